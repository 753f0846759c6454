//! Field-group types, one per scraped sub-resource.
//!
//! These are the typed replacement for the open-ended merged dicts
//! the scrapers used to pass around: each sub-page produces exactly
//! one named group, and the groups are stored under explicit keys.

use serde::{Deserialize, Serialize};

/// Fields extracted from the organization summary page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryFields {
    pub name: Option<String>,
    pub description: Option<String>,
    pub founded: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
}

impl SummaryFields {
    /// Whether the core description field is usable.
    ///
    /// A scrape whose summary has no description is classified as
    /// corrupt by the worker, so this check is the quarantine gate.
    pub fn has_description(&self) -> bool {
        self.description
            .as_deref()
            .map(|d| !d.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Which sub-pages the summary page links to.
///
/// Sub-resources are only fetched when the summary reports them
/// present; a profile without a financials tab never costs a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubPageLinks {
    pub financial: bool,
    pub news: bool,
    pub tech: bool,
}

/// One row of the funding-rounds table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundingRound {
    pub announced_on: Option<String>,
    pub round: Option<String>,
    pub money_raised: Option<String>,
}

/// Fields extracted from the financial-details sub-page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialFields {
    pub total_funding_amount: Option<String>,
    pub num_investors: Option<u32>,
    pub funding_rounds: Vec<FundingRound>,
}

/// One article from the news-and-analysis sub-page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: Option<String>,
    pub url: Option<String>,
    pub published_at: Option<String>,
    pub publisher: Option<String>,
}

/// Fields extracted from the news-and-analysis sub-page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsFields {
    pub articles: Vec<NewsArticle>,
}

/// Fields extracted from the tech-details sub-page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechFields {
    pub active_products: Vec<String>,
    pub monthly_visits: Option<String>,
}
