//! Merged scrape result for one organization.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{FinancialFields, NewsFields, SummaryFields, TechFields};

/// One named field group, as produced by a single sub-resource fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldGroup {
    Summary(SummaryFields),
    Financial(FinancialFields),
    News(NewsFields),
    Tech(TechFields),
}

impl FieldGroup {
    pub fn name(&self) -> &'static str {
        match self {
            FieldGroup::Summary(_) => "summary",
            FieldGroup::Financial(_) => "financial",
            FieldGroup::News(_) => "news",
            FieldGroup::Tech(_) => "tech",
        }
    }
}

/// The merged result document for one target, one slot per group.
///
/// Merge precedence: the first write to a slot wins. The summary is
/// always extracted first, so a later sub-resource can never
/// overwrite an already-set summary field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapeDocument {
    pub summary: Option<SummaryFields>,
    pub financial: Option<FinancialFields>,
    pub news: Option<NewsFields>,
    pub tech: Option<TechFields>,
}

impl ScrapeDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a field group into the document.
    ///
    /// Returns `false` (and leaves the slot untouched) if the group
    /// was already set.
    pub fn merge(&mut self, group: FieldGroup) -> bool {
        let slot = group.name();
        let merged = match group {
            FieldGroup::Summary(s) if self.summary.is_none() => {
                self.summary = Some(s);
                true
            }
            FieldGroup::Financial(f) if self.financial.is_none() => {
                self.financial = Some(f);
                true
            }
            FieldGroup::News(n) if self.news.is_none() => {
                self.news = Some(n);
                true
            }
            FieldGroup::Tech(t) if self.tech.is_none() => {
                self.tech = Some(t);
                true
            }
            _ => false,
        };
        if !merged {
            debug!(slot, "group slot already set, keeping the first extraction");
        }
        merged
    }

    /// Whether the usable core field (summary description) is present.
    pub fn has_core_description(&self) -> bool {
        self.summary
            .as_ref()
            .map(|s| s.has_description())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_summary_wins() {
        let mut doc = ScrapeDocument::new();
        assert!(doc.merge(FieldGroup::Summary(SummaryFields {
            description: Some("a robotics startup".into()),
            ..Default::default()
        })));

        // Second summary must not displace the first
        assert!(!doc.merge(FieldGroup::Summary(SummaryFields {
            description: Some("something else".into()),
            ..Default::default()
        })));
        assert_eq!(
            doc.summary.unwrap().description.as_deref(),
            Some("a robotics startup")
        );
    }

    #[test]
    fn groups_fill_independent_slots() {
        let mut doc = ScrapeDocument::new();
        assert!(doc.merge(FieldGroup::Summary(SummaryFields::default())));
        assert!(doc.merge(FieldGroup::Financial(FinancialFields::default())));
        assert!(doc.merge(FieldGroup::News(NewsFields::default())));
        assert!(doc.merge(FieldGroup::Tech(TechFields::default())));
        assert!(doc.financial.is_some());
        assert!(doc.tech.is_some());
    }

    #[test]
    fn blank_description_is_not_core() {
        let mut doc = ScrapeDocument::new();
        doc.merge(FieldGroup::Summary(SummaryFields {
            description: Some("   ".into()),
            ..Default::default()
        }));
        assert!(!doc.has_core_description());
    }
}
