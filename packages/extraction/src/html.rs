//! CSS-selector extractor over fetched profile pages.
//!
//! Selector depth is deliberately shallow: the orchestration layer is
//! the product here, and this implementation exists so the pipeline
//! runs end to end against the portal's markup. Tightening individual
//! selectors does not change any orchestration contract.

use scraper::{Html, Selector};
use tracing::debug;

use crate::error::ExtractionError;
use crate::traits::BaseFieldExtractor;
use crate::types::{
    FinancialFields, FundingRound, NewsArticle, NewsFields, SubPageLinks, SummaryFields,
    TechFields,
};

fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::InvalidSelector(e.to_string()))
}

fn text_of(doc: &Html, css: &str) -> Result<Option<String>, ExtractionError> {
    let sel = selector(css)?;
    Ok(doc
        .select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty()))
}

fn attr_of(doc: &Html, css: &str, attr: &str) -> Result<Option<String>, ExtractionError> {
    let sel = selector(css)?;
    Ok(doc
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

/// The portal renders an account button only while the session is
/// authenticated; its absence on a 200 response means the session
/// silently expired and the worker must log in again.
pub fn has_session_marker(body: &str) -> bool {
    let doc = Html::parse_document(body);
    match Selector::parse(r#"button[aria-label="Account"]"#) {
        Ok(sel) => doc.select(&sel).next().is_some(),
        Err(_) => false,
    }
}

/// Extractor backed by the `scraper` crate's CSS selectors.
#[derive(Debug, Default)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl BaseFieldExtractor for HtmlExtractor {
    fn extract_summary(
        &self,
        body: &str,
    ) -> Result<(SummaryFields, SubPageLinks), ExtractionError> {
        let doc = Html::parse_document(body);

        let fields = SummaryFields {
            name: text_of(&doc, "h1.profile-name")?
                .or(text_of(&doc, "h1")?),
            description: text_of(&doc, "span.description")?
                .or(attr_of(&doc, r#"meta[name="description"]"#, "content")?),
            founded: text_of(&doc, "span.component--field-formatter.field-type-date_precision")?,
            location: text_of(&doc, "span.component--field-formatter.field-type-identifier")?,
            website: attr_of(&doc, "a.component--field-formatter.link-accent", "href")?,
            logo_url: attr_of(&doc, "img.profile-logo", "src")?,
        };

        let tab = |name: &str| -> Result<bool, ExtractionError> {
            let sel = selector(&format!(r#"a[href$="/{}"]"#, name))?;
            Ok(doc.select(&sel).next().is_some())
        };
        let links = SubPageLinks {
            financial: tab("financial_details")?,
            news: tab("news_and_analysis")?,
            tech: tab("tech_details")?,
        };

        debug!(
            has_description = fields.has_description(),
            ?links,
            "summary extracted"
        );
        Ok((fields, links))
    }

    fn extract_financial(&self, body: &str) -> Result<FinancialFields, ExtractionError> {
        let doc = Html::parse_document(body);

        let row_sel = selector("table.funding-rounds tbody tr")?;
        let cell_sel = selector("td")?;
        let mut funding_rounds = Vec::new();
        for row in doc.select(&row_sel) {
            let cells: Vec<String> = row
                .select(&cell_sel)
                .map(|c| c.text().collect::<String>().trim().to_string())
                .collect();
            funding_rounds.push(FundingRound {
                announced_on: cells.first().cloned().filter(|c| !c.is_empty()),
                round: cells.get(1).cloned().filter(|c| !c.is_empty()),
                money_raised: cells.get(2).cloned().filter(|c| !c.is_empty()),
            });
        }

        Ok(FinancialFields {
            total_funding_amount: text_of(&doc, "span.total-funding")?,
            num_investors: text_of(&doc, "span.num-investors")?
                .and_then(|v| v.replace(',', "").parse().ok()),
            funding_rounds,
        })
    }

    fn extract_news(&self, body: &str) -> Result<NewsFields, ExtractionError> {
        let doc = Html::parse_document(body);

        let item_sel = selector("div.press-reference")?;
        let mut articles = Vec::new();
        for item in doc.select(&item_sel) {
            let link_sel = selector("a")?;
            let link = item.select(&link_sel).next();
            articles.push(NewsArticle {
                title: link
                    .map(|a| a.text().collect::<String>().trim().to_string())
                    .filter(|t| !t.is_empty()),
                url: link
                    .and_then(|a| a.value().attr("href"))
                    .map(str::to_string),
                published_at: item
                    .select(&selector("span.date")?)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string()),
                publisher: item
                    .select(&selector("span.publisher")?)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string()),
            });
        }

        Ok(NewsFields { articles })
    }

    fn extract_tech(&self, body: &str) -> Result<TechFields, ExtractionError> {
        let doc = Html::parse_document(body);

        let product_sel = selector("div.active-products li")?;
        let active_products = doc
            .select(&product_sel)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        Ok(TechFields {
            active_products,
            monthly_visits: text_of(&doc, "span.monthly-visits")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_marker_detected() {
        let body = r#"<html><body><button aria-label="Account">Me</button></body></html>"#;
        assert!(has_session_marker(body));
        assert!(!has_session_marker("<html><body>Log in</body></html>"));
    }

    #[test]
    fn summary_reports_subpage_links() {
        let body = r#"
            <html><body>
              <h1 class="profile-name">Acme Robotics</h1>
              <span class="description">Industrial robot arms.</span>
              <a href="/organization/acme/financial_details">Financials</a>
              <a href="/organization/acme/news_and_analysis">News</a>
            </body></html>"#;
        let (fields, links) = HtmlExtractor::new().extract_summary(body).unwrap();
        assert_eq!(fields.name.as_deref(), Some("Acme Robotics"));
        assert!(fields.has_description());
        assert!(links.financial);
        assert!(links.news);
        assert!(!links.tech);
    }

    #[test]
    fn financial_rows_parsed() {
        let body = r#"
            <html><body>
              <span class="total-funding">$12M</span>
              <table class="funding-rounds"><tbody>
                <tr><td>Jan 3, 2024</td><td>Series A</td><td>$10M</td></tr>
                <tr><td>Mar 1, 2022</td><td>Seed</td><td>$2M</td></tr>
              </tbody></table>
            </body></html>"#;
        let fields = HtmlExtractor::new().extract_financial(body).unwrap();
        assert_eq!(fields.total_funding_amount.as_deref(), Some("$12M"));
        assert_eq!(fields.funding_rounds.len(), 2);
        assert_eq!(fields.funding_rounds[1].round.as_deref(), Some("Seed"));
    }
}
