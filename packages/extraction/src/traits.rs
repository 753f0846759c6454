// Trait seam between the worker and the page extractors.
//
// Naming convention: Base* for trait names (matches the rest of the
// codebase's dependency-injection traits).

use crate::error::ExtractionError;
use crate::types::{FinancialFields, NewsFields, SubPageLinks, SummaryFields, TechFields};

/// Extracts typed field groups from fetched page bodies.
///
/// One method per sub-resource type. Extraction is pure CPU work on
/// an already-fetched body, so the methods are synchronous.
pub trait BaseFieldExtractor: Send + Sync {
    /// Extract the summary group plus the set of sub-pages the
    /// profile links to.
    fn extract_summary(
        &self,
        body: &str,
    ) -> Result<(SummaryFields, SubPageLinks), ExtractionError>;

    fn extract_financial(&self, body: &str) -> Result<FinancialFields, ExtractionError>;

    fn extract_news(&self, body: &str) -> Result<NewsFields, ExtractionError>;

    fn extract_tech(&self, body: &str) -> Result<TechFields, ExtractionError>;
}
