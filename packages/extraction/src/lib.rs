//! Field extraction for organization profile pages.
//!
//! The orchestrator treats page parsing as an external collaborator:
//! it hands a fetched HTML body to an extractor and gets back one
//! typed field group per sub-resource (summary, financial, news,
//! tech) plus, for the summary page, the set of sub-pages worth
//! fetching. Merging the groups into a single document happens in
//! [`ScrapeDocument`], with a defined precedence: a group that has
//! already been set is never displaced by a later one.
//!
//! # Modules
//!
//! - [`types`] - Field-group types, one per sub-resource
//! - [`document`] - `ScrapeDocument` merge with override precedence
//! - [`traits`] - `BaseFieldExtractor` collaborator seam
//! - [`html`] - CSS-selector implementation + session-marker probe
//! - [`error`] - Typed extraction errors

pub mod document;
pub mod error;
pub mod html;
pub mod traits;
pub mod types;

pub use document::{FieldGroup, ScrapeDocument};
pub use error::ExtractionError;
pub use html::{has_session_marker, HtmlExtractor};
pub use traits::BaseFieldExtractor;
pub use types::{
    FinancialFields, FundingRound, NewsArticle, NewsFields, SubPageLinks, SummaryFields,
    TechFields,
};
