//! Typed errors for the extraction library.

use thiserror::Error;

/// Errors that can occur while extracting fields from a fetched page.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The page body could not be interpreted as the expected document
    #[error("malformed page for {sub_resource}: {reason}")]
    MalformedPage {
        sub_resource: &'static str,
        reason: String,
    },

    /// A CSS selector failed to parse (programming error in the extractor)
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
}
