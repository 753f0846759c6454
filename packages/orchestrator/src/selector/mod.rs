//! Tiered batch selection over the shared queue.
//!
//! Both selectors follow the same cascade discipline: a tier is only
//! consulted while the batch is still under-filled, results are
//! deduplicated by identifier across tiers, and the final set is
//! marked (claimed for raw items, queued for records) before being
//! returned to the worker.

pub mod refresh;
pub mod work_queue;

pub use refresh::RecordRefreshSelector;
pub use work_queue::WorkQueueSelector;

/// Funding amounts the portal serves to throttled sessions instead of
/// real numbers. A record holding this literal needs a re-scrape.
pub const FUNDING_OBFUSCATION_SENTINEL: &str = "obfuscated obfuscation";

/// Case-insensitive marker for partially obfuscated fields.
pub const OBFUSCATION_MARKER: &str = "obfuscate";
