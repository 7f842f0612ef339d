//! Metric records
//!
//! - **record**: the `MetricRecord` type and its JSON-lines form
//! - **identity**: FNV-1a series identity over name and tags

pub mod identity;
pub mod record;

pub use identity::series_identity;
pub use record::{MetricRecord, RecordError};
