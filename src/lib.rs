//! # CrateDB Sink
//!
//! Persists batches of time-series metrics into CrateDB by rendering them as
//! a single multi-row INSERT statement.
//!
//! ## Modules
//!
//! - [`encoding`]: Value → SQL literal encoder
//! - [`statement`]: INSERT and CREATE TABLE builders
//! - [`metric`]: Metric records and series identity
//! - [`executor`]: Statement execution over CrateDB's HTTP endpoint
//! - [`sink`]: Connect / write lifecycle
//! - [`config`]: TOML and environment configuration
//!
//! CrateDB does not support bound parameters, so values are inlined as
//! escaped literals. Do not feed untrusted text through this crate without
//! validating it upstream.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cratedb_sink::{CrateSink, HttpExecutor, MetricRecord, SinkConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SinkConfig {
//!         table_create: true,
//!         ..SinkConfig::default()
//!     };
//!     let executor = Arc::new(HttpExecutor::from_config(&config)?);
//!     let sink = CrateSink::connect(config, executor).await?;
//!
//!     let batch = vec![
//!         MetricRecord::new("cpu")
//!             .tag("host", "web-1")
//!             .field("usage_idle", 97.5f64),
//!     ];
//!     sink.write(&batch).await?;
//!
//!     sink.close();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod encoding;
pub mod error;
pub mod executor;
pub mod metric;
pub mod sink;
pub mod statement;

// Re-export top-level types for convenience
pub use config::{generate_default_config, Config, ConfigError, LoggingConfig, SinkConfig};
pub use encoding::{Encoder, Number, TimeZoneSetting, Value};
pub use error::{EncodeError, EncodeResult, SinkError, SinkResult};
pub use executor::{HttpExecutor, SqlExecutor};
pub use metric::{MetricRecord, RecordError};
pub use sink::{CrateSink, SinkStats};
pub use statement::StatementBuilder;
