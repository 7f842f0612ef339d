//! CrateDB sink lifecycle
//!
//! `CrateSink` ties the pieces together:
//!
//! ```text
//! connect:  [table_create] CREATE TABLE IF NOT EXISTS → executor
//! write:    &[MetricRecord] → StatementBuilder → INSERT → executor (deadline)
//! ```
//!
//! Failures are returned exactly as the executor reports them. Nothing is
//! retried here; the calling pipeline owns retry and backoff.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::SinkConfig;
use crate::error::SinkResult;
use crate::executor::SqlExecutor;
use crate::metric::MetricRecord;
use crate::statement::StatementBuilder;

/// Writes metric batches into a CrateDB table
pub struct CrateSink {
    config: SinkConfig,
    builder: StatementBuilder,
    executor: Arc<dyn SqlExecutor>,
    stats: Counters,
}

#[derive(Debug, Default)]
struct Counters {
    statements: AtomicU64,
    records: AtomicU64,
    failures: AtomicU64,
}

/// Snapshot of sink activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// INSERT statements executed successfully
    pub statements: u64,
    /// Records carried by those statements
    pub records: u64,
    /// Batches that failed to encode or execute
    pub failures: u64,
}

impl fmt::Display for SinkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} statements, {} records, {} failures",
            self.statements, self.records, self.failures
        )
    }
}

impl CrateSink {
    /// Validate configuration and, if enabled, create the destination table
    pub async fn connect(config: SinkConfig, executor: Arc<dyn SqlExecutor>) -> SinkResult<Self> {
        config.validate()?;
        let builder = StatementBuilder::new(config.encoder()?);

        let sink = Self {
            config,
            builder,
            executor,
            stats: Counters::default(),
        };

        if sink.config.table_create {
            sink.create_table().await?;
        }

        tracing::info!(
            "CrateDB sink ready: table={} timeout={:?}",
            sink.config.table,
            sink.config.timeout()
        );
        Ok(sink)
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    pub fn builder(&self) -> &StatementBuilder {
        &self.builder
    }

    /// Issue CREATE TABLE IF NOT EXISTS for the configured table
    pub async fn create_table(&self) -> SinkResult<()> {
        let sql = self
            .builder
            .build_create_table(&self.config.table, self.config.partition_by_day);

        tracing::info!("Ensuring table {} exists", self.config.table);
        self.executor.execute(&sql, self.config.timeout()).await.map_err(|e| {
            tracing::error!("Failed to create table {}: {}", self.config.table, e);
            e
        })
    }

    /// Write one batch as a single INSERT
    ///
    /// An empty batch is skipped without touching the database.
    pub async fn write(&self, metrics: &[MetricRecord]) -> SinkResult<()> {
        if metrics.is_empty() {
            tracing::debug!("Skipping empty batch");
            return Ok(());
        }

        let sql = match self.builder.build_insert(&self.config.table, metrics) {
            Ok(sql) => sql,
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Dropping batch of {} records: {}", metrics.len(), e);
                return Err(e.into());
            }
        };

        let started = Instant::now();
        if let Err(e) = self.executor.execute(&sql, self.config.timeout()).await {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Failed to write {} records: {}", metrics.len(), e);
            tracing::debug!(statement = %sql, "Rejected statement");
            return Err(e);
        }

        self.stats.statements.fetch_add(1, Ordering::Relaxed);
        self.stats
            .records
            .fetch_add(metrics.len() as u64, Ordering::Relaxed);
        tracing::debug!(
            "Wrote {} records to {} in {:?}",
            metrics.len(),
            self.config.table,
            started.elapsed()
        );
        Ok(())
    }

    /// Write records in chunks of the configured batch size
    ///
    /// Stops at the first failing chunk; earlier chunks stay written.
    /// Returns the number of records written.
    pub async fn write_all(&self, metrics: &[MetricRecord]) -> SinkResult<usize> {
        let mut written = 0;
        for chunk in metrics.chunks(self.config.batch_size.max(1)) {
            self.write(chunk).await?;
            written += chunk.len();
        }
        Ok(written)
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            statements: self.stats.statements.load(Ordering::Relaxed),
            records: self.stats.records.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
        }
    }

    /// Release the database handle
    pub fn close(self) {
        tracing::info!("Closing CrateDB sink: {}", self.stats());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::error::{EncodeError, SinkError};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records statements and replays scripted failures
    #[derive(Default)]
    struct MockExecutor {
        statements: Mutex<Vec<(String, Duration)>>,
        failures: Mutex<Vec<SinkError>>,
    }

    impl MockExecutor {
        fn failing_with(err: SinkError) -> Self {
            let mock = Self::default();
            mock.failures.lock().unwrap().push(err);
            mock
        }

        fn statements(&self) -> Vec<String> {
            self.statements
                .lock()
                .unwrap()
                .iter()
                .map(|(s, _)| s.clone())
                .collect()
        }
    }

    #[async_trait]
    impl SqlExecutor for MockExecutor {
        async fn execute(&self, stmt: &str, deadline: Duration) -> SinkResult<()> {
            self.statements
                .lock()
                .unwrap()
                .push((stmt.to_string(), deadline));
            match self.failures.lock().unwrap().pop() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    fn config() -> SinkConfig {
        SinkConfig {
            table: "metrics".to_string(),
            timezone: "utc".to_string(),
            timeout_ms: 750,
            ..SinkConfig::default()
        }
    }

    fn record(i: u64) -> MetricRecord {
        MetricRecord::with_timestamp("cpu", Utc.timestamp_millis_opt(1_672_628_645_678).unwrap())
            .identity(i)
            .tag("host", "web-1")
            .field("usage", 42.5f64)
    }

    #[tokio::test]
    async fn test_connect_creates_table_first() {
        let mock = Arc::new(MockExecutor::default());
        let mut cfg = config();
        cfg.table_create = true;

        let sink = CrateSink::connect(cfg, mock.clone()).await.unwrap();
        sink.write(&[record(1)]).await.unwrap();

        let statements = mock.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS metrics ("));
        assert!(statements[0].ends_with("PARTITIONED BY (\"day\");"));
        assert!(statements[1].starts_with("INSERT INTO metrics "));
    }

    #[tokio::test]
    async fn test_connect_without_table_create() {
        let mock = Arc::new(MockExecutor::default());
        let _sink = CrateSink::connect(config(), mock.clone()).await.unwrap();
        assert!(mock.statements().is_empty());
    }

    #[tokio::test]
    async fn test_connect_surfaces_create_failure() {
        let mock = Arc::new(MockExecutor::failing_with(SinkError::Connection(
            "connection refused".to_string(),
        )));
        let mut cfg = config();
        cfg.table_create = true;

        let result = CrateSink::connect(cfg, mock).await;
        assert!(matches!(result, Err(SinkError::Connection(msg)) if msg == "connection refused"));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let mock = Arc::new(MockExecutor::default());
        let mut cfg = config();
        cfg.table = String::new();

        let result = CrateSink::connect(cfg, mock.clone()).await;
        assert!(matches!(
            result,
            Err(SinkError::Config(ConfigError::Invalid(_)))
        ));
        assert!(mock.statements().is_empty());
    }

    #[tokio::test]
    async fn test_write_uses_configured_timeout() {
        let mock = Arc::new(MockExecutor::default());
        let sink = CrateSink::connect(config(), mock.clone()).await.unwrap();

        sink.write(&[record(14305102049502225714)]).await.unwrap();

        let (stmt, deadline) = mock.statements.lock().unwrap()[0].clone();
        assert_eq!(deadline, Duration::from_millis(750));
        assert_eq!(
            stmt,
            "INSERT INTO metrics (\"hash_id\", \"timestamp\", \"name\", \"tags\", \"fields\") VALUES \
             (-4141642024207325902, '2023-01-02T03:04:05.678+0000', 'cpu', {\"host\" = 'web-1'}, {\"usage\" = 42.5});"
        );
        assert_eq!(
            sink.stats(),
            SinkStats {
                statements: 1,
                records: 1,
                failures: 0
            }
        );
    }

    #[tokio::test]
    async fn test_empty_write_skips_executor() {
        let mock = Arc::new(MockExecutor::default());
        let sink = CrateSink::connect(config(), mock.clone()).await.unwrap();

        sink.write(&[]).await.unwrap();
        assert!(mock.statements().is_empty());
        assert_eq!(sink.stats(), SinkStats::default());
    }

    #[tokio::test]
    async fn test_encoding_failure_never_reaches_executor() {
        let mock = Arc::new(MockExecutor::default());
        let sink = CrateSink::connect(config(), mock.clone()).await.unwrap();

        let bad = record(2).field("nested", vec![1i64, 2]);
        let result = sink.write(&[record(1), bad]).await;

        assert!(matches!(
            result,
            Err(SinkError::Encode(EncodeError::UnsupportedType { ref type_name })) if type_name == "list"
        ));
        assert!(mock.statements().is_empty());
        assert_eq!(sink.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_execution_errors_propagate_unchanged() {
        let mock = Arc::new(MockExecutor::failing_with(SinkError::Execution {
            status: Some(400),
            message: "DuplicateKeyException".to_string(),
        }));
        let sink = CrateSink::connect(config(), mock.clone()).await.unwrap();

        let result = sink.write(&[record(1)]).await;
        match result {
            Err(SinkError::Execution { status, message }) => {
                assert_eq!(status, Some(400));
                assert_eq!(message, "DuplicateKeyException");
            }
            other => panic!("expected execution error, got {:?}", other),
        }

        // No retry
        assert_eq!(mock.statements().len(), 1);
        assert_eq!(sink.stats().failures, 1);
        assert_eq!(sink.stats().statements, 0);
    }

    #[tokio::test]
    async fn test_timeout_propagates() {
        let mock = Arc::new(MockExecutor::failing_with(SinkError::Timeout(
            Duration::from_millis(750),
        )));
        let sink = CrateSink::connect(config(), mock).await.unwrap();

        let result = sink.write(&[record(1)]).await;
        assert!(matches!(result, Err(SinkError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_write_all_chunks_batches() {
        let mock = Arc::new(MockExecutor::default());
        let mut cfg = config();
        cfg.batch_size = 2;
        let sink = CrateSink::connect(cfg, mock.clone()).await.unwrap();

        let records: Vec<_> = (0..5).map(record).collect();
        let written = sink.write_all(&records).await.unwrap();

        assert_eq!(written, 5);
        let statements = mock.statements();
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0].matches(",\n").count(), 1);
        assert_eq!(statements[2].matches(",\n").count(), 0);
        assert_eq!(sink.stats().records, 5);
        assert_eq!(sink.stats().to_string(), "3 statements, 5 records, 0 failures");
    }

    #[tokio::test]
    async fn test_sink_is_shareable_across_tasks() {
        let mock = Arc::new(MockExecutor::default());
        let sink = Arc::new(CrateSink::connect(config(), mock.clone()).await.unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = Arc::clone(&sink);
                tokio::spawn(async move { sink.write(&[record(i)]).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(mock.statements().len(), 8);
        assert_eq!(sink.stats().records, 8);
    }
}
