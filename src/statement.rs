//! SQL statement construction
//!
//! Turns a batch of records into one multi-row INSERT, and renders the
//! destination table's DDL. Table identifiers come from trusted configuration
//! and are inserted verbatim.

use crate::encoding::{Encoder, Value};
use crate::error::{EncodeError, EncodeResult};
use crate::metric::MetricRecord;

/// Column list shared by the INSERT and the table schema
pub const COLUMNS: [&str; 5] = ["hash_id", "timestamp", "name", "tags", "fields"];

/// Builds INSERT and CREATE TABLE statements
#[derive(Debug, Clone, Default)]
pub struct StatementBuilder {
    encoder: Encoder,
}

impl StatementBuilder {
    pub fn new(encoder: Encoder) -> Self {
        Self { encoder }
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// Build one INSERT covering every record
    ///
    /// Fails with [`EncodeError::EmptyBatch`] on an empty slice, and with the
    /// first encoding error of any column otherwise. Nothing is returned on
    /// failure.
    pub fn build_insert(&self, table: &str, metrics: &[MetricRecord]) -> EncodeResult<String> {
        if metrics.is_empty() {
            return Err(EncodeError::EmptyBatch);
        }

        let rows = metrics
            .iter()
            .map(|m| self.encode_row(m))
            .collect::<EncodeResult<Vec<_>>>()?;

        let columns = COLUMNS
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!(
            "INSERT INTO {} ({}) VALUES {};",
            table,
            columns,
            rows.join(",\n")
        ))
    }

    /// Encode one record as a parenthesized row tuple
    fn encode_row(&self, metric: &MetricRecord) -> EncodeResult<String> {
        let cols = [
            Value::from(metric.signed_hash_id()),
            Value::from(metric.time()),
            Value::from(metric.name()),
            metric.tags_value(),
            metric.fields_value(),
        ];

        let mut row = String::from("(");
        for (i, col) in cols.iter().enumerate() {
            if i > 0 {
                row.push_str(", ");
            }
            self.encoder.encode_into(col, &mut row)?;
        }
        row.push(')');
        Ok(row)
    }

    /// Render the destination table's DDL
    ///
    /// With `partition_by_day`, a generated `day` column truncates the
    /// timestamp, joins the primary key, and partitions the table.
    pub fn build_create_table(&self, table: &str, partition_by_day: bool) -> String {
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n\
             \x20   \"hash_id\" LONG INDEX OFF,\n\
             \x20   \"timestamp\" TIMESTAMP NOT NULL,\n\
             \x20   \"name\" STRING,\n\
             \x20   \"tags\" OBJECT(DYNAMIC),\n\
             \x20   \"fields\" OBJECT(DYNAMIC),\n",
            table
        );

        if partition_by_day {
            sql.push_str(
                "    \"day\" TIMESTAMP GENERATED ALWAYS AS date_trunc('day', \"timestamp\"),\n\
                 \x20   PRIMARY KEY (\"timestamp\", \"hash_id\", \"day\")\n\
                 ) PARTITIONED BY (\"day\");",
            );
        } else {
            sql.push_str(
                "    PRIMARY KEY (\"timestamp\", \"hash_id\")\n\
                 );",
            );
        }

        sql
    }
}
