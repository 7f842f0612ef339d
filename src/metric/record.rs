//! Metric records as delivered by the collection pipeline

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::BufRead;
use thiserror::Error;

use super::identity::series_identity;
use crate::encoding::{reinterpret_identity, Value};

/// A single metric sample: one series at one instant, with any number of fields
///
/// Tags are indexed string dimensions; fields hold the measured values.
/// The identity defaults to a hash of the name and tags; see [`series_identity`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawRecord")]
pub struct MetricRecord {
    name: String,
    timestamp: DateTime<Utc>,
    tags: HashMap<String, String>,
    fields: HashMap<String, Value>,
    /// Explicit identity; derived from name and tags when absent
    identity: Option<u64>,
}

impl MetricRecord {
    /// Create a record stamped with the current time
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_timestamp(name, Utc::now())
    }

    /// Create a record at a specific instant
    pub fn with_timestamp(name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            timestamp,
            tags: HashMap::new(),
            fields: HashMap::new(),
            identity: None,
        }
    }

    /// Builder method: set timestamp
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Builder method: add a tag
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Builder method: add multiple tags
    pub fn tags(mut self, tags: HashMap<String, String>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Builder method: add a field
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Builder method: override the derived identity
    pub fn identity(mut self, identity: u64) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn tag_map(&self) -> &HashMap<String, String> {
        &self.tags
    }

    pub fn field_map(&self) -> &HashMap<String, Value> {
        &self.fields
    }

    /// The unsigned series identity
    pub fn hash_id(&self) -> u64 {
        self.identity
            .unwrap_or_else(|| series_identity(&self.name, &self.tags))
    }

    /// The identity with its bits reinterpreted as a signed LONG
    pub fn signed_hash_id(&self) -> i64 {
        reinterpret_identity(self.hash_id())
    }

    /// Tags as an object value
    pub fn tags_value(&self) -> Value {
        Value::object(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    /// Fields as an object value
    pub fn fields_value(&self) -> Value {
        Value::object(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    /// Parse newline-delimited JSON records, skipping blank lines
    pub fn from_json_lines(reader: impl BufRead) -> Result<Vec<Self>, RecordError> {
        let mut records = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record: MetricRecord =
                serde_json::from_str(&line).map_err(|e| RecordError::Parse {
                    line: idx + 1,
                    error: e.to_string(),
                })?;
            records.push(record);
        }

        Ok(records)
    }
}

/// Errors reading serialized records
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid record on line {line}: {error}")]
    Parse { line: usize, error: String },
}

/// Wire shape of a JSON record
#[derive(Deserialize)]
struct RawRecord {
    name: String,
    timestamp: RawTimestamp,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    fields: HashMap<String, Value>,
    #[serde(default, alias = "identity")]
    hash_id: Option<u64>,
}

/// RFC 3339 text or Unix milliseconds
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

impl TryFrom<RawRecord> for MetricRecord {
    type Error = String;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        if raw.name.is_empty() {
            return Err("metric name must not be empty".to_string());
        }

        let timestamp = match raw.timestamp {
            RawTimestamp::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| format!("timestamp out of range: {}", ms))?,
            RawTimestamp::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map_err(|e| format!("invalid timestamp '{}': {}", s, e))?
                .with_timezone(&Utc),
        };

        Ok(Self {
            name: raw.name,
            timestamp,
            tags: raw.tags,
            fields: raw.fields,
            identity: raw.hash_id,
        })
    }
}
