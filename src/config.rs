//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::encoding::{Encoder, TimeZoneSetting};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// CrateDB sink configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    /// CrateDB HTTP endpoint
    #[serde(default = "default_url")]
    pub url: String,

    /// Destination table; inserted into SQL verbatim
    #[serde(default = "default_table")]
    pub table: String,

    /// Issue CREATE TABLE IF NOT EXISTS on connect
    #[serde(default)]
    pub table_create: bool,

    /// Add a generated `day` column and partition by it
    #[serde(default = "default_partition_by_day")]
    pub partition_by_day: bool,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// `local`, `utc`, or a fixed offset such as `+02:00`
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Replacement for `.` in object keys
    #[serde(default)]
    pub key_separator: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Maximum records per INSERT when writing large inputs
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_url() -> String {
    "http://localhost:4200".to_string()
}

fn default_table() -> String {
    "metrics".to_string()
}

fn default_partition_by_day() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5000 // 5 seconds
}

fn default_timezone() -> String {
    "local".to_string()
}

fn default_batch_size() -> usize {
    1000
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            table: default_table(),
            table_create: false,
            partition_by_day: default_partition_by_day(),
            timeout_ms: default_timeout_ms(),
            timezone: default_timezone(),
            key_separator: None,
            username: None,
            password: None,
            batch_size: default_batch_size(),
        }
    }
}

impl SinkConfig {
    /// Deadline for a single statement
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parse the configured timezone
    pub fn time_zone(&self) -> Result<TimeZoneSetting, ConfigError> {
        self.timezone
            .parse::<TimeZoneSetting>()
            .map_err(|e| ConfigError::Invalid(format!("timezone: {}", e)))
    }

    /// Build the literal encoder this configuration describes
    pub fn encoder(&self) -> Result<Encoder, ConfigError> {
        let mut encoder = Encoder::new().with_zone(self.time_zone()?);
        if let Some(sep) = &self.key_separator {
            encoder = encoder.with_key_separator(sep.clone());
        }
        Ok(encoder)
    }

    /// Check for values that would produce broken statements
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.trim().is_empty() {
            return Err(ConfigError::Invalid("table must not be empty".to_string()));
        }
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("url must not be empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        self.time_zone()?;
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    ///
    /// The first existing file wins. A file that exists but cannot be loaded
    /// is an error rather than a silent fallback to defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("cratedb-sink").join("config.toml")),
            Some(PathBuf::from("/etc/cratedb-sink/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        if let Some(config) = Self::load_first(&config_paths)? {
            return Ok(config);
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Ok(Self::from_env())
    }

    /// Load the first of `paths` that exists
    fn load_first(paths: &[PathBuf]) -> Result<Option<Self>, ConfigError> {
        let Some(path) = paths.iter().find(|p| p.exists()) else {
            return Ok(None);
        };
        let config = Self::load_with_env(path)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(Some(config))
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CRATEDB_SINK_URL") {
            self.sink.url = url;
        }
        if let Some(table) = lookup("CRATEDB_SINK_TABLE") {
            self.sink.table = table;
        }
        if let Some(create) = lookup("CRATEDB_SINK_TABLE_CREATE") {
            if let Some(b) = parse_override("CRATEDB_SINK_TABLE_CREATE", &create) {
                self.sink.table_create = b;
            }
        }
        if let Some(timeout) = lookup("CRATEDB_SINK_TIMEOUT_MS") {
            if let Some(ms) = parse_override("CRATEDB_SINK_TIMEOUT_MS", &timeout) {
                self.sink.timeout_ms = ms;
            }
        }
        if let Some(tz) = lookup("CRATEDB_SINK_TIMEZONE") {
            self.sink.timezone = tz;
        }

        // Logging overrides
        if let Some(level) = lookup("CRATEDB_SINK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CRATEDB_SINK_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Parse an environment override, warning and ignoring it when malformed
fn parse_override<T>(name: &str, value: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!("Ignoring {}={:?}: {}", name, value, e);
            None
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# CrateDB Sink Configuration
#
# Environment variables override these settings:
# - CRATEDB_SINK_URL
# - CRATEDB_SINK_TABLE
# - CRATEDB_SINK_TABLE_CREATE
# - CRATEDB_SINK_TIMEOUT_MS
# - CRATEDB_SINK_TIMEZONE
# - CRATEDB_SINK_LOG_LEVEL
# - CRATEDB_SINK_LOG_FORMAT

[sink]
# CrateDB HTTP endpoint (statements are sent to <url>/_sql)
url = "http://localhost:4200"

# Destination table. Inserted verbatim; never take this from user input.
table = "metrics"

# Create the table on startup if it does not exist
table_create = false

# Partition the table by a generated day column
partition_by_day = true

# Timeout for each statement in milliseconds
timeout_ms = 5000

# Zone for rendering timestamps: local, utc, or an offset like +02:00
timezone = "local"

# Replace dots in tag and field keys (CrateDB reads them as object paths)
# key_separator = "_"

# HTTP basic auth
# username = "crate"
# password = ""

# Maximum records per INSERT statement
batch_size = 1000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sink.url, "http://localhost:4200");
        assert_eq!(config.sink.table, "metrics");
        assert!(!config.sink.table_create);
        assert!(config.sink.partition_by_day);
        assert_eq!(config.sink.timeout(), Duration::from_secs(5));
        assert_eq!(config.sink.time_zone().unwrap(), TimeZoneSetting::Local);
        assert_eq!(config.logging.level, "info");
        assert!(config.sink.validate().is_ok());
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        let defaults = SinkConfig::default();
        assert_eq!(config.sink.url, defaults.url);
        assert_eq!(config.sink.table, defaults.table);
        assert_eq!(config.sink.timeout_ms, defaults.timeout_ms);
        assert_eq!(config.sink.batch_size, defaults.batch_size);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[sink]
url = "http://crate:4200"
table = "doc.telemetry"
table_create = true
timeout_ms = 250
timezone = "utc"
key_separator = "_"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.sink.url, "http://crate:4200");
        assert_eq!(config.sink.table, "doc.telemetry");
        assert!(config.sink.table_create);
        assert!(config.sink.partition_by_day);
        assert_eq!(config.sink.timeout(), Duration::from_millis(250));

        let encoder = config.sink.encoder().unwrap();
        assert_eq!(encoder.zone(), TimeZoneSetting::Utc);
        assert_eq!(encoder.key_separator(), Some("_"));
    }

    #[test]
    fn test_load_errors() {
        let err = Config::load(Path::new("/nonexistent/cratedb-sink.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[sink\nurl = ").unwrap();
        match Config::load(file.path()).unwrap_err() {
            ConfigError::Parse { path, .. } => assert_eq!(path, file.path()),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_validation() {
        let mut config = SinkConfig::default();
        config.table = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SinkConfig::default();
        config.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = SinkConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = SinkConfig::default();
        config.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());
        assert!(config.encoder().is_err());
    }

    #[test]
    fn test_load_first_fails_on_malformed_file() {
        let mut broken = NamedTempFile::new().unwrap();
        writeln!(broken, "[sink\nurl = ").unwrap();
        let missing = PathBuf::from("/nonexistent/cratedb-sink.toml");

        let err = Config::load_first(&[missing.clone(), broken.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        assert!(Config::load_first(&[missing.clone()]).unwrap().is_none());

        let mut good = NamedTempFile::new().unwrap();
        writeln!(good, "[sink]\ntable = \"telemetry\"").unwrap();
        let config = Config::load_first(&[missing, good.path().to_path_buf()])
            .unwrap()
            .unwrap();
        assert_eq!(config.sink.table, "telemetry");
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("CRATEDB_SINK_URL", "http://crate:4200"),
            ("CRATEDB_SINK_TABLE_CREATE", "true"),
            ("CRATEDB_SINK_TIMEOUT_MS", "750"),
            ("CRATEDB_SINK_TIMEZONE", "utc"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.sink.url, "http://crate:4200");
        assert!(config.sink.table_create);
        assert_eq!(config.sink.timeout_ms, 750);
        assert_eq!(config.sink.timezone, "utc");
        assert_eq!(config.sink.table, "metrics");
    }

    #[test]
    fn test_malformed_overrides_warn_and_keep_value() {
        let env: HashMap<&str, &str> = [
            ("CRATEDB_SINK_TABLE_CREATE", "1"),
            ("CRATEDB_SINK_TIMEOUT_MS", "5s"),
        ]
        .into_iter()
        .collect();

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let mut config = Config::default();
        tracing::subscriber::with_default(subscriber, || {
            config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        });

        assert!(!config.sink.table_create);
        assert_eq!(config.sink.timeout_ms, 5000);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"), "{}", output);
        assert!(output.contains("CRATEDB_SINK_TABLE_CREATE"), "{}", output);
        assert!(output.contains("CRATEDB_SINK_TIMEOUT_MS"), "{}", output);
    }
}
