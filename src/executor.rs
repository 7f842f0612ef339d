//! Statement execution
//!
//! `SqlExecutor` is the seam between statement building and the network.
//! The production implementation talks to CrateDB's HTTP endpoint:
//!
//! ```text
//! POST <url>/_sql
//! {"stmt": "INSERT INTO ..."}
//! ```
//!
//! Every call is bounded by a caller-supplied deadline. When it elapses the
//! request future is dropped, which cancels the in-flight request.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SinkConfig;
use crate::error::{SinkError, SinkResult};

/// Executes SQL text against the destination
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run one statement, failing with [`SinkError::Timeout`] past `deadline`
    async fn execute(&self, stmt: &str, deadline: Duration) -> SinkResult<()>;
}

/// CrateDB HTTP `_sql` client
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    endpoint: String,
    credentials: Option<(String, Option<String>)>,
}

impl HttpExecutor {
    /// Create an executor for the CrateDB node at `url`
    pub fn new(url: &str) -> SinkResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| SinkError::Connection(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/_sql", url.trim_end_matches('/')),
            credentials: None,
        })
    }

    /// Create an executor from sink configuration
    pub fn from_config(config: &SinkConfig) -> SinkResult<Self> {
        let mut executor = Self::new(&config.url)?;
        if let Some(user) = &config.username {
            executor = executor.with_basic_auth(user.clone(), config.password.clone());
        }
        Ok(executor)
    }

    /// Builder: authenticate every request with HTTP basic auth
    pub fn with_basic_auth(mut self, username: String, password: Option<String>) -> Self {
        self.credentials = Some((username, password));
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, stmt: &str) -> SinkResult<()> {
        let mut request = self.client.post(&self.endpoint).json(&SqlRequest { stmt });
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                SinkError::Connection(e.to_string())
            } else {
                SinkError::Execution {
                    status: None,
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = match response.text().await {
            Ok(body) => error_message(&body),
            Err(e) => format!("failed to read response body: {}", e),
        };
        Err(SinkError::Execution {
            status: Some(status.as_u16()),
            message,
        })
    }
}

#[async_trait]
impl SqlExecutor for HttpExecutor {
    async fn execute(&self, stmt: &str, deadline: Duration) -> SinkResult<()> {
        match tokio::time::timeout(deadline, self.send(stmt)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(deadline)),
        }
    }
}

/// Extract the message from CrateDB's error envelope, falling back to the raw body
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            error: ErrorBody {
                message,
                code: Some(code),
            },
        }) => format!("[{}] {}", code, message),
        Ok(ErrorResponse { error }) => error.message,
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

// ============================================
// Request/Response DTOs
// ============================================

#[derive(Debug, Serialize)]
struct SqlRequest<'a> {
    stmt: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}
