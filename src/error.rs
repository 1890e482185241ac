// ABOUTME: Error taxonomies the reasoning loop reasons about.
// ABOUTME: Tool/approval failures are materialized as ToolResult data, never raised here.

use thiserror::Error;

/// Errors the model adapter surfaces to the reasoning loop.
///
/// Anything in this set aborts the current turn (§7): the loop cannot repair
/// a transport, auth, or context-window failure the way it can a denied
/// tool call or an unknown tool name.
#[derive(Debug, Error)]
pub enum ModelErrorKind {
    #[error("authentication failed")]
    AuthError,
    #[error("rate limited")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("context window exceeded")]
    ContextOverflow,
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ModelErrorKind {
    /// Classify an HTTP status + body into the closed error taxonomy.
    ///
    /// Providers' native errors MUST be classified into this set (§4.2);
    /// this is the one place that mapping happens for every adapter variant.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::AuthError,
            429 => Self::RateLimited,
            408 | 504 => Self::Timeout,
            400 if body.to_lowercase().contains("context") || body.to_lowercase().contains("token") => {
                Self::ContextOverflow
            }
            500..=599 => Self::Unavailable(sanitize(body)),
            _ => Self::Malformed(sanitize(body)),
        }
    }
}

impl From<reqwest::Error> for ModelErrorKind {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Malformed(err.to_string())
        }
    }
}

fn sanitize(body: &str) -> String {
    const MAX: usize = 256;
    let collapsed: String = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX {
        format!("{}...[truncated]", collapsed.chars().take(MAX).collect::<String>())
    } else {
        collapsed
    }
}

/// Non-fatal transcript store failures (§7): the in-memory turn proceeds
/// regardless, and the caller logs the error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
