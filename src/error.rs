use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("unable to reach the page: {0}")]
    Transport(#[from] TransportError),
    #[error("report sink rejected the report with HTTP {status}")]
    ReportRejected { status: u16 },
    #[error("report delivery failed: {0}")]
    ReportDelivery(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Failure of a single rule predicate. Never escapes a scan.
#[derive(Debug, Clone, Error)]
#[error("rule {rule} failed: {message}")]
pub struct RuleError {
    pub rule: String,
    pub message: String,
}

impl RuleError {
    pub fn new(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            message: message.into(),
        }
    }
}

/// Failure of the control-surface ↔ document-context boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The document context is gone (reloaded or closed).
    #[error("document context is unreachable")]
    Unreachable,
    /// The document context is still handling another request.
    #[error("document context is busy")]
    Busy,
    #[error("malformed message: {0}")]
    Malformed(String),
}
