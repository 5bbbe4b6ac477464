//! Shared error type across Aloxi crates.

use thiserror::Error;

/// Stable fault codes (used in bus error replies and status output).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    /// Pub/sub connect or publish failed.
    Transport,
    /// Controller answered with a non-success status.
    FetchFailed,
    /// Controller document or session unusable.
    Controller,
    /// Correlation deadline passed.
    Timeout,
    /// Referenced device unknown.
    NotFound,
    /// Malformed request.
    BadRequest,
    /// Component not built or stopped.
    Unavailable,
    /// Invalid configuration.
    Config,
    /// Internal error.
    Internal,
}

impl FaultCode {
    /// String representation used in JSON replies.
    pub fn as_str(self) -> &'static str {
        match self {
            FaultCode::Transport => "TRANSPORT",
            FaultCode::FetchFailed => "FETCH_FAILED",
            FaultCode::Controller => "CONTROLLER",
            FaultCode::Timeout => "TIMEOUT",
            FaultCode::NotFound => "NOT_FOUND",
            FaultCode::BadRequest => "BAD_REQUEST",
            FaultCode::Unavailable => "UNAVAILABLE",
            FaultCode::Config => "CONFIG",
            FaultCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, AloxiError>;

/// Unified error type used by core and bridge.
#[derive(Debug, Error)]
pub enum AloxiError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("controller fetch failed with status {status}")]
    Fetch { status: u16 },
    #[error("controller: {0}")]
    Controller(String),
    #[error("timed out waiting for response")]
    Timeout,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl AloxiError {
    /// Map internal error to a stable fault code.
    pub fn code(&self) -> FaultCode {
        match self {
            AloxiError::Transport(_) => FaultCode::Transport,
            AloxiError::Fetch { .. } => FaultCode::FetchFailed,
            AloxiError::Controller(_) => FaultCode::Controller,
            AloxiError::Timeout => FaultCode::Timeout,
            AloxiError::NotFound(_) => FaultCode::NotFound,
            AloxiError::BadRequest(_) => FaultCode::BadRequest,
            AloxiError::Unavailable(_) => FaultCode::Unavailable,
            AloxiError::Config(_) => FaultCode::Config,
            AloxiError::Internal(_) => FaultCode::Internal,
        }
    }
}
