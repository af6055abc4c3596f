//! Error types for collaborator calls.

use thiserror::Error;

/// Result type for collaborator calls.
pub type MlClientResult<T> = Result<T, MlClientError>;

/// Errors raised by the detector, the classifier or the remote services.
///
/// None of these are fatal to the pipeline; callers substitute a defined
/// fallback at the call site.
#[derive(Debug, Error)]
pub enum MlClientError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Classification failed: {0}")]
    ClassificationFailed(String),

    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MlClientError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    pub fn classification_failed(message: impl Into<String>) -> Self {
        Self::ClassificationFailed(message.into())
    }

    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if the error is likely transient (timeouts, connection drops,
    /// 5xx/429 responses).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
