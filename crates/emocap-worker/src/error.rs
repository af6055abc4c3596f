//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Composition failed: {0}")]
    CompositionFailed(String),

    #[error("Commentary failed: {0}")]
    CommentaryFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Pipeline is shutting down")]
    ShuttingDown,

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Vision error: {0}")]
    Vision(#[from] emocap_vision::VisionError),

    #[error("ML client error: {0}")]
    MlClient(#[from] emocap_ml_client::MlClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn capture_failed(msg: impl Into<String>) -> Self {
        Self::CaptureFailed(msg.into())
    }

    pub fn composition_failed(msg: impl Into<String>) -> Self {
        Self::CompositionFailed(msg.into())
    }

    pub fn commentary_failed(msg: impl Into<String>) -> Self {
        Self::CommentaryFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }

    /// Upstream failures that may succeed on a later frame.
    pub fn is_transient(&self) -> bool {
        match self {
            WorkerError::MlClient(e) => e.is_retryable(),
            WorkerError::CommentaryFailed(_) => true,
            _ => false,
        }
    }

    /// Bad geometry skips a cycle; it is never a task failure.
    pub fn is_geometry(&self) -> bool {
        matches!(self, WorkerError::Vision(e) if e.is_geometry())
    }
}

impl From<tokio::task::JoinError> for WorkerError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::TaskFailed(e.to_string())
    }
}
