//! Error types for vision operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for vision operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors that can occur while tracking, cropping or composing.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("No overlay available for emotion: {0}")]
    NoOverlayAvailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Unknown tuning preset: {0}")]
    UnknownPreset(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VisionError {
    /// Create an invalid geometry error.
    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        Self::InvalidGeometry(message.into())
    }

    /// Create a no-overlay error for the given label.
    pub fn no_overlay(label: impl Into<String>) -> Self {
        Self::NoOverlayAvailable(label.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Geometry problems skip a cycle rather than failing a task.
    pub fn is_geometry(&self) -> bool {
        matches!(self, Self::InvalidGeometry(_))
    }
}
