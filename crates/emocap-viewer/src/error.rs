//! Viewer error types.

use thiserror::Error;

pub type ViewerResult<T> = Result<T, ViewerError>;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("Audio persistence failed: {0}")]
    AudioPersist(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl ViewerError {
    pub fn audio_persist(msg: impl Into<String>) -> Self {
        Self::AudioPersist(msg.into())
    }

    pub fn playback(msg: impl Into<String>) -> Self {
        Self::Playback(msg.into())
    }

    pub fn image_decode(msg: impl Into<String>) -> Self {
        Self::ImageDecode(msg.into())
    }

    /// Audio problems never block a presentation.
    pub fn is_audio(&self) -> bool {
        matches!(self, ViewerError::AudioPersist(_) | ViewerError::Playback(_))
    }
}
