//! Synchronous per-frame vision algorithms for the EmoCap pipeline.
//!
//! This crate provides:
//! - Face identity tracking by descriptor similarity and position
//! - Emotion bias correction and temporal stabilization
//! - Square capture-crop geometry and JPEG encoding
//! - Overlay library and compositor for captured moments
//! - Frame annotation
//!
//! Nothing here is async or shared; callers own the locking.

pub mod annotate;
pub mod compose;
pub mod crop;
pub mod error;
pub mod stabilizer;
pub mod tracker;
pub mod tuning;

pub use annotate::annotate;
pub use compose::{normal_overlays_for, ComposerConfig, Compositor, OverlayChoice, OverlayLibrary};
pub use crop::{capture_region, crop_image, encode_jpeg, extract_face, save_jpeg, CropConfig};
pub use error::{VisionError, VisionResult};
pub use stabilizer::{EmotionStabilizer, StabilizedEmotion};
pub use tracker::{cosine_similarity, Identity, IdentityTracker, TrackOutcome, TrackerConfig};
pub use tuning::{SensitivityConfig, TuningConfig, TuningPreset};
