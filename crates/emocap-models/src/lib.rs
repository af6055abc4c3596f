//! Shared data models for the EmoCap moment pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Emotion labels, score maps and per-identity emotion state
//! - Identity ids, pixel geometry and per-face reports
//! - Composition jobs and results
//! - Pipeline events and viewer message schemas

pub mod composition;
pub mod emotion;
pub mod events;
pub mod geometry;
pub mod identity;
pub mod report;

// Re-export common types
pub use composition::{CompositionJob, CompositionResult, OverlayKind};
pub use emotion::{EmotionLabel, EmotionLabelParseError, EmotionScores, EmotionState};
pub use events::{PipelineEvent, ViewerMessage};
pub use geometry::{BoundingBox, CropRegion, Point};
pub use identity::IdentityId;
pub use report::FaceReport;
