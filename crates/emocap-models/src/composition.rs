//! Composition job and result types.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::EmotionLabel;

/// Kind of decoration applied to a captured image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    /// Mood-matched overlay drawn centered over a faded base image.
    Normal,
    /// Full-bleed overlay usable for any emotion.
    Special,
}

impl OverlayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayKind::Normal => "normal",
            OverlayKind::Special => "special",
        }
    }
}

impl fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A queued request to decorate a captured image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompositionJob {
    pub image_path: PathBuf,
    pub emotion_label: EmotionLabel,
    pub enqueue_time: DateTime<Utc>,
}

impl CompositionJob {
    pub fn new(image_path: impl Into<PathBuf>, emotion_label: EmotionLabel) -> Self {
        Self {
            image_path: image_path.into(),
            emotion_label,
            enqueue_time: Utc::now(),
        }
    }
}

/// Outcome of one composition job, reported whether or not it succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompositionResult {
    pub success: bool,
    pub output_path: PathBuf,
    /// Absent when no overlay could be selected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_kind: Option<OverlayKind>,
    pub emotion_label: EmotionLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompositionResult {
    pub fn succeeded(output_path: PathBuf, overlay_kind: OverlayKind, emotion_label: EmotionLabel) -> Self {
        Self {
            success: true,
            output_path,
            overlay_kind: Some(overlay_kind),
            emotion_label,
            error: None,
        }
    }

    pub fn failed(output_path: PathBuf, emotion_label: EmotionLabel, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output_path,
            overlay_kind: None,
            emotion_label,
            error: Some(error.into()),
        }
    }
}
