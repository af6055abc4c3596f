//! Narrow interfaces to the opaque collaborators.
//!
//! The pipeline never looks inside these. Detection runs on the frame loop
//! and is synchronous; everything else is async and may be slow.

use async_trait::async_trait;
use emocap_models::{BoundingBox, EmotionLabel, EmotionScores};
use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::error::MlClientResult;

/// One face found by the landmark detector.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    /// Landmark-derived feature vector used for identity matching
    pub descriptor: Vec<f32>,
    pub bbox: BoundingBox,
}

impl FaceDetection {
    pub fn new(descriptor: Vec<f32>, bbox: BoundingBox) -> Self {
        Self { descriptor, bbox }
    }
}

/// Raw classifier verdict for one face crop.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// The classifier's own dominant label
    pub label: EmotionLabel,
    /// Per-class scores in percent
    pub scores: EmotionScores,
}

impl Classification {
    /// Verdict whose label is the top score.
    pub fn from_scores(scores: EmotionScores) -> Self {
        let label = scores
            .dominant()
            .map(|(label, _)| label)
            .unwrap_or(EmotionLabel::Unknown);
        Self { label, scores }
    }

    /// Score of the classifier's own label.
    pub fn label_score(&self) -> f64 {
        self.scores.get(self.label)
    }
}

/// `detect_landmarks(frame)`.
pub trait LandmarkDetector: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> MlClientResult<Vec<FaceDetection>>;
}

/// `classify_emotion(face_crop)`.
#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    async fn classify(&self, face: RgbImage) -> MlClientResult<Classification>;
}

/// `generate_commentary(image_path)`. `Ok(None)` means the service had
/// nothing to say.
#[async_trait]
pub trait CommentaryGenerator: Send + Sync {
    async fn generate(&self, image_path: &Path) -> MlClientResult<Option<String>>;
}

/// `synthesize_speech(text, filename)`; returns where the audio was written.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, filename: &str) -> MlClientResult<PathBuf>;
}
