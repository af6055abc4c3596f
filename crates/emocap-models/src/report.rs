//! Per-face summary returned alongside an annotated frame.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{BoundingBox, EmotionLabel, EmotionScores, EmotionState, IdentityId};

/// What the pipeline currently believes about one visible face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FaceReport {
    pub identity_id: IdentityId,
    pub bbox: BoundingBox,
    pub label: EmotionLabel,
    pub score: f64,
    pub all_scores: EmotionScores,
}

impl FaceReport {
    pub fn from_state(bbox: BoundingBox, state: &EmotionState) -> Self {
        Self {
            identity_id: state.identity_id,
            bbox,
            label: state.dominant_label,
            score: state.dominant_score,
            all_scores: state.all_scores.clone(),
        }
    }

    /// Report for a face whose classification has not landed yet.
    pub fn pending(identity_id: IdentityId, bbox: BoundingBox) -> Self {
        Self::from_state(bbox, &EmotionState::unknown(identity_id))
    }
}
