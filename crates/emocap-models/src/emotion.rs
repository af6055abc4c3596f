//! Emotion labels and per-class score maps.
//!
//! The classifier speaks in seven classes. `Unknown` is not a class: it is
//! the displayed label for an identity whose last classification failed or
//! has not completed yet.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::IdentityId;

/// Emotion label produced by the classifier (plus the `Unknown` sentinel).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum EmotionLabel {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
    /// No usable classification.
    #[default]
    Unknown,
}

impl EmotionLabel {
    /// The classifier's classes, in canonical order.
    pub const CLASSES: &'static [EmotionLabel] = &[
        EmotionLabel::Angry,
        EmotionLabel::Disgust,
        EmotionLabel::Fear,
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Surprise,
        EmotionLabel::Neutral,
    ];

    /// Returns the label name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Angry => "angry",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Unknown => "unknown",
        }
    }

    /// Returns true for the seven classifier classes.
    pub fn is_class(&self) -> bool {
        !matches!(self, EmotionLabel::Unknown)
    }

    /// Display colour (RGB) used when annotating frames.
    pub fn color(&self) -> [u8; 3] {
        match self {
            EmotionLabel::Angry => [255, 0, 0],
            EmotionLabel::Disgust => [0, 128, 0],
            EmotionLabel::Fear => [128, 0, 128],
            EmotionLabel::Happy => [255, 255, 0],
            EmotionLabel::Sad => [0, 0, 255],
            EmotionLabel::Surprise => [255, 165, 0],
            EmotionLabel::Neutral => [200, 200, 200],
            EmotionLabel::Unknown => [255, 255, 255],
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = EmotionLabelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "angry" => Ok(EmotionLabel::Angry),
            "disgust" => Ok(EmotionLabel::Disgust),
            "fear" => Ok(EmotionLabel::Fear),
            "happy" => Ok(EmotionLabel::Happy),
            "sad" => Ok(EmotionLabel::Sad),
            "surprise" => Ok(EmotionLabel::Surprise),
            "neutral" => Ok(EmotionLabel::Neutral),
            "unknown" => Ok(EmotionLabel::Unknown),
            _ => Err(EmotionLabelParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown emotion label: {0}")]
pub struct EmotionLabelParseError(String);

/// Per-class scores, keyed by a closed label set.
///
/// `Unknown` is never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct EmotionScores(BTreeMap<EmotionLabel, f64>);

impl EmotionScores {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build from `(label, score)` pairs, dropping `Unknown`.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (EmotionLabel, f64)>) -> Self {
        let mut scores = Self::new();
        for (label, score) in pairs {
            scores.set(label, score);
        }
        scores
    }

    /// Score for a label, 0 when absent.
    pub fn get(&self, label: EmotionLabel) -> f64 {
        self.0.get(&label).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, label: EmotionLabel, score: f64) {
        if label.is_class() {
            self.0.insert(label, score);
        }
    }

    pub fn contains(&self, label: EmotionLabel) -> bool {
        self.0.contains_key(&label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f64)> + '_ {
        self.0.iter().map(|(label, score)| (*label, *score))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Highest-scoring label. Ties resolve to the earlier class.
    pub fn dominant(&self) -> Option<(EmotionLabel, f64)> {
        self.iter().fold(None, |best, (label, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((label, score)),
        })
    }

    /// Rescale so the scores sum to 100. A zero total is returned unchanged.
    pub fn normalized(&self) -> Self {
        let total = self.total();
        if total <= 0.0 {
            return self.clone();
        }
        Self(
            self.0
                .iter()
                .map(|(label, score)| (*label, score / total * 100.0))
                .collect(),
        )
    }

    /// Scores sorted high to low.
    pub fn ranked(&self) -> Vec<(EmotionLabel, f64)> {
        let mut ranked: Vec<_> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

/// Stabilized emotion for one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EmotionState {
    pub identity_id: IdentityId,
    /// Label currently displayed for this identity
    pub dominant_label: EmotionLabel,
    /// Score (percent) of the displayed label
    pub dominant_score: f64,
    /// Bias-corrected scores, summing to 100 when non-empty
    pub all_scores: EmotionScores,
    /// Classifier's own dominant label before correction
    pub raw_label: EmotionLabel,
    pub raw_score: f64,
    pub last_update: DateTime<Utc>,
}

impl EmotionState {
    /// The defined state after a failed or pending classification.
    pub fn unknown(identity_id: IdentityId) -> Self {
        Self {
            identity_id,
            dominant_label: EmotionLabel::Unknown,
            dominant_score: 0.0,
            all_scores: EmotionScores::new(),
            raw_label: EmotionLabel::Unknown,
            raw_score: 0.0,
            last_update: Utc::now(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.dominant_label == EmotionLabel::Unknown
    }

    /// Short display text, e.g. `Happy(72.5)`.
    pub fn display_text(&self) -> String {
        let name = self.dominant_label.as_str();
        let mut chars = name.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        format!("{}({:.1})", capitalized, self.dominant_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parse() {
        assert_eq!("happy".parse::<EmotionLabel>().unwrap(), EmotionLabel::Happy);
        assert_eq!("Surprise".parse::<EmotionLabel>().unwrap(), EmotionLabel::Surprise);
        assert_eq!(" sad ".parse::<EmotionLabel>().unwrap(), EmotionLabel::Sad);
        assert!("bored".parse::<EmotionLabel>().is_err());
    }

    #[test]
    fn test_label_serde_snake_case() {
        let json = serde_json::to_string(&EmotionLabel::Surprise).unwrap();
        assert_eq!(json, "\"surprise\"");
    }

    #[test]
    fn test_scores_drop_unknown() {
        let scores = EmotionScores::from_pairs([
            (EmotionLabel::Happy, 10.0),
            (EmotionLabel::Unknown, 50.0),
        ]);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores.get(EmotionLabel::Unknown), 0.0);
    }

    #[test]
    fn test_dominant_and_ranked() {
        let scores = EmotionScores::from_pairs([
            (EmotionLabel::Happy, 10.0),
            (EmotionLabel::Sad, 30.0),
            (EmotionLabel::Neutral, 20.0),
        ]);
        assert_eq!(scores.dominant(), Some((EmotionLabel::Sad, 30.0)));
        let ranked = scores.ranked();
        assert_eq!(ranked[0].0, EmotionLabel::Sad);
        assert_eq!(ranked[2].0, EmotionLabel::Happy);
        assert!(EmotionScores::new().dominant().is_none());
    }

    #[test]
    fn test_normalized_sums_to_100() {
        let scores = EmotionScores::from_pairs([
            (EmotionLabel::Happy, 1.0),
            (EmotionLabel::Sad, 3.0),
        ]);
        let normalized = scores.normalized();
        assert!((normalized.total() - 100.0).abs() < 1e-9);
        assert!((normalized.get(EmotionLabel::Sad) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalized_zero_total() {
        let scores = EmotionScores::from_pairs([(EmotionLabel::Happy, 0.0)]);
        assert_eq!(scores.normalized(), scores);
    }

    #[test]
    fn test_unknown_state() {
        let state = EmotionState::unknown(IdentityId(3));
        assert!(state.is_unknown());
        assert_eq!(state.dominant_score, 0.0);
        assert!(state.all_scores.is_empty());
        assert_eq!(state.display_text(), "Unknown(0.0)");
    }
}
