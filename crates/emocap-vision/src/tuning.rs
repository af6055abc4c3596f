//! Classifier bias correction and stabilization sensitivity.
//!
//! The raw classifier is skewed (it over-reports anger and sadness and
//! under-reports surprise and neutral). [`TuningConfig::correct`] reshapes a
//! score map in a fixed order:
//!
//! 1. multiply by per-class weights
//! 2. add per-class biases
//! 3. multiply by per-class probability adjustments
//! 4. fold remapped classes into their targets
//! 5. clamp at zero and renormalize to percentages summing to 100
//!
//! Profiles are stored as JSON and merged over the defaults when loaded.

use emocap_models::{EmotionLabel, EmotionScores};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::{VisionError, VisionResult};

/// Thresholds driving [`crate::EmotionStabilizer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityConfig {
    /// Scores below this are not appended to history
    pub min_confidence: f64,
    /// Scores at or above this bypass smoothing
    pub instant_response_threshold: f64,
    /// Voting window length
    pub history_size: usize,
    /// Occurrences a new majority label needs to take over
    pub fast_change_threshold: usize,
    /// Raw score that switches labels without a majority
    pub high_confidence_switch: f64,
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            min_confidence: 60.0,
            instant_response_threshold: 55.0,
            history_size: 3,
            fast_change_threshold: 1,
            high_confidence_switch: 65.0,
        }
    }
}

/// Named tuning presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TuningPreset {
    /// Stronger happy/surprise, weaker fear/anger
    HappyBoost,
    /// Low thresholds, short window
    Sensitive,
    /// High thresholds, long window
    Stable,
    /// Mild adjustments
    Balanced,
}

impl TuningPreset {
    pub const ALL: &'static [TuningPreset] = &[
        TuningPreset::HappyBoost,
        TuningPreset::Sensitive,
        TuningPreset::Stable,
        TuningPreset::Balanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TuningPreset::HappyBoost => "happy_boost",
            TuningPreset::Sensitive => "sensitive",
            TuningPreset::Stable => "stable",
            TuningPreset::Balanced => "balanced",
        }
    }
}

impl fmt::Display for TuningPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TuningPreset {
    type Err = VisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "happy_boost" | "happyboost" => Ok(TuningPreset::HappyBoost),
            "sensitive" => Ok(TuningPreset::Sensitive),
            "stable" => Ok(TuningPreset::Stable),
            "balanced" => Ok(TuningPreset::Balanced),
            _ => Err(VisionError::UnknownPreset(s.to_string())),
        }
    }
}

/// Correction pipeline plus stabilization sensitivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub weights: BTreeMap<EmotionLabel, f64>,
    pub biases: BTreeMap<EmotionLabel, f64>,
    pub adjustments: BTreeMap<EmotionLabel, f64>,
    /// `source -> target`: the source score is added to the target and zeroed
    pub mappings: BTreeMap<EmotionLabel, EmotionLabel>,
    pub sensitivity: SensitivityConfig,
}

impl Default for TuningConfig {
    fn default() -> Self {
        let weights = BTreeMap::from([
            (EmotionLabel::Angry, 0.2),
            (EmotionLabel::Happy, 1.2),
            (EmotionLabel::Neutral, 12.0),
            (EmotionLabel::Sad, 0.01),
            (EmotionLabel::Surprise, 15.0),
            (EmotionLabel::Fear, 0.001),
            (EmotionLabel::Disgust, 4.0),
        ]);
        Self {
            weights,
            biases: BTreeMap::new(),
            adjustments: BTreeMap::new(),
            mappings: BTreeMap::new(),
            sensitivity: SensitivityConfig::default(),
        }
    }
}

impl TuningConfig {
    /// Identity correction: all weights 1, nothing else.
    pub fn passthrough() -> Self {
        Self {
            weights: BTreeMap::new(),
            ..Self::default()
        }
    }

    /// Apply the correction pipeline. The result sums to 100 unless every
    /// corrected score is zero (or the input is empty).
    pub fn correct(&self, raw: &EmotionScores) -> EmotionScores {
        let mut scores: BTreeMap<EmotionLabel, f64> = raw.iter().collect();

        for (label, score) in scores.iter_mut() {
            *score *= self.weights.get(label).copied().unwrap_or(1.0);
            *score += self.biases.get(label).copied().unwrap_or(0.0);
            *score *= self.adjustments.get(label).copied().unwrap_or(1.0);
        }

        for (source, target) in &self.mappings {
            if source == target || !scores.contains_key(target) {
                continue;
            }
            if let Some(moved) = scores.get_mut(source).map(std::mem::take) {
                if let Some(dest) = scores.get_mut(target) {
                    *dest += moved;
                }
            }
        }

        EmotionScores::from_pairs(scores.into_iter().map(|(label, score)| (label, score.max(0.0))))
            .normalized()
    }

    /// Overlay a preset on this profile.
    pub fn apply_preset(&mut self, preset: TuningPreset) {
        match preset {
            TuningPreset::HappyBoost => self.set_adjustments([1.5, 0.7, 0.8, 1.2, 0.9]),
            TuningPreset::Balanced => self.set_adjustments([1.1, 0.9, 0.95, 1.05, 1.0]),
            TuningPreset::Sensitive => {
                self.sensitivity = SensitivityConfig {
                    min_confidence: 45.0,
                    instant_response_threshold: 40.0,
                    history_size: 2,
                    fast_change_threshold: 1,
                    ..self.sensitivity
                };
            }
            TuningPreset::Stable => {
                self.sensitivity = SensitivityConfig {
                    min_confidence: 75.0,
                    instant_response_threshold: 70.0,
                    history_size: 5,
                    fast_change_threshold: 2,
                    ..self.sensitivity
                };
            }
        }
        info!(preset = %preset, "Applied tuning preset");
    }

    /// Multipliers for happy, fear, angry, surprise, neutral.
    fn set_adjustments(&mut self, values: [f64; 5]) {
        let labels = [
            EmotionLabel::Happy,
            EmotionLabel::Fear,
            EmotionLabel::Angry,
            EmotionLabel::Surprise,
            EmotionLabel::Neutral,
        ];
        for (label, value) in labels.into_iter().zip(values) {
            self.adjustments.insert(label, value);
        }
    }

    /// Parse a JSON profile, merging its tables over the defaults.
    pub fn from_json(json: &str) -> VisionResult<Self> {
        let loaded: TuningConfig = serde_json::from_str(json)?;
        let mut merged = TuningConfig::default();
        merged.weights.extend(loaded.weights);
        merged.biases.extend(loaded.biases);
        merged.adjustments.extend(loaded.adjustments);
        merged.mappings.extend(loaded.mappings);
        merged.sensitivity = loaded.sensitivity;
        Ok(merged)
    }

    /// Load a profile from disk. A missing or unreadable file yields the
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No tuning profile, using defaults");
            return Self::default();
        }

        match std::fs::read_to_string(path)
            .map_err(VisionError::from)
            .and_then(|json| Self::from_json(&json))
        {
            Ok(config) => {
                info!(path = %path.display(), "Loaded tuning profile");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load tuning profile, using defaults");
                Self::default()
            }
        }
    }

    /// Write the profile as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> VisionResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}
