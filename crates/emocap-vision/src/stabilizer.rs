//! Per-identity temporal stabilization of classifier output.
//!
//! Each call runs bias correction, then votes over a short per-identity
//! history. Confident detections take effect immediately; weaker ones need
//! the window to agree before the displayed label moves.

use chrono::Utc;
use emocap_models::{EmotionLabel, EmotionScores, EmotionState, IdentityId};
use std::collections::{HashMap, VecDeque};

use crate::tuning::{SensitivityConfig, TuningConfig};

/// Output of one [`EmotionStabilizer::ingest`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizedEmotion {
    /// Label to display
    pub label: EmotionLabel,
    /// Score to display alongside it
    pub score: f64,
    /// Bias-corrected scores (sum to 100 when non-empty)
    pub corrected: EmotionScores,
    /// Dominant label of the corrected scores, before voting
    pub corrected_label: EmotionLabel,
    pub corrected_score: f64,
}

impl StabilizedEmotion {
    /// Build the state stored for an identity.
    pub fn into_state(self, identity_id: IdentityId, raw_label: EmotionLabel, raw_score: f64) -> EmotionState {
        EmotionState {
            identity_id,
            dominant_label: self.label,
            dominant_score: self.score,
            all_scores: self.corrected,
            raw_label,
            raw_score,
            last_update: Utc::now(),
        }
    }
}

/// Smooths per-identity emotion labels.
#[derive(Debug, Default)]
pub struct EmotionStabilizer {
    tuning: TuningConfig,
    histories: HashMap<IdentityId, VecDeque<(EmotionLabel, f64)>>,
}

impl EmotionStabilizer {
    pub fn new(tuning: TuningConfig) -> Self {
        Self {
            tuning,
            histories: HashMap::new(),
        }
    }

    pub fn tuning(&self) -> &TuningConfig {
        &self.tuning
    }

    fn sensitivity(&self) -> &SensitivityConfig {
        &self.tuning.sensitivity
    }

    /// Correct and smooth one classification for an identity.
    ///
    /// `raw_label` is the classifier's own verdict; voting uses the dominant
    /// label after correction. Empty scores yield `Unknown` at 0 and leave
    /// the history untouched.
    pub fn ingest(&mut self, identity_id: IdentityId, raw_label: EmotionLabel, raw_scores: &EmotionScores) -> StabilizedEmotion {
        let corrected = self.tuning.correct(raw_scores);

        let Some((corrected_label, corrected_score)) = corrected.dominant() else {
            tracing::debug!(identity_id = %identity_id, raw = %raw_label, "No scores to stabilize");
            return StabilizedEmotion {
                label: EmotionLabel::Unknown,
                score: 0.0,
                corrected,
                corrected_label: EmotionLabel::Unknown,
                corrected_score: 0.0,
            };
        };

        let (label, score) = self.smooth(identity_id, corrected_label, corrected_score);
        StabilizedEmotion {
            label,
            score,
            corrected,
            corrected_label,
            corrected_score,
        }
    }

    /// The voting step on its own.
    pub fn smooth(&mut self, identity_id: IdentityId, label: EmotionLabel, score: f64) -> (EmotionLabel, f64) {
        let sensitivity = *self.sensitivity();
        let capacity = sensitivity.history_size.max(1);
        let history = self.histories.entry(identity_id).or_default();

        if score >= sensitivity.min_confidence {
            history.push_back((label, score));
            while history.len() > capacity {
                history.pop_front();
            }
        }

        if history.is_empty() || score >= sensitivity.instant_response_threshold || history.len() == 1 {
            return (label, score);
        }

        let current_displayed = history[history.len() - 2].0;
        let (majority, count) = majority_label(history);
        let majority_scores: Vec<f64> = history
            .iter()
            .filter(|(l, _)| *l == majority)
            .map(|(_, s)| *s)
            .collect();
        let avg_score = if majority_scores.is_empty() {
            score
        } else {
            majority_scores.iter().sum::<f64>() / majority_scores.len() as f64
        };

        if majority == current_displayed || count >= sensitivity.fast_change_threshold {
            (majority, avg_score)
        } else if score > sensitivity.high_confidence_switch {
            (label, score)
        } else {
            (current_displayed, avg_score)
        }
    }

    /// Forget the voting window of an identity (new face in that slot).
    pub fn reset_history(&mut self, identity_id: IdentityId) {
        if let Some(history) = self.histories.get_mut(&identity_id) {
            history.clear();
        }
    }

    pub fn history(&self, identity_id: IdentityId) -> Option<&VecDeque<(EmotionLabel, f64)>> {
        self.histories.get(&identity_id)
    }

    /// Drop windows of evicted identities. Returns how many existed.
    pub fn remove(&mut self, ids: &[IdentityId]) -> usize {
        ids.iter()
            .filter(|id| self.histories.remove(id).is_some())
            .count()
    }

    pub fn tracked(&self) -> usize {
        self.histories.len()
    }
}

/// Most frequent label; ties go to the label seen first.
fn majority_label(history: &VecDeque<(EmotionLabel, f64)>) -> (EmotionLabel, usize) {
    let mut counts: Vec<(EmotionLabel, usize)> = Vec::new();
    for (label, _) in history {
        match counts.iter_mut().find(|(l, _)| l == label) {
            Some((_, n)) => *n += 1,
            None => counts.push((*label, 1)),
        }
    }
    counts
        .into_iter()
        .fold((EmotionLabel::Unknown, 0), |best, entry| if entry.1 > best.1 { entry } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stabilizer() -> EmotionStabilizer {
        EmotionStabilizer::new(TuningConfig::passthrough())
    }

    const ID: IdentityId = IdentityId(1);

    #[test]
    fn test_first_detection_returned_verbatim() {
        let mut s = stabilizer();
        assert_eq!(s.smooth(ID, EmotionLabel::Happy, 30.0), (EmotionLabel::Happy, 30.0));
        // Below the confidence gate: not recorded
        assert!(s.history(ID).unwrap().is_empty());
    }

    #[test]
    fn test_instant_response() {
        let mut s = stabilizer();
        s.smooth(ID, EmotionLabel::Sad, 80.0);
        s.smooth(ID, EmotionLabel::Sad, 80.0);
        assert_eq!(s.smooth(ID, EmotionLabel::Happy, 90.0), (EmotionLabel::Happy, 90.0));
    }

    #[test]
    fn test_low_score_holds_majority() {
        let mut s = EmotionStabilizer::new(TuningConfig {
            sensitivity: SensitivityConfig {
                instant_response_threshold: 95.0,
                ..SensitivityConfig::default()
            },
            ..TuningConfig::passthrough()
        });
        s.smooth(ID, EmotionLabel::Sad, 70.0);
        s.smooth(ID, EmotionLabel::Sad, 80.0);

        // Not recorded (below 60) and not instant: window still says sad
        let (label, score) = s.smooth(ID, EmotionLabel::Happy, 50.0);
        assert_eq!(label, EmotionLabel::Sad);
        assert!((score - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut s = stabilizer();
        for _ in 0..10 {
            s.smooth(ID, EmotionLabel::Happy, 70.0);
        }
        assert_eq!(s.history(ID).unwrap().len(), 3);
    }

    #[test]
    fn test_repetition_converges() {
        let config = TuningConfig {
            sensitivity: SensitivityConfig {
                instant_response_threshold: 101.0,
                ..SensitivityConfig::default()
            },
            ..TuningConfig::passthrough()
        };
        let mut s = EmotionStabilizer::new(config);
        s.smooth(ID, EmotionLabel::Sad, 90.0);
        s.smooth(ID, EmotionLabel::Sad, 90.0);
        s.smooth(ID, EmotionLabel::Sad, 90.0);

        let mut last = (EmotionLabel::Unknown, 0.0);
        for _ in 0..3 {
            last = s.smooth(ID, EmotionLabel::Happy, 62.0);
        }
        assert_eq!(last, (EmotionLabel::Happy, 62.0));
    }

    #[test]
    fn test_reset_history() {
        let mut s = stabilizer();
        s.smooth(ID, EmotionLabel::Sad, 70.0);
        s.reset_history(ID);
        assert!(s.history(ID).unwrap().is_empty());
        assert_eq!(s.remove(&[ID]), 1);
        assert!(s.history(ID).is_none());
    }

    #[test]
    fn test_ingest_corrects_before_voting() {
        let mut s = EmotionStabilizer::new(TuningConfig::default());
        let raw = EmotionScores::from_pairs([
            (EmotionLabel::Angry, 60.0),
            (EmotionLabel::Surprise, 10.0),
            (EmotionLabel::Neutral, 30.0),
        ]);
        let out = s.ingest(ID, EmotionLabel::Angry, &raw);
        // angry 12, surprise 150, neutral 360
        assert_eq!(out.corrected_label, EmotionLabel::Neutral);
        assert_eq!(out.label, EmotionLabel::Neutral);
        assert!((out.corrected.total() - 100.0).abs() < 1e-6);

        let state = out.into_state(ID, EmotionLabel::Angry, 60.0);
        assert_eq!(state.raw_label, EmotionLabel::Angry);
        assert_eq!(state.dominant_label, EmotionLabel::Neutral);
    }

    #[test]
    fn test_ingest_empty_scores() {
        let mut s = stabilizer();
        let out = s.ingest(ID, EmotionLabel::Happy, &EmotionScores::new());
        assert_eq!(out.label, EmotionLabel::Unknown);
        assert_eq!(out.score, 0.0);
        assert!(s.history(ID).is_none());
    }

    #[test]
    fn test_majority_tie_prefers_first_seen() {
        let history = VecDeque::from([(EmotionLabel::Sad, 1.0), (EmotionLabel::Happy, 1.0)]);
        assert_eq!(majority_label(&history), (EmotionLabel::Sad, 1));
    }
}
