//! Per-identity state shared by the frame loop, the classifier tasks and
//! the cache governor.
//!
//! Three maps, three locks, always taken in the order
//! tracker → emotions → stabilizer. Anything that removes an identity holds
//! all three at once so an id is never present in one map and absent from
//! another.

use std::collections::HashMap;
use std::time::Instant;

use emocap_ml_client::{Classification, MlClientResult};
use emocap_models::{EmotionState, IdentityId, Point};
use emocap_vision::{EmotionStabilizer, IdentityTracker, TrackOutcome, TrackerConfig, TuningConfig};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Identity registry, displayed emotions and voting histories.
pub struct PipelineState {
    pub(crate) tracker: Mutex<IdentityTracker>,
    pub(crate) emotions: Mutex<HashMap<IdentityId, EmotionState>>,
    pub(crate) stabilizer: Mutex<EmotionStabilizer>,
}

impl PipelineState {
    pub fn new(tracker: TrackerConfig, tuning: TuningConfig) -> Self {
        Self {
            tracker: Mutex::new(IdentityTracker::new(tracker)),
            emotions: Mutex::new(HashMap::new()),
            stabilizer: Mutex::new(EmotionStabilizer::new(tuning)),
        }
    }

    /// Match a detection to an identity. A new identity gets an unknown
    /// placeholder and an empty voting history.
    pub async fn observe(&self, descriptor: &[f32], center: Point, now: Instant) -> TrackOutcome {
        let mut tracker = self.tracker.lock().await;
        let outcome = tracker.match_or_create(descriptor, center, now);

        if outcome.is_new {
            let mut emotions = self.emotions.lock().await;
            let mut stabilizer = self.stabilizer.lock().await;
            emotions.insert(outcome.id, EmotionState::unknown(outcome.id));
            stabilizer.reset_history(outcome.id);
            debug!(identity_id = %outcome.id, "New identity");
        }
        outcome
    }

    /// Fold a classifier verdict into the identity's state.
    ///
    /// A failed call stores the unknown state. Returns `None` when the
    /// identity was evicted while the call was in flight.
    pub async fn apply_classification(
        &self,
        id: IdentityId,
        result: MlClientResult<Classification>,
    ) -> Option<EmotionState> {
        let tracker = self.tracker.lock().await;
        if !tracker.contains(id) {
            debug!(identity_id = %id, "Dropping classification for evicted identity");
            return None;
        }

        let mut emotions = self.emotions.lock().await;
        let mut stabilizer = self.stabilizer.lock().await;

        let state = match result {
            Ok(classification) => {
                let raw_score = classification.label_score();
                stabilizer
                    .ingest(id, classification.label, &classification.scores)
                    .into_state(id, classification.label, raw_score)
            }
            Err(e) => {
                warn!(identity_id = %id, error = %e, "Classification failed, marking unknown");
                EmotionState::unknown(id)
            }
        };

        if let Some(previous) = emotions.get(&id) {
            if previous.dominant_label != state.dominant_label && !state.is_unknown() {
                info!(
                    identity_id = %id,
                    from = %previous.dominant_label,
                    to = %state.dominant_label,
                    score = state.dominant_score,
                    "Emotion changed"
                );
            }
        }

        emotions.insert(id, state.clone());
        drop(stabilizer);
        drop(emotions);
        drop(tracker);
        Some(state)
    }

    pub async fn emotion(&self, id: IdentityId) -> Option<EmotionState> {
        self.emotions.lock().await.get(&id).cloned()
    }

    /// Displayed states for `ids`, in order; missing entries are skipped.
    pub async fn emotions_for(&self, ids: &[IdentityId]) -> Vec<EmotionState> {
        let emotions = self.emotions.lock().await;
        ids.iter().filter_map(|id| emotions.get(id).cloned()).collect()
    }

    /// Remove identities from every map at once.
    pub async fn evict(&self, ids: &[IdentityId]) -> usize {
        let mut tracker = self.tracker.lock().await;
        let mut emotions = self.emotions.lock().await;
        let mut stabilizer = self.stabilizer.lock().await;
        Self::evict_locked(&mut tracker, &mut emotions, &mut stabilizer, ids)
    }

    pub(crate) fn evict_locked(
        tracker: &mut IdentityTracker,
        emotions: &mut HashMap<IdentityId, EmotionState>,
        stabilizer: &mut EmotionStabilizer,
        ids: &[IdentityId],
    ) -> usize {
        let removed = tracker.remove(ids);
        for id in ids {
            emotions.remove(id);
        }
        stabilizer.remove(ids);
        removed
    }

    pub async fn tracked(&self) -> usize {
        self.tracker.lock().await.len()
    }

    /// True when the registry and the emotion map hold the same ids.
    pub async fn is_consistent(&self) -> bool {
        let tracker = self.tracker.lock().await;
        let emotions = self.emotions.lock().await;
        let stabilizer = self.stabilizer.lock().await;
        let ids = tracker.ids();
        ids.len() == emotions.len()
            && ids.iter().all(|id| emotions.contains_key(id))
            && stabilizer.tracked() <= ids.len()
    }

    /// Forget everything and restart ids at 0.
    pub async fn reset(&self) {
        let mut tracker = self.tracker.lock().await;
        let mut emotions = self.emotions.lock().await;
        let mut stabilizer = self.stabilizer.lock().await;
        let ids = tracker.ids();
        stabilizer.remove(&ids);
        emotions.clear();
        tracker.reset();
        info!(cleared = ids.len(), "Pipeline state reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emocap_ml_client::MlClientError;
    use emocap_models::{EmotionLabel, EmotionScores};

    fn state() -> PipelineState {
        PipelineState::new(TrackerConfig::default(), TuningConfig::passthrough())
    }

    fn happy(score: f64) -> Classification {
        Classification::from_scores(EmotionScores::from_pairs([
            (EmotionLabel::Happy, score),
            (EmotionLabel::Neutral, 100.0 - score),
        ]))
    }

    #[tokio::test]
    async fn test_new_identity_gets_placeholder() {
        let state = state();
        let outcome = state.observe(&[1.0, 0.0], Point::new(10.0, 10.0), Instant::now()).await;
        assert!(outcome.is_new);
        let emotion = state.emotion(outcome.id).await.unwrap();
        assert!(emotion.is_unknown());
        assert!(state.is_consistent().await);
    }

    #[tokio::test]
    async fn test_classification_updates_state() {
        let state = state();
        let id = state.observe(&[1.0, 0.0], Point::new(0.0, 0.0), Instant::now()).await.id;
        let applied = state.apply_classification(id, Ok(happy(80.0))).await.unwrap();
        assert_eq!(applied.dominant_label, EmotionLabel::Happy);
        assert_eq!(applied.dominant_score, 80.0);
        assert_eq!(state.emotion(id).await.unwrap(), applied);
    }

    #[tokio::test]
    async fn test_failed_classification_marks_unknown() {
        let state = state();
        let id = state.observe(&[1.0, 0.0], Point::new(0.0, 0.0), Instant::now()).await.id;
        state.apply_classification(id, Ok(happy(80.0))).await;

        let err = MlClientError::classification_failed("model crashed");
        let applied = state.apply_classification(id, Err(err)).await.unwrap();
        assert!(applied.is_unknown());
        assert_eq!(applied.dominant_score, 0.0);
    }

    #[tokio::test]
    async fn test_late_result_for_evicted_identity_is_dropped() {
        let state = state();
        let id = state.observe(&[1.0, 0.0], Point::new(0.0, 0.0), Instant::now()).await.id;
        assert_eq!(state.evict(&[id]).await, 1);

        assert!(state.apply_classification(id, Ok(happy(90.0))).await.is_none());
        assert!(state.emotion(id).await.is_none());
        assert!(state.is_consistent().await);
    }

    #[tokio::test]
    async fn test_reset_keeps_ids_increasing() {
        let state = state();
        state.observe(&[1.0, 0.0], Point::new(0.0, 0.0), Instant::now()).await;
        state.observe(&[0.0, 1.0], Point::new(500.0, 0.0), Instant::now()).await;
        assert_eq!(state.tracked().await, 2);

        state.reset().await;
        assert_eq!(state.tracked().await, 0);
        let outcome = state.observe(&[1.0, 0.0], Point::new(0.0, 0.0), Instant::now()).await;
        assert!(outcome.is_new);
        assert_eq!(outcome.id, IdentityId(2));
        assert!(state.emotion(outcome.id).await.unwrap().is_unknown());
        assert!(state.is_consistent().await);
    }
}
