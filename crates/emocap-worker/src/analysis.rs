//! Classifier dispatch.
//!
//! The frame loop offers every visible face; at most one classification per
//! identity is in flight, and a new one starts only after the per-identity
//! interval has passed. A global semaphore bounds the classifier load.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use emocap_ml_client::EmotionClassifier;
use emocap_models::IdentityId;
use image::RgbImage;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::metrics;
use crate::state::PipelineState;

#[derive(Debug, Default)]
struct DispatchGate {
    last_dispatch: HashMap<IdentityId, Instant>,
    in_flight: HashSet<IdentityId>,
}

/// Rate-limited, single-flight classifier dispatcher.
pub struct AnalysisScheduler {
    interval: Duration,
    classifier: Arc<dyn EmotionClassifier>,
    state: Arc<PipelineState>,
    permits: Arc<Semaphore>,
    gate: Arc<Mutex<DispatchGate>>,
    accepting: AtomicBool,
}

impl AnalysisScheduler {
    pub fn new(
        classifier: Arc<dyn EmotionClassifier>,
        state: Arc<PipelineState>,
        interval: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            interval,
            classifier,
            state,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            gate: Arc::new(Mutex::new(DispatchGate::default())),
            accepting: AtomicBool::new(true),
        }
    }

    /// Start a classification for `id` unless one is running or the last
    /// one started too recently. Returns whether a task was spawned.
    pub async fn maybe_dispatch(&self, id: IdentityId, face: RgbImage) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            return false;
        }
        if face.width() == 0 || face.height() == 0 {
            debug!(identity_id = %id, "Skipping empty face crop");
            return false;
        }

        let now = Instant::now();
        {
            let mut gate = self.gate.lock().await;
            if gate.in_flight.contains(&id) {
                return false;
            }
            if let Some(last) = gate.last_dispatch.get(&id) {
                if now.duration_since(*last) <= self.interval {
                    return false;
                }
            }
            gate.last_dispatch.insert(id, now);
            gate.in_flight.insert(id);
        }

        metrics::record_dispatch();

        let classifier = Arc::clone(&self.classifier);
        let state = Arc::clone(&self.state);
        let permits = Arc::clone(&self.permits);
        let gate = Arc::clone(&self.gate);

        tokio::spawn(async move {
            match permits.acquire_owned().await {
                Ok(_permit) => {
                    let started = Instant::now();
                    let result = classifier.classify(face).await;
                    metrics::record_classification(started.elapsed().as_secs_f64(), result.is_ok());
                    if let Err(e) = &result {
                        warn!(identity_id = %id, error = %e, "Emotion classifier failed");
                    }
                    state.apply_classification(id, result).await;
                }
                Err(_) => debug!(identity_id = %id, "Classifier pool closed"),
            }
            gate.lock().await.in_flight.remove(&id);
        });

        true
    }

    /// Drop gate entries of evicted identities.
    pub async fn forget(&self, ids: &[IdentityId]) {
        let mut gate = self.gate.lock().await;
        for id in ids {
            gate.last_dispatch.remove(id);
        }
    }

    pub async fn in_flight(&self) -> usize {
        self.gate.lock().await.in_flight.len()
    }

    /// Clear the gate entirely.
    pub async fn reset(&self) {
        let mut gate = self.gate.lock().await;
        gate.last_dispatch.clear();
    }

    /// Refuse new dispatches; running calls finish on their own.
    pub fn stop(&self) {
        self.accepting.store(false, Ordering::Release);
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use emocap_ml_client::{Classification, MlClientError, MlClientResult};
    use emocap_models::{EmotionLabel, EmotionScores, Point};
    use emocap_vision::{TrackerConfig, TuningConfig};
    use std::sync::atomic::AtomicUsize;

    struct SlowClassifier {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl EmotionClassifier for SlowClassifier {
        async fn classify(&self, _face: RgbImage) -> MlClientResult<Classification> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(MlClientError::classification_failed("no face"));
            }
            Ok(Classification::from_scores(EmotionScores::from_pairs([
                (EmotionLabel::Surprise, 90.0),
                (EmotionLabel::Neutral, 10.0),
            ])))
        }
    }

    async fn setup(delay: Duration, fail: bool) -> (AnalysisScheduler, Arc<SlowClassifier>, Arc<PipelineState>, IdentityId) {
        let classifier = Arc::new(SlowClassifier {
            calls: AtomicUsize::new(0),
            delay,
            fail,
        });
        let state = Arc::new(PipelineState::new(TrackerConfig::default(), TuningConfig::passthrough()));
        let id = state
            .observe(&[1.0, 0.0], Point::new(0.0, 0.0), std::time::Instant::now())
            .await
            .id;
        let scheduler = AnalysisScheduler::new(
            classifier.clone(),
            Arc::clone(&state),
            Duration::from_millis(300),
            4,
        );
        (scheduler, classifier, state, id)
    }

    fn face() -> RgbImage {
        RgbImage::new(8, 8)
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_gate() {
        let (scheduler, classifier, _state, id) = setup(Duration::from_millis(10), false).await;

        assert!(scheduler.maybe_dispatch(id, face()).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!scheduler.maybe_dispatch(id, face()).await);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(scheduler.maybe_dispatch(id, face()).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_per_identity() {
        let (scheduler, classifier, state, id) = setup(Duration::from_secs(2), false).await;

        assert!(scheduler.maybe_dispatch(id, face()).await);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!scheduler.maybe_dispatch(id, face()).await, "previous call still running");
        assert_eq!(scheduler.in_flight().await, 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(scheduler.in_flight().await, 0);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        let emotion = state.emotion(id).await.unwrap();
        assert_eq!(emotion.dominant_label, EmotionLabel::Surprise);

        assert!(scheduler.maybe_dispatch(id, face()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_after_reset_does_not_reach_new_face() {
        let (scheduler, _classifier, state, old) = setup(Duration::from_secs(1), false).await;
        assert!(scheduler.maybe_dispatch(old, face()).await);
        tokio::time::sleep(Duration::from_millis(100)).await;

        state.reset().await;
        scheduler.reset().await;
        let fresh = state
            .observe(&[0.0, 1.0], Point::new(0.0, 0.0), std::time::Instant::now())
            .await;
        assert!(fresh.is_new);
        assert_ne!(fresh.id, old);

        // The stale call completes while the new face waits for its own.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(state.emotion(fresh.id).await.unwrap().is_unknown());
        assert!(state.emotion(old).await.is_none());
        assert!(state.is_consistent().await);

        assert!(scheduler.maybe_dispatch(fresh.id, face()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_writes_unknown() {
        let (scheduler, _classifier, state, id) = setup(Duration::from_millis(5), true).await;
        assert!(scheduler.maybe_dispatch(id, face()).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.emotion(id).await.unwrap().is_unknown());
        assert_eq!(scheduler.in_flight().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_crop_and_stop() {
        let (scheduler, classifier, _state, id) = setup(Duration::from_millis(5), false).await;
        assert!(!scheduler.maybe_dispatch(id, RgbImage::new(0, 0)).await);

        scheduler.stop();
        assert!(!scheduler.maybe_dispatch(id, face()).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }
}
