//! Bounds per-identity state.
//!
//! A sweep first drops identities idle for longer than the TTL, then trims
//! the least recently seen until the count is within the cap. Eviction holds
//! every state lock at once, so the registry, the emotion map and the voting
//! histories always agree.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use emocap_models::IdentityId;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use crate::analysis::AnalysisScheduler;
use crate::metrics;
use crate::state::PipelineState;

/// Cache limits.
#[derive(Debug, Clone, Copy)]
pub struct CacheLimits {
    pub ttl: Duration,
    pub cap: usize,
    pub sweep_interval: Duration,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            cap: 50,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: Vec<IdentityId>,
    pub over_cap: Vec<IdentityId>,
    pub remaining: usize,
}

impl SweepReport {
    pub fn evicted(&self) -> usize {
        self.expired.len() + self.over_cap.len()
    }
}

/// Running totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub sweeps: u64,
    pub identities_evicted: u64,
    pub last_sweep: Option<DateTime<Utc>>,
    pub tracked: usize,
}

pub struct CacheGovernor {
    state: Arc<PipelineState>,
    analysis: Arc<AnalysisScheduler>,
    limits: CacheLimits,
    stats: Mutex<CacheStats>,
}

impl CacheGovernor {
    pub fn new(state: Arc<PipelineState>, analysis: Arc<AnalysisScheduler>, limits: CacheLimits) -> Self {
        Self {
            state,
            analysis,
            limits,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn limits(&self) -> &CacheLimits {
        &self.limits
    }

    /// Evict by TTL, then by cap, measured against `now`.
    pub async fn sweep(&self, now: Instant) -> SweepReport {
        let mut tracker = self.state.tracker.lock().await;
        let mut emotions = self.state.emotions.lock().await;
        let mut stabilizer = self.state.stabilizer.lock().await;

        let mut by_age: Vec<(IdentityId, Duration)> = tracker
            .ids()
            .into_iter()
            .filter_map(|id| {
                tracker
                    .get(id)
                    .map(|identity| (id, now.saturating_duration_since(identity.last_seen)))
            })
            .collect();
        // Least recently seen first.
        by_age.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let (expired, kept): (Vec<_>, Vec<_>) =
            by_age.into_iter().partition(|(_, idle)| *idle > self.limits.ttl);
        let expired: Vec<IdentityId> = expired.into_iter().map(|(id, _)| id).collect();

        let overflow = kept.len().saturating_sub(self.limits.cap);
        let over_cap: Vec<IdentityId> = kept.iter().take(overflow).map(|(id, _)| *id).collect();

        let mut doomed = expired.clone();
        doomed.extend(over_cap.iter().copied());
        PipelineState::evict_locked(&mut tracker, &mut emotions, &mut stabilizer, &doomed);
        let remaining = tracker.len();
        drop(stabilizer);
        drop(emotions);
        drop(tracker);

        if !doomed.is_empty() {
            self.analysis.forget(&doomed).await;
        }

        metrics::record_evictions("ttl", expired.len());
        metrics::record_evictions("cap", over_cap.len());
        metrics::set_tracked_identities(remaining);

        let report = SweepReport {
            expired,
            over_cap,
            remaining,
        };

        let mut stats = self.stats.lock().await;
        stats.sweeps += 1;
        stats.identities_evicted += report.evicted() as u64;
        stats.last_sweep = Some(Utc::now());
        stats.tracked = remaining;

        if report.evicted() > 0 {
            info!(
                expired = report.expired.len(),
                over_cap = report.over_cap.len(),
                remaining = remaining,
                "Identity cache swept"
            );
        } else {
            debug!(remaining = remaining, "Identity cache sweep: nothing to evict");
        }
        report
    }

    /// Sweep right now, outside the schedule.
    pub async fn force_sweep(&self) -> SweepReport {
        self.sweep(tokio::time::Instant::now().into_std()).await
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.lock().await.clone()
    }

    /// Sweep on a fixed cadence until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.limits.sweep_interval;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.force_sweep().await;
                }
            }
        }
        debug!("Cache governor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use emocap_ml_client::{Classification, EmotionClassifier, MlClientResult};
    use emocap_models::{EmotionLabel, EmotionScores, Point};
    use emocap_vision::{TrackerConfig, TuningConfig};
    use image::RgbImage;

    struct Happy;

    #[async_trait]
    impl EmotionClassifier for Happy {
        async fn classify(&self, _face: RgbImage) -> MlClientResult<Classification> {
            Ok(Classification::from_scores(EmotionScores::from_pairs([
                (EmotionLabel::Happy, 80.0),
                (EmotionLabel::Neutral, 20.0),
            ])))
        }
    }

    fn governor(limits: CacheLimits) -> (CacheGovernor, Arc<PipelineState>) {
        let state = Arc::new(PipelineState::new(TrackerConfig::default(), TuningConfig::passthrough()));
        let analysis = Arc::new(AnalysisScheduler::new(
            Arc::new(Happy),
            Arc::clone(&state),
            Duration::from_millis(300),
            2,
        ));
        (CacheGovernor::new(Arc::clone(&state), analysis, limits), state)
    }

    /// Orthogonal descriptors far apart never match each other.
    async fn add_identity(state: &PipelineState, slot: usize, seen: Instant) -> IdentityId {
        let mut descriptor = vec![0.0f32; 64];
        descriptor[slot] = 1.0;
        let id = state
            .observe(&descriptor, Point::new(slot as f64 * 500.0, 0.0), seen)
            .await
            .id;
        state
            .apply_classification(
                id,
                Ok(Classification::from_scores(EmotionScores::from_pairs([(EmotionLabel::Sad, 100.0)]))),
            )
            .await;
        id
    }

    #[tokio::test]
    async fn test_ttl_eviction_is_atomic() {
        let (governor, state) = governor(CacheLimits::default());
        let base = Instant::now();
        let stale = add_identity(&state, 0, base).await;
        let fresh = add_identity(&state, 1, base + Duration::from_secs(200)).await;

        let report = governor.sweep(base + Duration::from_secs(301)).await;
        assert_eq!(report.expired, vec![stale]);
        assert!(report.over_cap.is_empty());
        assert_eq!(report.remaining, 1);

        assert!(state.emotion(stale).await.is_none());
        assert!(state.emotion(fresh).await.is_some());
        assert!(state.is_consistent().await);
        assert!(state.stabilizer.lock().await.history(stale).is_none());
    }

    #[tokio::test]
    async fn test_cap_evicts_least_recently_seen() {
        let (governor, state) = governor(CacheLimits {
            cap: 3,
            ..CacheLimits::default()
        });
        let base = Instant::now();
        let mut ids = Vec::new();
        for slot in 0..5 {
            ids.push(add_identity(&state, slot, base + Duration::from_secs(slot as u64)).await);
        }

        let report = governor.sweep(base + Duration::from_secs(10)).await;
        assert!(report.expired.is_empty());
        assert_eq!(report.over_cap, vec![ids[0], ids[1]]);
        assert_eq!(state.tracked().await, 3);
        assert!(state.is_consistent().await);

        let stats = governor.stats().await;
        assert_eq!(stats.sweeps, 1);
        assert_eq!(stats.identities_evicted, 2);
        assert_eq!(stats.tracked, 3);
    }

    #[tokio::test]
    async fn test_quiet_sweep() {
        let (governor, state) = governor(CacheLimits::default());
        add_identity(&state, 0, Instant::now()).await;
        let report = governor.force_sweep().await;
        assert_eq!(report.evicted(), 0);
        assert_eq!(report.remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_sweeps_on_cadence() {
        let (governor, _state) = governor(CacheLimits {
            sweep_interval: Duration::from_secs(60),
            ..CacheLimits::default()
        });
        let governor = Arc::new(governor);
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&governor).run(rx));

        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(governor.stats().await.sweeps, 2);

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
