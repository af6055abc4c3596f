//! Feature + position tracker for maintaining face identity across frames.
//!
//! Each detection carries a landmark descriptor and a face center. A detection
//! joins an existing identity only when both its descriptor is similar enough
//! (cosine) and its center is close enough (Euclidean) to that identity's
//! running averages. No re-identification model is involved.

use emocap_models::{IdentityId, Point};
use std::collections::HashMap;
use std::time::Instant;

/// Matching thresholds for [`IdentityTracker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Cosine similarity a candidate must exceed
    pub similarity_threshold: f64,
    /// Center distance (pixels) a candidate must stay below
    pub position_threshold: f64,
    /// Weight of the new observation in the running averages
    pub smoothing: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            position_threshold: 100.0,
            smoothing: 0.1,
        }
    }
}

/// A tracked face.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: IdentityId,
    pub descriptor: Vec<f32>,
    pub last_center: Point,
    pub last_seen: Instant,
}

/// Result of [`IdentityTracker::match_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackOutcome {
    pub id: IdentityId,
    /// True when the detection did not match and a fresh id was allocated
    pub is_new: bool,
}

/// Registry of tracked faces.
///
/// The tracker never drops identities on its own; [`IdentityTracker::remove`]
/// exists for the cache governor.
#[derive(Debug, Default)]
pub struct IdentityTracker {
    config: TrackerConfig,
    identities: HashMap<IdentityId, Identity>,
    next_id: u64,
}

impl IdentityTracker {
    /// Create a new tracker.
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            identities: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Resolve a detection to an identity, allocating one when nothing matches.
    ///
    /// Among candidates passing both thresholds, the most similar wins. A
    /// match folds the observation into the stored descriptor and center.
    pub fn match_or_create(&mut self, descriptor: &[f32], center: Point, now: Instant) -> TrackOutcome {
        let mut best: Option<(IdentityId, f64)> = None;

        for identity in self.identities.values() {
            let Some(similarity) = cosine_similarity(descriptor, &identity.descriptor) else {
                continue;
            };
            if similarity <= self.config.similarity_threshold {
                continue;
            }
            if center.distance(&identity.last_center) >= self.config.position_threshold {
                continue;
            }
            if best.map_or(true, |(_, best_sim)| similarity > best_sim) {
                best = Some((identity.id, similarity));
            }
        }

        if let Some((id, _)) = best {
            let alpha = self.config.smoothing;
            if let Some(identity) = self.identities.get_mut(&id) {
                for (stored, observed) in identity.descriptor.iter_mut().zip(descriptor) {
                    *stored = (*stored as f64 * (1.0 - alpha) + *observed as f64 * alpha) as f32;
                }
                identity.last_center = identity.last_center.blend(&center, alpha);
                identity.last_seen = now;
            }
            return TrackOutcome { id, is_new: false };
        }

        let id = IdentityId(self.next_id);
        self.next_id += 1;
        self.identities.insert(
            id,
            Identity {
                id,
                descriptor: descriptor.to_vec(),
                last_center: center,
                last_seen: now,
            },
        );
        TrackOutcome { id, is_new: true }
    }

    pub fn get(&self, id: IdentityId) -> Option<&Identity> {
        self.identities.get(&id)
    }

    pub fn contains(&self, id: IdentityId) -> bool {
        self.identities.contains_key(&id)
    }

    /// Tracked ids, unordered.
    pub fn ids(&self) -> Vec<IdentityId> {
        self.identities.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Drop identities. Returns how many were present.
    pub fn remove(&mut self, ids: &[IdentityId]) -> usize {
        ids.iter()
            .filter(|id| self.identities.remove(id).is_some())
            .count()
    }

    /// Forget every identity. Ids keep counting up, so a result still in
    /// flight for a forgotten id can never match a new face.
    pub fn reset(&mut self) {
        self.identities.clear();
    }
}

/// Cosine similarity, or `None` when it is undefined (zero vector, length
/// mismatch, empty input, non-finite result).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    let similarity = dot / denom;
    similarity.is_finite().then_some(similarity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> IdentityTracker {
        IdentityTracker::new(TrackerConfig::default())
    }

    #[test]
    fn test_tracker_new_detections() {
        let mut tracker = tracker();
        let now = Instant::now();

        let a = tracker.match_or_create(&[1.0, 0.0, 0.0], Point::new(100.0, 100.0), now);
        let b = tracker.match_or_create(&[0.0, 1.0, 0.0], Point::new(100.0, 100.0), now);

        assert_eq!(a, TrackOutcome { id: IdentityId(0), is_new: true });
        assert_eq!(b, TrackOutcome { id: IdentityId(1), is_new: true });
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_tracker_stable_under_small_drift() {
        let mut tracker = tracker();
        let now = Instant::now();
        let first = tracker.match_or_create(&[1.0, 0.2, 0.1], Point::new(200.0, 200.0), now);

        for step in 1..50 {
            let jitter = (step % 5) as f32 * 0.01;
            let center = Point::new(200.0 + (step % 7) as f64 * 5.0, 200.0 - (step % 3) as f64 * 5.0);
            let outcome = tracker.match_or_create(&[1.0, 0.2 + jitter, 0.1], center, now);
            assert_eq!(outcome.id, first.id);
            assert!(!outcome.is_new);
        }
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_tracker_separates_distant_faces() {
        let mut tracker = tracker();
        let now = Instant::now();
        let a = tracker.match_or_create(&[1.0, 0.0], Point::new(0.0, 0.0), now);
        // Same descriptor, too far away
        let b = tracker.match_or_create(&[1.0, 0.0], Point::new(150.0, 0.0), now);
        assert_ne!(a.id, b.id);
        assert!(b.is_new);
    }

    #[test]
    fn test_tracker_prefers_most_similar() {
        let mut tracker = IdentityTracker::new(TrackerConfig {
            similarity_threshold: 0.7,
            ..TrackerConfig::default()
        });
        let now = Instant::now();
        let a = tracker.match_or_create(&[1.0, 0.0], Point::new(0.0, 0.0), now);
        let b = tracker.match_or_create(&[0.6, 0.8], Point::new(0.0, 0.0), now);
        assert!(b.is_new);

        // 0.8 against a, 0.96 against b: both qualify, b is more similar
        let c = tracker.match_or_create(&[0.8, 0.6], Point::new(5.0, 0.0), now);
        assert_eq!(c.id, b.id);
        assert_ne!(c.id, a.id);
    }

    #[test]
    fn test_ema_update() {
        let mut tracker = tracker();
        let now = Instant::now();
        let a = tracker.match_or_create(&[1.0, 0.0], Point::new(100.0, 100.0), now);
        tracker.match_or_create(&[1.0, 0.0], Point::new(150.0, 100.0), now);

        let identity = tracker.get(a.id).unwrap();
        assert!((identity.last_center.x - 105.0).abs() < 1e-9);
        assert!((identity.last_center.y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_descriptor_never_matches() {
        let mut tracker = tracker();
        let now = Instant::now();
        let a = tracker.match_or_create(&[0.0, 0.0], Point::new(10.0, 10.0), now);
        let b = tracker.match_or_create(&[0.0, 0.0], Point::new(10.0, 10.0), now);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_length_mismatch_never_matches() {
        let mut tracker = tracker();
        let now = Instant::now();
        let a = tracker.match_or_create(&[1.0, 0.0], Point::new(10.0, 10.0), now);
        let b = tracker.match_or_create(&[1.0, 0.0, 0.0], Point::new(10.0, 10.0), now);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_remove_and_reset() {
        let mut tracker = tracker();
        let now = Instant::now();
        let a = tracker.match_or_create(&[1.0, 0.0], Point::new(0.0, 0.0), now);
        let b = tracker.match_or_create(&[0.0, 1.0], Point::new(0.0, 0.0), now);

        assert_eq!(tracker.remove(&[a.id, IdentityId(99)]), 1);
        assert!(!tracker.contains(a.id));
        assert!(tracker.contains(b.id));

        // Ids are not reused after removal
        let c = tracker.match_or_create(&[1.0, 0.0], Point::new(0.0, 0.0), now);
        assert_eq!(c.id, IdentityId(2));

        tracker.reset();
        assert!(tracker.is_empty());
        let d = tracker.match_or_create(&[1.0, 0.0], Point::new(0.0, 0.0), now);
        assert!(d.is_new);
        assert_eq!(d.id, IdentityId(3));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-9);
        assert!(cosine_similarity(&[], &[]).is_none());
        assert!(cosine_similarity(&[0.0], &[1.0]).is_none());
    }
}
