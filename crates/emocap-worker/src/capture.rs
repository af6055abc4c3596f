//! Moment selection and capture.
//!
//! The scheduler runs on every processed frame but only evaluates once per
//! capture interval. An evaluation resets the cadence whether or not it
//! selects anybody, so a quiet room does not cause rapid retries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use emocap_models::{CropRegion, EmotionLabel, FaceReport, IdentityId};
use emocap_vision::{capture_region, crop_image, save_jpeg, CropConfig};
use image::RgbImage;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::WorkerResult;
use crate::metrics;

/// Capture classes in priority order with the score each must exceed.
pub const CAPTURE_PRIORITY: [(EmotionLabel, f64); 4] = [
    (EmotionLabel::Happy, 25.0),
    (EmotionLabel::Surprise, 25.0),
    (EmotionLabel::Sad, 30.0),
    (EmotionLabel::Angry, 25.0),
];

/// Capture settings.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub interval: Duration,
    pub indicator: Duration,
    pub crop: CropConfig,
    pub output_dir: PathBuf,
    pub quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(20),
            indicator: Duration::from_secs(3),
            crop: CropConfig::default(),
            output_dir: PathBuf::from("pictures"),
            quality: 95,
        }
    }
}

/// A selected moment, ready to persist.
#[derive(Debug, Clone)]
pub struct CaptureTask {
    /// Undecorated frame the crop is cut from
    pub source: Arc<RgbImage>,
    pub identity_id: IdentityId,
    pub label: EmotionLabel,
    pub score: f64,
    pub region: CropRegion,
    pub filename: String,
}

impl CaptureTask {
    /// Crop and write the moment into `dir`. Blocking.
    pub fn persist(&self, dir: &Path, quality: u8) -> WorkerResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let crop = crop_image(&self.source, &self.region)?;
        let path = dir.join(&self.filename);
        save_jpeg(&crop, &path, quality)?;
        Ok(path)
    }
}

/// Transient "just captured" marker for the annotator.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureIndicator {
    pub identity_id: IdentityId,
    pub label: EmotionLabel,
    pub score: f64,
    pub region: CropRegion,
    pub until: Instant,
}

/// Best capture candidate by class priority, then score. Ties keep the
/// earlier face.
pub fn select_candidate(faces: &[FaceReport]) -> Option<(&FaceReport, EmotionLabel, f64)> {
    for (label, threshold) in CAPTURE_PRIORITY {
        let mut best: Option<(&FaceReport, f64)> = None;
        for face in faces {
            let score = face.all_scores.get(label);
            if score <= threshold {
                continue;
            }
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((face, score));
            }
        }
        if let Some((face, score)) = best {
            return Some((face, label, score));
        }
    }
    None
}

/// Moment filename: label, local timestamp, sequence and score.
pub fn capture_filename(label: EmotionLabel, sequence: u64, score: f64) -> String {
    format!(
        "{}_moment_{}_{:04}_{:.0}pct.jpg",
        label,
        chrono::Local::now().format("%Y%m%d_%H%M%S"),
        sequence,
        score
    )
}

/// Interval-gated moment selector.
#[derive(Debug)]
pub struct CaptureScheduler {
    config: CaptureConfig,
    last_evaluation: Option<Instant>,
    sequence: u64,
    indicator: Option<CaptureIndicator>,
}

impl CaptureScheduler {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            last_evaluation: None,
            sequence: 0,
            indicator: None,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// The first evaluation is always due.
    pub fn is_due(&self, now: Instant) -> bool {
        self.last_evaluation
            .map_or(true, |last| now.duration_since(last) >= self.config.interval)
    }

    /// Time left until the next evaluation.
    pub fn next_capture_countdown(&self, now: Instant) -> Duration {
        match self.last_evaluation {
            Some(last) => self.config.interval.saturating_sub(now.duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Pick at most one moment from the current faces.
    pub fn evaluate(&mut self, frame: &Arc<RgbImage>, faces: &[FaceReport], now: Instant) -> Option<CaptureTask> {
        if !self.is_due(now) {
            return None;
        }
        self.last_evaluation = Some(now);

        let Some((face, label, score)) = select_candidate(faces) else {
            debug!(faces = faces.len(), "No capture candidate this cycle");
            metrics::record_capture_skipped("no_candidate");
            return None;
        };

        let region = match capture_region(&face.bbox, frame.width(), frame.height(), &self.config.crop) {
            Ok(region) => region,
            Err(e) => {
                warn!(identity_id = %face.identity_id, error = %e, "Skipping capture");
                metrics::record_capture_skipped("invalid_geometry");
                return None;
            }
        };

        self.sequence += 1;
        let filename = capture_filename(label, self.sequence, score);
        info!(
            identity_id = %face.identity_id,
            label = %label,
            score = score,
            filename = %filename,
            "Moment selected"
        );

        Some(CaptureTask {
            source: Arc::clone(frame),
            identity_id: face.identity_id,
            label,
            score,
            region,
            filename,
        })
    }

    /// Raise the indicator after a successful persist.
    pub fn mark_captured(&mut self, task: &CaptureTask, now: Instant) {
        metrics::record_capture(task.label.as_str());
        self.indicator = Some(CaptureIndicator {
            identity_id: task.identity_id,
            label: task.label,
            score: task.score,
            region: task.region,
            until: now + self.config.indicator,
        });
    }

    /// The indicator, while it lasts.
    pub fn indicator(&self, now: Instant) -> Option<&CaptureIndicator> {
        self.indicator.as_ref().filter(|i| now < i.until)
    }

    /// Moments selected so far.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn reset(&mut self) {
        self.last_evaluation = None;
        self.indicator = None;
    }
}
