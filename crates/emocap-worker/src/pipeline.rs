//! The moment pipeline: per-frame entry point plus its background tasks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use emocap_ml_client::{CommentaryGenerator, EmotionClassifier, LandmarkDetector, SpeechSynthesizer};
use emocap_models::{BoundingBox, FaceReport, IdentityId, PipelineEvent, ViewerMessage};
use emocap_vision::{annotate, extract_face, ComposerConfig, Compositor, CropConfig};
use image::RgbImage;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::analysis::AnalysisScheduler;
use crate::artifacts::{ArtifactGovernor, ArtifactStats};
use crate::capture::{CaptureConfig, CaptureScheduler, CaptureTask};
use crate::commentary::CommentaryWorkflow;
use crate::composition::{CompositionHandle, CompositionWorker};
use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::governor::{CacheGovernor, CacheLimits, CacheStats, SweepReport};
use crate::logging::{MomentLogger, MomentStage};
use crate::metrics;
use crate::relay::NotificationRelay;
use crate::state::PipelineState;

/// The opaque collaborators the pipeline calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub detector: Arc<dyn LandmarkDetector>,
    pub classifier: Arc<dyn EmotionClassifier>,
    pub commentary: Option<Arc<dyn CommentaryGenerator>>,
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
}

/// A processed frame ready for display.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    /// The frame with face boxes and the capture highlight drawn on it
    pub image: RgbImage,
    pub faces: Vec<FaceReport>,
    /// Set on the frame that triggered a capture
    pub captured: Option<PathBuf>,
}

/// Running pipeline. Create with [`MomentPipeline::start`] inside a tokio
/// runtime; stop with [`MomentPipeline::shutdown`].
pub struct MomentPipeline {
    config: WorkerConfig,
    state: Arc<PipelineState>,
    detector: Arc<dyn LandmarkDetector>,
    analysis: Arc<AnalysisScheduler>,
    capture: Mutex<CaptureScheduler>,
    composition: CompositionHandle,
    events: mpsc::UnboundedSender<PipelineEvent>,
    cache: Arc<CacheGovernor>,
    artifacts: Arc<ArtifactGovernor>,
    composition_worker: Mutex<CompositionWorker>,
    shutdown: watch::Sender<bool>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl MomentPipeline {
    /// Build the pipeline and spawn its background tasks. Returns the
    /// stream of messages for the remote viewer.
    pub fn start(
        config: WorkerConfig,
        collaborators: Collaborators,
    ) -> WorkerResult<(Self, mpsc::UnboundedReceiver<ViewerMessage>)> {
        std::fs::create_dir_all(&config.capture_dir)?;
        std::fs::create_dir_all(&config.audio_dir)?;

        let state = Arc::new(PipelineState::new(config.tracker_config(), config.tuning()));
        let analysis = Arc::new(AnalysisScheduler::new(
            collaborators.classifier,
            Arc::clone(&state),
            config.analysis_interval,
            config.max_concurrent_classifications,
        ));
        let capture = CaptureScheduler::new(CaptureConfig {
            interval: config.capture_interval,
            indicator: config.capture_indicator,
            crop: CropConfig {
                face_padding: config.face_padding,
                ..CropConfig::default()
            },
            output_dir: config.capture_dir.clone(),
            quality: config.capture_quality,
        });

        let compositor = Arc::new(Compositor::load(ComposerConfig::with_sources_dir(&config.sources_dir)));
        if compositor.library().is_empty() {
            warn!(dir = %config.sources_dir.display(), "No overlay assets found; compositions will fail");
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (viewer_tx, viewer_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        let (composition_worker, composition) = CompositionWorker::spawn(compositor, events_tx.clone());

        let workflow = CommentaryWorkflow::new(
            collaborators.commentary,
            collaborators.speech,
            composition.clone(),
            viewer_tx.clone(),
            config.commentary_wait,
        );
        let relay = NotificationRelay::new(workflow, viewer_tx, config.display_duration);

        let cache = Arc::new(CacheGovernor::new(
            Arc::clone(&state),
            Arc::clone(&analysis),
            CacheLimits {
                ttl: config.identity_ttl,
                cap: config.identity_cap,
                sweep_interval: config.cache_sweep_interval,
            },
        ));
        let artifacts = Arc::new(ArtifactGovernor::from_config(&config));

        let background = vec![
            tokio::spawn(relay.run(events_rx, shutdown.subscribe())),
            tokio::spawn(Arc::clone(&cache).run(shutdown.subscribe())),
            tokio::spawn(Arc::clone(&artifacts).run(shutdown.subscribe())),
        ];

        info!(
            capture_interval_secs = config.capture_interval.as_secs_f64(),
            capture_dir = %config.capture_dir.display(),
            audio_dir = %config.audio_dir.display(),
            "Moment pipeline started"
        );

        let pipeline = Self {
            state,
            detector: collaborators.detector,
            analysis,
            capture: Mutex::new(capture),
            composition,
            events: events_tx,
            cache,
            artifacts,
            composition_worker: Mutex::new(composition_worker),
            shutdown,
            background: Mutex::new(background),
            config,
        };
        Ok((pipeline, viewer_rx))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }

    /// Producer handle for the composition queue.
    pub fn composition(&self) -> &CompositionHandle {
        &self.composition
    }

    /// Process one raw frame: track, dispatch analysis, maybe capture,
    /// annotate. Upstream failures degrade to an unannotated frame.
    pub async fn on_frame(&self, frame: RgbImage) -> AnnotatedFrame {
        let now = Instant::now();

        let detections = match self.detector.detect(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                metrics::record_detector_failure();
                warn!(error = %e, "Landmark detection failed");
                Vec::new()
            }
        };

        let mut visible: Vec<(IdentityId, BoundingBox)> = Vec::with_capacity(detections.len());
        for detection in detections {
            if detection.bbox.is_degenerate() {
                debug!(bbox = ?detection.bbox, "Ignoring degenerate face box");
                continue;
            }
            let outcome = self
                .state
                .observe(&detection.descriptor, detection.bbox.center_point(), now.into_std())
                .await;

            match extract_face(&frame, &detection.bbox, self.config.face_padding) {
                Ok(face) => {
                    self.analysis.maybe_dispatch(outcome.id, face).await;
                }
                Err(e) => debug!(identity_id = %outcome.id, error = %e, "No face crop"),
            }
            visible.push((outcome.id, detection.bbox));
        }

        let faces: Vec<FaceReport> = {
            let emotions = self.state.emotions.lock().await;
            visible
                .iter()
                .map(|(id, bbox)| match emotions.get(id) {
                    Some(state) => FaceReport::from_state(*bbox, state),
                    None => FaceReport::pending(*id, *bbox),
                })
                .collect()
        };

        let frame = Arc::new(frame);
        let selected = self.capture.lock().await.evaluate(&frame, &faces, now);
        let captured = match selected {
            Some(task) => self.persist_capture(task, now).await,
            None => None,
        };

        let highlight = self.capture.lock().await.indicator(now).map(|i| i.region);
        let mut image = Arc::try_unwrap(frame).unwrap_or_else(|shared| (*shared).clone());
        annotate(&mut image, &faces, highlight.as_ref());

        AnnotatedFrame {
            image,
            faces,
            captured,
        }
    }

    async fn persist_capture(&self, task: CaptureTask, now: Instant) -> Option<PathBuf> {
        let dir = self.config.capture_dir.clone();
        let quality = self.config.capture_quality;
        let job = task.clone();
        let persisted = tokio::task::spawn_blocking(move || job.persist(&dir, quality)).await;

        let path = match persisted {
            Ok(Ok(path)) => path,
            Ok(Err(e)) => {
                metrics::record_capture_skipped(if e.is_geometry() { "invalid_geometry" } else { "io" });
                warn!(identity_id = %task.identity_id, error = %e, "Capture not persisted");
                return None;
            }
            Err(e) => {
                metrics::record_capture_skipped("io");
                warn!(identity_id = %task.identity_id, error = %e, "Capture task failed");
                return None;
            }
        };

        self.capture.lock().await.mark_captured(&task, now);
        MomentLogger::for_capture(&path, task.label, MomentStage::Capture)
            .with_score(task.score)
            .finished(&format!("identity {} at {:.1}%", task.identity_id, task.score));

        let event = PipelineEvent::CaptureCompleted {
            identity_id: task.identity_id,
            label: task.label,
            score: task.score,
            file: path.clone(),
        };
        if self.events.send(event).is_err() {
            debug!("Notification relay gone");
        }
        Some(path)
    }

    /// Seconds until the capture scheduler evaluates again.
    pub async fn next_capture_countdown(&self) -> f64 {
        self.capture.lock().await.next_capture_countdown(Instant::now()).as_secs_f64()
    }

    pub async fn force_sweep(&self) -> SweepReport {
        self.cache.force_sweep().await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub fn artifact_stats(&self) -> ArtifactStats {
        self.artifacts.stats()
    }

    /// Prune artifacts now, off the async threads.
    pub async fn force_artifact_sweep(&self) -> WorkerResult<()> {
        let artifacts = Arc::clone(&self.artifacts);
        tokio::task::spawn_blocking(move || artifacts.sweep(SystemTime::now())).await?;
        Ok(())
    }

    /// Forget every identity and restart capture cadence.
    pub async fn reset(&self) {
        self.state.reset().await;
        self.analysis.reset().await;
        self.capture.lock().await.reset();
    }

    /// Stop accepting work and join background tasks within the configured
    /// timeout. In-flight calls are not cancelled.
    pub async fn shutdown(&self) {
        info!("Shutting down moment pipeline");
        self.analysis.stop();
        let _ = self.shutdown.send(true);

        let timeout = self.config.shutdown_timeout;
        self.composition_worker.lock().await.shutdown(timeout).await;

        let handles: Vec<JoinHandle<()>> = self.background.lock().await.drain(..).collect();
        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!("Background tasks did not stop in time");
        }
        info!("Moment pipeline stopped");
    }
}
