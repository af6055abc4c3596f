//! Single-consumer composition queue.
//!
//! Producers hold a cheap [`CompositionHandle`] and never block. One
//! background task drains the queue in order, composes each image on the
//! blocking pool and reports every outcome as a
//! [`PipelineEvent::CompositionCompleted`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use emocap_models::{CompositionJob, CompositionResult, EmotionLabel, PipelineEvent};
use emocap_vision::Compositor;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::logging::{MomentLogger, MomentStage};
use crate::metrics;

/// Producer side of the composition queue.
#[derive(Debug, Clone)]
pub struct CompositionHandle {
    tx: mpsc::UnboundedSender<CompositionJob>,
    accepting: Arc<AtomicBool>,
}

impl CompositionHandle {
    /// Queue a job. Returns false when the source file is missing or the
    /// worker has stopped accepting work.
    pub fn enqueue(&self, image_path: impl Into<std::path::PathBuf>, emotion_label: EmotionLabel) -> bool {
        let job = CompositionJob::new(image_path, emotion_label);
        if !self.accepting.load(Ordering::Acquire) {
            warn!(path = %job.image_path.display(), "Composition worker stopped, job rejected");
            return false;
        }
        if !job.image_path.exists() {
            warn!(path = %job.image_path.display(), "Composition source missing, job rejected");
            return false;
        }
        debug!(path = %job.image_path.display(), label = %emotion_label, "Composition queued");
        self.tx.send(job).is_ok()
    }
}

/// Owner of the background consumer.
pub struct CompositionWorker {
    accepting: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl CompositionWorker {
    /// Start the consumer; results go to `events`.
    pub fn spawn(
        compositor: Arc<Compositor>,
        events: mpsc::UnboundedSender<PipelineEvent>,
    ) -> (Self, CompositionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let accepting = Arc::new(AtomicBool::new(true));

        let handle = tokio::spawn(run_queue(compositor, rx, events, shutdown_rx));
        let worker = Self {
            accepting: Arc::clone(&accepting),
            shutdown,
            handle: Some(handle),
        };
        (worker, CompositionHandle { tx, accepting })
    }

    /// Stop accepting jobs, let the queued ones drain, and wait at most
    /// `timeout` for the consumer. Returns whether it finished in time.
    pub async fn shutdown(&mut self, timeout: Duration) -> bool {
        self.accepting.store(false, Ordering::Release);
        let _ = self.shutdown.send(true);

        let Some(handle) = self.handle.take() else {
            return true;
        };
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => {
                info!("Composition worker stopped");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Composition worker task failed");
                true
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Composition worker still busy, detaching");
                false
            }
        }
    }
}

async fn run_queue(
    compositor: Arc<Compositor>,
    mut rx: mpsc::UnboundedReceiver<CompositionJob>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        normal = compositor.library().normal_count(),
        special = compositor.library().special_count(),
        "Composition worker started"
    );

    loop {
        tokio::select! {
            biased;
            job = rx.recv() => match job {
                Some(job) => {
                    process_job(&compositor, job, &events).await;
                }
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    rx.close();
                    while let Some(job) = rx.recv().await {
                        process_job(&compositor, job, &events).await;
                    }
                    break;
                }
            }
        }
    }
}

/// Compose one job; the outcome is always reported.
pub async fn process_job(
    compositor: &Arc<Compositor>,
    job: CompositionJob,
    events: &mpsc::UnboundedSender<PipelineEvent>,
) -> CompositionResult {
    let logger = MomentLogger::for_capture(&job.image_path, job.emotion_label, MomentStage::Composition);
    let started = Instant::now();
    let queued_for = (chrono::Utc::now() - job.enqueue_time).num_milliseconds();
    logger.started(&format!("after {} ms in queue", queued_for));

    let compositor = Arc::clone(compositor);
    let path = job.image_path.clone();
    let label = job.emotion_label;
    let outcome = tokio::task::spawn_blocking(move || {
        let mut rng = rand::rng();
        compositor.compose_file(&path, label, &path, &mut rng)
    })
    .await;

    let result = match outcome {
        Ok(Ok(kind)) => {
            logger.finished(&format!("{} overlay", kind));
            CompositionResult::succeeded(job.image_path.clone(), kind, label)
        }
        Ok(Err(e)) => {
            logger.failed(&e.to_string());
            CompositionResult::failed(job.image_path.clone(), label, e.to_string())
        }
        Err(e) => {
            logger.failed(&format!("compose task panicked: {}", e));
            CompositionResult::failed(job.image_path.clone(), label, e.to_string())
        }
    };

    metrics::record_composition(
        result.success,
        result.overlay_kind.map(|k| k.as_str()),
        started.elapsed().as_secs_f64(),
    );
    if events.send(PipelineEvent::from(&result)).is_err() {
        debug!("No listener for composition events");
    }
    result
}
