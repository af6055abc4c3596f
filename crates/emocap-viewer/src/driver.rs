//! Feeds inbound viewer messages into the [`SyncCoordinator`] and fires its
//! deadlines.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use emocap_models::ViewerMessage;
use image::RgbImage;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ViewerConfig;
use crate::error::{ViewerError, ViewerResult};
use crate::metrics;
use crate::sync::{DisplayMode, SyncCoordinator, SyncPhase, SyncTransition};

/// Local audio output.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Start playing the file at `path`. Should return once playback has
    /// started, not when it finishes.
    async fn play(&self, path: &Path) -> ViewerResult<()>;

    /// Shutter cue for a freshly taken photo.
    async fn shutter(&self) {}
}

/// Discards all audio.
pub struct SilentSink;

#[async_trait]
impl AudioSink for SilentSink {
    async fn play(&self, _path: &Path) -> ViewerResult<()> {
        Ok(())
    }
}

/// Read side for the render loop.
#[derive(Clone)]
pub struct ViewerHandle {
    coordinator: Arc<Mutex<SyncCoordinator>>,
}

impl ViewerHandle {
    pub fn display_mode(&self) -> DisplayMode {
        lock(&self.coordinator).display_mode(Instant::now())
    }

    pub fn phase(&self) -> SyncPhase {
        lock(&self.coordinator).phase()
    }

    pub fn reset(&self) {
        lock(&self.coordinator).reset();
    }
}

fn lock(coordinator: &Mutex<SyncCoordinator>) -> std::sync::MutexGuard<'_, SyncCoordinator> {
    coordinator.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ViewerDriver {
    config: ViewerConfig,
    sink: Arc<dyn AudioSink>,
    coordinator: Arc<Mutex<SyncCoordinator>>,
}

impl ViewerDriver {
    pub fn new(config: ViewerConfig, sink: Arc<dyn AudioSink>) -> Self {
        let coordinator = Arc::new(Mutex::new(SyncCoordinator::new(config.sync)));
        Self {
            config,
            sink,
            coordinator,
        }
    }

    pub fn handle(&self) -> ViewerHandle {
        ViewerHandle {
            coordinator: Arc::clone(&self.coordinator),
        }
    }

    /// Process messages until the channel closes or shutdown is signalled.
    pub async fn run(self, mut messages: mpsc::UnboundedReceiver<ViewerMessage>, mut shutdown: watch::Receiver<bool>) {
        info!(audio_dir = %self.config.audio_dir.display(), "Viewer driver started");
        loop {
            let deadline = lock(&self.coordinator).next_deadline();
            tokio::select! {
                message = messages.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => break,
                },
                _ = wait_until(deadline) => {
                    self.tick(Instant::now());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Viewer driver stopped");
    }

    pub async fn handle_message(&self, message: ViewerMessage) {
        match message {
            ViewerMessage::PhotoTaken {
                emotion_label,
                emotion_score,
                filename,
                ..
            } => {
                info!(label = %emotion_label, score = emotion_score, filename = %filename, "Photo taken");
                self.sink.shutter().await;
            }
            ViewerMessage::AudioAndDisplaySync {
                comment,
                audio_filename,
                audio_bytes,
                start_display,
                ..
            } => {
                if !start_display || audio_bytes.is_empty() {
                    debug!(filename = %audio_filename, "Sync message without playable audio");
                    return;
                }
                info!(comment = %comment, filename = %audio_filename, "Commentary audio received");
                self.receive_audio(&audio_filename, &audio_bytes).await;

                let transition = lock(&self.coordinator).audio_ready(Instant::now());
                if let Some(transition) = transition {
                    log_transition(transition);
                }
            }
            ViewerMessage::PhotoComposed {
                image_bytes,
                display_duration,
                emotion_label,
                overlay_kind,
                ..
            } => {
                let image = match decode_image(&image_bytes) {
                    Ok(image) => image,
                    Err(e) => {
                        metrics::record_image_dropped();
                        warn!(label = %emotion_label, error = %e, "Dropping undecodable composed image");
                        return;
                    }
                };
                info!(
                    label = %emotion_label,
                    overlay = %overlay_kind,
                    width = image.width(),
                    height = image.height(),
                    "Composed image received"
                );
                let transition = {
                    let mut coordinator = lock(&self.coordinator);
                    let duration = coordinator.display_duration(display_duration);
                    coordinator.image_ready(Arc::new(image), duration, Instant::now())
                };
                log_transition(transition);
            }
        }
    }

    /// Fire any deadlines that have passed.
    pub fn tick(&self, now: Instant) {
        let transitions = lock(&self.coordinator).tick(now);
        for transition in transitions {
            log_transition(transition);
        }
    }

    /// Persist then play. Failures are logged; the caller still marks the
    /// audio ready.
    async fn receive_audio(&self, filename: &str, bytes: &[u8]) {
        let path = match persist_audio(&self.config.audio_dir, filename, bytes).await {
            Ok(path) => path,
            Err(e) => {
                metrics::record_audio_received(false);
                warn!(filename = %filename, error = %e, "Could not persist commentary audio");
                return;
            }
        };
        metrics::record_audio_received(true);
        debug!(path = %path.display(), bytes = bytes.len(), "Commentary audio saved");

        if let Err(e) = self.sink.play(&path).await {
            warn!(path = %path.display(), error = %e, "Audio playback failed");
        }
    }
}

/// Write `bytes` to `<dir>/<filename>`. Only the final path component of
/// `filename` is used.
pub async fn persist_audio(dir: &Path, filename: &str, bytes: &[u8]) -> ViewerResult<PathBuf> {
    let name = Path::new(filename)
        .file_name()
        .ok_or_else(|| ViewerError::audio_persist(format!("invalid audio filename {:?}", filename)))?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ViewerError::audio_persist(format!("{}: {}", dir.display(), e)))?;
    let path = dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| ViewerError::audio_persist(format!("{}: {}", path.display(), e)))?;
    Ok(path)
}

pub fn decode_image(bytes: &[u8]) -> ViewerResult<RgbImage> {
    if bytes.is_empty() {
        return Err(ViewerError::image_decode("empty payload"));
    }
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn log_transition(transition: SyncTransition) {
    match transition {
        SyncTransition::Holding { deadline } => {
            let wait = deadline.saturating_duration_since(Instant::now());
            info!(wait_secs = wait.as_secs_f64(), "Holding composed image for audio");
        }
        SyncTransition::Presenting { synchronized, until } => {
            metrics::record_presentation(synchronized);
            let secs = until.saturating_duration_since(Instant::now()).as_secs_f64();
            if synchronized {
                info!(display_secs = secs, "Presenting composed image with audio");
            } else {
                warn!(display_secs = secs, "Audio sync timed out, presenting without audio");
            }
        }
        SyncTransition::Returned => info!("Back to live feed"),
    }
}
