//! Turns pipeline events into viewer messages.

use std::path::Path;

use emocap_models::{EmotionLabel, OverlayKind, PipelineEvent, ViewerMessage};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::commentary::CommentaryWorkflow;

/// Consumes [`PipelineEvent`]s until the channel closes or shutdown.
pub struct NotificationRelay {
    workflow: CommentaryWorkflow,
    viewer: mpsc::UnboundedSender<ViewerMessage>,
    display_duration: f64,
}

impl NotificationRelay {
    pub fn new(
        workflow: CommentaryWorkflow,
        viewer: mpsc::UnboundedSender<ViewerMessage>,
        display_duration: f64,
    ) -> Self {
        Self {
            workflow,
            viewer,
            display_duration,
        }
    }

    pub async fn run(self, mut events: mpsc::UnboundedReceiver<PipelineEvent>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Notification relay stopped");
    }

    /// Captures are handed to the commentary workflow on their own task;
    /// composition results are relayed inline.
    pub async fn handle(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::CaptureCompleted {
                identity_id,
                label,
                score,
                file,
            } => {
                info!(identity_id = %identity_id, label = %label, path = %file.display(), "Capture completed");
                let workflow = self.workflow.clone();
                tokio::spawn(async move {
                    workflow.on_capture(file, label, score).await;
                });
            }
            PipelineEvent::CompositionCompleted {
                success: true,
                output_path,
                overlay_kind,
                label,
            } => {
                self.relay_composed(&output_path, label, overlay_kind.unwrap_or(OverlayKind::Normal))
                    .await;
            }
            PipelineEvent::CompositionCompleted { output_path, label, .. } => {
                warn!(label = %label, path = %output_path.display(), "Composition failed, nothing to relay");
            }
        }
    }

    async fn relay_composed(&self, path: &Path, label: EmotionLabel, kind: OverlayKind) {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                info!(path = %path.display(), bytes = bytes.len(), overlay = %kind, "Relaying composed image");
                let message = ViewerMessage::photo_composed(bytes, self.display_duration, label, kind);
                if self.viewer.send(message).is_err() {
                    debug!("No viewer attached");
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Composed image unreadable"),
        }
    }
}
