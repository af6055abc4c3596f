//! What happens after a moment is captured.
//!
//! The viewer hears about the photo at once. Commentary is requested for it;
//! when there is something to say, speech synthesis and composition run
//! side by side and the audio is relayed if it shows up within the wait
//! window. Composition is queued no matter how commentary goes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use emocap_ml_client::{CommentaryGenerator, SpeechSynthesizer};
use emocap_models::{EmotionLabel, ViewerMessage};
use tokio::sync::mpsc;
use tracing::{debug, Instrument};

use crate::composition::CompositionHandle;
use crate::logging::{MomentLogger, MomentStage};
use crate::metrics;

/// Outcome of one workflow run, mostly for tests and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentaryOutcome {
    /// Commentary and audio were relayed
    Delivered { comment: String, audio: PathBuf },
    /// Commentary produced but audio failed or timed out
    AudioMissing { comment: String },
    /// No commentary
    Silent,
}

/// Drives commentary, speech and composition for captured moments.
#[derive(Clone)]
pub struct CommentaryWorkflow {
    commentary: Option<Arc<dyn CommentaryGenerator>>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    composition: CompositionHandle,
    viewer: mpsc::UnboundedSender<ViewerMessage>,
    audio_wait: Duration,
}

impl CommentaryWorkflow {
    pub fn new(
        commentary: Option<Arc<dyn CommentaryGenerator>>,
        speech: Option<Arc<dyn SpeechSynthesizer>>,
        composition: CompositionHandle,
        viewer: mpsc::UnboundedSender<ViewerMessage>,
        audio_wait: Duration,
    ) -> Self {
        Self {
            commentary,
            speech,
            composition,
            viewer,
            audio_wait,
        }
    }

    /// Handle one captured moment end to end.
    pub async fn on_capture(&self, file: PathBuf, label: EmotionLabel, score: f64) -> CommentaryOutcome {
        let logger = MomentLogger::for_capture(&file, label, MomentStage::Commentary).with_score(score);
        let span = logger.create_span();
        self.run(&logger, file, label, score).instrument(span).await
    }

    async fn run(&self, logger: &MomentLogger, file: PathBuf, label: EmotionLabel, score: f64) -> CommentaryOutcome {
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.send(ViewerMessage::photo_taken(label, score, filename));
        logger.started(&format!("requesting commentary at {:.1}%", score));

        let Some(comment) = self.request_commentary(logger, &file).await else {
            self.composition.enqueue(&file, label);
            return CommentaryOutcome::Silent;
        };

        let Some(speech) = self.speech.clone() else {
            logger.degraded("no speech synthesizer configured");
            self.composition.enqueue(&file, label);
            return CommentaryOutcome::AudioMissing { comment };
        };

        let audio_name = audio_filename(&file);
        let text = comment.clone();
        let name = audio_name.clone();
        let synthesis = tokio::spawn(async move { speech.synthesize(&text, &name).await });

        self.composition.enqueue(&file, label);

        let audio = match tokio::time::timeout(self.audio_wait, synthesis).await {
            Ok(Ok(Ok(path))) => path,
            Ok(Ok(Err(e))) => {
                logger.degraded(&format!("speech synthesis failed: {}", e));
                return CommentaryOutcome::AudioMissing { comment };
            }
            Ok(Err(e)) => {
                logger.failed(&format!("speech task failed: {}", e));
                return CommentaryOutcome::AudioMissing { comment };
            }
            Err(_) => {
                logger.degraded(&format!("no audio after {:?}", self.audio_wait));
                return CommentaryOutcome::AudioMissing { comment };
            }
        };

        match tokio::fs::read(&audio).await {
            Ok(bytes) => {
                logger.finished(&format!("audio {} ({} bytes)", audio.display(), bytes.len()));
                self.send(ViewerMessage::audio_and_display_sync(comment.clone(), audio_name, bytes));
                CommentaryOutcome::Delivered { comment, audio }
            }
            Err(e) => {
                logger.degraded(&format!("audio file unreadable: {}", e));
                CommentaryOutcome::AudioMissing { comment }
            }
        }
    }

    async fn request_commentary(&self, logger: &MomentLogger, file: &Path) -> Option<String> {
        let generator = self.commentary.as_ref()?;
        match generator.generate(file).await {
            Ok(Some(comment)) => {
                metrics::record_commentary("produced");
                logger.step(&format!("commentary: {}", comment));
                Some(comment)
            }
            Ok(None) => {
                metrics::record_commentary("empty");
                logger.degraded("commentary service returned nothing");
                None
            }
            Err(e) => {
                metrics::record_commentary("failed");
                logger.degraded(&format!("commentary failed: {}", e));
                None
            }
        }
    }

    fn send(&self, message: ViewerMessage) {
        let kind = message.message_type();
        if self.viewer.send(message).is_err() {
            debug!(message = kind, "No viewer attached");
        }
    }
}

/// Audio filename for a capture: same stem, `.wav`.
pub fn audio_filename(capture: &Path) -> String {
    let stem = capture
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "moment".to_string());
    format!("{}.wav", stem)
}
