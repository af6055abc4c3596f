//! Structured moment logging utilities.
//!
//! One captured moment travels through capture, commentary and composition
//! on different tasks. [`MomentLogger`] keeps its log lines and spans
//! consistent so they can be correlated by capture stem.

use std::path::Path;

use emocap_models::EmotionLabel;
use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber: JSON when `LOG_FORMAT=json`, coloured
/// human output otherwise.
pub fn init_tracing(directives: &[&str]) {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse() {
            Ok(d) => env_filter = env_filter.add_directive(d),
            Err(e) => eprintln!("Ignoring log directive {}: {}", directive, e),
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Which leg of a moment's lifecycle is logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MomentStage {
    Capture,
    Commentary,
    Composition,
}

impl MomentStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MomentStage::Capture => "capture",
            MomentStage::Commentary => "commentary",
            MomentStage::Composition => "composition",
        }
    }
}

impl std::fmt::Display for MomentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logger for one captured moment. Every line carries the capture stem
/// (which embeds the sequence number), the emotion and the stage.
#[derive(Debug, Clone)]
pub struct MomentLogger {
    moment: String,
    label: EmotionLabel,
    stage: MomentStage,
    score: Option<f64>,
}

impl MomentLogger {
    pub fn new(moment: impl Into<String>, label: EmotionLabel, stage: MomentStage) -> Self {
        Self {
            moment: moment.into(),
            label,
            stage,
            score: None,
        }
    }

    /// Key the logger by the capture file stem.
    pub fn for_capture(path: &Path, label: EmotionLabel, stage: MomentStage) -> Self {
        let moment = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(moment, label, stage)
    }

    /// Attach the score that triggered the capture.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn started(&self, message: &str) {
        info!(moment = %self.moment, label = %self.label, stage = %self.stage, "Moment {} started: {}", self.stage, message);
    }

    pub fn step(&self, message: &str) {
        info!(moment = %self.moment, label = %self.label, stage = %self.stage, "{}", message);
    }

    /// The moment continues without this part.
    pub fn degraded(&self, message: &str) {
        warn!(moment = %self.moment, label = %self.label, stage = %self.stage, "Moment degraded: {}", message);
    }

    pub fn failed(&self, message: &str) {
        error!(moment = %self.moment, label = %self.label, stage = %self.stage, "Moment {} failed: {}", self.stage, message);
    }

    pub fn finished(&self, message: &str) {
        info!(moment = %self.moment, label = %self.label, stage = %self.stage, "Moment {} finished: {}", self.stage, message);
    }

    pub fn moment(&self) -> &str {
        &self.moment
    }

    pub fn label(&self) -> EmotionLabel {
        self.label
    }

    pub fn stage(&self) -> MomentStage {
        self.stage
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    /// Span to instrument the stage's async work with.
    pub fn create_span(&self) -> Span {
        let span = tracing::info_span!(
            "moment",
            moment = %self.moment,
            label = %self.label,
            stage = %self.stage,
            score = tracing::field::Empty
        );
        if let Some(score) = self.score {
            span.record("score", score);
        }
        span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_logger_keyed_by_capture_stem() {
        let path = PathBuf::from("pictures/happy_moment_20240101_120000_0001_80pct.jpg");
        let logger = MomentLogger::for_capture(&path, EmotionLabel::Happy, MomentStage::Commentary).with_score(80.4);
        assert_eq!(logger.moment(), "happy_moment_20240101_120000_0001_80pct");
        assert_eq!(logger.label(), EmotionLabel::Happy);
        assert_eq!(logger.stage(), MomentStage::Commentary);
        assert_eq!(logger.score(), Some(80.4));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(MomentStage::Capture.to_string(), "capture");
        assert_eq!(MomentStage::Composition.as_str(), "composition");
    }

    #[test]
    fn test_logging_methods() {
        let logger = MomentLogger::new("sad_moment_0002", EmotionLabel::Sad, MomentStage::Composition);
        logger.started("queued 3 ms");
        logger.step("overlay chosen");
        logger.degraded("no audio");
        logger.failed("write failed");
        logger.finished("done");
        let _guard = logger.create_span().entered();
    }
}
