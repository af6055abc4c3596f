//! Moment pipeline orchestration.
//!
//! This crate provides:
//! - Rate-limited, single-flight emotion analysis dispatch
//! - Interval-gated moment capture with priority selection
//! - A single-consumer composition queue
//! - Commentary, speech and viewer notification
//! - Cache and artifact governors
//! - Graceful shutdown

pub mod analysis;
pub mod artifacts;
pub mod capture;
pub mod commentary;
pub mod composition;
pub mod config;
pub mod error;
pub mod governor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod relay;
pub mod state;

pub use analysis::AnalysisScheduler;
pub use artifacts::{ArtifactDir, ArtifactGovernor, ArtifactStats, DirectoryStats, PruneReport};
pub use capture::{CaptureConfig, CaptureIndicator, CaptureScheduler, CaptureTask, CAPTURE_PRIORITY};
pub use commentary::{CommentaryOutcome, CommentaryWorkflow};
pub use composition::{CompositionHandle, CompositionWorker};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use governor::{CacheGovernor, CacheLimits, CacheStats, SweepReport};
pub use logging::{init_tracing, MomentLogger, MomentStage};
pub use pipeline::{AnnotatedFrame, Collaborators, MomentPipeline};
pub use relay::NotificationRelay;
pub use state::PipelineState;
