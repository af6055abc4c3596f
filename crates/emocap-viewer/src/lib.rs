//! Viewer side of the EmoCap moment pipeline.
//!
//! The viewer receives [`ViewerMessage`](emocap_models::ViewerMessage)s from
//! the worker and presents each composed image together with its commentary
//! audio:
//! - [`SyncCoordinator`]: the pairing state machine
//! - [`ViewerDriver`]: runs the coordinator against an inbound message stream
//! - [`AudioSink`]: local playback, after the audio is saved to disk

pub mod config;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod sync;

pub use config::ViewerConfig;
pub use driver::{decode_image, persist_audio, AudioSink, SilentSink, ViewerDriver, ViewerHandle};
pub use error::{ViewerError, ViewerResult};
pub use sync::{DisplayMode, SyncConfig, SyncCoordinator, SyncPhase, SyncTransition};
