//! Collaborator interfaces for the EmoCap pipeline.
//!
//! The landmark detector and emotion classifier are supplied by the
//! embedding application through [`LandmarkDetector`] and
//! [`EmotionClassifier`]. The commentary and speech services are remote
//! HTTP calls with ready-made clients.

pub mod commentary;
pub mod error;
pub mod speech;
pub mod traits;

pub use commentary::{CommentaryClient, CommentaryConfig};
pub use error::{MlClientError, MlClientResult};
pub use speech::{SpeechClient, SpeechConfig, VOICE_PREFIX};
pub use traits::{
    Classification, CommentaryGenerator, EmotionClassifier, FaceDetection, LandmarkDetector,
    SpeechSynthesizer,
};
