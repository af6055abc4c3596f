//! Pipeline events and the messages relayed to a remote viewer.
//!
//! Payload shapes only; framing and transport belong to the embedding
//! application.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;

use crate::{CompositionResult, EmotionLabel, IdentityId, OverlayKind};

/// Events raised by the core for the notification layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A moment was captured and persisted.
    CaptureCompleted {
        identity_id: IdentityId,
        label: EmotionLabel,
        score: f64,
        file: PathBuf,
    },

    /// A composition job finished (successfully or not).
    CompositionCompleted {
        success: bool,
        output_path: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        overlay_kind: Option<OverlayKind>,
        label: EmotionLabel,
    },
}

impl PipelineEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::CaptureCompleted { .. } => "capture_completed",
            PipelineEvent::CompositionCompleted { .. } => "composition_completed",
        }
    }
}

impl From<&CompositionResult> for PipelineEvent {
    fn from(result: &CompositionResult) -> Self {
        PipelineEvent::CompositionCompleted {
            success: result.success,
            output_path: result.output_path.clone(),
            overlay_kind: result.overlay_kind,
            label: result.emotion_label,
        }
    }
}

/// Messages delivered to the remote viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerMessage {
    /// A photo was just taken (viewer plays a shutter cue).
    PhotoTaken {
        emotion_label: EmotionLabel,
        emotion_score: f64,
        filename: String,
        timestamp: DateTime<Utc>,
    },

    /// Commentary audio is ready; the viewer plays it and may start the
    /// decorated-image presentation.
    AudioAndDisplaySync {
        comment: String,
        audio_filename: String,
        #[serde(with = "base64_bytes")]
        #[schemars(with = "String")]
        audio_bytes: Vec<u8>,
        start_display: bool,
        timestamp: DateTime<Utc>,
    },

    /// The decorated image is ready for presentation.
    PhotoComposed {
        #[serde(with = "base64_bytes")]
        #[schemars(with = "String")]
        image_bytes: Vec<u8>,
        /// Requested on-screen time in seconds
        display_duration: f64,
        emotion_label: EmotionLabel,
        overlay_kind: OverlayKind,
        timestamp: DateTime<Utc>,
    },
}

impl ViewerMessage {
    pub fn photo_taken(emotion_label: EmotionLabel, emotion_score: f64, filename: impl Into<String>) -> Self {
        ViewerMessage::PhotoTaken {
            emotion_label,
            emotion_score,
            filename: filename.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn audio_and_display_sync(
        comment: impl Into<String>,
        audio_filename: impl Into<String>,
        audio_bytes: Vec<u8>,
    ) -> Self {
        ViewerMessage::AudioAndDisplaySync {
            comment: comment.into(),
            audio_filename: audio_filename.into(),
            audio_bytes,
            start_display: true,
            timestamp: Utc::now(),
        }
    }

    pub fn photo_composed(
        image_bytes: Vec<u8>,
        display_duration: f64,
        emotion_label: EmotionLabel,
        overlay_kind: OverlayKind,
    ) -> Self {
        ViewerMessage::PhotoComposed {
            image_bytes,
            display_duration,
            emotion_label,
            overlay_kind,
            timestamp: Utc::now(),
        }
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            ViewerMessage::PhotoTaken { .. } => "photo_taken",
            ViewerMessage::AudioAndDisplaySync { .. } => "audio_and_display_sync",
            ViewerMessage::PhotoComposed { .. } => "photo_composed",
        }
    }
}

/// Binary payloads travel as standard base64 strings.
mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_event_tagging() {
        let event = PipelineEvent::CaptureCompleted {
            identity_id: IdentityId(7),
            label: EmotionLabel::Happy,
            score: 42.0,
            file: PathBuf::from("pictures/a.jpg"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "capture_completed");
        assert_eq!(json["identity_id"], 7);
        assert_eq!(json["label"], "happy");
    }

    #[test]
    fn test_composition_event_from_result() {
        let result = CompositionResult::failed(PathBuf::from("x.jpg"), EmotionLabel::Sad, "boom");
        let event = PipelineEvent::from(&result);
        match event {
            PipelineEvent::CompositionCompleted { success, overlay_kind, label, .. } => {
                assert!(!success);
                assert!(overlay_kind.is_none());
                assert_eq!(label, EmotionLabel::Sad);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_audio_payload_is_base64() {
        let msg = ViewerMessage::audio_and_display_sync("nice hat", "voice_a.wav", vec![1, 2, 3]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "audio_and_display_sync");
        assert_eq!(json["audio_bytes"], "AQID");
        assert_eq!(json["start_display"], true);

        let back: ViewerMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let json = serde_json::json!({
            "type": "photo_composed",
            "image_bytes": "***",
            "display_duration": 5.0,
            "emotion_label": "happy",
            "overlay_kind": "normal",
            "timestamp": "2024-01-01T00:00:00Z"
        });
        assert!(serde_json::from_value::<ViewerMessage>(json).is_err());
    }
}
