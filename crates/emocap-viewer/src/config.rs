//! Viewer configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::sync::SyncConfig;

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Where received commentary audio is written before playback
    pub audio_dir: PathBuf,
    pub sync: SyncConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            audio_dir: PathBuf::from("received_audio"),
            sync: SyncConfig::default(),
        }
    }
}

impl ViewerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            audio_dir: std::env::var("EMOCAP_VIEWER_AUDIO_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.audio_dir),
            sync: SyncConfig {
                pairing_timeout: std::env::var("EMOCAP_SYNC_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.sync.pairing_timeout),
                default_display: defaults.sync.default_display,
            },
        }
    }
}
