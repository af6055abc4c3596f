//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use emocap_vision::{TrackerConfig, TuningConfig, TuningPreset};
use tracing::warn;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Minimum time between two capture evaluations
    pub capture_interval: Duration,
    /// How long the "just captured" highlight stays up
    pub capture_indicator: Duration,
    /// Captured and composed images
    pub capture_dir: PathBuf,
    /// Synthesized commentary audio
    pub audio_dir: PathBuf,
    /// Overlay assets (`<sources_dir>/special` holds the full-bleed ones)
    pub sources_dir: PathBuf,
    /// JPEG quality for captured crops
    pub capture_quality: u8,
    /// Padding around the face box for classifier crops
    pub face_padding: i32,
    pub similarity_threshold: f64,
    pub position_threshold: f64,
    /// Per-identity gap between classifier dispatches
    pub analysis_interval: Duration,
    /// Concurrent classifier calls across all identities
    pub max_concurrent_classifications: usize,
    pub identity_ttl: Duration,
    pub identity_cap: usize,
    pub cache_sweep_interval: Duration,
    pub artifact_max_age: Duration,
    pub artifact_max_files: usize,
    pub artifact_sweep_interval: Duration,
    /// How long to wait for commentary audio before giving up on it
    pub commentary_wait: Duration,
    /// Bounded join on shutdown
    pub shutdown_timeout: Duration,
    /// Seconds the viewer shows a composed image
    pub display_duration: f64,
    /// Optional JSON tuning profile
    pub tuning_profile: Option<PathBuf>,
    pub tuning_preset: Option<TuningPreset>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_secs(20),
            capture_indicator: Duration::from_secs(3),
            capture_dir: PathBuf::from("pictures"),
            audio_dir: PathBuf::from("output_voice"),
            sources_dir: PathBuf::from("sources"),
            capture_quality: 95,
            face_padding: 10,
            similarity_threshold: 0.85,
            position_threshold: 100.0,
            analysis_interval: Duration::from_millis(300),
            max_concurrent_classifications: 4,
            identity_ttl: Duration::from_secs(300),
            identity_cap: 50,
            cache_sweep_interval: Duration::from_secs(60),
            artifact_max_age: Duration::from_secs(24 * 3600),
            artifact_max_files: 100,
            artifact_sweep_interval: Duration::from_secs(30 * 60),
            commentary_wait: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(2),
            display_duration: 5.0,
            tuning_profile: None,
            tuning_preset: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |key: &str, fallback: Duration| {
            env_parse::<u64>(key).map(Duration::from_secs).unwrap_or(fallback)
        };

        let tuning_preset = std::env::var("EMOCAP_TUNING_PRESET").ok().and_then(|name| {
            name.parse()
                .map_err(|e| warn!("Ignoring EMOCAP_TUNING_PRESET: {}", e))
                .ok()
        });

        Self {
            capture_interval: secs("EMOCAP_CAPTURE_INTERVAL_SECS", defaults.capture_interval),
            capture_indicator: defaults.capture_indicator,
            capture_dir: std::env::var("EMOCAP_CAPTURE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.capture_dir),
            audio_dir: std::env::var("EMOCAP_AUDIO_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.audio_dir),
            sources_dir: std::env::var("EMOCAP_SOURCES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.sources_dir),
            capture_quality: env_parse("EMOCAP_CAPTURE_QUALITY").unwrap_or(defaults.capture_quality),
            face_padding: env_parse("EMOCAP_FACE_PADDING").unwrap_or(defaults.face_padding),
            similarity_threshold: env_parse("EMOCAP_SIMILARITY_THRESHOLD")
                .unwrap_or(defaults.similarity_threshold),
            position_threshold: env_parse("EMOCAP_POSITION_THRESHOLD")
                .unwrap_or(defaults.position_threshold),
            analysis_interval: env_parse::<u64>("EMOCAP_ANALYSIS_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.analysis_interval),
            max_concurrent_classifications: env_parse("EMOCAP_MAX_CLASSIFICATIONS")
                .unwrap_or(defaults.max_concurrent_classifications),
            identity_ttl: secs("EMOCAP_IDENTITY_TTL_SECS", defaults.identity_ttl),
            identity_cap: env_parse("EMOCAP_IDENTITY_CAP").unwrap_or(defaults.identity_cap),
            cache_sweep_interval: secs("EMOCAP_CACHE_SWEEP_SECS", defaults.cache_sweep_interval),
            artifact_max_age: env_parse::<u64>("EMOCAP_ARTIFACT_MAX_AGE_HOURS")
                .map(|h| Duration::from_secs(h * 3600))
                .unwrap_or(defaults.artifact_max_age),
            artifact_max_files: env_parse("EMOCAP_ARTIFACT_MAX_FILES")
                .unwrap_or(defaults.artifact_max_files),
            artifact_sweep_interval: env_parse::<u64>("EMOCAP_ARTIFACT_SWEEP_MINS")
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.artifact_sweep_interval),
            commentary_wait: secs("EMOCAP_COMMENTARY_WAIT_SECS", defaults.commentary_wait),
            shutdown_timeout: secs("EMOCAP_SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout),
            display_duration: env_parse("EMOCAP_DISPLAY_DURATION_SECS")
                .unwrap_or(defaults.display_duration),
            tuning_profile: std::env::var("EMOCAP_TUNING_PROFILE").ok().map(PathBuf::from),
            tuning_preset,
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            similarity_threshold: self.similarity_threshold,
            position_threshold: self.position_threshold,
            ..TrackerConfig::default()
        }
    }

    /// Resolve the tuning profile, then the preset on top of it.
    pub fn tuning(&self) -> TuningConfig {
        let mut tuning = match &self.tuning_profile {
            Some(path) => TuningConfig::load(path),
            None => TuningConfig::default(),
        };
        if let Some(preset) = self.tuning_preset {
            tuning.apply_preset(preset);
        }
        tuning
    }

    /// Special overlays live under the sources directory.
    pub fn special_dir(&self) -> PathBuf {
        self.sources_dir.join("special")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.capture_interval, Duration::from_secs(20));
        assert_eq!(config.identity_ttl, Duration::from_secs(300));
        assert_eq!(config.identity_cap, 50);
        assert_eq!(config.artifact_max_files, 100);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(config.special_dir(), PathBuf::from("sources/special"));
    }

    #[test]
    fn test_tracker_config_follows_thresholds() {
        let config = WorkerConfig {
            similarity_threshold: 0.9,
            position_threshold: 40.0,
            ..WorkerConfig::default()
        };
        let tracker = config.tracker_config();
        assert_eq!(tracker.similarity_threshold, 0.9);
        assert_eq!(tracker.position_threshold, 40.0);
    }

    #[test]
    fn test_missing_profile_falls_back_to_defaults() {
        let config = WorkerConfig {
            tuning_profile: Some(PathBuf::from("/nonexistent/tuning.json")),
            ..WorkerConfig::default()
        };
        assert_eq!(config.tuning(), TuningConfig::default());
    }
}
