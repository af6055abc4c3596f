//! Pairs commentary audio with the decorated image.
//!
//! One presentation cycle runs `Idle -> WaitingForPair -> Presenting -> Idle`.
//! Audio and image arrive independently and in either order. An image that
//! arrives after its audio is shown at once; an image that arrives first is
//! held until the audio shows up or the pairing timeout fires, whichever is
//! sooner. Leaving `Presenting` clears the audio flag so the next cycle
//! starts clean.
//!
//! The coordinator never reads the clock itself; callers pass `now`.

use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// How long a pending image waits for its audio
    pub pairing_timeout: Duration,
    /// Used when a message carries an unusable display duration
    pub default_display: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pairing_timeout: Duration::from_secs(10),
            default_display: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    WaitingForPair,
    Presenting,
}

#[derive(Debug, Clone)]
enum SyncState {
    Idle,
    WaitingForPair {
        image: Arc<RgbImage>,
        duration: Duration,
        deadline: Instant,
    },
    Presenting {
        image: Arc<RgbImage>,
        until: Instant,
    },
}

/// What the render loop should show.
#[derive(Debug, Clone)]
pub enum DisplayMode {
    /// The live annotated feed
    Live,
    Special {
        image: Arc<RgbImage>,
        remaining: Duration,
    },
}

impl DisplayMode {
    pub fn is_live(&self) -> bool {
        matches!(self, DisplayMode::Live)
    }
}

/// A state change worth logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTransition {
    /// An image is held until `deadline`.
    Holding { deadline: Instant },
    /// A presentation started. `synchronized` is false when the pairing
    /// timeout fired first.
    Presenting { synchronized: bool, until: Instant },
    /// The presentation ended and the live feed is back.
    Returned,
}

#[derive(Debug)]
pub struct SyncCoordinator {
    config: SyncConfig,
    state: SyncState,
    audio_ready: bool,
}

impl SyncCoordinator {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            state: SyncState::Idle,
            audio_ready: false,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn phase(&self) -> SyncPhase {
        match self.state {
            SyncState::Idle => SyncPhase::Idle,
            SyncState::WaitingForPair { .. } => SyncPhase::WaitingForPair,
            SyncState::Presenting { .. } => SyncPhase::Presenting,
        }
    }

    pub fn is_audio_ready(&self) -> bool {
        self.audio_ready
    }

    /// Convert a requested duration in seconds, falling back to the default
    /// for negative or non-finite values.
    pub fn display_duration(&self, secs: f64) -> Duration {
        Duration::try_from_secs_f64(secs).unwrap_or(self.config.default_display)
    }

    /// Commentary audio has started playing.
    pub fn audio_ready(&mut self, now: Instant) -> Option<SyncTransition> {
        self.audio_ready = true;
        match &self.state {
            SyncState::WaitingForPair { image, duration, .. } => {
                let (image, duration) = (Arc::clone(image), *duration);
                Some(self.present(image, duration, true, now))
            }
            _ => None,
        }
    }

    /// A decorated image arrived. A newer image replaces whatever is held or
    /// on screen.
    pub fn image_ready(&mut self, image: Arc<RgbImage>, duration: Duration, now: Instant) -> SyncTransition {
        if self.audio_ready {
            return self.present(image, duration, true, now);
        }
        let deadline = now + self.config.pairing_timeout;
        self.state = SyncState::WaitingForPair {
            image,
            duration,
            deadline,
        };
        SyncTransition::Holding { deadline }
    }

    /// Fire whatever deadlines have passed by `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<SyncTransition> {
        let mut transitions = Vec::new();
        if let SyncState::WaitingForPair {
            image,
            duration,
            deadline,
        } = &self.state
        {
            if now >= *deadline {
                let (image, duration, deadline) = (Arc::clone(image), *duration, *deadline);
                // Measure from the deadline so a late tick does not stretch the display.
                transitions.push(self.present(image, duration, false, deadline));
            }
        }
        if let SyncState::Presenting { until, .. } = self.state {
            if now >= until {
                self.state = SyncState::Idle;
                self.audio_ready = false;
                transitions.push(SyncTransition::Returned);
            }
        }
        transitions
    }

    /// The next instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            SyncState::Idle => None,
            SyncState::WaitingForPair { deadline, .. } => Some(deadline),
            SyncState::Presenting { until, .. } => Some(until),
        }
    }

    pub fn display_mode(&self, now: Instant) -> DisplayMode {
        match &self.state {
            SyncState::Presenting { image, until } if now < *until => DisplayMode::Special {
                image: Arc::clone(image),
                remaining: until.saturating_duration_since(now),
            },
            _ => DisplayMode::Live,
        }
    }

    /// Drop any held or presented image and the audio flag.
    pub fn reset(&mut self) {
        self.state = SyncState::Idle;
        self.audio_ready = false;
    }

    fn present(&mut self, image: Arc<RgbImage>, duration: Duration, synchronized: bool, now: Instant) -> SyncTransition {
        let until = now + duration;
        self.state = SyncState::Presenting { image, until };
        SyncTransition::Presenting { synchronized, until }
    }
}

impl Default for SyncCoordinator {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}
