//! Playback clock.
//!
//! [`PlaybackClock`] is the single authoritative mapping between wall-clock
//! time and composition time. It keeps an anchor (a composition position at
//! a specific instant) and derives the current position from it:
//!
//! - playing: `current = anchor_ms + (now - anchor_instant)`
//! - stopped/paused: `current = anchor_ms`
//!
//! Every transition takes the instant it happens at, so the clock is fully
//! deterministic under test.

use std::time::{Duration, Instant};

/// Transport state of the playback clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Wall-clock to composition-time mapping.
#[derive(Clone, Debug)]
pub struct PlaybackClock {
    state: PlaybackState,
    anchor_instant: Instant,
    anchor_ms: f64,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock {
    /// Create a stopped clock at position 0.
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Stopped,
            anchor_instant: Instant::now(),
            anchor_ms: 0.0,
        }
    }

    /// Current transport state.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Whether the clock is running.
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Composition time in milliseconds at `now`.
    pub fn current_time_ms(&self, now: Instant) -> f64 {
        if self.state != PlaybackState::Playing || now <= self.anchor_instant {
            return self.anchor_ms;
        }
        let elapsed = now.duration_since(self.anchor_instant).as_secs_f64() * 1000.0;
        self.anchor_ms + elapsed
    }

    /// Start running from the current position.
    pub fn start(&mut self, now: Instant) {
        if self.state != PlaybackState::Playing {
            self.anchor_instant = now;
            self.state = PlaybackState::Playing;
        }
    }

    /// Freeze at the current position.
    pub fn pause(&mut self, now: Instant) -> f64 {
        self.anchor_ms = self.current_time_ms(now);
        self.anchor_instant = now;
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
        self.anchor_ms
    }

    /// Stop and rewind to 0.
    pub fn stop(&mut self, now: Instant) {
        self.anchor_ms = 0.0;
        self.anchor_instant = now;
        self.state = PlaybackState::Stopped;
    }

    /// Jump to a position, keeping the running state.
    pub fn seek(&mut self, position_ms: f64, now: Instant) {
        self.anchor_ms = position_ms.max(0.0);
        self.anchor_instant = now;
    }

    /// Wall-clock instant at which a composition position is reached.
    ///
    /// Positions already in the past map to `now`. Only meaningful while playing.
    pub fn instant_at(&self, position_ms: f64, now: Instant) -> Instant {
        let ahead = position_ms - self.current_time_ms(now);
        now + millis(ahead)
    }
}

/// Non-negative millisecond offset as a [`Duration`].
fn millis(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_secs_f64(ms / 1000.0)
    } else {
        Duration::ZERO
    }
}
