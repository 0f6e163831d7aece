//! Sound output collaborators.
//!
//! The scheduler never produces audio itself. It asks a [`VoiceFactory`]
//! for one [`Voice`] per instrument slot and hands each note to it with an
//! absolute start time on the factory's audio clock.

use crate::banks::{bank_or_default, Instrument, InstrumentBank};
use std::time::Instant;

/// A sound-producing unit for one instrument slot.
pub trait Voice: Send {
    /// Schedule a note. `at_time` is on the owning factory's audio clock, in seconds.
    fn start(&mut self, pitch: u8, velocity: u8, duration_secs: f64, at_time: f64);

    /// Silence everything this voice is sounding or has been asked to sound.
    fn stop(&mut self);
}

/// Source of voices and of the audio clock they are scheduled against.
pub trait VoiceFactory: Send {
    /// Current audio clock time in seconds.
    fn current_time(&self) -> f64;

    /// Create the voice for an instrument slot, or `None` when it is not available.
    fn create_voice(&mut self, instrument: u8) -> Option<Box<dyn Voice>>;

    /// Switch the palette used by subsequently created voices.
    fn select_bank(&mut self, _bank: &str) {}
}

/// Voice factory that only logs what would be played.
///
/// Useful for dry runs and when no audio device is available.
pub struct LoggingVoiceFactory {
    epoch: Instant,
    bank: &'static InstrumentBank,
}

impl Default for LoggingVoiceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingVoiceFactory {
    /// Create a factory whose audio clock starts now, using the default bank.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            bank: bank_or_default(None),
        }
    }

    /// Bank the next voices will be named after.
    pub fn bank(&self) -> &'static InstrumentBank {
        self.bank
    }
}

impl VoiceFactory for LoggingVoiceFactory {
    fn current_time(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn create_voice(&mut self, instrument: u8) -> Option<Box<dyn Voice>> {
        let entry = self.bank.instrument(instrument);
        log::debug!("voice {} ready: {}/{}", instrument, self.bank.id, entry.name);
        Some(Box::new(LoggingVoice {
            slot: instrument,
            instrument: entry,
            started: 0,
        }))
    }

    fn select_bank(&mut self, bank: &str) {
        self.bank = bank_or_default(Some(bank));
        if self.bank.id != bank {
            log::warn!("Unknown bank '{}', using '{}'", bank, self.bank.id);
        }
    }
}

/// Voice that logs note starts instead of sounding them.
pub struct LoggingVoice {
    slot: u8,
    instrument: &'static Instrument,
    started: usize,
}

impl LoggingVoice {
    /// Notes started since the last stop.
    pub fn started(&self) -> usize {
        self.started
    }
}

impl Voice for LoggingVoice {
    fn start(&mut self, pitch: u8, velocity: u8, duration_secs: f64, at_time: f64) {
        self.started += 1;
        if !self.instrument.in_range(pitch) {
            log::debug!(
                "pitch {} outside {} range {}-{}",
                pitch,
                self.instrument.name,
                self.instrument.low,
                self.instrument.high
            );
        }
        log::debug!(
            "♪ {} (i={}) pitch={} vel={} dur={:.3}s at={:.3}s",
            self.instrument.name,
            self.slot,
            pitch,
            velocity,
            duration_secs,
            at_time
        );
    }

    fn stop(&mut self) {
        if self.started > 0 {
            log::debug!("■ {} (i={}) silenced", self.instrument.name, self.slot);
        }
        self.started = 0;
    }
}
