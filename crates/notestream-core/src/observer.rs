//! Visual observer interface.
//!
//! Ordering contract for one armed note: `set_active(note, true)` is always
//! delivered before `set_active(note, false)`. Timed signals are delivered
//! only from [`PlaybackScheduler::tick`](crate::scheduler::PlaybackScheduler::tick);
//! pause, stop, seek and loop wraps switch off active notes synchronously
//! at the end of the call. The observer is owned by the scheduler and holds
//! no reference back to it, so it can never be re-entered.

use crate::note::NoteEvent;
use crate::timing::PlaybackState;

/// Receiver of note and transport notifications.
pub trait PlaybackObserver: Send {
    /// A new, distinct note was admitted.
    fn on_note_added(&mut self, _note: &NoteEvent) {}

    /// A note became audible (`true`) or finished (`false`).
    fn set_active(&mut self, _note: &NoteEvent, _active: bool) {}

    /// The transport changed state.
    fn on_play_state_changed(&mut self, _state: PlaybackState) {}

    /// All notes were discarded.
    fn on_cleared(&mut self) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NullObserver;

impl PlaybackObserver for NullObserver {}

/// Observer that logs note activity, standing in for a piano-roll view.
#[derive(Debug, Default)]
pub struct LoggingObserver {
    active: usize,
}

impl PlaybackObserver for LoggingObserver {
    fn on_note_added(&mut self, note: &NoteEvent) {
        log::trace!("note added: {:?}", note);
    }

    fn set_active(&mut self, note: &NoteEvent, active: bool) {
        if active {
            self.active += 1;
        } else {
            self.active = self.active.saturating_sub(1);
        }
        log::trace!(
            "{} t={} n={} i={} ({} sounding)",
            if active { "on " } else { "off" },
            note.start_ms,
            note.pitch,
            note.instrument,
            self.active
        );
    }

    fn on_play_state_changed(&mut self, state: PlaybackState) {
        log::info!("playback {:?}", state);
    }

    fn on_cleared(&mut self) {
        self.active = 0;
    }
}
