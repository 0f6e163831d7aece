//! Playback scheduler with progressive note admission.
//!
//! The scheduler owns the [`PlaybackClock`], the set of known notes and every
//! pending trigger. Notes can be admitted while playback is already running;
//! each one is armed relative to the clock the moment it arrives.
//!
//! Audio is handed to the voices immediately with an absolute start time on
//! the audio clock. Visual start/end signals are queued by wall-clock instant
//! and delivered from [`tick`](PlaybackScheduler::tick), which also performs
//! end-of-playback detection and loop wrapping once the position reaches the
//! total duration.
//!
//! Each generation stream is opened with
//! [`begin_stream`](PlaybackScheduler::begin_stream) and closed with
//! [`finalize`](PlaybackScheduler::finalize). Playback never ends on its own
//! while a stream is open.
//!
//! Every operation mutates all of its state within the call, so a tick that
//! follows a pause or seek only ever observes the finished transition.

use crate::note::{NoteEvent, NoteKey, INSTRUMENT_COUNT};
use crate::observer::{NullObserver, PlaybackObserver};
use crate::timing::{PlaybackClock, PlaybackState};
use crate::voice::{Voice, VoiceFactory};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

/// Outcome of [`PlaybackScheduler::admit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// A note with the same identity is already known.
    Duplicate,
    /// Known, waiting for playback to start.
    Queued,
    /// Armed against the running clock.
    Armed,
    /// Known, but its whole interval already lies in the past.
    Late,
    /// First note of a stream with auto-play enabled; playback started.
    Started,
}

/// Pending or sounding note, owned while its playback window is open.
#[derive(Clone, Copy, Debug)]
struct ScheduledVoiceHandle {
    ends_at: Instant,
}

#[derive(Clone, Copy, Debug)]
struct VisualSignal {
    note: NoteEvent,
    active: bool,
}

/// Authoritative playback scheduler for one composition.
pub struct PlaybackScheduler {
    clock: PlaybackClock,
    /// Known notes in admission order.
    notes: Vec<NoteEvent>,
    known: HashSet<NoteKey>,
    total_ms: u64,
    handles: HashMap<NoteKey, ScheduledVoiceHandle>,
    /// Pending visual signals keyed by due instant and insertion sequence.
    signals: BTreeMap<(Instant, u64), VisualSignal>,
    signal_seq: u64,
    /// Notes whose visual start has been delivered but not their end.
    active: HashMap<NoteKey, NoteEvent>,
    factory: Option<Box<dyn VoiceFactory>>,
    voices: HashMap<u8, Box<dyn Voice>>,
    voices_acquired: bool,
    observer: Box<dyn PlaybackObserver>,
    looping: bool,
    auto_play: bool,
    finalized: bool,
    /// Auto-play may still start playback for the current stream.
    auto_start_pending: bool,
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackScheduler {
    /// Create a stopped, silent scheduler with auto-play enabled.
    pub fn new() -> Self {
        Self {
            clock: PlaybackClock::new(),
            notes: Vec::new(),
            known: HashSet::new(),
            total_ms: 0,
            handles: HashMap::new(),
            signals: BTreeMap::new(),
            signal_seq: 0,
            active: HashMap::new(),
            factory: None,
            voices: HashMap::new(),
            voices_acquired: false,
            observer: Box::new(NullObserver),
            looping: false,
            auto_play: true,
            finalized: false,
            auto_start_pending: true,
        }
    }

    /// Use this voice factory for sound output.
    pub fn with_voice_factory(mut self, factory: Box<dyn VoiceFactory>) -> Self {
        self.set_voice_factory(factory);
        self
    }

    /// Report note and transport activity to this observer.
    pub fn with_observer(mut self, observer: Box<dyn PlaybackObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the voice factory. Cached voices are released.
    pub fn set_voice_factory(&mut self, factory: Box<dyn VoiceFactory>) {
        self.release_voices();
        self.factory = Some(factory);
    }

    /// Enable or disable starting playback on the first admitted note.
    pub fn set_auto_play(&mut self, enabled: bool) {
        self.auto_play = enabled;
    }

    pub fn auto_play(&self) -> bool {
        self.auto_play
    }

    /// Enable or disable wrapping back to 0 at the end.
    pub fn set_loop(&mut self, enabled: bool) {
        self.looping = enabled;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn state(&self) -> PlaybackState {
        self.clock.state()
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    /// Composition time in milliseconds at `now`.
    pub fn current_time_ms(&self, now: Instant) -> f64 {
        self.clock.current_time_ms(now)
    }

    /// Latest note end over all known notes.
    pub fn total_duration_ms(&self) -> u64 {
        self.total_ms
    }

    /// Known notes in admission order.
    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    /// Number of notes with an open playback window.
    pub fn armed_count(&self) -> usize {
        self.handles.len()
    }

    /// Number of notes currently shown as active.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Whether the stream feeding this scheduler has completed.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Whether the next admitted note (or finalize) may auto-start playback.
    pub fn auto_start_pending(&self) -> bool {
        self.auto_start_pending
    }

    /// Accept a note into the known set, arming it if playback is running.
    pub fn admit(&mut self, note: NoteEvent, now: Instant) -> Admission {
        if !self.known.insert(note.key()) {
            return Admission::Duplicate;
        }
        self.notes.push(note);
        self.total_ms = self.total_ms.max(note.end_ms());
        self.observer.on_note_added(&note);

        if self.clock.is_playing() {
            if self.arm(note, now) {
                Admission::Armed
            } else {
                log::trace!(
                    "late note {:?} at {:.0}ms not armed",
                    note.key(),
                    self.clock.current_time_ms(now)
                );
                Admission::Late
            }
        } else if self.auto_play && self.auto_start_pending {
            self.play(now);
            Admission::Started
        } else {
            Admission::Queued
        }
    }

    /// Start or resume playback from the current position.
    ///
    /// Every note that is not entirely in the past is armed; a note already
    /// in progress sounds for the rest of its duration.
    pub fn play(&mut self, now: Instant) {
        if self.clock.is_playing() {
            return;
        }
        self.acquire_voices();
        self.clock.start(now);
        self.auto_start_pending = false;

        let current = self.clock.current_time_ms(now);
        let armed = self.arm_all(now, None);
        log::debug!("play from {:.0}ms, {} notes armed", current, armed);
        self.observer.on_play_state_changed(PlaybackState::Playing);
    }

    /// Freeze playback at the current position.
    pub fn pause(&mut self, now: Instant) {
        if !self.clock.is_playing() {
            return;
        }
        let position = self.clock.pause(now);
        self.disarm();
        log::debug!("paused at {:.0}ms", position);
        self.observer.on_play_state_changed(PlaybackState::Paused);
    }

    /// Stop playback and rewind to 0.
    pub fn stop(&mut self, now: Instant) {
        let previous = self.clock.state();
        self.disarm();
        self.clock.stop(now);
        if previous != PlaybackState::Stopped {
            log::debug!("stopped");
            self.observer.on_play_state_changed(PlaybackState::Stopped);
        }
    }

    /// Jump to `position_ms`, keeping the transport state.
    ///
    /// Notes already in progress at the seek point are not resumed mid-note;
    /// only notes starting at or after it are re-armed.
    pub fn seek(&mut self, position_ms: f64, now: Instant) {
        let target = position_ms.max(0.0);
        self.disarm();
        self.clock.seek(target, now);
        if self.clock.is_playing() {
            let armed = self.arm_all(now, Some(target));
            log::debug!("seek to {:.0}ms, {} notes re-armed", target, armed);
        }
    }

    /// Open a new generation stream on top of the known notes.
    ///
    /// Playback no longer ends at the current total duration until the
    /// stream is finalized. A stopped scheduler auto-starts again on the
    /// stream's first note; a paused one stays paused.
    pub fn begin_stream(&mut self) {
        self.finalized = false;
        self.auto_start_pending = self.clock.state() == PlaybackState::Stopped;
    }

    /// Mark the stream as complete.
    ///
    /// Starts playback when auto-play is on and nothing has played during
    /// the stream.
    pub fn finalize(&mut self, now: Instant) {
        self.finalized = true;
        if self.auto_play && self.auto_start_pending && !self.notes.is_empty() {
            self.play(now);
        }
    }

    /// Discard every note and rewind. Voices stay cached.
    pub fn clear(&mut self) {
        let previous = self.clock.state();
        self.disarm();
        self.notes.clear();
        self.known.clear();
        self.total_ms = 0;
        self.clock = PlaybackClock::new();
        self.finalized = false;
        self.auto_start_pending = true;
        self.observer.on_cleared();
        if previous != PlaybackState::Stopped {
            self.observer.on_play_state_changed(PlaybackState::Stopped);
        }
    }

    /// Switch instrument palette; cached voices are replaced.
    pub fn select_bank(&mut self, bank: &str, now: Instant) {
        let playing = self.clock.is_playing();
        self.disarm();
        self.release_voices();
        if let Some(factory) = self.factory.as_mut() {
            factory.select_bank(bank);
        }
        if playing {
            self.acquire_voices();
            let current = self.clock.current_time_ms(now);
            self.arm_all(now, Some(current));
        }
    }

    /// Periodic callback: delivers due visual signals, releases finished
    /// handles and handles the end of the composition.
    pub fn tick(&mut self, now: Instant) {
        while let Some(entry) = self.signals.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let signal = entry.remove();
            self.deliver(signal);
        }
        self.handles.retain(|_, handle| handle.ends_at > now);

        if !self.clock.is_playing() || self.total_ms == 0 {
            return;
        }
        let current = self.clock.current_time_ms(now);
        if current < self.total_ms as f64 {
            return;
        }
        if self.looping {
            self.disarm();
            self.clock.seek(0.0, now);
            let armed = self.arm_all(now, None);
            log::debug!("loop wrap at {:.0}ms, {} notes re-armed", current, armed);
        } else if self.finalized {
            log::info!("playback finished at {:.0}ms", current);
            self.stop(now);
        }
    }

    fn deliver(&mut self, signal: VisualSignal) {
        let key = signal.note.key();
        if signal.active {
            self.active.insert(key, signal.note);
            self.observer.set_active(&signal.note, true);
        } else if self.active.remove(&key).is_some() {
            self.observer.set_active(&signal.note, false);
        }
    }

    fn arm_all(&mut self, now: Instant, from_ms: Option<f64>) -> usize {
        let mut armed = 0;
        for index in 0..self.notes.len() {
            let note = self.notes[index];
            if from_ms.is_some_and(|from| (note.start_ms as f64) < from) {
                continue;
            }
            if self.arm(note, now) {
                armed += 1;
            }
        }
        armed
    }

    /// Arm one note against the running clock. Returns false when it is
    /// entirely past.
    fn arm(&mut self, note: NoteEvent, now: Instant) -> bool {
        let delay = note.start_ms as f64 - self.clock.current_time_ms(now);
        let duration = note.duration_ms as f64;
        if delay <= -duration {
            return false;
        }
        let lead = delay.max(0.0);
        // Time left to sound when starting mid-note.
        let remaining = duration + delay.min(0.0);

        if let Some(at_time) = self
            .factory
            .as_ref()
            .map(|factory| factory.current_time() + lead / 1000.0)
        {
            let slot = if self.voices.contains_key(&note.instrument) {
                note.instrument
            } else {
                0
            };
            match self.voices.get_mut(&slot) {
                Some(voice) => voice.start(note.pitch, note.velocity, remaining / 1000.0, at_time),
                None => log::trace!("no voice for instrument {}, note is silent", note.instrument),
            }
        }

        let starts_at = self.clock.instant_at(note.start_ms as f64, now);
        let ends_at = self.clock.instant_at(note.end_ms() as f64, now);
        self.push_signal(starts_at, note, true);
        self.push_signal(ends_at, note, false);
        self.handles.insert(note.key(), ScheduledVoiceHandle { ends_at });
        true
    }

    fn push_signal(&mut self, at: Instant, note: NoteEvent, active: bool) {
        self.signal_seq += 1;
        self.signals
            .insert((at, self.signal_seq), VisualSignal { note, active });
    }

    /// Drop every pending trigger, silence voices and switch off active notes.
    fn disarm(&mut self) {
        self.handles.clear();
        self.signals.clear();
        for voice in self.voices.values_mut() {
            voice.stop();
        }
        let mut active: Vec<NoteEvent> = self.active.drain().map(|(_, note)| note).collect();
        active.sort_by_key(NoteEvent::key);
        for note in &active {
            self.observer.set_active(note, false);
        }
    }

    fn acquire_voices(&mut self) {
        if self.voices_acquired {
            return;
        }
        let Some(factory) = self.factory.as_mut() else {
            return;
        };
        for instrument in 0..INSTRUMENT_COUNT {
            if let Some(voice) = factory.create_voice(instrument) {
                self.voices.insert(instrument, voice);
            }
        }
        self.voices_acquired = true;
        if self.voices.is_empty() {
            log::warn!("No voices available, playback will be silent");
        }
    }

    fn release_voices(&mut self) {
        for voice in self.voices.values_mut() {
            voice.stop();
        }
        self.voices.clear();
        self.voices_acquired = false;
    }
}

impl std::fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("state", &self.clock.state())
            .field("notes", &self.notes.len())
            .field("armed", &self.handles.len())
            .field("looping", &self.looping)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const AUDIO_NOW: f64 = 10.0;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Start {
            instrument: u8,
            pitch: u8,
            duration_secs: f64,
            at_time: f64,
        },
        Stop(u8),
    }

    struct FakeVoice {
        instrument: u8,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl Voice for FakeVoice {
        fn start(&mut self, pitch: u8, _velocity: u8, duration_secs: f64, at_time: f64) {
            self.calls.lock().unwrap().push(Call::Start {
                instrument: self.instrument,
                pitch,
                duration_secs,
                at_time,
            });
        }

        fn stop(&mut self) {
            self.calls.lock().unwrap().push(Call::Stop(self.instrument));
        }
    }

    struct FakeFactory {
        available: Vec<u8>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl VoiceFactory for FakeFactory {
        fn current_time(&self) -> f64 {
            AUDIO_NOW
        }

        fn create_voice(&mut self, instrument: u8) -> Option<Box<dyn Voice>> {
            self.available.contains(&instrument).then(|| {
                Box::new(FakeVoice {
                    instrument,
                    calls: self.calls.clone(),
                }) as Box<dyn Voice>
            })
        }
    }

    #[derive(Default)]
    struct Recorded {
        added: usize,
        signals: Vec<(u8, bool)>,
        states: Vec<PlaybackState>,
    }

    struct FakeObserver(Arc<Mutex<Recorded>>);

    impl PlaybackObserver for FakeObserver {
        fn on_note_added(&mut self, _note: &NoteEvent) {
            self.0.lock().unwrap().added += 1;
        }

        fn set_active(&mut self, note: &NoteEvent, active: bool) {
            self.0.lock().unwrap().signals.push((note.pitch, active));
        }

        fn on_play_state_changed(&mut self, state: PlaybackState) {
            self.0.lock().unwrap().states.push(state);
        }
    }

    struct Harness {
        scheduler: PlaybackScheduler,
        calls: Arc<Mutex<Vec<Call>>>,
        recorded: Arc<Mutex<Recorded>>,
    }

    impl Harness {
        fn new(available: &[u8]) -> Self {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let recorded = Arc::new(Mutex::new(Recorded::default()));
            let scheduler = PlaybackScheduler::new()
                .with_voice_factory(Box::new(FakeFactory {
                    available: available.to_vec(),
                    calls: calls.clone(),
                }))
                .with_observer(Box::new(FakeObserver(recorded.clone())));
            Self {
                scheduler,
                calls,
                recorded,
            }
        }

        fn starts(&self) -> Vec<(u8, u8, f64)> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|call| match call {
                    Call::Start {
                        instrument,
                        pitch,
                        at_time,
                        ..
                    } => Some((*instrument, *pitch, *at_time)),
                    Call::Stop(_) => None,
                })
                .collect()
        }

        fn durations(&self) -> Vec<(u8, f64)> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|call| match call {
                    Call::Start {
                        pitch,
                        duration_secs,
                        ..
                    } => Some((*pitch, *duration_secs)),
                    Call::Stop(_) => None,
                })
                .collect()
        }

        fn clear_calls(&self) {
            self.calls.lock().unwrap().clear();
        }
    }

    fn note(start_ms: u32, pitch: u8, duration_ms: u32) -> NoteEvent {
        NoteEvent::new(start_ms, pitch, 90, duration_ms, 0).unwrap()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_first_note_auto_starts_and_dedups() {
        let mut h = Harness::new(&[0]);
        let t0 = Instant::now();
        assert_eq!(h.scheduler.admit(note(0, 60, 500), t0), Admission::Started);
        assert!(h.scheduler.is_playing());
        assert_eq!(h.scheduler.admit(note(0, 60, 500), t0), Admission::Duplicate);
        assert_eq!(h.scheduler.admit(note(250, 64, 500), t0), Admission::Armed);
        assert_eq!(h.scheduler.total_duration_ms(), 750);
        assert_eq!(h.recorded.lock().unwrap().added, 2);
        assert_eq!(h.starts(), vec![(0, 60, AUDIO_NOW), (0, 64, AUDIO_NOW + 0.25)]);
    }

    #[test]
    fn test_without_auto_play_notes_queue() {
        let mut h = Harness::new(&[0]);
        h.scheduler.set_auto_play(false);
        let t0 = Instant::now();
        assert_eq!(h.scheduler.admit(note(0, 60, 500), t0), Admission::Queued);
        assert_eq!(h.scheduler.state(), PlaybackState::Stopped);
        assert!(h.starts().is_empty());

        h.scheduler.finalize(t0);
        assert!(!h.scheduler.is_playing());
    }

    #[test]
    fn test_finalize_starts_when_nothing_played() {
        let mut h = Harness::new(&[0]);
        h.scheduler.set_auto_play(false);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 500), t0);
        h.scheduler.set_auto_play(true);
        h.scheduler.finalize(t0);
        assert!(h.scheduler.is_playing());
        assert!(h.scheduler.is_finalized());
    }

    #[test]
    fn test_late_note_is_dropped() {
        let mut h = Harness::new(&[0]);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 3000), t0);
        let now = t0 + ms(2000);
        assert_eq!(h.scheduler.admit(note(500, 62, 1000), now), Admission::Late);
        // Still in progress: starts now for the rest of its duration
        assert_eq!(h.scheduler.admit(note(1500, 64, 1000), now), Admission::Armed);
        let starts = h.starts();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[1], (0, 64, AUDIO_NOW));
        assert!((h.durations()[1].1 - 0.5).abs() < 1e-9);
        assert_eq!(h.scheduler.notes().len(), 3);
    }

    #[test]
    fn test_transport_positions() {
        let mut h = Harness::new(&[0]);
        h.scheduler.set_auto_play(false);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 5000), t0);

        h.scheduler.seek(2000.0, t0);
        assert_eq!(h.scheduler.current_time_ms(t0), 2000.0);
        assert_eq!(h.scheduler.state(), PlaybackState::Stopped);

        h.scheduler.play(t0);
        assert_eq!(h.scheduler.current_time_ms(t0), 2000.0);

        let later = t0 + ms(700);
        h.scheduler.pause(later);
        assert!((h.scheduler.current_time_ms(later + ms(5000)) - 2700.0).abs() < 1e-6);
        assert_eq!(h.scheduler.armed_count(), 0);

        h.scheduler.stop(later);
        assert_eq!(h.scheduler.current_time_ms(later), 0.0);
        assert_eq!(
            h.recorded.lock().unwrap().states,
            vec![PlaybackState::Playing, PlaybackState::Paused, PlaybackState::Stopped]
        );
    }

    #[test]
    fn test_pause_silences_voices() {
        let mut h = Harness::new(&[0, 1]);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 1000), t0);
        h.clear_calls();
        h.scheduler.pause(t0 + ms(100));
        let calls = h.calls.lock().unwrap().clone();
        assert!(calls.contains(&Call::Stop(0)));
        assert!(calls.contains(&Call::Stop(1)));
    }

    #[test]
    fn test_seek_while_playing_rearms_from_seek_point() {
        let mut h = Harness::new(&[0]);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 2000), t0);
        h.scheduler.admit(note(1000, 62, 500), t0);
        h.scheduler.admit(note(1500, 64, 500), t0);
        h.scheduler.admit(note(2500, 65, 500), t0);
        h.clear_calls();

        let now = t0 + ms(100);
        h.scheduler.seek(1500.0, now);
        assert_eq!(h.scheduler.current_time_ms(now), 1500.0);
        // 60 is still sounding at 1500 but is not resumed mid-note
        assert_eq!(h.starts(), vec![(0, 64, AUDIO_NOW), (0, 65, AUDIO_NOW + 1.0)]);
        assert_eq!(h.scheduler.armed_count(), 2);
    }

    #[test]
    fn test_loop_wraps_and_rearms() {
        let mut h = Harness::new(&[0]);
        h.scheduler.set_loop(true);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 500), t0);
        h.scheduler.admit(note(500, 64, 500), t0);
        assert_eq!(h.scheduler.total_duration_ms(), 1000);

        let end = t0 + ms(1000);
        h.clear_calls();
        h.scheduler.tick(end);
        assert!(h.scheduler.current_time_ms(end) < 1000.0);
        assert!(h.scheduler.is_playing());
        assert_eq!(h.scheduler.armed_count(), 2);
        assert_eq!(h.starts(), vec![(0, 60, AUDIO_NOW), (0, 64, AUDIO_NOW + 0.5)]);
    }

    #[test]
    fn test_end_stops_only_after_finalize() {
        let mut h = Harness::new(&[0]);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 500), t0);

        h.scheduler.tick(t0 + ms(600));
        assert!(h.scheduler.is_playing(), "stream still open");

        h.scheduler.finalize(t0 + ms(600));
        h.scheduler.tick(t0 + ms(610));
        assert_eq!(h.scheduler.state(), PlaybackState::Stopped);
        assert_eq!(h.scheduler.current_time_ms(t0 + ms(700)), 0.0);
    }

    #[test]
    fn test_missing_voice_falls_back_then_goes_silent() {
        let mut h = Harness::new(&[0]);
        let t0 = Instant::now();
        h.scheduler
            .admit(NoteEvent::new(0, 40, 90, 500, 5).unwrap(), t0);
        assert_eq!(h.starts(), vec![(0, 40, AUDIO_NOW)]);

        let mut silent = Harness::new(&[]);
        silent.scheduler.admit(note(0, 60, 100), t0);
        assert!(silent.starts().is_empty());
        silent.scheduler.tick(t0);
        silent.scheduler.tick(t0 + ms(100));
        assert_eq!(
            silent.recorded.lock().unwrap().signals,
            vec![(60, true), (60, false)]
        );
    }

    #[test]
    fn test_visual_signals_ordered() {
        let mut h = Harness::new(&[0]);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 300), t0);
        h.scheduler.admit(note(100, 62, 100), t0);
        // Nothing is delivered outside of tick
        assert!(h.recorded.lock().unwrap().signals.is_empty());

        h.scheduler.tick(t0 + ms(1000));
        assert_eq!(
            h.recorded.lock().unwrap().signals,
            vec![(60, true), (62, true), (62, false), (60, false)]
        );
        assert_eq!(h.scheduler.armed_count(), 0);
    }

    #[test]
    fn test_pause_switches_off_active_notes() {
        let mut h = Harness::new(&[0]);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 1000), t0);
        h.scheduler.tick(t0 + ms(10));
        assert_eq!(h.scheduler.active_count(), 1);
        h.scheduler.pause(t0 + ms(20));
        assert_eq!(h.scheduler.active_count(), 0);
        assert_eq!(
            h.recorded.lock().unwrap().signals,
            vec![(60, true), (60, false)]
        );
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut h = Harness::new(&[0]);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 1000), t0);
        h.scheduler.clear();
        assert!(h.scheduler.notes().is_empty());
        assert_eq!(h.scheduler.total_duration_ms(), 0);
        assert_eq!(h.scheduler.state(), PlaybackState::Stopped);
        assert!(h.scheduler.auto_start_pending());
        assert_eq!(h.scheduler.admit(note(0, 60, 1000), t0), Admission::Started);
    }

    #[test]
    fn test_bank_switch_reacquires_voices() {
        let mut h = Harness::new(&[0]);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 1000), t0);
        h.scheduler.admit(note(500, 62, 1000), t0);
        h.clear_calls();
        h.scheduler.select_bank("retro", t0 + ms(200));
        assert_eq!(h.starts(), vec![(0, 62, AUDIO_NOW + 0.3)]);
    }

    #[test]
    fn test_resume_mid_note_sounds_the_remainder() {
        let mut h = Harness::new(&[0]);
        h.scheduler.set_auto_play(false);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 1000), t0);
        h.scheduler.admit(note(800, 62, 400), t0);
        h.scheduler.seek(600.0, t0);
        h.scheduler.play(t0);

        let durations = h.durations();
        assert_eq!(durations.len(), 2);
        assert_eq!(durations[0].0, 60);
        assert!((durations[0].1 - 0.4).abs() < 1e-9);
        assert!((durations[1].1 - 0.4).abs() < 1e-9);

        // The visual end matches the audible end
        h.scheduler.tick(t0 + ms(399));
        assert_eq!(h.scheduler.active_count(), 2);
        h.scheduler.tick(t0 + ms(400));
        assert_eq!(h.scheduler.active_count(), 1);
        assert_eq!(
            h.recorded.lock().unwrap().signals,
            vec![(60, true), (62, true), (60, false)]
        );
    }

    #[test]
    fn test_no_end_before_total_duration() {
        let mut h = Harness::new(&[0]);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 1000), t0);
        h.scheduler.finalize(t0);
        h.clear_calls();

        h.scheduler.tick(t0 + ms(970));
        assert!(h.scheduler.is_playing());
        assert!(h.calls.lock().unwrap().is_empty(), "last note cut short");

        h.scheduler.tick(t0 + ms(1000));
        assert_eq!(h.scheduler.state(), PlaybackState::Stopped);

        let mut looping = Harness::new(&[0]);
        looping.scheduler.set_loop(true);
        looping.scheduler.admit(note(0, 60, 1000), t0);
        looping.scheduler.tick(t0 + ms(970));
        assert!((looping.scheduler.current_time_ms(t0 + ms(970)) - 970.0).abs() < 1e-6);
    }

    #[test]
    fn test_new_stream_after_end_plays_again() {
        let mut h = Harness::new(&[0]);
        let t0 = Instant::now();
        h.scheduler.begin_stream();
        h.scheduler.admit(note(0, 60, 500), t0);
        h.scheduler.finalize(t0);
        h.scheduler.tick(t0 + ms(500));
        assert_eq!(h.scheduler.state(), PlaybackState::Stopped);

        let t1 = t0 + ms(1000);
        h.scheduler.begin_stream();
        assert!(!h.scheduler.is_finalized());
        h.clear_calls();
        assert_eq!(h.scheduler.admit(note(600, 64, 400), t1), Admission::Started);
        assert_eq!(h.starts(), vec![(0, 60, AUDIO_NOW), (0, 64, AUDIO_NOW + 0.6)]);

        // Still streaming: no stop at the end of what is known so far
        h.scheduler.tick(t1 + ms(1100));
        assert!(h.scheduler.is_playing());

        h.scheduler.finalize(t1 + ms(1100));
        h.scheduler.tick(t1 + ms(1110));
        assert_eq!(h.scheduler.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_new_stream_keeps_paused_playback_paused() {
        let mut h = Harness::new(&[0]);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 1000), t0);
        h.scheduler.pause(t0 + ms(200));

        h.scheduler.begin_stream();
        assert_eq!(h.scheduler.admit(note(1000, 62, 500), t0 + ms(300)), Admission::Queued);
        h.scheduler.finalize(t0 + ms(400));
        assert_eq!(h.scheduler.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_seek_while_paused_then_play() {
        let mut h = Harness::new(&[0]);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 500), t0);
        h.scheduler.admit(note(1000, 62, 500), t0);
        h.scheduler.admit(note(2000, 64, 500), t0);
        h.scheduler.pause(t0 + ms(100));
        h.clear_calls();

        let t1 = t0 + ms(5000);
        h.scheduler.seek(1200.0, t1);
        assert_eq!(h.scheduler.state(), PlaybackState::Paused);
        assert_eq!(h.scheduler.current_time_ms(t1), 1200.0);
        assert_eq!(h.scheduler.current_time_ms(t1 + ms(300)), 1200.0);
        assert!(h.starts().is_empty());
        assert_eq!(h.scheduler.armed_count(), 0);

        let t2 = t1 + ms(300);
        h.scheduler.play(t2);
        assert_eq!(h.scheduler.current_time_ms(t2), 1200.0);
        assert!((h.scheduler.current_time_ms(t2 + ms(250)) - 1450.0).abs() < 1e-6);
        assert_eq!(h.starts(), vec![(0, 62, AUDIO_NOW), (0, 64, AUDIO_NOW + 0.8)]);
    }

    #[test]
    fn test_tick_right_after_seek_sees_new_position() {
        let mut h = Harness::new(&[0]);
        let t0 = Instant::now();
        h.scheduler.admit(note(0, 60, 400), t0);
        h.scheduler.admit(note(1000, 62, 300), t0);
        h.scheduler.admit(note(1500, 64, 300), t0);
        h.scheduler.tick(t0 + ms(10));
        assert_eq!(h.scheduler.active_count(), 1);

        let now = t0 + ms(20);
        h.scheduler.seek(1000.0, now);
        h.scheduler.tick(now);
        assert_eq!(h.scheduler.current_time_ms(now), 1000.0);
        assert_eq!(h.scheduler.armed_count(), 2);
        assert_eq!(h.scheduler.active_count(), 1);
        assert_eq!(
            h.recorded.lock().unwrap().signals,
            vec![(60, true), (60, false), (62, true)]
        );
    }
}
