//! Session controller.
//!
//! Owns the extractor, the playback scheduler and the periodic tasks of one
//! session, and drives them from server messages and user requests.
//!
//! ```text
//!            compose                thinking               chunk
//!   Idle ─────────────▶ Waiting ─────────────▶ Thinking ─────────▶ Generating
//!    ▲                     │            chunk                          │
//!    │                     └───────────────────────────────────────────┤
//!    │           done / cancelled / error / cancel / disconnect        │
//!    └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Playing` is never stored: [`observed_state`](SessionController::observed_state)
//! reports it when the controller is idle and the scheduler is playing.
//!
//! Only one request is active at a time. Every server message that carries
//! an id other than the active one is dropped before it can touch any state.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::prompt::sanitize_prompt;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::store::{Composition, CompositionStore};
use crate::transport::Transport;
use notestream_core::{
    find_bank, Admission, Extracted, PeriodicTasks, PlaybackScheduler, StreamExtractor, WarningKind,
};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How often the elapsed-time display is refreshed.
pub const ELAPSED_INTERVAL: Duration = Duration::from_secs(1);

/// User-visible session state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    /// Request sent, nothing received yet.
    Waiting,
    /// The generator is reasoning.
    Thinking,
    /// Content is streaming in.
    Generating,
    /// Idle with sound playing.
    Playing,
}

impl SessionState {
    /// Whether a request is in flight.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            SessionState::Waiting | SessionState::Thinking | SessionState::Generating
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Waiting => "waiting",
            SessionState::Thinking => "thinking",
            SessionState::Generating => "generating",
            SessionState::Playing => "playing",
        };
        f.write_str(label)
    }
}

/// Recurring work owned by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionTask {
    Heartbeat,
    Elapsed,
    PlaybackTick,
}

/// Notification for whatever presents the session to the user.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The observed state changed.
    StateChanged(SessionState),
    /// Transient status message; the presenter clears it after a while.
    Status(String),
    /// Time since the active request was sent.
    Elapsed { state: SessionState, elapsed: Duration },
    /// Whether a refinement of the last composition can be requested.
    RefineAvailable(bool),
    /// A finished composition was handed to the gallery.
    Saved { id: String, notes: usize },
}

/// Receiver of [`SessionEvent`]s.
pub trait SessionObserver: Send {
    fn on_event(&mut self, _event: &SessionEvent) {}
}

/// Writes session events to the log.
#[derive(Debug, Default)]
pub struct LoggingSessionObserver;

impl SessionObserver for LoggingSessionObserver {
    fn on_event(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::StateChanged(state) => log::info!("session {}", state),
            SessionEvent::Status(message) => log::warn!("{}", message),
            SessionEvent::Elapsed { state, elapsed } => {
                log::info!("{}... {}s", state, elapsed.as_secs())
            }
            SessionEvent::RefineAvailable(available) => {
                log::debug!("refine available: {}", available)
            }
            SessionEvent::Saved { id, notes } => log::info!("composition {} saved ({} notes)", id, notes),
        }
    }
}

/// Drives one composition session over a [`Transport`].
pub struct SessionController<T: Transport> {
    transport: T,
    model: String,
    provider: String,
    max_tokens: u32,
    requested_bank: Option<String>,
    heartbeat: Duration,
    tick: Duration,
    extractor: StreamExtractor,
    scheduler: PlaybackScheduler,
    tasks: PeriodicTasks<SessionTask>,
    state: SessionState,
    reported: SessionState,
    active_id: Option<String>,
    request_sent_at: Option<Instant>,
    prompt: String,
    refined: bool,
    bank: Option<String>,
    refine_available: bool,
    last_pong: Option<Instant>,
    store: Option<Box<dyn CompositionStore>>,
    observer: Box<dyn SessionObserver>,
}

impl<T: Transport> SessionController<T> {
    /// Create an idle controller configured from `config`.
    pub fn new(transport: T, config: &Config) -> Self {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.set_auto_play(config.playback.auto_play);
        scheduler.set_loop(config.playback.loop_playback);

        Self {
            transport,
            model: config.session.model.clone(),
            provider: config.session.provider.clone(),
            max_tokens: config.session.max_tokens,
            requested_bank: config.session.bank.clone(),
            heartbeat: config.session.heartbeat_interval(),
            tick: config.playback.tick_interval(),
            extractor: StreamExtractor::new(),
            scheduler,
            tasks: PeriodicTasks::new(),
            state: SessionState::Idle,
            reported: SessionState::Idle,
            active_id: None,
            request_sent_at: None,
            prompt: String::new(),
            refined: false,
            bank: None,
            refine_available: false,
            last_pong: None,
            store: None,
            observer: Box::new(LoggingSessionObserver),
        }
    }

    /// Hand finished compositions to this store.
    pub fn with_store(mut self, store: Box<dyn CompositionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the playback scheduler, e.g. one wired to a voice factory.
    pub fn with_scheduler(mut self, scheduler: PlaybackScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut PlaybackScheduler {
        &mut self.scheduler
    }

    pub fn extractor(&self) -> &StreamExtractor {
        &self.extractor
    }

    /// Stored state; never [`SessionState::Playing`].
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// State as the user sees it.
    pub fn observed_state(&self) -> SessionState {
        if self.state == SessionState::Idle && self.scheduler.is_playing() {
            SessionState::Playing
        } else {
            self.state
        }
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    /// Bank of the current composition, if one was selected.
    pub fn bank(&self) -> Option<&str> {
        self.bank.as_deref()
    }

    pub fn refine_available(&self) -> bool {
        self.refine_available
    }

    pub fn last_pong(&self) -> Option<Instant> {
        self.last_pong
    }

    /// Send a compose request and return its id.
    ///
    /// A request that is still active is superseded: its id goes stale and
    /// its remaining messages are ignored. With `refine` the notes of the
    /// previous composition are kept and extended.
    pub fn compose(&mut self, prompt: &str, refine: bool, now: Instant) -> Result<String> {
        let prompt = match sanitize_prompt(prompt) {
            Ok(prompt) => prompt,
            Err(e) => {
                self.emit(SessionEvent::Status(e.to_string()));
                return Err(e);
            }
        };

        let id = Uuid::new_v4().to_string();
        let message = ClientMessage::Compose {
            prompt: prompt.clone(),
            id: id.clone(),
            model: self.model.clone(),
            provider: self.provider.clone(),
            max_tokens: self.max_tokens,
            refine,
            bank_id: self.requested_bank.clone(),
        };
        self.send(&message)?;

        if let Some(previous) = self.active_id.take() {
            log::debug!("request {} superseded by {}", previous, id);
        }
        log::info!("compose {} ({}): {}", id, if refine { "refine" } else { "new" }, prompt);

        self.extractor.reset();
        if !refine {
            self.scheduler.clear();
            self.bank = None;
        }
        self.scheduler.begin_stream();
        self.prompt = prompt;
        self.refined = refine;
        self.active_id = Some(id.clone());
        self.request_sent_at = Some(now);
        self.set_refine_available(false);
        self.tasks.start(SessionTask::Elapsed, ELAPSED_INTERVAL, now);
        self.ensure_tick(now);
        self.set_state(SessionState::Waiting);
        Ok(id)
    }

    /// Cancel the active request. Notes admitted so far are kept.
    pub fn cancel(&mut self) -> Result<()> {
        let Some(id) = self.active_id.take() else {
            return Ok(());
        };
        log::info!("cancel {}", id);
        self.finish_request();
        self.send(&ClientMessage::Cancel { id })
    }

    /// Forget the server-side conversation and reset all local playback state.
    pub fn clear_session(&mut self) -> Result<()> {
        if let Some(id) = self.active_id.take() {
            log::debug!("request {} dropped by session clear", id);
        }
        self.finish_request();
        self.extractor.reset();
        self.scheduler.clear();
        self.bank = None;
        self.prompt.clear();
        self.refined = false;
        self.set_refine_available(false);
        self.notify_state();
        self.send(&ClientMessage::ClearSession)
    }

    /// Send a keepalive.
    pub fn ping(&mut self) -> Result<()> {
        self.send(&ClientMessage::Ping)
    }

    /// Decode and handle one raw server message.
    pub fn handle_text(&mut self, text: &str, now: Instant) {
        match ServerMessage::from_json(text) {
            Ok(message) => self.handle_message(message, now),
            Err(e) => log::warn!("Ignoring undecodable server message: {}", e),
        }
    }

    /// Handle one server message.
    pub fn handle_message(&mut self, message: ServerMessage, now: Instant) {
        if let Some(id) = message.request_id() {
            if self.active_id.as_deref() != Some(id) {
                log::debug!("discarding stale {} for request {}", message.kind(), id);
                return;
            }
        }

        match message {
            ServerMessage::Start { id } => log::debug!("request {} accepted", id),
            ServerMessage::Thinking { data, .. } => {
                log::trace!("thinking: {}", data);
                if self.state == SessionState::Waiting {
                    self.set_state(SessionState::Thinking);
                }
            }
            ServerMessage::Chunk { data, .. } => {
                if matches!(self.state, SessionState::Waiting | SessionState::Thinking) {
                    self.set_state(SessionState::Generating);
                }
                self.feed(&data, now);
            }
            ServerMessage::Done { id, bank } => self.complete(id, bank, now),
            ServerMessage::Cancelled { id } => {
                log::info!("request {} cancelled by server", id);
                self.active_id = None;
                self.finish_request();
            }
            ServerMessage::Error { id, message } => {
                log::warn!("request {} failed: {}", id, message);
                self.active_id = None;
                self.finish_request();
                self.emit(SessionEvent::Status(format!("Generation failed: {}", message)));
            }
            ServerMessage::Pong => self.last_pong = Some(now),
            ServerMessage::SessionCleared => log::info!("server session cleared"),
            ServerMessage::Unknown => log::debug!("ignoring unknown server message"),
        }
        self.notify_state();
    }

    /// The connection (re)opened. Starts the heartbeat.
    pub fn on_connected(&mut self, now: Instant) {
        log::info!("connected");
        if let Some(id) = self.active_id.take() {
            log::debug!("request {} not carried across reconnect", id);
            self.finish_request();
        }
        self.last_pong = None;
        self.tasks.start(SessionTask::Heartbeat, self.heartbeat, now);
        self.ensure_tick(now);
        self.notify_state();
    }

    /// The connection closed. Any request in flight is abandoned.
    pub fn on_disconnected(&mut self) {
        self.tasks.cancel(SessionTask::Heartbeat);
        if let Some(id) = self.active_id.take() {
            log::warn!("connection lost, request {} abandoned", id);
            self.finish_request();
            self.emit(SessionEvent::Status(
                "Connection lost, please try again".to_string(),
            ));
        } else {
            self.emit(SessionEvent::Status("Connection lost".to_string()));
        }
        self.notify_state();
    }

    pub fn play(&mut self, now: Instant) {
        self.scheduler.play(now);
        self.ensure_tick(now);
        self.notify_state();
    }

    pub fn pause(&mut self, now: Instant) {
        self.scheduler.pause(now);
        self.notify_state();
    }

    pub fn stop(&mut self, now: Instant) {
        self.scheduler.stop(now);
        self.notify_state();
    }

    pub fn seek(&mut self, position_ms: f64, now: Instant) {
        self.scheduler.seek(position_ms, now);
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.scheduler.set_loop(enabled);
    }

    /// Earliest instant [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.next_deadline()
    }

    /// Run every periodic task due at `now`.
    pub fn poll(&mut self, now: Instant) {
        for task in self.tasks.due(now) {
            match task {
                SessionTask::Heartbeat => {
                    if !self.transport.is_connected() {
                        log::debug!("heartbeat skipped, transport not connected");
                    } else if let Err(e) = self.ping() {
                        log::debug!("heartbeat not sent: {}", e);
                    }
                }
                SessionTask::Elapsed => {
                    if let Some(sent_at) = self.request_sent_at {
                        self.emit(SessionEvent::Elapsed {
                            state: self.state,
                            elapsed: now.saturating_duration_since(sent_at),
                        });
                    }
                }
                SessionTask::PlaybackTick => self.scheduler.tick(now),
            }
        }
        self.notify_state();
    }

    fn feed(&mut self, data: &str, now: Instant) {
        let scheduler = &mut self.scheduler;
        let mut admitted = 0usize;
        let mut selected: Option<String> = None;

        self.extractor.feed(data, |item| match item {
            Extracted::Note(note) => {
                if scheduler.admit(note, now) != Admission::Duplicate {
                    admitted += 1;
                }
            }
            Extracted::Bank(select) => {
                scheduler.select_bank(&select.bank, now);
                selected = Some(select.bank);
            }
            Extracted::Warning(warning) => match warning.kind {
                WarningKind::Incomplete => log::trace!("waiting for rest of {:?}", warning.excerpt),
                WarningKind::Malformed | WarningKind::Abandoned => {
                    log::warn!("dropped {:?} record: {:?}", warning.kind, warning.excerpt)
                }
            },
        });

        if admitted > 0 {
            log::debug!("{} note(s) admitted, {} known", admitted, self.scheduler.notes().len());
        }
        if let Some(bank) = selected {
            self.record_bank(bank);
        }
    }

    fn complete(&mut self, id: String, bank: Option<String>, now: Instant) {
        if let Some(bank) = bank {
            if self.bank.as_deref() != Some(bank.as_str()) {
                self.scheduler.select_bank(&bank, now);
                self.record_bank(bank);
            }
        }
        self.scheduler.finalize(now);
        self.active_id = None;
        self.finish_request();

        let composition = Composition {
            id,
            prompt: self.prompt.clone(),
            bank: self.bank.clone(),
            notes: self.scheduler.notes().to_vec(),
            refined: self.refined,
        };
        log::info!(
            "composition {} complete: {} notes, {}ms",
            composition.id,
            composition.notes.len(),
            composition.duration_ms()
        );
        if let Some(store) = self.store.as_mut() {
            match store.save(&composition) {
                Ok(()) => self.emit(SessionEvent::Saved {
                    id: composition.id.clone(),
                    notes: composition.notes.len(),
                }),
                Err(e) => {
                    log::warn!("Failed to save composition {}: {}", composition.id, e);
                    self.emit(SessionEvent::Status(format!("Could not save composition: {}", e)));
                }
            }
        }
        self.set_refine_available(!composition.notes.is_empty());
    }

    fn record_bank(&mut self, bank: String) {
        if find_bank(&bank).is_none() {
            log::warn!("Unknown instrument bank {:?}", bank);
        } else {
            log::info!("instrument bank: {}", bank);
        }
        self.bank = Some(bank);
    }

    /// Leave the request phase. The active id must already be cleared.
    fn finish_request(&mut self) {
        self.tasks.cancel(SessionTask::Elapsed);
        self.request_sent_at = None;
        self.set_state(SessionState::Idle);
    }

    fn ensure_tick(&mut self, now: Instant) {
        if !self.tasks.is_running(SessionTask::PlaybackTick) {
            self.tasks.start(SessionTask::PlaybackTick, self.tick, now);
        }
    }

    fn send(&mut self, message: &ClientMessage) -> Result<()> {
        match self.transport.send(message) {
            Ok(()) => Ok(()),
            Err(e) => {
                let status = match &e {
                    Error::NotConnected => "Not connected".to_string(),
                    other => format!("Send failed: {}", other),
                };
                self.emit(SessionEvent::Status(status));
                Err(e)
            }
        }
    }

    fn set_refine_available(&mut self, available: bool) {
        if self.refine_available != available {
            self.refine_available = available;
            self.emit(SessionEvent::RefineAvailable(available));
        }
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.notify_state();
    }

    /// Report the observed state if it changed since the last report.
    fn notify_state(&mut self) {
        let observed = self.observed_state();
        if observed != self.reported {
            self.reported = observed;
            self.emit(SessionEvent::StateChanged(observed));
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        self.observer.on_event(&event);
    }
}

impl<T: Transport + std::fmt::Debug> std::fmt::Debug for SessionController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("transport", &self.transport)
            .field("state", &self.state)
            .field("active_id", &self.active_id)
            .field("bank", &self.bank)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
