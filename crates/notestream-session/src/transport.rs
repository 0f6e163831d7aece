//! Transport seam and connection state.
//!
//! The controller only ever sends through [`Transport`]. Incoming messages
//! and open/close notifications are pushed into the controller by whoever
//! drives the connection, which also owns reconnect timing through a
//! [`ConnectionTracker`].

use crate::error::{Error, Result};
use crate::protocol::ClientMessage;
use std::time::Duration;

/// Outgoing half of a session connection.
pub trait Transport {
    /// Send one message to the server.
    fn send(&mut self, message: &ClientMessage) -> Result<()>;

    /// Whether the connection is currently open.
    fn is_connected(&self) -> bool {
        true
    }
}

/// In-process transport that records every message it is asked to send.
#[derive(Debug, Clone)]
pub struct RecordingTransport {
    sent: Vec<ClientMessage>,
    connected: bool,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    /// Create a connected transport with an empty log.
    pub fn new() -> Self {
        Self {
            sent: Vec::new(),
            connected: true,
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> &[ClientMessage] {
        &self.sent
    }

    pub fn last(&self) -> Option<&ClientMessage> {
        self.sent.last()
    }

    /// Drain the log.
    pub fn take_sent(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, message: &ClientMessage) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        log::trace!("-> {}", message.to_json()?);
        self.sent.push(message.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Connection lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    #[default]
    Disconnected,
    /// Waiting before reconnect attempt number `attempt` (zero-based).
    Reconnecting { attempt: u32 },
}

/// Exponential backoff between reconnect attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            initial,
            max: max.max(initial),
            factor: if factor.is_finite() { factor.max(1.0) } else { 1.0 },
        }
    }

    /// Delay before attempt `attempt`: `min(initial * factor^attempt, max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Tracks [`ConnectionState`] and hands out backoff delays.
#[derive(Clone, Debug, Default)]
pub struct ConnectionTracker {
    state: ConnectionState,
    policy: ReconnectPolicy,
}

impl ConnectionTracker {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// The connection opened. Resets the attempt counter.
    pub fn connected(&mut self) {
        if let ConnectionState::Reconnecting { attempt } = self.state {
            log::info!("reconnected after {} attempt(s)", attempt + 1);
        }
        self.state = ConnectionState::Connected;
    }

    /// The connection closed.
    ///
    /// A close reported while already reconnecting (a failed attempt) keeps
    /// the attempt counter so the next delay keeps growing.
    pub fn disconnected(&mut self) {
        if let ConnectionState::Connected = self.state {
            self.state = ConnectionState::Disconnected;
        }
    }

    /// Advance to the next reconnect attempt and return how long to wait first.
    pub fn next_attempt(&mut self) -> Duration {
        let attempt = match self.state {
            ConnectionState::Reconnecting { attempt } => attempt.saturating_add(1),
            ConnectionState::Connected | ConnectionState::Disconnected => 0,
        };
        self.state = ConnectionState::Reconnecting { attempt };
        let delay = self.policy.delay_for_attempt(attempt);
        log::debug!("reconnect attempt {} in {:?}", attempt + 1, delay);
        delay
    }
}
