//! notestream session - the client side of a streamed composition request.
//!
//! [`SessionController`] sends compose requests over a [`Transport`], filters
//! the server's replies by request id and feeds the stream into the
//! extractor and playback scheduler from `notestream-core`.
//!
//! # Example
//!
//! ```
//! use notestream_session::{Config, RecordingTransport, ServerMessage, SessionController};
//! use std::time::Instant;
//!
//! let now = Instant::now();
//! let mut session = SessionController::new(RecordingTransport::new(), &Config::default());
//! let id = session.compose("slow piano", false, now).unwrap();
//!
//! session.handle_message(
//!     ServerMessage::Chunk { id: id.clone(), data: r#"{"t":0,"n":60,"v":80,"d":500}"#.into() },
//!     now,
//! );
//! session.handle_message(ServerMessage::Done { id, bank: None }, now);
//! assert_eq!(session.scheduler().total_duration_ms(), 500);
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod prompt;
pub mod protocol;
pub mod store;
pub mod transport;

pub use config::{Config, PlaybackSettings, ReconnectSettings, SessionSettings};
pub use controller::{
    LoggingSessionObserver, SessionController, SessionEvent, SessionObserver, SessionState,
    SessionTask, ELAPSED_INTERVAL,
};
pub use error::{Error, Result};
pub use prompt::{sanitize_prompt, MAX_PROMPT_LEN};
pub use protocol::{ClientMessage, ServerMessage};
pub use store::{Composition, CompositionStore, JsonDirStore, MemoryStore};
pub use transport::{
    ConnectionState, ConnectionTracker, ReconnectPolicy, RecordingTransport, Transport,
};
