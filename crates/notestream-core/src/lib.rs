//! notestream core - turning a streamed composition into timed playback.
//!
//! This crate provides the building blocks that do not depend on any
//! transport:
//!
//! - **Notes** - [`NoteEvent`], bank selections and their validation
//! - **Extraction** - [`StreamExtractor`] recovers complete records from a
//!   growing, possibly malformed text stream
//! - **Timing** - [`PlaybackClock`], the single wall-clock to composition-time mapping
//! - **Scheduling** - [`PlaybackScheduler`] arms notes as they arrive and
//!   handles play/pause/stop/seek/loop
//! - **Collaborators** - [`Voice`]/[`VoiceFactory`] for sound,
//!   [`PlaybackObserver`] for visuals
//! - **Tasks** - [`PeriodicTasks`], the registry every recurring timer goes through
//! - **Banks** - the instrument palette catalog
//!
//! # Example
//!
//! ```
//! use notestream_core::{Extracted, PlaybackScheduler, StreamExtractor};
//! use std::time::Instant;
//!
//! let mut extractor = StreamExtractor::new();
//! let mut scheduler = PlaybackScheduler::new();
//! let now = Instant::now();
//!
//! for fragment in [r#"{"t":0,"n":60,"v":80,"#, r#""d":500}"#] {
//!     extractor.feed(fragment, |item| {
//!         if let Extracted::Note(note) = item {
//!             scheduler.admit(note, now);
//!         }
//!     });
//! }
//! assert_eq!(scheduler.total_duration_ms(), 500);
//! assert!(scheduler.is_playing());
//! ```

pub mod banks;
pub mod error;
pub mod extractor;
pub mod note;
pub mod observer;
pub mod scheduler;
pub mod ticker;
pub mod timing;
pub mod voice;

pub use banks::{bank_or_default, find_bank, Instrument, InstrumentBank, BANKS, DEFAULT_BANK};
pub use error::{Error, Result};
pub use extractor::{ExtractWarning, Extracted, StreamExtractor, WarningKind};
pub use note::{total_duration_ms, BankSelect, NoteEvent, NoteKey, Record};
pub use observer::{LoggingObserver, NullObserver, PlaybackObserver};
pub use scheduler::{Admission, PlaybackScheduler};
pub use ticker::PeriodicTasks;
pub use timing::{PlaybackClock, PlaybackState};
pub use voice::{LoggingVoice, LoggingVoiceFactory, Voice, VoiceFactory};
