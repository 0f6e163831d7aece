//! Note events and the stream records they are decoded from.
//!
//! The generator emits one flat JSON object per record:
//!
//! - `{"t": 0, "n": 60, "v": 80, "d": 500, "i": 0}` - a [`NoteEvent`]
//! - `{"bank": "acoustic"}` - a [`BankSelect`]
//!
//! Field ranges are enforced here. An out-of-range instrument snaps to 0,
//! any other bad field rejects the whole record.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::ops::RangeInclusive;

/// Highest valid MIDI pitch.
pub const MAX_PITCH: u8 = 127;

/// Number of instrument slots in a bank (ids 0-7).
pub const INSTRUMENT_COUNT: u8 = 8;

/// One discrete sound instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct NoteEvent {
    /// Start offset from the beginning of the composition in milliseconds.
    #[serde(rename = "t")]
    pub start_ms: u32,
    /// MIDI pitch (0-127).
    #[serde(rename = "n")]
    pub pitch: u8,
    /// MIDI velocity (1-127).
    #[serde(rename = "v")]
    pub velocity: u8,
    /// Duration in milliseconds (> 0).
    #[serde(rename = "d")]
    pub duration_ms: u32,
    /// Instrument slot within the active bank (0-7).
    #[serde(rename = "i")]
    pub instrument: u8,
}

/// Identity of a note for deduplication.
///
/// Velocity is deliberately not part of the identity: the same note
/// re-emitted with a different velocity is still the same note.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteKey {
    pub start_ms: u32,
    pub pitch: u8,
    pub duration_ms: u32,
    pub instrument: u8,
}

impl NoteEvent {
    /// Create a note, validating every field.
    pub fn new(start_ms: u32, pitch: u8, velocity: u8, duration_ms: u32, instrument: u8) -> Result<Self> {
        if pitch > MAX_PITCH {
            return Err(out_of_range("n", pitch));
        }
        if velocity == 0 || velocity > 127 {
            return Err(out_of_range("v", velocity));
        }
        if duration_ms == 0 {
            return Err(out_of_range("d", duration_ms));
        }
        Ok(Self {
            start_ms,
            pitch,
            velocity,
            duration_ms,
            instrument: if instrument < INSTRUMENT_COUNT { instrument } else { 0 },
        })
    }

    /// Deduplication identity of this note.
    pub fn key(&self) -> NoteKey {
        NoteKey {
            start_ms: self.start_ms,
            pitch: self.pitch,
            duration_ms: self.duration_ms,
            instrument: self.instrument,
        }
    }

    /// End of the note in milliseconds.
    pub fn end_ms(&self) -> u64 {
        self.start_ms as u64 + self.duration_ms as u64
    }
}

/// Instrument palette selection (`{"bank": "..."}`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BankSelect {
    pub bank: String,
}

/// A validated stream record.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Note(NoteEvent),
    Bank(BankSelect),
}

impl Record {
    /// Decode and validate one complete candidate object.
    ///
    /// Returns [`Error::Json`] when the text does not decode at all, and a
    /// validation error when it decodes but is not an acceptable record.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(fields) = value else {
            return Err(Error::NotAnObject);
        };

        if let Some(bank) = fields.get("bank") {
            let name = bank
                .as_str()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| Error::InvalidBank(bank.to_string()))?;
            return Ok(Record::Bank(BankSelect { bank: name }));
        }

        let start_ms = int_field(&fields, "t", 0..=u32::MAX as i64)? as u32;
        let pitch = int_field(&fields, "n", 0..=MAX_PITCH as i64)? as u8;
        let velocity = int_field(&fields, "v", 1..=127)? as u8;
        let duration_ms = int_field(&fields, "d", 1..=u32::MAX as i64)? as u32;
        let instrument = fields
            .get("i")
            .and_then(Value::as_i64)
            .filter(|i| (0..INSTRUMENT_COUNT as i64).contains(i))
            .unwrap_or(0) as u8;

        Ok(Record::Note(NoteEvent {
            start_ms,
            pitch,
            velocity,
            duration_ms,
            instrument,
        }))
    }
}

fn int_field(fields: &Map<String, Value>, name: &'static str, range: RangeInclusive<i64>) -> Result<i64> {
    let value = fields.get(name).ok_or(Error::MissingField(name))?;
    value
        .as_i64()
        .filter(|v| range.contains(v))
        .ok_or_else(|| out_of_range(name, value))
}

fn out_of_range(field: &'static str, value: impl ToString) -> Error {
    Error::OutOfRange {
        field,
        value: value.to_string(),
    }
}

/// Total duration of a set of notes: the latest note end, 0 when empty.
pub fn total_duration_ms<'a>(notes: impl IntoIterator<Item = &'a NoteEvent>) -> u64 {
    notes.into_iter().map(NoteEvent::end_ms).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_with_default_instrument() {
        let record = Record::parse(r#"{"t":0,"n":60,"v":80,"d":400}"#).unwrap();
        let Record::Note(note) = record else {
            panic!("expected a note");
        };
        assert_eq!(note.start_ms, 0);
        assert_eq!(note.pitch, 60);
        assert_eq!(note.velocity, 80);
        assert_eq!(note.duration_ms, 400);
        assert_eq!(note.instrument, 0);
    }

    #[test]
    fn test_out_of_range_instrument_snaps_to_zero() {
        for text in [
            r#"{"t":10,"n":60,"v":80,"d":400,"i":9}"#,
            r#"{"t":10,"n":60,"v":80,"d":400,"i":-1}"#,
            r#"{"t":10,"n":60,"v":80,"d":400,"i":"two"}"#,
        ] {
            match Record::parse(text).unwrap() {
                Record::Note(note) => assert_eq!(note.instrument, 0, "{text}"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_bad_fields_reject_record() {
        assert!(matches!(
            Record::parse(r#"{"t":0,"n":128,"v":80,"d":400}"#),
            Err(Error::OutOfRange { field: "n", .. })
        ));
        assert!(matches!(
            Record::parse(r#"{"t":0,"n":60,"v":0,"d":400}"#),
            Err(Error::OutOfRange { field: "v", .. })
        ));
        assert!(matches!(
            Record::parse(r#"{"t":0,"n":60,"v":80,"d":0}"#),
            Err(Error::OutOfRange { field: "d", .. })
        ));
        assert!(matches!(
            Record::parse(r#"{"t":-5,"n":60,"v":80,"d":10}"#),
            Err(Error::OutOfRange { field: "t", .. })
        ));
        assert!(matches!(
            Record::parse(r#"{"n":60,"v":80,"d":10}"#),
            Err(Error::MissingField("t"))
        ));
    }

    #[test]
    fn test_parse_bank_normalizes_name() {
        let record = Record::parse(r#"{"bank": " Acoustic "}"#).unwrap();
        assert_eq!(
            record,
            Record::Bank(BankSelect {
                bank: "acoustic".to_string()
            })
        );
        assert!(matches!(Record::parse(r#"{"bank": 3}"#), Err(Error::InvalidBank(_))));
    }

    #[test]
    fn test_truncated_text_is_malformed() {
        let err = Record::parse(r#"{"t":0,"n":"#).unwrap_err();
        assert!(err.is_malformed());
        assert!(!Error::MissingField("t").is_malformed());
    }

    #[test]
    fn test_key_ignores_velocity() {
        let a = NoteEvent::new(100, 60, 80, 500, 1).unwrap();
        let b = NoteEvent::new(100, 60, 20, 500, 1).unwrap();
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), NoteEvent::new(100, 60, 80, 500, 2).unwrap().key());
    }

    #[test]
    fn test_total_duration() {
        let notes = [
            NoteEvent::new(0, 60, 80, 500, 0).unwrap(),
            NoteEvent::new(250, 64, 90, 500, 0).unwrap(),
        ];
        assert_eq!(total_duration_ms(&notes), 750);
        assert_eq!(total_duration_ms(&[]), 0);
    }
}
