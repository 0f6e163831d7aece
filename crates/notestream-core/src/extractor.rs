//! Incremental record extraction from a growing text stream.
//!
//! Fragments arrive at arbitrary boundaries, may split a record anywhere and
//! may be interleaved with prose. The [`StreamExtractor`] accumulates them
//! and pushes every record that has become complete to a sink, exactly once.
//!
//! Records are flat objects, so candidates are found with a single-level
//! byte scanner that tracks string/escape state. Braces inside string values
//! never confuse it. A `{` outside a string while a candidate is open starts
//! a new candidate, so a stray brace in prose cannot swallow the records that
//! follow it. A raw line break inside a string cannot be JSON and ends the
//! candidate.

use crate::error::Error;
use crate::note::{BankSelect, NoteEvent, NoteKey, Record};
use std::collections::HashSet;
use std::ops::Range;

/// Maximum length of a warning excerpt in characters.
pub const EXCERPT_CHARS: usize = 40;

/// An unterminated candidate longer than this is treated as stray text.
///
/// A note record is well under 100 bytes, so only a lone `{` in prose can
/// grow this large; the scanner then restarts after it.
pub const MAX_CANDIDATE_BYTES: usize = 4096;

/// Why a fragment produced a warning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarningKind {
    /// The buffer ends inside a record; it stays buffered until completed.
    Incomplete,
    /// A complete candidate failed to decode and was dropped.
    Malformed,
    /// An unterminated candidate grew past [`MAX_CANDIDATE_BYTES`] and was skipped.
    Abandoned,
}

/// Non-fatal extraction warning with a short excerpt of the offending text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractWarning {
    pub kind: WarningKind,
    pub excerpt: String,
}

/// One item pushed to the extraction sink.
#[derive(Clone, Debug, PartialEq)]
pub enum Extracted {
    Note(NoteEvent),
    Bank(BankSelect),
    Warning(ExtractWarning),
}

/// Incremental extractor for one composition.
///
/// Call [`reset`](Self::reset) before reusing it for another composition.
#[derive(Debug, Default)]
pub struct StreamExtractor {
    /// Not-yet-consumed text.
    buffer: String,
    /// Buffer offsets of candidates already handled.
    consumed: HashSet<usize>,
    /// Offset of the incomplete tail already reported.
    warned_tail: Option<usize>,
    /// Identities of every note emitted since the last reset.
    emitted: HashSet<NoteKey>,
}

/// Result of one scan over the buffer.
struct Scan {
    complete: Vec<Range<usize>>,
    open: Option<usize>,
}

impl StreamExtractor {
    /// Create an empty extractor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all buffered text and emission history.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.consumed.clear();
        self.warned_tail = None;
        self.emitted.clear();
    }

    /// Bytes currently buffered (the unconsumed tail).
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Number of distinct notes emitted since the last reset.
    pub fn emitted_count(&self) -> usize {
        self.emitted.len()
    }

    /// Append a fragment and push every newly complete record to `sink`.
    pub fn feed<F>(&mut self, fragment: &str, mut sink: F)
    where
        F: FnMut(Extracted),
    {
        self.buffer.push_str(fragment);

        let mut from = 0;
        loop {
            let scan = scan_candidates(self.buffer.as_bytes(), from);
            for range in scan.complete {
                if self.consumed.insert(range.start) {
                    self.process(range, &mut sink);
                }
            }

            match scan.open {
                Some(start) if self.buffer.len() - start > MAX_CANDIDATE_BYTES => {
                    if self.consumed.insert(start) {
                        let excerpt = excerpt(&self.buffer[start..]);
                        log::debug!("skipping unterminated text: {}", excerpt);
                        sink(Extracted::Warning(ExtractWarning {
                            kind: WarningKind::Abandoned,
                            excerpt,
                        }));
                    }
                    from = start + 1;
                }
                Some(start) => {
                    if self.warned_tail != Some(start) {
                        self.warned_tail = Some(start);
                        sink(Extracted::Warning(ExtractWarning {
                            kind: WarningKind::Incomplete,
                            excerpt: excerpt(&self.buffer[start..]),
                        }));
                    }
                    self.compact(start);
                    break;
                }
                None => {
                    self.compact(self.buffer.len());
                    break;
                }
            }
        }
    }

    /// Feed a fragment and collect the extracted items.
    pub fn feed_collect(&mut self, fragment: &str) -> Vec<Extracted> {
        let mut items = Vec::new();
        self.feed(fragment, |item| items.push(item));
        items
    }

    fn process<F>(&mut self, range: Range<usize>, sink: &mut F)
    where
        F: FnMut(Extracted),
    {
        let candidate = &self.buffer[range];
        match Record::parse(candidate) {
            Ok(Record::Bank(bank)) => sink(Extracted::Bank(bank)),
            Ok(Record::Note(note)) => {
                if self.emitted.insert(note.key()) {
                    sink(Extracted::Note(note));
                } else {
                    log::trace!("duplicate note {:?} suppressed", note.key());
                }
            }
            Err(err) if err.is_malformed() => {
                let excerpt = excerpt(candidate);
                log::debug!("malformed record {}: {}", excerpt, err);
                sink(Extracted::Warning(ExtractWarning {
                    kind: WarningKind::Malformed,
                    excerpt,
                }));
            }
            Err(err) => {
                log::debug!("rejected record {}: {}", excerpt(candidate), err);
            }
        }
    }

    /// Drop everything before `keep_from`; offsets are invalidated.
    fn compact(&mut self, keep_from: usize) {
        if keep_from == 0 {
            return;
        }
        self.buffer.drain(..keep_from);
        self.consumed.clear();
        self.warned_tail = self
            .warned_tail
            .and_then(|offset| offset.checked_sub(keep_from));
    }
}

/// Find flat brace-delimited candidates starting at `from`.
fn scan_candidates(bytes: &[u8], from: usize) -> Scan {
    let mut complete = Vec::new();
    let mut open: Option<usize> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &byte) in bytes.iter().enumerate().skip(from) {
        let Some(start) = open else {
            if byte == b'{' {
                open = Some(i);
                in_string = false;
                escaped = false;
            }
            continue;
        };

        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            } else if byte == b'\n' || byte == b'\r' {
                open = None;
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => open = Some(i),
            b'}' => {
                complete.push(start..i + 1);
                open = None;
            }
            _ => {}
        }
    }

    Scan { complete, open }
}

fn excerpt(text: &str) -> String {
    let mut chars = text.chars();
    let mut out: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        out.push_str("...");
    }
    out
}
