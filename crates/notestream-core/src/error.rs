//! Error types for the notestream-core crate.

use thiserror::Error;

/// Errors raised while decoding and validating a single stream record.
///
/// None of these are fatal: the extractor turns them into dropped records
/// and warnings, never into a failed stream.
#[derive(Error, Debug)]
pub enum Error {
    /// The candidate text is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The candidate decoded to something other than an object.
    #[error("Record is not a JSON object")]
    NotAnObject,

    /// A required note field is absent.
    #[error("Missing field `{0}`")]
    MissingField(&'static str),

    /// A note field is present but not an integer in its allowed range.
    #[error("Field `{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: String },

    /// A `bank` field that is not a non-empty string.
    #[error("Invalid bank selector: {0}")]
    InvalidBank(String),
}

impl Error {
    /// Whether the record failed structural decoding rather than validation.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::Json(_))
    }
}

/// Result type alias using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
