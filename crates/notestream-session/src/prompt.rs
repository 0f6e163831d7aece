//! Prompt sanitizing.

use crate::error::{Error, Result};

/// Longest accepted prompt, in characters.
pub const MAX_PROMPT_LEN: usize = 512;

/// Trim the prompt and strip control characters.
///
/// Newlines and tabs inside the prompt are control characters too; they are
/// replaced by a space so words on either side stay apart.
pub fn sanitize_prompt(raw: &str) -> Result<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if c == '\n' || c == '\t' || c == '\r' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();
    let cleaned = cleaned.trim().to_string();

    if cleaned.is_empty() {
        return Err(Error::EmptyPrompt);
    }
    let len = cleaned.chars().count();
    if len > MAX_PROMPT_LEN {
        return Err(Error::PromptTooLong {
            len,
            max: MAX_PROMPT_LEN,
        });
    }
    Ok(cleaned)
}
