//! Turning model output into typed payloads.
//!
//! Models wrap JSON in markdown fences, prepend chatter, or return the wrong
//! shape. Decoding is strict: the text must deserialize into the target type
//! and pass its [`Payload::check`]. A single repair step retries on the
//! outermost `{...}` substring before giving up.

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no JSON object found in model output")]
    NoJsonObject,

    #[error("model output does not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("model output failed validation: {0}")]
    Invalid(String),
}

/// A typed model reply.
pub trait Payload: DeserializeOwned {
    /// Semantic checks the type system cannot express, such as score ranges.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Fence language tags that mark the block as JSON-ish. Longest first.
const FENCE_TAGS: &[&str] = &["javascript", "json", "js"];

/// Removes a surrounding markdown code fence. The opening fence may carry a
/// `json`, `javascript` or `js` tag in any case.
///
/// ```rust
/// use crmgate::llm::decode::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
/// assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
/// ```
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(mut rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    if let Some(tag) = FENCE_TAGS
        .iter()
        .find(|tag| rest.get(..tag.len()).is_some_and(|head| head.eq_ignore_ascii_case(tag)))
    {
        rest = &rest[tag.len()..];
    }
    let rest = rest.trim_end().strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Returns the span from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Strict decode of `text` into `T`, with one substring repair attempt.
pub fn decode_payload<T: Payload>(text: &str) -> Result<T, DecodeError> {
    let cleaned = strip_code_fences(text);

    match parse_checked::<T>(cleaned) {
        Ok(value) => Ok(value),
        Err(first) => {
            let candidate = extract_json_object(cleaned).ok_or(DecodeError::NoJsonObject)?;
            if candidate == cleaned {
                return Err(first);
            }
            tracing::debug!(error = %first, "retrying decode on extracted JSON object");
            parse_checked(candidate)
        }
    }
}

fn parse_checked<T: Payload>(text: &str) -> Result<T, DecodeError> {
    let value: T = serde_json::from_str(text)?;
    value.check().map_err(DecodeError::Invalid)?;
    Ok(value)
}
