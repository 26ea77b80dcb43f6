//! Decoding model replies into typed values.
//!
//! Models wrap JSON in prose or markdown fences often enough that a strict
//! `serde_json::from_str` on the raw reply is not an option. The reply is
//! narrowed to the outermost `{ ... }` first, then deserialized, then checked
//! by the type's own [`StructuredOutput::validate`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Why a reply could not be turned into the expected value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("the reply was empty")]
    Empty,

    #[error("the reply contained no JSON object")]
    NoJson,

    #[error("the JSON did not match the expected shape: {0}")]
    Json(String),

    #[error("{0}")]
    Invalid(String),
}

/// A value an agent is asked to produce as JSON.
pub trait StructuredOutput: DeserializeOwned + Send {
    /// Short name shown to the model alongside the schema.
    fn output_name() -> &'static str;

    /// JSON schema the reply must follow.
    fn output_schema() -> Value;

    /// Checks beyond what deserialization enforces.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Accept any non-blank reply, trimmed.
pub fn decode_text(reply: &str) -> Result<String, ParseError> {
    let text = reply.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(text.to_string())
}

/// Extract, deserialize and validate a structured reply.
pub fn decode_json<T: StructuredOutput>(reply: &str) -> Result<T, ParseError> {
    if reply.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let json = extract_json(reply).ok_or(ParseError::NoJson)?;
    let value: T = serde_json::from_str(json).map_err(|e| ParseError::Json(e.to_string()))?;
    value.validate().map_err(ParseError::Invalid)?;
    Ok(value)
}

/// Find the JSON object in a reply, looking inside a code fence if there is one.
pub fn extract_json(reply: &str) -> Option<&str> {
    let body = fenced_body(reply).unwrap_or(reply);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

fn fenced_body(reply: &str) -> Option<&str> {
    let open = reply.find("```")?;
    let after = &reply[open + 3..];
    // Skip the language tag line (```json).
    let body = &after[after.find('\n')? + 1..];
    let close = body.find("```")?;
    Some(&body[..close])
}
