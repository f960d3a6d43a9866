//! Decoder for single lines of `stream-events` output.

use serde_json::{Map, Value};

/// Field holding the event type tag.
pub const TYPE_FIELD: &str = "type";

/// Error type for line decoding.
///
/// Decode failures are never fatal; they only mean there is no domain event
/// for the line.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("Failed to parse JSON: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("Line is not a JSON object")]
    NotAnObject,
    #[error("Record has no type tag")]
    MissingType,
}

/// A decoded stream record.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    kind: String,
    payload: Map<String, Value>,
}

impl EventRecord {
    /// The type tag, e.g. `comment-added`.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The full decoded object, type tag included.
    #[must_use]
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Consume the record, returning the decoded object.
    #[must_use]
    pub fn into_payload(self) -> Map<String, Value> {
        self.payload
    }
}

/// Decode one line of stream output.
///
/// Trailing line terminators are ignored.
///
/// # Errors
///
/// Returns `DecodeError` if the text is not a JSON object with a non-empty
/// string `type` field.
pub fn decode(text: &str) -> Result<EventRecord, DecodeError> {
    let line = text.trim_end_matches(['\n', '\r']);
    let Value::Object(payload) = serde_json::from_str::<Value>(line)? else {
        return Err(DecodeError::NotAnObject);
    };

    let kind = match payload.get(TYPE_FIELD) {
        Some(Value::String(kind)) if !kind.is_empty() => kind.clone(),
        _ => return Err(DecodeError::MissingType),
    };

    Ok(EventRecord { kind, payload })
}
