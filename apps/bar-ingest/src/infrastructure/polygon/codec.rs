//! Feed Codec
//!
//! Decodes Polygon text frames into typed [`FeedEvent`]s and encodes
//! control requests.
//!
//! A frame is normally a JSON array; a bare object is accepted as a
//! one-element frame. Each element is classified by its `ev` field. An
//! element that cannot be decoded becomes [`FeedEvent::Malformed`] instead
//! of failing the whole frame, so one bad element never hides the rest.

use serde_json::Value;

use super::messages::{AggregateMessage, StatusMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is neither an array nor an object.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// A decoded feed element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Aggregate bar (`A` or `AM`).
    Aggregate(AggregateMessage),
    /// Status / acknowledgment.
    Status(StatusMessage),
    /// Event type this pipeline does not handle.
    Unknown {
        /// The `ev` value.
        event_type: String,
    },
    /// Element that could not be decoded.
    Malformed {
        /// The `ev` value, if present.
        event_type: Option<String>,
        /// Decode failure.
        reason: String,
    },
}

impl FeedEvent {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Aggregate(_) => "aggregate",
            Self::Status(_) => "status",
            Self::Unknown { .. } => "unknown",
            Self::Malformed { .. } => "malformed",
        }
    }
}

/// JSON codec for the Polygon stocks stream.
#[derive(Debug, Default, Clone)]
pub struct FeedCodec;

impl FeedCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame into events.
    ///
    /// # Errors
    ///
    /// Returns an error only when the frame as a whole is not JSON or is not
    /// an array/object. Per-element problems yield [`FeedEvent::Malformed`].
    pub fn decode(&self, text: &str) -> Result<Vec<FeedEvent>, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;

        match value {
            Value::Array(items) => Ok(items.into_iter().map(decode_element).collect()),
            Value::Object(_) => Ok(vec![decode_element(value)]),
            other => Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got {}",
                json_type(&other)
            ))),
        }
    }

    /// Encode a value to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

fn decode_element(value: Value) -> FeedEvent {
    let event_type = value.get("ev").and_then(Value::as_str).map(str::to_string);

    match event_type.as_deref() {
        Some("A" | "AM") => match serde_json::from_value::<AggregateMessage>(value) {
            Ok(msg) => FeedEvent::Aggregate(msg),
            Err(e) => FeedEvent::Malformed {
                event_type,
                reason: e.to_string(),
            },
        },
        Some("status") => match serde_json::from_value::<StatusMessage>(value) {
            Ok(msg) => FeedEvent::Status(msg),
            Err(e) => FeedEvent::Malformed {
                event_type,
                reason: e.to_string(),
            },
        },
        Some(other) => FeedEvent::Unknown {
            event_type: other.to_string(),
        },
        None => FeedEvent::Malformed {
            event_type: None,
            reason: "missing ev field".to_string(),
        },
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Tests
// =============================================================================
