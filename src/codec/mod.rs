//! Record Codec
//!
//! Encodes and decodes the JSON records of both topic store layouts:
//! - `decode_event_state` / `encode_event_state`: one bare `EventState`
//!   (the V2 bucket value)
//! - `EventStates`: streaming extraction of `(event ID, raw bytes)` pairs
//!   from a V1 envelope without decoding the events
//! - `EnvelopeWriter`: streaming construction of a V1 envelope from raw
//!   event bytes
//! - `encode_topic_state` / `decode_topic_state`: the full V1 envelope
//!
//! Migrators only use the streaming halves, so moving a topic between
//! layouts never allocates one structure per event.

mod envelope;
mod scanner;

use crate::types::EventState;

pub use envelope::{decode_topic_state, encode_topic_state, EnvelopeWriter, ENVELOPE_VERSION};
pub use scanner::EventStates;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while reading or writing records
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Structural JSON error found by the streaming scanner
    #[error("syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: &'static str },
    /// Error reported by serde_json (carries line and column)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported envelope version {0}")]
    Version(i64),
    #[error("envelope has no value")]
    EmptyValue,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode a bare event state record
pub fn decode_event_state(data: &[u8]) -> CodecResult<EventState> {
    Ok(serde_json::from_slice(data)?)
}

/// Encode a bare event state record
pub fn encode_event_state(es: &EventState) -> CodecResult<Vec<u8>> {
    Ok(serde_json::to_vec(es)?)
}
