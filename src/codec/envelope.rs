//! V1 envelope encoding
//!
//! `{"version":1,"value":{"topic":<name>,"event-states":{<id>:<event>,...}}}`

use std::io::Write;

use serde::{Deserialize, Serialize};

use super::{CodecError, CodecResult};
use crate::types::TopicState;

/// Version number written into every V1 envelope
pub const ENVELOPE_VERSION: i64 = 1;

#[derive(Serialize)]
struct Envelope<'a> {
    version: i64,
    value: &'a TopicState,
}

#[derive(Deserialize)]
struct OwnedEnvelope {
    version: i64,
    value: Option<TopicState>,
}

/// Encode a topic state as a V1 envelope
pub fn encode_topic_state(ts: &TopicState) -> CodecResult<Vec<u8>> {
    Ok(serde_json::to_vec(&Envelope {
        version: ENVELOPE_VERSION,
        value: ts,
    })?)
}

/// Decode a V1 envelope into a topic state
pub fn decode_topic_state(data: &[u8]) -> CodecResult<TopicState> {
    let envelope: OwnedEnvelope = serde_json::from_slice(data)?;
    if envelope.version != ENVELOPE_VERSION {
        return Err(CodecError::Version(envelope.version));
    }
    envelope.value.ok_or(CodecError::EmptyValue)
}

/// Streaming writer for one V1 envelope
///
/// Event values are written verbatim, so bytes taken from a V2 bucket come
/// back out exactly as they went in. The output matches
/// `encode_topic_state` byte for byte when fed the same events in key order.
pub struct EnvelopeWriter<W: Write> {
    out: W,
    events: usize,
}

impl<W: Write> EnvelopeWriter<W> {
    /// Write the envelope header for `topic`
    pub fn begin(mut out: W, topic: &str) -> CodecResult<Self> {
        write!(out, r#"{{"version":{},"value":{{"topic":"#, ENVELOPE_VERSION)?;
        serde_json::to_writer(&mut out, topic)?;
        out.write_all(br#","event-states":{"#)?;
        Ok(Self { out, events: 0 })
    }

    /// Append one event; `raw` must already be a serialized event state
    pub fn event(&mut self, id: &str, raw: &[u8]) -> CodecResult<()> {
        if self.events > 0 {
            self.out.write_all(b",")?;
        }
        serde_json::to_writer(&mut self.out, id)?;
        self.out.write_all(b":")?;
        self.out.write_all(raw)?;
        self.events += 1;
        Ok(())
    }

    /// Number of events written so far
    pub fn events(&self) -> usize {
        self.events
    }

    /// Close the envelope and hand back the writer
    pub fn finish(mut self) -> CodecResult<W> {
        self.out.write_all(b"}}}")?;
        Ok(self.out)
    }
}
