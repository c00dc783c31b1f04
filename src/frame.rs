//! Classification of inbound event payloads.
//!
//! The backend multiplexes control signals and generated text on one event
//! channel. Two literal sentinels are reserved for control; every other
//! payload is a base64-encoded UTF-8 chunk. Sentinels are matched exactly
//! before any decode is attempted.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Payload announcing that generation has started.
pub const PROCESSING_SENTINEL: &str = "[PROCESSING]";

/// Payload announcing the end of the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded event from the generation stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamFrame {
    /// The backend accepted the prompt and is generating.
    Processing,
    /// The backend finished; no further frames follow.
    Done,
    /// A chunk of generated text.
    DataChunk(String),
    /// A payload that is neither a sentinel nor valid encoded text.
    Malformed(String),
}

impl StreamFrame {
    /// Returns true for the control signals.
    pub fn is_control(&self) -> bool {
        matches!(self, StreamFrame::Processing | StreamFrame::Done)
    }
}

/// Decodes one event payload into a [`StreamFrame`].
pub fn decode(payload: &str) -> StreamFrame {
    if payload == PROCESSING_SENTINEL {
        return StreamFrame::Processing;
    }
    if payload == DONE_SENTINEL {
        return StreamFrame::Done;
    }
    let bytes = match STANDARD.decode(payload) {
        Ok(bytes) => bytes,
        Err(e) => return StreamFrame::Malformed(format!("invalid base64: {e}")),
    };
    match String::from_utf8(bytes) {
        Ok(text) => StreamFrame::DataChunk(text),
        Err(e) => StreamFrame::Malformed(format!("chunk is not UTF-8: {e}")),
    }
}

/// Encodes text the way the backend frames data chunks.
pub fn encode_chunk(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}
