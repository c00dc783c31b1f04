//! Server-Sent Events (SSE) processing for generation streams.
//!
//! This module turns the raw byte stream of an HTTP response into the ordered
//! sequence of event data payloads. Interpretation of those payloads lives in
//! [`crate::frame`].

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::error::{Error, Result};
use crate::observability::STREAM_BYTES;

/// Process a stream of bytes into a stream of event data payloads.
///
/// Events without a data field are not dispatched, and an unterminated event
/// at the end of the stream is discarded.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer = String::new();
    let pending: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer, pending),
        move |(mut stream, mut buffer, mut pending)| async move {
            loop {
                // First check if we have a complete event in the buffer
                if let Some((data, remaining)) = extract_event(&buffer) {
                    buffer = remaining;
                    match data {
                        Some(data) => return Some((Ok(data), (stream, buffer, pending))),
                        None => continue,
                    }
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        pending.extend_from_slice(&bytes);
                        if let Err(e) = drain_utf8(&mut pending, &mut buffer) {
                            pending.clear();
                            return Some((Err(e), (stream, buffer, pending)));
                        }
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, pending)));
                    }
                    None => return None,
                }
            }
        },
    )
}

/// Moves the longest valid UTF-8 prefix of `pending` into `buffer`.
///
/// A multi-byte sequence cut at the end of a network chunk stays in
/// `pending` until the next chunk completes it.
fn drain_utf8(pending: &mut Vec<u8>, buffer: &mut String) -> Result<()> {
    let valid = match std::str::from_utf8(pending.as_slice()) {
        Ok(text) => {
            push_normalized(buffer, text);
            pending.len()
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let text = std::str::from_utf8(&pending[..valid])?;
            push_normalized(buffer, text);
            valid
        }
        Err(e) => {
            return Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            ));
        }
    };
    pending.drain(..valid);
    Ok(())
}

/// Appends `text`, folding CRLF into LF including pairs split across chunks.
fn push_normalized(buffer: &mut String, text: &str) {
    buffer.push_str(text);
    if buffer.contains("\r\n") {
        *buffer = buffer.replace("\r\n", "\n");
    }
}

/// Extract a complete SSE event from a buffer string.
///
/// Returns `None` while the event is incomplete. A complete event yields its
/// joined data lines, or `None` for events that carry no data.
fn extract_event(buffer: &str) -> Option<(Option<String>, String)> {
    let (event_text, rest) = buffer.split_once("\n\n")?;
    let rest = rest.to_string();

    let mut data: Option<String> = None;
    for line in event_text.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            match data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }

    Some((data.filter(|data| !data.is_empty()), rest))
}
