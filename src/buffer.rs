//! Append-only text accumulator for one turn.

use crate::error::{Error, Result};

/// Generated text received so far for a single turn.
///
/// Chunks are appended in arrival order. Once sealed the buffer rejects
/// further appends, so the last snapshot of a finished turn is final.
#[derive(Clone, Debug, Default)]
pub struct GenerationBuffer {
    text: String,
    chunks: usize,
    sealed: bool,
}

impl GenerationBuffer {
    /// Creates an empty, open buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk to the end of the buffer.
    pub fn append(&mut self, chunk: &str) -> Result<()> {
        if self.sealed {
            return Err(Error::streaming(
                "generation buffer is sealed; the turn has already ended",
                None,
            ));
        }
        self.text.push_str(chunk);
        self.chunks += 1;
        Ok(())
    }

    /// Returns the full current content.
    pub fn snapshot(&self) -> &str {
        &self.text
    }

    /// Number of chunks appended.
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Length of the content in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Returns true if nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Freezes the buffer.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Returns true once the buffer has been frozen.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Consumes the buffer, returning its content.
    pub fn into_string(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_in_order() {
        let mut buffer = GenerationBuffer::new();
        buffer.append("ab").unwrap();
        assert_eq!(buffer.snapshot(), "ab");
        buffer.append("cd").unwrap();
        assert_eq!(buffer.snapshot(), "abcd");
        assert_eq!(buffer.chunk_count(), 2);
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn sealed_buffer_is_immutable() {
        let mut buffer = GenerationBuffer::new();
        buffer.append("partial").unwrap();
        buffer.seal();
        assert!(buffer.append("more").is_err());
        assert_eq!(buffer.snapshot(), "partial");
        assert_eq!(buffer.into_string(), "partial");
    }
}
