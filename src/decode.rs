//! Incremental UTF-8 decoding for chunked response bodies.

use crate::{FluxReadError, Result};

/// Decodes a byte stream into text one chunk at a time.
///
/// A multi-byte character split across two chunks is held back until the
/// rest of its bytes arrive, so every returned fragment is complete text.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
    offset: u64,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes held back from the previous chunk (at most 3).
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> Result<String> {
        let joined;
        let input: &[u8] = if self.pending.is_empty() {
            chunk
        } else {
            let mut buffered = std::mem::take(&mut self.pending);
            buffered.extend_from_slice(chunk);
            joined = buffered;
            joined.as_slice()
        };
        let start = self.offset;

        match std::str::from_utf8(input) {
            Ok(text) => {
                self.offset = start.saturating_add(input.len() as u64);
                Ok(text.to_owned())
            }
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                if err.error_len().is_some() {
                    return Err(FluxReadError::Decode(format!(
                        "invalid byte sequence at offset {}",
                        start.saturating_add(valid_up_to as u64)
                    )));
                }

                let (complete, tail) = input.split_at(valid_up_to);
                let text = std::str::from_utf8(complete)
                    .map_err(|err| FluxReadError::Decode(err.to_string()))?
                    .to_owned();
                self.pending = tail.to_vec();
                self.offset = start.saturating_add(valid_up_to as u64);
                Ok(text)
            }
        }
    }

    /// Fails if the stream ended in the middle of a multi-byte character.
    pub fn finish(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let dangling = std::mem::take(&mut self.pending);
        Err(FluxReadError::Decode(format!(
            "stream ended inside a multi-byte sequence ({} dangling bytes at offset {})",
            dangling.len(),
            self.offset
        )))
    }
}
