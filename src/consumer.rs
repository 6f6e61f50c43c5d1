use crate::cancel::CancelSignal;
use crate::decode::Utf8ChunkDecoder;
use crate::lines::{floor_char_boundary, trim_to_last_newline};
use crate::source::{ByteSource, ScopedSource};
use crate::{FluxReadError, Result};

/// Text read from one query response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    /// Decoded body. When `truncated` is set this stops at a row boundary.
    pub text: String,
    /// Whether reading stopped because `byte_cap` was exceeded.
    pub truncated: bool,
    /// Raw bytes observed, including any discarded tail.
    pub bytes_read: u64,
}

/// Reads `source` to completion or until more than `byte_cap` bytes have
/// arrived.
///
/// Once the cap is crossed, the part of the crossing chunk that still fits is
/// kept up to its last newline and no further chunks are requested. The source is released on
/// every exit path. If `cancel` was raised the result is always
/// [`FluxReadError::Cancelled`], even when the source failed at the same time.
pub async fn consume<S: ByteSource>(
    source: S,
    byte_cap: u64,
    cancel: &CancelSignal,
) -> Result<QueryResult> {
    let mut source = ScopedSource::new(source);
    let outcome = read_loop(&mut source, byte_cap, cancel).await;
    source.release();

    match outcome {
        Err(err) if cancel.is_cancelled() && !err.is_cancelled() => {
            tracing::debug!(error = %err, "discarding stream error after cancellation");
            Err(FluxReadError::Cancelled)
        }
        outcome => outcome,
    }
}

async fn read_loop<S: ByteSource>(
    source: &mut ScopedSource<S>,
    byte_cap: u64,
    cancel: &CancelSignal,
) -> Result<QueryResult> {
    let mut decoder = Utf8ChunkDecoder::new();
    let mut text = String::new();
    let mut bytes_read: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(bytes_read, "query stream cancelled");
                return Err(FluxReadError::Cancelled);
            }
            next = source.next_chunk() => next,
        };
        let Some(chunk) = next? else {
            break;
        };

        let decoded = decoder.decode(&chunk)?;
        bytes_read = bytes_read.saturating_add(chunk.len() as u64);

        if bytes_read > byte_cap {
            append_within_cap(&mut text, &decoded, byte_cap);
            tracing::debug!(bytes_read, byte_cap, "byte cap exceeded, truncating");
            return Ok(QueryResult {
                text,
                truncated: true,
                bytes_read,
            });
        }

        text.push_str(&decoded);
    }

    decoder.finish()?;
    Ok(QueryResult {
        text,
        truncated: false,
        bytes_read,
    })
}

/// Appends the part of `chunk` that still fits under `byte_cap`, then cuts
/// the text back to its last complete row.
///
/// A chunk with no newline at all has no row boundary to cut at and is kept
/// whole.
fn append_within_cap(text: &mut String, chunk: &str, byte_cap: u64) {
    if !chunk.contains('\n') {
        text.push_str(chunk);
        return;
    }

    let room = usize::try_from(byte_cap.saturating_sub(text.len() as u64)).unwrap_or(usize::MAX);
    text.push_str(&chunk[..floor_char_boundary(chunk, room)]);

    let kept = trim_to_last_newline(text);
    let kept = if kept.ends_with('\n') { kept.len() } else { 0 };
    text.truncate(kept);
}
