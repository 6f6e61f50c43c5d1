//! Byte sources the stream consumer reads from.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt, TryStreamExt};

use crate::{FluxReadError, Result};

/// A body that yields bytes chunk by chunk and can be given back early.
#[async_trait]
pub trait ByteSource: Send {
    /// Next chunk, or `None` once the body is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;

    /// Drops the underlying body. Reads after this report end of stream.
    fn release(&mut self);
}

/// A [`ByteSource`] over any fallible stream of byte chunks.
pub struct StreamSource {
    inner: Option<BoxStream<'static, Result<Bytes>>>,
}

impl StreamSource {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: Some(stream.boxed()),
        }
    }

    pub fn from_response(response: reqwest::Response) -> Self {
        Self::new(response.bytes_stream().map_err(FluxReadError::from))
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }
}

impl std::fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSource")
            .field("open", &self.is_open())
            .finish()
    }
}

#[async_trait]
impl ByteSource for StreamSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let Some(stream) = self.inner.as_mut() else {
            return Ok(None);
        };
        stream.next().await.transpose()
    }

    fn release(&mut self) {
        self.inner.take();
    }
}

/// Owns a [`ByteSource`] for one read loop and releases it exactly once,
/// either through [`ScopedSource::release`] or when dropped.
pub(crate) struct ScopedSource<S: ByteSource> {
    inner: S,
    released: bool,
}

impl<S: ByteSource> ScopedSource<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            released: false,
        }
    }

    pub(crate) async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.released {
            return Ok(None);
        }
        self.inner.next_chunk().await
    }

    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.inner.release();
        tracing::trace!("byte source released");
    }
}

impl<S: ByteSource> Drop for ScopedSource<S> {
    fn drop(&mut self) {
        self.release();
    }
}
