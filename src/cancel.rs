use tokio_util::sync::CancellationToken;

/// One-shot cancellation trigger shared between a caller and a transfer.
///
/// Clones observe the same signal. Raising it more than once, or after the
/// transfer has finished, has no further effect.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!("cancellation requested");
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal has been raised.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}
