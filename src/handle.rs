use std::future::IntoFuture;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;

use crate::cancel::CancelSignal;
use crate::consumer::QueryResult;
use crate::{FluxReadError, Result};

/// The spawned transfer. Aborted if dropped before it finishes, which
/// drops the response stream with it.
struct TransferTask(JoinHandle<Result<QueryResult>>);

impl Drop for TransferTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

enum Transfer {
    Spawned(TransferTask),
    /// Settled before anything was spawned.
    Failed(FluxReadError),
}

/// An in-flight query started by [`crate::QueryClient::run_query`].
///
/// Await [`TransferHandle::result`] (or the handle itself) for the outcome.
/// Dropping the handle abandons the transfer.
pub struct TransferHandle {
    transfer: Transfer,
    cancel: CancelSignal,
}

impl std::fmt::Debug for TransferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.transfer {
            Transfer::Spawned(task) if task.0.is_finished() => "finished",
            Transfer::Spawned(_) => "running",
            Transfer::Failed(_) => "failed",
        };
        f.debug_struct("TransferHandle")
            .field("state", &state)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl TransferHandle {
    pub(crate) fn spawned(task: JoinHandle<Result<QueryResult>>, cancel: CancelSignal) -> Self {
        Self {
            transfer: Transfer::Spawned(TransferTask(task)),
            cancel,
        }
    }

    pub(crate) fn failed(err: FluxReadError, cancel: CancelSignal) -> Self {
        Self {
            transfer: Transfer::Failed(err),
            cancel,
        }
    }

    /// Requests cancellation. Safe to call repeatedly and after completion.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A trigger for this transfer that can be moved to another task.
    pub fn cancel_handle(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        match &self.transfer {
            Transfer::Spawned(task) => task.0.is_finished(),
            Transfer::Failed(_) => true,
        }
    }

    pub async fn result(self) -> Result<QueryResult> {
        match self.transfer {
            Transfer::Failed(err) => Err(err),
            Transfer::Spawned(mut task) => match (&mut task.0).await {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => Err(FluxReadError::Cancelled),
                Err(err) => Err(FluxReadError::Runtime(format!("query task failed: {err}"))),
            },
        }
    }
}

impl IntoFuture for TransferHandle {
    type Output = Result<QueryResult>;
    type IntoFuture = BoxFuture<'static, Result<QueryResult>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.result())
    }
}
