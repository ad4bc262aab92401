//! Per-request handle: a future for the single result plus cancellation.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use log::warn;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::dispatch::CallbackContext;
use crate::error::ApiError;

/// Cancels one specific in-flight request.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    abort: AbortHandle,
}

impl CancelHandle {
    /// Stops the request. Its task then resolves with a cancelled error,
    /// unless it had already finished.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// An issued request. Resolves exactly once.
///
/// The request runs whether or not this value is polled; dropping it only
/// discards the result.
#[must_use = "dropping an ApiTask discards its result"]
pub struct ApiTask<T> {
    receiver: oneshot::Receiver<Result<T, ApiError>>,
    cancel: CancelHandle,
}

impl<T: Send + 'static> ApiTask<T> {
    /// Spawns `work` on the current Tokio runtime.
    pub(crate) fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let result = work.await;
            // The receiver may be gone; the request still counts as done.
            let _ = sender.send(result);
        });

        Self {
            receiver,
            cancel: CancelHandle {
                abort: handle.abort_handle(),
            },
        }
    }

    /// A task that is already resolved, used when the request could not
    /// even be built.
    pub(crate) fn ready(result: Result<T, ApiError>) -> Self {
        Self::spawn(async move { result })
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Delivers the result to `callback` on `context`, exactly once.
    pub fn on_complete<F>(self, context: &CallbackContext, callback: F)
    where
        F: FnOnce(Result<T, ApiError>) + Send + 'static,
    {
        let context = context.clone();
        tokio::spawn(async move {
            let result = self.await;
            if !context.dispatch(move || callback(result)) {
                warn!("Callback context is closed, dropping request result");
            }
        });
    }
}

impl<T> Future for ApiTask<T> {
    type Output = Result<T, ApiError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(ApiError::cancelled())))
    }
}
