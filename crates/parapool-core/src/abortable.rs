//! A completable, abortable future handle.
//!
//! [`AbortableFuture`] is the return type of [`crate`]'s top-level `execute` entry point. It is
//! deliberately *not* built by extending a primitive future type: the result pipeline (a
//! one-shot channel carrying `Result<T, E>`) and the control pipeline (an `abort()` callback
//! installed by whoever constructed the handle) are kept separate so that aborting never races
//! with, or is confused for, completion.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// A handle to an in-flight operation that can be awaited for its result and aborted from the
/// outside.
///
/// Constructed via [`AbortableFuture::new`], which hands the caller both the handle and a
/// [`Completer`] the operation uses to resolve it exactly once.
pub struct AbortableFuture<T, E> {
    receiver: oneshot::Receiver<Result<T, E>>,
    abort: Arc<dyn Fn() + Send + Sync>,
}

/// The writable half of an [`AbortableFuture`], held by the operation driving it.
pub struct Completer<T, E> {
    sender: Option<oneshot::Sender<Result<T, E>>>,
}

impl<T, E> Completer<T, E> {
    /// Resolve the paired [`AbortableFuture`] with `result`. A second call is a no-op: only the
    /// first resolution is observed, matching the "completable exactly once" contract.
    pub fn complete(&mut self, result: Result<T, E>) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(result);
        }
    }
}

impl<T, E> AbortableFuture<T, E> {
    /// Create a new handle/completer pair. `install_abort` receives the handle's abort callback
    /// cell to fill in; it is always called before this function returns, so `abort()` is always
    /// backed by a real implementation for handles produced through the crate's own entry points.
    pub fn new<F>(install_abort: F) -> (Self, Completer<T, E>)
    where
        F: FnOnce() -> Arc<dyn Fn() + Send + Sync>,
    {
        let (sender, receiver) = oneshot::channel();
        let abort = install_abort();
        (
            AbortableFuture { receiver, abort },
            Completer {
                sender: Some(sender),
            },
        )
    }

    /// Request cancellation. Already-running work is not interrupted; it runs to completion and
    /// the operation's own bookkeeping marks the result as aborted. Calling this more than once,
    /// or after the future has already resolved, is always safe.
    pub fn abort(&self) {
        (self.abort)();
    }
}

impl<T, E> Future for AbortableFuture<T, E>
where
    E: From<oneshot::error::RecvError>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(recv_err)) => Poll::Ready(Err(recv_err.into())),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug)]
    struct TestError;
    impl From<oneshot::error::RecvError> for TestError {
        fn from(_: oneshot::error::RecvError) -> Self {
            TestError
        }
    }

    #[tokio::test]
    async fn test_complete_resolves_future() {
        let (future, mut completer) = AbortableFuture::<i32, TestError>::new(|| Arc::new(|| {}));
        completer.complete(Ok(42));
        assert_eq!(future.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_abort_invokes_installed_callback() {
        let aborted = Arc::new(AtomicBool::new(false));
        let aborted_clone = aborted.clone();
        let (future, mut completer) = AbortableFuture::<i32, TestError>::new(move || {
            Arc::new(move || aborted_clone.store(true, Ordering::SeqCst))
        });
        future.abort();
        assert!(aborted.load(Ordering::SeqCst));
        completer.complete(Ok(1));
    }

    #[tokio::test]
    async fn test_second_complete_is_noop() {
        let (future, mut completer) = AbortableFuture::<i32, TestError>::new(|| Arc::new(|| {}));
        completer.complete(Ok(1));
        completer.complete(Ok(2));
        assert_eq!(future.await.unwrap(), 1);
    }
}
