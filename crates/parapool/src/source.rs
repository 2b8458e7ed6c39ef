//! The union of shapes `execute` accepts as its input sequence, normalized to a single boxed
//! stream (plus an optional `init` value) by [`resolve`].

use std::future::Future;
use std::pin::Pin;

use futures_core::Stream;
use futures_util::stream::{self, StreamExt};

/// A boxed, owned, `Send` stream — the normalized shape every [`Source`] resolves to.
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// The shapes an `execute` input sequence may take.
///
/// A single tagged enum rather than five separate entry points, resolved in one place
/// ([`resolve`]) before scheduling begins.
pub enum Source<T, Init> {
    /// A finite, already-in-hand sequence.
    Iter(Box<dyn Iterator<Item = T> + Send>),
    /// A lazy asynchronous sequence with no accompanying init value.
    Stream(BoxStream<T>),
    /// A lazy asynchronous sequence paired with an init value threaded into the callback and
    /// teardown.
    WithInit(BoxStream<T>, Init),
    /// A future resolving to any other `Source` shape (including another `Future` or
    /// `Producer`, resolved recursively).
    Future(Pin<Box<dyn Future<Output = Source<T, Init>> + Send>>),
    /// A producer invoked once to obtain the real source. Its own error is recorded as a single
    /// `SourceResolutionError` and the run proceeds straight to teardown with an empty stream.
    Producer(Box<dyn FnOnce() -> Result<Source<T, Init>, String> + Send>),
}

impl<T, Init> Source<T, Init>
where
    T: Send + 'static,
    Init: Send + 'static,
{
    /// Build a `Source` from any `IntoIterator`.
    pub fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T> + Send + 'static,
        I::IntoIter: Send + 'static,
    {
        Source::Iter(Box::new(iter.into_iter()))
    }

    /// Build a `Source` from a `Stream` with no init value.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Source::Stream(Box::pin(stream))
    }

    /// Build a `Source` from a `Stream` paired with an init value.
    pub fn from_stream_with_init<S>(stream: S, init: Init) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Source::WithInit(Box::pin(stream), init)
    }

    /// Build a `Source` from a future that resolves to another `Source`.
    pub fn from_future<F>(fut: F) -> Self
    where
        F: Future<Output = Source<T, Init>> + Send + 'static,
    {
        Source::Future(Box::pin(fut))
    }

    /// Build a `Source` from a fallible producer function.
    pub fn from_producer<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<Source<T, Init>, String> + Send + 'static,
    {
        Source::Producer(Box::new(f))
    }
}

/// Resolve a `Source` to a normalized stream plus optional init value.
///
/// A producer's own error is captured here rather than propagated via `?`/panic: it becomes a
/// single recorded error and an empty stream, so the executor still runs its teardown and
/// finishes cleanly instead of aborting the whole call.
pub async fn resolve<T, Init>(source: Source<T, Init>) -> (BoxStream<T>, Option<Init>, Option<String>)
where
    T: Send + 'static,
    Init: Send + 'static,
{
    match source {
        Source::Iter(iter) => (Box::pin(stream::iter(iter)), None, None),
        Source::Stream(s) => (s, None, None),
        Source::WithInit(s, init) => (s, Some(init), None),
        Source::Future(fut) => {
            let inner = fut.await;
            // Async recursion needs boxing; `resolve` itself is already behind a `Box::pin` at
            // every call site that reaches here, so this does not grow unboundedly for any
            // finite chain of `Future`/`Producer` wrapping.
            Box::pin(resolve(inner)).await
        }
        Source::Producer(f) => match f() {
            Ok(inner) => Box::pin(resolve(inner)).await,
            Err(e) => (Box::pin(stream::empty()), None, Some(e)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt as _;

    #[tokio::test]
    async fn test_resolve_iter() {
        let source = Source::<i32, ()>::from_iter(vec![1, 2, 3]);
        let (mut stream, init, err) = resolve(source).await;
        assert!(init.is_none());
        assert!(err.is_none());
        let mut out = Vec::new();
        while let Some(v) = stream.next().await {
            out.push(v);
        }
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_resolve_future_of_with_init() {
        let source = Source::<i32, &'static str>::from_future(async {
            Source::from_stream_with_init(stream::iter(vec![4, 5]), "init-value")
        });
        let (mut stream, init, err) = resolve(source).await;
        assert_eq!(init, Some("init-value"));
        assert!(err.is_none());
        assert_eq!(stream.next().await, Some(4));
    }

    #[tokio::test]
    async fn test_resolve_producer_error() {
        let source = Source::<i32, ()>::from_producer(|| Err("boom".to_string()));
        let (mut stream, init, err) = resolve(source).await;
        assert!(init.is_none());
        assert_eq!(err, Some("boom".to_string()));
        assert_eq!(stream.next().await, None);
    }
}
