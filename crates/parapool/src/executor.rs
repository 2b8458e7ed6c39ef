//! `ParallelExecutor`: drives bounded-concurrency callback invocation over a [`Source`].

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::oneshot;

use parapool_core::error::CallbackError;
use parapool_core::{diag_debug, AbortableFuture};

use crate::source::{resolve, Source};

/// Distinguished sentinel a callback returns to signal a cooperative abort rather than a real
/// error: it sets `ExecutorResults::aborted` and stops new tasks from starting, but is not
/// recorded among `errors` and does not count against `fulfilled`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorAbortError;

impl fmt::Display for ExecutorAbortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "executor abort requested")
    }
}

impl std::error::Error for ExecutorAbortError {}

/// The error half of a callback's `Result`: either a real failure or the abort sentinel.
#[derive(Debug)]
pub enum CallbackFailure {
    Abort(ExecutorAbortError),
    Error(CallbackError),
}

impl From<ExecutorAbortError> for CallbackFailure {
    fn from(e: ExecutorAbortError) -> Self {
        CallbackFailure::Abort(e)
    }
}

impl From<CallbackError> for CallbackFailure {
    fn from(e: CallbackError) -> Self {
        CallbackFailure::Error(e)
    }
}

impl From<String> for CallbackFailure {
    fn from(e: String) -> Self {
        CallbackFailure::Error(CallbackError::from(e))
    }
}

/// Tunables for a single `execute` call. All fields have spec-documented defaults.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Target in-flight callback count. Must be `>= 1`.
    pub parallel: usize,
    /// If false, stop starting new callbacks on the first recorded error (already-running
    /// callbacks still finish).
    pub continue_on_error: bool,
    /// If true, append non-discarded callback results to `ExecutorResults::results`.
    pub store_output: bool,
    /// If true and any errors were recorded, the returned future fails with `ExecutorError`.
    pub throw_on_error: bool,
    /// Cap on the number of errors retained; excess errors are silently dropped. `None` means
    /// unbounded.
    pub max_errors: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallel: parapool_core::constants::DEFAULT_PARALLEL,
            continue_on_error: true,
            store_output: true,
            throw_on_error: true,
            max_errors: None,
        }
    }
}

impl ExecutorConfig {
    pub fn with_parallel(mut self, n: usize) -> Self {
        assert!(n >= 1, "ExecutorConfig::parallel must be >= 1");
        self.parallel = n;
        self
    }

    pub fn with_continue_on_error(mut self, b: bool) -> Self {
        self.continue_on_error = b;
        self
    }

    pub fn with_store_output(mut self, b: bool) -> Self {
        self.store_output = b;
        self
    }

    pub fn with_throw_on_error(mut self, b: bool) -> Self {
        self.throw_on_error = b;
        self
    }

    pub fn with_max_errors(mut self, n: usize) -> Self {
        self.max_errors = Some(n);
        self
    }
}

/// Accumulated outcome of an `execute` run.
#[derive(Debug)]
pub struct ExecutorResults<V> {
    /// Non-discarded callback results, in completion order (not input order).
    pub results: Vec<V>,
    /// Recorded callback/source/teardown errors, capped by `max_errors`.
    pub errors: Vec<CallbackError>,
    /// Count of callbacks that completed without erroring or signaling abort.
    pub fulfilled: u64,
    /// `Some(true)` iff abort was requested or a callback signaled abort; `None` if abort was
    /// never relevant to this run.
    pub aborted: Option<bool>,
}

impl<V> Default for ExecutorResults<V> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            errors: Vec::new(),
            fulfilled: 0,
            aborted: None,
        }
    }
}

/// The failure value of `execute`'s future when `throw_on_error` is set and errors exist.
#[derive(Debug)]
pub struct ExecutorError<V> {
    pub results: ExecutorResults<V>,
}

impl<V: fmt::Debug> fmt::Display for ExecutorError<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "execute failed with {} error(s) ({} fulfilled)",
            self.results.errors.len(),
            self.results.fulfilled
        )
    }
}

impl<V: fmt::Debug> std::error::Error for ExecutorError<V> {}

impl<V> From<oneshot::error::RecvError> for ExecutorError<V> {
    fn from(_: oneshot::error::RecvError) -> Self {
        ExecutorError {
            results: ExecutorResults::default(),
        }
    }
}

fn push_error<V>(results: &mut ExecutorResults<V>, config: &ExecutorConfig, err: CallbackError) {
    if let Some(max) = config.max_errors {
        if results.errors.len() >= max {
            return;
        }
    }
    results.errors.push(err);
}

fn should_continue<V>(results: &ExecutorResults<V>, config: &ExecutorConfig, aborted: &AtomicBool) -> bool {
    !aborted.load(Ordering::SeqCst) && (config.continue_on_error || results.errors.is_empty())
}

fn finish<V>(results: ExecutorResults<V>, config: &ExecutorConfig) -> Result<ExecutorResults<V>, ExecutorError<V>> {
    if config.throw_on_error && !results.errors.is_empty() {
        Err(ExecutorError { results })
    } else {
        Ok(results)
    }
}

async fn drive<T, Init, V, C, Fut, TD, TDFut>(
    source: Source<T, Init>,
    callback: Arc<C>,
    config: ExecutorConfig,
    teardown: Option<TD>,
    aborted: Arc<AtomicBool>,
) -> Result<ExecutorResults<V>, ExecutorError<V>>
where
    T: Send + 'static,
    Init: Send + Sync + 'static,
    V: Send + 'static,
    C: Fn(T, Option<Arc<Init>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, CallbackFailure>> + Send + 'static,
    TD: FnOnce(Option<Arc<Init>>) -> TDFut,
    TDFut: Future<Output = ()>,
{
    let mut results = ExecutorResults::default();

    let (mut stream, init, resolution_error) = resolve(source).await;
    if let Some(e) = resolution_error {
        push_error(&mut results, &config, CallbackError::from(e));
    }
    let init = init.map(Arc::new);

    let mut exhausted = false;
    let mut in_flight = FuturesUnordered::new();

    loop {
        while in_flight.len() < config.parallel && !exhausted {
            if !should_continue(&results, &config, &aborted) {
                break;
            }
            match stream.next().await {
                Some(item) => {
                    let cb = callback.clone();
                    let init = init.clone();
                    in_flight.push(async move { cb(item, init).await });
                }
                None => exhausted = true,
            }
        }

        if in_flight.is_empty() {
            break;
        }

        if let Some(outcome) = in_flight.next().await {
            match outcome {
                Ok(value) => {
                    results.fulfilled += 1;
                    if config.store_output {
                        results.results.push(value);
                    }
                }
                Err(CallbackFailure::Abort(_)) => {
                    results.aborted = Some(true);
                    aborted.store(true, Ordering::SeqCst);
                }
                Err(CallbackFailure::Error(e)) => {
                    push_error(&mut results, &config, e);
                }
            }
        }
    }

    if let Some(teardown) = teardown {
        teardown(init).await;
    }

    diag_debug!(
        "execute finished: fulfilled={} errors={} aborted={:?}",
        results.fulfilled,
        results.errors.len(),
        results.aborted
    );

    finish(results, &config)
}

/// Drive bounded-concurrency callback invocation over `source`, returning a handle that resolves
/// to the accumulated results (or fails with [`ExecutorError`] if `throw_on_error` applies).
///
/// `teardown`, if given, runs exactly once after every in-flight callback has finished and the
/// source is exhausted (or the run was stopped), and receives the shared `init` value if the
/// source carried one.
pub fn execute<T, Init, V, C, Fut, TD, TDFut>(
    source: Source<T, Init>,
    callback: C,
    config: ExecutorConfig,
    teardown: Option<TD>,
) -> AbortableFuture<ExecutorResults<V>, ExecutorError<V>>
where
    T: Send + 'static,
    Init: Send + Sync + 'static,
    V: Send + 'static,
    C: Fn(T, Option<Arc<Init>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, CallbackFailure>> + Send + 'static,
    TD: FnOnce(Option<Arc<Init>>) -> TDFut + Send + 'static,
    TDFut: Future<Output = ()> + Send + 'static,
{
    let aborted = Arc::new(AtomicBool::new(false));
    let callback = Arc::new(callback);

    let (future, mut completer) = AbortableFuture::new({
        let aborted = aborted.clone();
        move || Arc::new(move || aborted.store(true, Ordering::SeqCst)) as Arc<dyn Fn() + Send + Sync>
    });

    tokio::spawn(async move {
        let result = drive(source, callback, config, teardown, aborted).await;
        completer.complete(result);
    });

    future
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    async fn delay_ok(v: i32, _init: Option<Arc<()>>) -> Result<i32, CallbackFailure> {
        sleep(Duration::from_millis(10)).await;
        Ok(v)
    }

    #[tokio::test]
    async fn test_empty_source() {
        let source = Source::<i32, ()>::from_iter(Vec::new());
        let result = execute(
            source,
            delay_ok,
            ExecutorConfig::default(),
            None::<fn(Option<Arc<()>>) -> std::future::Ready<()>>,
        )
        .await
        .unwrap();
        assert_eq!(result.fulfilled, 0);
        assert!(result.results.is_empty());
        assert!(result.errors.is_empty());
        assert_eq!(result.aborted, None);
    }

    #[tokio::test]
    async fn test_parallel_one_runs_sequentially() {
        let source = Source::<i32, ()>::from_iter(1..=4);
        let start = std::time::Instant::now();
        let result = execute(
            source,
            delay_ok,
            ExecutorConfig::default().with_parallel(1),
            None::<fn(Option<Arc<()>>) -> std::future::Ready<()>>,
        )
        .await
        .unwrap();
        assert_eq!(result.fulfilled, 4);
        assert!(start.elapsed() >= Duration::from_millis(38));
        let mut values = result.results;
        values.sort();
        assert_eq!(values, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_continue_on_error_records_error_and_keeps_going() {
        let source = Source::<i32, ()>::from_iter(1..=6);
        let result = execute(
            source,
            |v, _init: Option<Arc<()>>| async move {
                if v == 3 {
                    Err(CallbackFailure::from("3 failed".to_string()))
                } else {
                    sleep(Duration::from_millis(5)).await;
                    Ok(())
                }
            },
            ExecutorConfig::default()
                .with_continue_on_error(true)
                .with_throw_on_error(false)
                .with_parallel(1),
            None::<fn(Option<Arc<()>>) -> std::future::Ready<()>>,
        )
        .await
        .unwrap();
        assert_eq!(result.fulfilled, 5);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].0, "3 failed");
    }

    #[tokio::test]
    async fn test_stop_on_error_halts_new_starts() {
        let source = Source::<i32, ()>::from_iter(1..=6);
        let result = execute(
            source,
            |v, _init: Option<Arc<()>>| async move {
                if v == 3 {
                    Err(CallbackFailure::from("3 failed".to_string()))
                } else {
                    sleep(Duration::from_millis(30)).await;
                    Ok(())
                }
            },
            ExecutorConfig::default()
                .with_continue_on_error(false)
                .with_throw_on_error(false)
                .with_parallel(2),
            None::<fn(Option<Arc<()>>) -> std::future::Ready<()>>,
        )
        .await
        .unwrap();
        assert_eq!(result.fulfilled, 2);
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_abort_stops_new_starts() {
        let source = Source::<i32, ()>::from_iter(1..=6);
        let handle = execute(
            source,
            |v, _init: Option<Arc<()>>| async move {
                sleep(Duration::from_millis(50)).await;
                Ok::<_, CallbackFailure>(v)
            },
            ExecutorConfig::default().with_parallel(3),
            None::<fn(Option<Arc<()>>) -> std::future::Ready<()>>,
        );
        sleep(Duration::from_millis(20)).await;
        handle.abort();
        let start = std::time::Instant::now();
        let result = handle.await.unwrap();
        assert!(result.fulfilled >= 1 && result.fulfilled <= 3);
        assert_eq!(result.aborted, Some(true));
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_abort_sentinel_not_counted_as_error() {
        let source = Source::<i32, ()>::from_iter(1..=7);
        let result = execute(
            source,
            |v, _init: Option<Arc<()>>| async move {
                if v == 4 {
                    Err(CallbackFailure::Abort(ExecutorAbortError))
                } else {
                    Ok(())
                }
            },
            ExecutorConfig::default()
                .with_parallel(1)
                .with_continue_on_error(true)
                .with_throw_on_error(false),
            None::<fn(Option<Arc<()>>) -> std::future::Ready<()>>,
        )
        .await
        .unwrap();
        assert_eq!(result.errors.len(), 0);
        assert_eq!(result.fulfilled, 3);
        assert_eq!(result.aborted, Some(true));
    }

    #[tokio::test]
    async fn test_teardown_runs_once_with_init() {
        let source = Source::from_stream_with_init(
            futures_util::stream::iter(vec![1, 2, 3]),
            "shared-init".to_string(),
        );
        let teardown_calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let tc = teardown_calls.clone();
        let result = execute(
            source,
            |v, init: Option<Arc<String>>| async move {
                assert_eq!(init.as_deref().map(|s| s.as_str()), Some("shared-init"));
                Ok::<_, CallbackFailure>(v)
            },
            ExecutorConfig::default(),
            Some(move |init: Option<Arc<String>>| {
                let tc = tc.clone();
                async move {
                    assert_eq!(init.as_deref().map(|s| s.as_str()), Some("shared-init"));
                    tc.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
            }),
        )
        .await
        .unwrap();
        assert_eq!(result.fulfilled, 3);
        assert_eq!(teardown_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_max_errors_caps_retained_errors() {
        let source = Source::<i32, ()>::from_iter(1..=10);
        let result = execute(
            source,
            |_v, _init: Option<Arc<()>>| async move { Err(CallbackFailure::from("nope".to_string())) },
            ExecutorConfig::default()
                .with_throw_on_error(false)
                .with_max_errors(2)
                .with_parallel(4),
            None::<fn(Option<Arc<()>>) -> std::future::Ready<()>>,
        )
        .await
        .unwrap();
        assert_eq!(result.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_throw_on_error_fails_future() {
        let source = Source::<i32, ()>::from_iter(vec![1]);
        let err = execute(
            source,
            |_v, _init: Option<Arc<()>>| async move { Err(CallbackFailure::from("bad".to_string())) },
            ExecutorConfig::default(),
            None::<fn(Option<Arc<()>>) -> std::future::Ready<()>>,
        )
        .await
        .unwrap_err();
        assert_eq!(err.results.errors.len(), 1);
    }
}
