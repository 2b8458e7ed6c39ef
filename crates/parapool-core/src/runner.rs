//! Runner traits — the caller-supplied contract a [`ScalingConnectionPool`](crate) manages.
//!
//! # Implementors
//!
//! Callers provide a concrete type implementing [`Runner`] (and, for polling sources,
//! [`PollingRunner`]) along with a factory closure. The pool owns each runner exclusively between
//! creation and [`Runner::quit`]; it never calls a runner's methods concurrently with itself.

use std::future::Future;

/// A pooled worker instance.
///
/// The pool calls [`quit`](Runner::quit) exactly once per instance, on scale-down or on pool
/// shutdown, and never calls any other method on the instance afterwards.
pub trait Runner: Send + 'static {
    /// Release any resources held by this runner. Errors are reported to the pool's error event
    /// channel; they do not block the pool from completing the scale-down or shutdown.
    fn quit(self) -> impl Future<Output = Result<(), String>> + Send;
}

/// The outcome of a single [`PollingRunner::fetch`] call.
///
/// `Timeout` and `Empty` are kept distinct even though the polling buffer's pool reacts to them
/// identically (see `PollingAsyncBuffer`): `Timeout` means the runner's underlying poll returned
/// without a batch at all (e.g. a blocking-queue read that hit its wait deadline), while `Empty`
/// means the runner did receive an answer, and the answer was an empty batch. Callers that care
/// about the difference (metrics, logging) can match on it; the pool's scaling logic does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<T> {
    /// The poll timed out before any batch was produced.
    Timeout,
    /// The poll completed with a batch, which happened to be empty.
    Empty,
    /// The poll completed with a non-empty batch of items.
    Batch(Vec<T>),
}

impl<T> FetchOutcome<T> {
    /// True for both [`FetchOutcome::Timeout`] and [`FetchOutcome::Empty`] — the two outcomes
    /// that drive the polling buffer's reap-on-idle logic.
    pub fn is_idle(&self) -> bool {
        matches!(self, FetchOutcome::Timeout | FetchOutcome::Empty)
    }
}

/// A [`Runner`] that can also be driven to fetch batches of items, for use as the engine behind
/// a [`PollingAsyncBuffer`](crate).
pub trait PollingRunner<T>: Runner {
    /// Fetch the next batch of items, or report that the poll came back idle.
    ///
    /// Errors are surfaced as a protocol error on the polling buffer's error channel; a runner
    /// that wants to signal "nothing right now, try again" should return
    /// [`FetchOutcome::Timeout`] or [`FetchOutcome::Empty`], not an `Err`.
    fn fetch(&mut self) -> impl Future<Output = Result<FetchOutcome<T>, String>> + Send;
}
