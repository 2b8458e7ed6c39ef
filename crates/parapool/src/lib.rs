//! # parapool
//!
//! A concurrency toolkit for bounded-parallel task execution over sequences of inputs that may
//! be produced lazily or asynchronously: a scheduler that keeps exactly `K` tasks in flight, a
//! backpressured async buffer, and an elastic pool of reusable worker instances, composed so
//! that polling-style ingestion can drive the executor.
//!
//! ## Modules
//!
//! - `source` — `Source<T, Init>`, the normalized-input union and its resolver
//! - `executor` — `ParallelExecutor`'s driving logic, `ExecutorConfig`, `ExecutorResults`,
//!   `ExecutorError`, `ExecutorAbortError`, and the public [`execute`] entry point
//!
//! Re-exported from `parapool-core`: [`AbortableFuture`], [`BufferEvent`], [`PoolEvent`],
//! [`Runner`], [`PollingRunner`], [`FetchOutcome`].
//!
//! Re-exported from `parapool-runtime`: [`AsyncBuffer`], [`ScalingConnectionPool`], [`PoolGuard`],
//! [`PollingAsyncBuffer`], [`AsyncBufferOptions`], [`ConnectionPoolOptions`].

pub mod executor;
pub mod source;

pub use executor::{execute, CallbackFailure, ExecutorAbortError, ExecutorConfig, ExecutorError, ExecutorResults};
pub use source::{resolve as resolve_source, BoxStream, Source};

pub use parapool_core::{AbortableFuture, BufferEvent, FetchOutcome, PollingRunner, PoolEvent, Runner};
pub use parapool_core::error::CallbackError;
pub use parapool_runtime::{
    AsyncBuffer, AsyncBufferOptions, ConnectionPoolOptions, PollingAsyncBuffer, PoolGuard, ScalingConnectionPool,
};
