//! # parapool-core
//!
//! Core types and traits for the parapool concurrency toolkit.
//!
//! This crate has no opinions about scheduling policy — it is platform-agnostic plumbing shared
//! by `parapool-runtime` (the buffer/pool implementations) and `parapool` (the executor and the
//! public `execute` entry point).
//!
//! ## Modules
//!
//! - `abortable` — the completable, externally-abortable future handle
//! - `runner` — the `Runner`/`PollingRunner` traits callers implement
//! - `events` — typed notification enums (`BufferEvent`, `PoolEvent`)
//! - `error` — error types and `XxxResult` aliases
//! - `diag` — leveled diagnostic printing
//! - `constants` — shared default configuration values

pub mod abortable;
pub mod constants;
pub mod diag;
pub mod error;
pub mod events;
pub mod runner;

pub use abortable::{AbortableFuture, Completer};
pub use error::{AbortNotInstalled, BufferError, BufferResult, CallbackError, PoolError, PoolResult};
pub use events::{BufferEvent, PoolEvent};
pub use runner::{FetchOutcome, PollingRunner, Runner};
