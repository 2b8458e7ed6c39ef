//! Typed notification channels.
//!
//! The teacher crate this workspace grew from has no string-keyed event emitter anywhere in its
//! core types, and neither does this one: each component that needs to notify observers defines a
//! small closed `enum` and broadcasts it over a [`tokio::sync::broadcast`] channel. Subscribers
//! that lag behind the broadcast's ring buffer simply miss old notifications (see
//! [`tokio::sync::broadcast::error::RecvError::Lagged`]); every notification here is advisory
//! (logging, metrics, test assertions), never load-bearing for correctness, so lag is harmless.

use std::fmt;

/// Notifications emitted by an `AsyncBuffer`.
#[derive(Debug, Clone)]
pub enum BufferEvent {
    /// An item was pushed; carries the buffer length immediately after the push.
    Pushed { len: usize },
    /// An item was popped; carries the buffer length immediately after the pop.
    Popped { len: usize },
    /// The buffer's effective capacity changed (emitted by composing components, e.g.
    /// `PollingAsyncBuffer`, which piggybacks its pool's scale events on the buffer channel).
    Scale,
    /// A non-fatal protocol or usage error occurred.
    Error(String),
}

impl fmt::Display for BufferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferEvent::Pushed { len } => write!(f, "pushed (len={len})"),
            BufferEvent::Popped { len } => write!(f, "popped (len={len})"),
            BufferEvent::Scale => write!(f, "scale"),
            BufferEvent::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Notifications emitted by a `ScalingConnectionPool`.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// A runner became available for claiming, either freshly created or just released.
    /// Carries the instance's index in the pool's internal wrapper list.
    Available { index: usize },
    /// A runner was released back to the pool (whether or not it went on to become available).
    Released { index: usize },
    /// The pool's instance count changed (scale-up or scale-down completed).
    Scale { instance_count: usize },
    /// A usage-tick sample was taken.
    Usage(f64),
    /// A non-fatal error occurred (factory failure, runner quit failure, usage error).
    Error(String),
}

impl fmt::Display for PoolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolEvent::Available { index } => write!(f, "available (index={index})"),
            PoolEvent::Released { index } => write!(f, "released (index={index})"),
            PoolEvent::Scale { instance_count } => {
                write!(f, "scale (instance_count={instance_count})")
            }
            PoolEvent::Usage(u) => write!(f, "usage ({u:.3})"),
            PoolEvent::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}
