//! Error types shared across the parapool crates.

use core::fmt;

/// Result type for buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors that can occur on an [`crate::abortable::AbortableFuture`] abort call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortNotInstalled;

impl fmt::Display for AbortNotInstalled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "abort not implemented")
    }
}

impl std::error::Error for AbortNotInstalled {}

/// Errors raised by [`AsyncBuffer`](crate) operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// `push` or `pop` was attempted after `quit` had already been initiated.
    Quitting,
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::Quitting => write!(f, "buffer is quitting"),
        }
    }
}

impl std::error::Error for BufferError {}

/// Errors raised by [`ScalingConnectionPool`](crate) operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// `claim` was attempted after `quit` had already been initiated.
    Quitting,
    /// `release` was called with an instance the pool has no record of.
    UnknownInstance,
    /// `release` was called on an instance that was not currently claimed.
    NotClaimed,
    /// The runner factory failed while scaling up.
    FactoryFailed(String),
    /// A runner's `quit` failed while scaling down or during pool shutdown.
    RunnerQuitFailed(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Quitting => write!(f, "pool is quitting"),
            PoolError::UnknownInstance => write!(f, "release of unknown instance"),
            PoolError::NotClaimed => write!(f, "release of instance that was not claimed"),
            PoolError::FactoryFailed(msg) => write!(f, "runner factory failed: {msg}"),
            PoolError::RunnerQuitFailed(msg) => write!(f, "runner quit failed: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// An error produced by the user-supplied work callback, carried verbatim in
/// [`crate::ExecutorResults`]`.errors`.
///
/// Kept as an opaque, displayable/debuggable string-backed error rather than a generic
/// parameter: the executor collects errors from arbitrarily many distinct callback
/// invocations and must be able to store them side by side regardless of the callback's
/// concrete error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackError(pub String);

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CallbackError {}

impl From<String> for CallbackError {
    fn from(s: String) -> Self {
        CallbackError(s)
    }
}

impl From<&str> for CallbackError {
    fn from(s: &str) -> Self {
        CallbackError(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_error_display() {
        assert_eq!(format!("{}", BufferError::Quitting), "buffer is quitting");
    }

    #[test]
    fn test_pool_error_display() {
        let e = PoolError::FactoryFailed("boom".into());
        assert_eq!(format!("{}", e), "runner factory failed: boom");
    }

    #[test]
    fn test_callback_error_from_display() {
        let e: CallbackError = "3 failed".to_string().into();
        assert_eq!(format!("{}", e), "3 failed");
    }
}
