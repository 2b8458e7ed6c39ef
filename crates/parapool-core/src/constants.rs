//! Default configuration values, centralized so `Default` impls across the workspace agree.

/// Default `ExecutorConfig::parallel`.
pub const DEFAULT_PARALLEL: usize = 1;

/// Default `AsyncBufferOptions::max_size`.
pub const DEFAULT_MAX_SIZE: usize = 100;

/// Default `ConnectionPoolOptions::min_instances`.
pub const DEFAULT_MIN_INSTANCES: usize = 1;

/// Default `ConnectionPoolOptions::max_instances`.
pub const DEFAULT_MAX_INSTANCES: usize = 16;

/// Default `ConnectionPoolOptions::scale_down_at`.
pub const DEFAULT_SCALE_DOWN_AT: f64 = 0.4;

/// Default `ConnectionPoolOptions::scale_up_at`.
pub const DEFAULT_SCALE_UP_AT: f64 = 0.8;

/// Default `ConnectionPoolOptions::scale_interval`, in milliseconds.
pub const DEFAULT_SCALE_INTERVAL_MS: u64 = 1000;

/// Success-streak multiple (of instance count) after which the polling buffer requests a
/// scale-up; see `PollingAsyncBuffer`'s poll driver.
pub const POLL_SUCCESS_SCALE_UP_FACTOR: usize = 2;
