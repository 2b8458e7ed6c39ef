//! Configuration structs for `AsyncBuffer` and `ScalingConnectionPool`.

use std::time::Duration;

use parapool_core::constants::{
    DEFAULT_MAX_INSTANCES, DEFAULT_MAX_SIZE, DEFAULT_MIN_INSTANCES, DEFAULT_SCALE_DOWN_AT,
    DEFAULT_SCALE_INTERVAL_MS, DEFAULT_SCALE_UP_AT,
};

/// Options controlling an [`crate::AsyncBuffer`]'s capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsyncBufferOptions {
    /// Maximum number of items the buffer holds before `push` suspends. Must be `>= 1`.
    pub max_size: usize,
}

impl Default for AsyncBufferOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl AsyncBufferOptions {
    /// Set the maximum buffer size.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        assert!(max_size >= 1, "AsyncBufferOptions::max_size must be >= 1");
        self.max_size = max_size;
        self
    }
}

/// Options controlling a [`crate::ScalingConnectionPool`]'s elastic behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionPoolOptions {
    /// Minimum instance count the pool maintains at steady state.
    pub min_instances: usize,
    /// Maximum instance count the pool will scale up to.
    pub max_instances: usize,
    /// Utilization below which the pool scales down, once above `min_instances`.
    pub scale_down_at: f64,
    /// Utilization above which the pool scales up, once below `max_instances`.
    pub scale_up_at: f64,
    /// Period of the auto-scale usage tick.
    pub scale_interval: Duration,
    /// Whether a claim miss while below `max_instances` triggers an immediate scale-up instead
    /// of waiting for the next tick.
    pub responsive_scale: bool,
    /// Whether the periodic usage tick runs at all. When `false`, `responsive_scale` is also
    /// effectively disabled, but the pool still converges to `min_instances` on startup.
    pub auto_scale: bool,
}

impl Default for ConnectionPoolOptions {
    fn default() -> Self {
        Self {
            min_instances: DEFAULT_MIN_INSTANCES,
            max_instances: DEFAULT_MAX_INSTANCES,
            scale_down_at: DEFAULT_SCALE_DOWN_AT,
            scale_up_at: DEFAULT_SCALE_UP_AT,
            scale_interval: Duration::from_millis(DEFAULT_SCALE_INTERVAL_MS),
            responsive_scale: true,
            auto_scale: true,
        }
    }
}

impl ConnectionPoolOptions {
    /// Validate the documented invariants (`min <= max`, thresholds in `[0,1]`,
    /// `scale_down_at < scale_up_at`). Called by `ScalingConnectionPool::new`.
    pub fn validate(&self) {
        assert!(
            self.min_instances <= self.max_instances,
            "min_instances must be <= max_instances"
        );
        assert!(
            (0.0..=1.0).contains(&self.scale_down_at) && (0.0..=1.0).contains(&self.scale_up_at),
            "scale thresholds must be in [0, 1]"
        );
        assert!(
            self.scale_down_at < self.scale_up_at,
            "scale_down_at must be < scale_up_at"
        );
    }

    pub fn with_min_instances(mut self, n: usize) -> Self {
        self.min_instances = n;
        self
    }

    pub fn with_max_instances(mut self, n: usize) -> Self {
        self.max_instances = n;
        self
    }

    pub fn with_scale_down_at(mut self, v: f64) -> Self {
        self.scale_down_at = v;
        self
    }

    pub fn with_scale_up_at(mut self, v: f64) -> Self {
        self.scale_up_at = v;
        self
    }

    pub fn with_scale_interval(mut self, d: Duration) -> Self {
        self.scale_interval = d;
        self
    }

    pub fn with_responsive_scale(mut self, b: bool) -> Self {
        self.responsive_scale = b;
        self
    }

    pub fn with_auto_scale(mut self, b: bool) -> Self {
        self.auto_scale = b;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_options_default() {
        assert_eq!(AsyncBufferOptions::default().max_size, DEFAULT_MAX_SIZE);
    }

    #[test]
    #[should_panic(expected = "max_size must be >= 1")]
    fn test_buffer_options_rejects_zero() {
        AsyncBufferOptions::default().with_max_size(0);
    }

    #[test]
    fn test_pool_options_default_is_valid() {
        ConnectionPoolOptions::default().validate();
    }

    #[test]
    #[should_panic(expected = "min_instances must be <= max_instances")]
    fn test_pool_options_rejects_min_over_max() {
        ConnectionPoolOptions::default()
            .with_min_instances(5)
            .with_max_instances(1)
            .validate();
    }
}
