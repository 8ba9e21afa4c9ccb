//! Registry configuration

use std::time::Duration;

/// Configuration for the stream registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How often the liveness sweeper runs
    pub sweep_interval: Duration,

    /// How long a stream survives without a publisher while subscribers wait
    pub publisher_grace_period: Duration,

    /// Maximum GOP cache size in bytes
    pub max_gop_size: usize,

    /// Cache metadata, sequence headers and the current GOP for late joiners
    pub cache_enabled: bool,

    /// Longest a single subscriber write may suspend before the subscriber
    /// counts as a slow consumer
    pub delivery_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5),
            publisher_grace_period: Duration::from_secs(10),
            max_gop_size: 4 * 1024 * 1024, // 4MB
            cache_enabled: true,
            delivery_timeout: Duration::from_secs(1),
        }
    }
}

impl RegistryConfig {
    /// Set the liveness sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the publisher grace period
    pub fn publisher_grace_period(mut self, period: Duration) -> Self {
        self.publisher_grace_period = period;
        self
    }

    /// Set the GOP cache limit
    pub fn max_gop_size(mut self, size: usize) -> Self {
        self.max_gop_size = size;
        self
    }

    /// Set the per-subscriber delivery bound
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Disable late-joiner caching
    pub fn disable_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }
}
