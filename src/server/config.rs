//! Server configuration

use std::time::Duration;

use crate::endpoint::{Backpressure, PipeConfig};
use crate::registry::RegistryConfig;
use crate::relay::RelayConfig;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Publisher liveness window (disconnect if no data received)
    pub read_timeout: Duration,

    /// Subscriber liveness window (disconnect if nothing could be sent)
    pub write_timeout: Duration,

    /// Queue capacity of each publisher and subscriber endpoint, in packets
    pub subscriber_queue: usize,

    /// Stream registry settings
    pub registry: RegistryConfig,

    /// Relay session settings
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            subscriber_queue: 1024,
            registry: RegistryConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Set the publisher liveness window
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the subscriber liveness window
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the per-endpoint queue capacity
    pub fn subscriber_queue(mut self, capacity: usize) -> Self {
        self.subscriber_queue = capacity.max(1);
        self
    }

    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    pub fn relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    /// Disable GOP caching for late joiners
    pub fn disable_gop_cache(mut self) -> Self {
        self.registry = self.registry.disable_cache();
        self
    }

    /// Pipe settings for a publisher: ingest waits instead of dropping
    pub fn publisher_pipe(&self) -> PipeConfig {
        PipeConfig::default()
            .capacity(self.subscriber_queue)
            .timeout(self.read_timeout)
            .backpressure(Backpressure::Wait)
    }

    /// Pipe settings for a subscriber: a full queue marks a slow consumer
    pub fn subscriber_pipe(&self) -> PipeConfig {
        PipeConfig::default()
            .capacity(self.subscriber_queue)
            .timeout(self.write_timeout)
            .backpressure(Backpressure::Reject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.subscriber_queue, 1024);
        assert!(config.registry.cache_enabled);
        assert_eq!(config.relay.local_rtmp_addr, ":1935");
    }

    #[test]
    fn test_builder_subscriber_queue_floor() {
        let config = ServerConfig::default().subscriber_queue(0);

        assert_eq!(config.subscriber_queue, 1);
    }

    #[test]
    fn test_builder_disable_gop_cache() {
        let config = ServerConfig::default().disable_gop_cache();

        assert!(!config.registry.cache_enabled);
    }

    #[test]
    fn test_pipe_configs() {
        let config = ServerConfig::default()
            .read_timeout(Duration::from_secs(30))
            .write_timeout(Duration::from_secs(5))
            .subscriber_queue(64);

        let publisher = config.publisher_pipe();
        assert_eq!(publisher.capacity, 64);
        assert_eq!(publisher.timeout, Duration::from_secs(30));
        assert_eq!(publisher.backpressure, Backpressure::Wait);

        let subscriber = config.subscriber_pipe();
        assert_eq!(subscriber.capacity, 64);
        assert_eq!(subscriber.timeout, Duration::from_secs(5));
        assert_eq!(subscriber.backpressure, Backpressure::Reject);
    }

    #[test]
    fn test_builder_chaining() {
        let config = ServerConfig::default()
            .registry(RegistryConfig::default().publisher_grace_period(Duration::from_secs(2)))
            .relay(RelayConfig::default().local_rtmp_addr(":1936"))
            .read_timeout(Duration::from_secs(20));

        assert_eq!(config.registry.publisher_grace_period, Duration::from_secs(2));
        assert_eq!(config.relay.local_rtmp_addr, ":1936");
        assert_eq!(config.read_timeout, Duration::from_secs(20));
    }
}
