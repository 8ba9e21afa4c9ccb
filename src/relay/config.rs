//! Relay configuration

use std::time::Duration;

use crate::endpoint::PipeConfig;

/// Configuration for relay sessions
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address suffix of the local RTMP listener, e.g. `":1935"`
    pub local_rtmp_addr: String,

    /// How long `stop` waits for a pump task before aborting it
    pub stop_timeout: Duration,

    /// Queue settings for the local side of each session
    pub pipe: PipeConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            local_rtmp_addr: ":1935".to_string(),
            stop_timeout: Duration::from_secs(3),
            pipe: PipeConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Set the local listener address suffix
    pub fn local_rtmp_addr(mut self, addr: impl Into<String>) -> Self {
        self.local_rtmp_addr = addr.into();
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn pipe(mut self, pipe: PipeConfig) -> Self {
        self.pipe = pipe;
        self
    }

    /// URL under which a relayed stream is served locally
    pub fn local_url(&self, app: &str, channel_key: &str) -> String {
        format!("rtmp://127.0.0.1{}/{}/{}", self.local_rtmp_addr, app, channel_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_local_url() {
        let config = RelayConfig::default();
        assert_eq!(config.local_url("live", "key1"), "rtmp://127.0.0.1:1935/live/key1");
        assert_eq!(config.stop_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_builder_chaining() {
        let config = RelayConfig::default()
            .local_rtmp_addr(":1936")
            .stop_timeout(Duration::from_millis(500))
            .pipe(PipeConfig::default().capacity(8));

        assert_eq!(config.local_url("app", "ck"), "rtmp://127.0.0.1:1936/app/ck");
        assert_eq!(config.stop_timeout, Duration::from_millis(500));
        assert_eq!(config.pipe.capacity, 8);
    }
}
