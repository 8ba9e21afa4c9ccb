//! Runtime assembly
//!
//! [`MediaServer`] wires the registry, its liveness sweeper, the relay manager
//! and the control plane together. Transports attach endpoints through
//! [`MediaServer::publish`] and [`MediaServer::play`].

pub mod config;

pub use config::ServerConfig;

use std::future::Future;
use std::sync::Arc;

use crate::av::{Handler, StreamInfo};
use crate::control::ControlPlane;
use crate::endpoint::{pipe, PipeReader, PipeWriter};
use crate::error::Result;
use crate::registry::StreamRegistry;
use crate::relay::{RelayConnector, RelayManager};

/// Media relay server
pub struct MediaServer {
    config: ServerConfig,
    registry: Arc<StreamRegistry>,
    relays: Arc<RelayManager>,
    control: ControlPlane,
}

impl MediaServer {
    /// Create a new server; `connector` opens remote relay endpoints
    pub fn new(config: ServerConfig, connector: Arc<dyn RelayConnector>) -> Self {
        let registry = Arc::new(StreamRegistry::with_config(config.registry.clone()));
        let relays = Arc::new(RelayManager::new(
            Arc::clone(&registry),
            connector,
            config.relay.clone(),
        ));
        let control = ControlPlane::new(Arc::clone(&relays), Arc::clone(&registry));

        Self {
            config,
            registry,
            relays,
            control,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get a reference to the stream registry
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    pub fn relays(&self) -> &Arc<RelayManager> {
        &self.relays
    }

    pub fn control(&self) -> &ControlPlane {
        &self.control
    }

    /// Attach a publisher; the transport feeds demuxed packets into the returned writer
    pub async fn publish(&self, info: StreamInfo) -> Result<PipeWriter> {
        let (writer, reader) = pipe(info, &self.config.publisher_pipe());
        self.registry.handle_reader(Arc::new(reader)).await?;
        Ok(writer)
    }

    /// Attach a subscriber; the transport drains the returned reader
    pub async fn play(&self, info: StreamInfo) -> Result<PipeReader> {
        let (writer, reader) = pipe(info, &self.config.subscriber_pipe());
        self.registry.handle_writer(Arc::new(writer)).await?;
        Ok(reader)
    }

    /// Run background tasks until `shutdown` resolves, then stop all relays
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let sweeper = self.registry.spawn_sweep_task();
        tracing::info!(
            sweep_interval_ms = self.config.registry.sweep_interval.as_millis() as u64,
            "Media server running"
        );

        shutdown.await;

        sweeper.abort();
        self.relays.shutdown().await;
        tracing::info!("Media server stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::av::{Packet, Reader, Writer};
    use crate::error::Error;
    use crate::registry::RegistryConfig;

    struct Unreachable;

    #[async_trait]
    impl RelayConnector for Unreachable {
        async fn play(&self, url: &str) -> Result<Arc<dyn Reader>> {
            Err(Error::Disconnected(url.to_string()))
        }

        async fn publish(&self, url: &str) -> Result<Arc<dyn Writer>> {
            Err(Error::Disconnected(url.to_string()))
        }
    }

    fn server(config: ServerConfig) -> MediaServer {
        MediaServer::new(config, Arc::new(Unreachable))
    }

    #[tokio::test]
    async fn test_publish_and_play() {
        let server = server(ServerConfig::default());
        let key = "live/room1";

        let source = server
            .publish(StreamInfo::new(key, "rtmp://localhost/live/room1"))
            .await
            .unwrap();
        let viewer = server
            .play(StreamInfo::new(key, "rtmp://localhost/live/room1"))
            .await
            .unwrap();

        source
            .write(Packet::audio(7, Bytes::from_static(&[0xAF, 0x01, 0x00])))
            .await
            .unwrap();
        assert_eq!(viewer.read().await.unwrap().timestamp, 7);

        let second = server
            .publish(StreamInfo::new(key, "rtmp://localhost/live/room1"))
            .await;
        assert!(matches!(second, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_play_unknown_stream() {
        let server = server(ServerConfig::default());
        let result = server
            .play(StreamInfo::new("live/none", "rtmp://localhost/live/none"))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_sweeps_dead_publishers() {
        let config = ServerConfig::default()
            .read_timeout(Duration::from_secs(1))
            .registry(RegistryConfig::default().sweep_interval(Duration::from_millis(500)));
        let server = server(config);

        let _source = server
            .publish(StreamInfo::new("live/room1", "rtmp://localhost/live/room1"))
            .await
            .unwrap();
        assert_eq!(server.registry().stream_count().await, 1);

        server
            .run_until(tokio::time::sleep(Duration::from_secs(3)))
            .await;
        assert_eq!(server.registry().stream_count().await, 0);
    }
}
