//! Remote endpoint factory

use std::sync::Arc;

use async_trait::async_trait;

use crate::av::{Reader, Writer};
use crate::error::Result;

/// Opens endpoints on a remote server
///
/// The wire protocol client lives outside this crate; relay sessions only
/// see the resulting [`Reader`] and [`Writer`].
#[async_trait]
pub trait RelayConnector: Send + Sync {
    /// Play a remote stream (source of a pull session)
    async fn play(&self, url: &str) -> Result<Arc<dyn Reader>>;

    /// Publish to a remote stream (destination of a push session)
    async fn publish(&self, url: &str) -> Result<Arc<dyn Writer>>;
}
