//! Relay session types and the packet pump

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::av::{Reader, Writer};
use crate::error::{Error, Result};
use crate::registry::{Participant, StreamRegistry};

/// Direction of a relay session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayOperation {
    /// Play from a remote server, publish locally
    Pull,
    /// Play locally, publish to a remote server
    Push,
}

impl RelayOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayOperation::Pull => "pull",
            RelayOperation::Push => "push",
        }
    }
}

impl fmt::Display for RelayOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelayOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pull" => Ok(RelayOperation::Pull),
            "push" => Ok(RelayOperation::Push),
            other => Err(Error::InvalidParameter(format!("unknown relay operation: {other}"))),
        }
    }
}

/// Session table key: `"<op>:<app>/<channelKey>"`
pub fn session_key(operation: RelayOperation, app: &str, channel_key: &str) -> String {
    format!("{operation}:{app}/{channel_key}")
}

/// Public view of a relay session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub key: String,
    pub operation: RelayOperation,
    pub source_url: String,
    pub target_url: String,
    /// False while the session is still connecting
    pub running: bool,
}

/// The local end of a session as registered with the registry
#[derive(Clone)]
pub(crate) enum LocalSide {
    /// Pull: the local pipe reader publishes into the registry
    Publisher(Arc<dyn Reader>),
    /// Push: the local pipe writer subscribes to the registry
    Subscriber(Arc<dyn Writer>),
}

/// Everything a session needs to tear itself down
#[derive(Clone)]
pub(crate) struct Endpoints {
    pub source: Arc<dyn Reader>,
    pub dest: Arc<dyn Writer>,
    pub local: LocalSide,
    /// Registry key of the local stream
    pub local_key: String,
}

impl Endpoints {
    /// Close the pumped pair only
    pub fn finish(&self, err: Error) {
        self.source.close(err.clone());
        self.dest.close(err);
    }

    /// Close every endpoint of the session
    pub fn close(&self, err: Error) {
        self.finish(err.clone());
        match &self.local {
            LocalSide::Publisher(reader) => reader.close(err),
            LocalSide::Subscriber(writer) => writer.close(err),
        }
    }

    /// Close everything and drop the local participant from the registry
    pub async fn release(&self, registry: &StreamRegistry, err: Error) {
        self.close(err);
        let participant = match &self.local {
            LocalSide::Publisher(reader) => Participant::Publisher(reader.info().uid),
            LocalSide::Subscriber(writer) => Participant::Subscriber(writer.info().uid),
        };
        registry.unregister(&self.local_key, &participant).await;
    }
}

/// A running relay session
pub(crate) struct RelaySession {
    /// Distinguishes this session from a later one under the same key
    pub id: u64,
    pub info: SessionInfo,
    pub cancel: CancellationToken,
    pub endpoints: Endpoints,
    pub handle: JoinHandle<()>,
}

/// Copy packets from `source` to `dest` until either side fails or `cancel` fires
///
/// Returns `Ok(())` when cancelled; otherwise the error that ended the pump,
/// `EndOfStream` included.
pub(crate) async fn pump(
    source: &dyn Reader,
    dest: &dyn Writer,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        let packet = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            packet = source.read() => packet?,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            result = dest.write(packet) => result?,
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::av::{Endpoint, Packet, StreamInfo};
    use crate::endpoint::{pipe, PipeConfig};

    #[test]
    fn test_operation_round_trip() {
        assert_eq!("pull".parse::<RelayOperation>().unwrap(), RelayOperation::Pull);
        assert_eq!("push".parse::<RelayOperation>().unwrap(), RelayOperation::Push);
        assert!(matches!(
            "start".parse::<RelayOperation>(),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(RelayOperation::Push.to_string(), "push");
    }

    #[test]
    fn test_session_key_format() {
        assert_eq!(session_key(RelayOperation::Pull, "live", "key1"), "pull:live/key1");
        assert_eq!(session_key(RelayOperation::Push, "app", "ck"), "push:app/ck");
    }

    #[tokio::test]
    async fn test_pump_stops_at_end_of_stream() {
        let config = PipeConfig::default();
        let (remote_tx, remote_rx) = pipe(StreamInfo::new("remote", "rtmp://remote/x"), &config);
        let (local_tx, local_rx) = pipe(StreamInfo::new("local", "rtmp://local/x"), &config);

        remote_tx.write(Packet::audio(5, Bytes::from_static(&[0xAF, 0x01]))).await.unwrap();
        remote_tx.close(Error::EndOfStream);

        let cancel = CancellationToken::new();
        let result = pump(&remote_rx, &local_tx, &cancel).await;
        assert_eq!(result, Err(Error::EndOfStream));
        assert_eq!(local_rx.read().await.unwrap().timestamp, 5);
    }

    #[tokio::test]
    async fn test_pump_returns_on_cancel() {
        let config = PipeConfig::default();
        let (_remote_tx, remote_rx) = pipe(StreamInfo::new("remote", "rtmp://remote/x"), &config);
        let (local_tx, _local_rx) = pipe(StreamInfo::new("local", "rtmp://local/x"), &config);

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(pump(&remote_rx, &local_tx, &cancel).await, Ok(()));
    }
}
