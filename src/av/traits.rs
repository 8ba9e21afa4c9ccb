//! Capability traits shared by transports, codecs and the registry
//!
//! Concrete transports implement [`Reader`] and [`Writer`]; codec code
//! implements [`Demuxer`], [`Muxer`] and [`CodecParser`]. The registry
//! implements [`Handler`], the entry point a transport calls to attach a new
//! publisher or subscriber.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::stats::TrafficSnapshot;

use super::info::StreamInfo;
use super::packet::Packet;
use super::state::EndpointState;

/// Turns a raw wire packet into a packet with a parsed header
///
/// Fails with `MalformedInput` on unparseable or truncated payloads.
pub trait Demuxer: Send {
    fn demux(&mut self, raw: Packet) -> Result<Packet>;
}

/// Encodes packets into a byte sink
///
/// Fails with `UnsupportedCodec` for formats it cannot encode and
/// `WriteFailure` when the sink rejects the bytes.
pub trait Muxer: Send {
    fn mux(&mut self, packet: &Packet, sink: &mut dyn io::Write) -> Result<()>;
}

pub trait SampleRater {
    fn sample_rate(&self) -> Result<u32>;
}

/// In-place bitstream transform applied before fan-out
pub trait CodecParser: SampleRater + Send {
    fn parse(&mut self, packet: &mut Packet, sink: &mut dyn io::Write) -> Result<()>;
}

/// Surface shared by readers and writers
pub trait Endpoint: Send + Sync {
    fn info(&self) -> StreamInfo;

    /// Close the endpoint, unblocking any suspended I/O
    ///
    /// Repeated calls are no-ops.
    fn close(&self, err: crate::error::Error);

    fn is_alive(&self) -> bool;

    fn state(&self) -> EndpointState;

    /// Traffic counters for statistics
    fn traffic(&self) -> TrafficSnapshot {
        TrafficSnapshot::default()
    }
}

/// Packet source: a publisher, or the source side of a relay session
#[async_trait]
pub trait Reader: Endpoint {
    /// Next packet
    ///
    /// Fails with `EndOfStream` once the source was closed deliberately,
    /// `Timeout`/`Disconnected` on liveness or transport failure, and `Closed`
    /// after [`Endpoint::close`].
    async fn read(&self) -> Result<Packet>;
}

/// Packet sink: a subscriber, or the destination side of a relay session
#[async_trait]
pub trait Writer: Endpoint {
    /// Recompute the timestamp base from the last written timestamps
    fn recompute_base(&self);

    /// Restart the liveness window without writing
    fn refresh_liveness(&self);

    /// Deliver one packet
    ///
    /// Fails with `SlowConsumer` when the sink cannot keep up and `Closed`
    /// after [`Endpoint::close`].
    async fn write(&self, packet: Packet) -> Result<()>;
}

/// Registration entry points used by transports
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle_reader(&self, reader: Arc<dyn Reader>) -> Result<()>;
    async fn handle_writer(&self, writer: Arc<dyn Writer>) -> Result<()>;
}
