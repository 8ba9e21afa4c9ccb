//! In-process reader/writer pair
//!
//! A pipe is a bounded queue whose write end implements [`Writer`] and whose
//! read end implements [`Reader`]. Relay sessions use pipes as their local
//! endpoints; transports use them to hand packets to and from the registry.
//!
//! ```text
//!   PipeWriter::write ──► [ mpsc, capacity N ] ──► PipeReader::read
//!        │ close                                       │ close
//!        └──────► writer_closed          reader_closed ◄┘
//! ```
//!
//! Closing the writer lets the reader drain what is queued and then report
//! `EndOfStream`. Closing the reader makes further writes fail with `Closed`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::av::{Endpoint, EndpointState, Packet, Reader, RwBase, StateCell, StreamInfo, Writer};
use crate::error::{Error, Result};
use crate::stats::{TrafficMeter, TrafficSnapshot, DEFAULT_TRAFFIC_INTERVAL};

/// What a full queue does to a writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// Fail the write with `SlowConsumer`
    Reject,
    /// Suspend the write until space frees up or either end closes
    Wait,
}

/// Pipe configuration
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Queue capacity in packets
    pub capacity: usize,
    /// Liveness window of both ends
    pub timeout: Duration,
    pub backpressure: Backpressure,
    /// Interval for per-interval traffic counters
    pub traffic_interval: Duration,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            timeout: Duration::from_secs(10),
            backpressure: Backpressure::Reject,
            traffic_interval: DEFAULT_TRAFFIC_INTERVAL,
        }
    }
}

impl PipeConfig {
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    pub fn traffic_interval(mut self, interval: Duration) -> Self {
        self.traffic_interval = interval;
        self
    }
}

struct Shared {
    writer_closed: CancellationToken,
    reader_closed: CancellationToken,
}

/// Create a connected writer/reader pair
pub fn pipe(info: StreamInfo, config: &PipeConfig) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    let shared = Arc::new(Shared {
        writer_closed: CancellationToken::new(),
        reader_closed: CancellationToken::new(),
    });

    let writer = PipeWriter {
        info: info.clone(),
        tx,
        base: RwBase::new(config.timeout),
        meter: TrafficMeter::new(config.traffic_interval),
        state: StateCell::new(),
        backpressure: config.backpressure,
        shared: Arc::clone(&shared),
    };

    let reader = PipeReader {
        info,
        rx: Mutex::new(rx),
        base: RwBase::new(config.timeout),
        meter: TrafficMeter::new(config.traffic_interval),
        state: StateCell::new(),
        shared,
    };

    (writer, reader)
}

/// Write end of a pipe
pub struct PipeWriter {
    info: StreamInfo,
    tx: mpsc::Sender<Packet>,
    base: RwBase,
    meter: TrafficMeter,
    state: StateCell,
    backpressure: Backpressure,
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Timestamp base of this writer
    pub fn base(&self) -> &RwBase {
        &self.base
    }
}

impl Endpoint for PipeWriter {
    fn info(&self) -> StreamInfo {
        self.info.clone()
    }

    fn close(&self, err: Error) {
        if !self.state.begin_close() {
            return;
        }
        tracing::debug!(stream = %self.info.key, uid = %self.info.uid, reason = %err, "Pipe writer closed");
        self.shared.writer_closed.cancel();
        self.state.finish_close();
    }

    fn is_alive(&self) -> bool {
        self.state.is_open() && self.base.is_alive()
    }

    fn state(&self) -> EndpointState {
        self.state.get()
    }

    fn traffic(&self) -> TrafficSnapshot {
        self.meter.snapshot()
    }
}

#[async_trait]
impl Writer for PipeWriter {
    fn recompute_base(&self) {
        self.base.recompute_base();
    }

    fn refresh_liveness(&self) {
        self.base.refresh_liveness();
    }

    async fn write(&self, mut packet: Packet) -> Result<()> {
        if !self.state.is_open() || self.shared.reader_closed.is_cancelled() {
            return Err(Error::Closed);
        }

        let permit = match self.backpressure {
            Backpressure::Reject => match self.tx.try_reserve() {
                Ok(permit) => permit,
                Err(TrySendError::Full(())) => return Err(Error::SlowConsumer),
                Err(TrySendError::Closed(())) => return Err(Error::Closed),
            },
            Backpressure::Wait => tokio::select! {
                biased;
                _ = self.shared.writer_closed.cancelled() => return Err(Error::Closed),
                _ = self.shared.reader_closed.cancelled() => return Err(Error::Closed),
                permit = self.tx.reserve() => permit.map_err(|_| Error::Closed)?,
            },
        };

        if packet.is_audio || packet.is_video {
            let timestamp = packet.timestamp.wrapping_add(self.base.base_timestamp());
            packet.timestamp = timestamp;
            self.base.record_timestamp(timestamp, packet.type_id());
        }

        self.meter.record(&packet);
        permit.send(packet);
        self.base.refresh_liveness();
        Ok(())
    }
}

/// Read end of a pipe
pub struct PipeReader {
    info: StreamInfo,
    rx: Mutex<mpsc::Receiver<Packet>>,
    base: RwBase,
    meter: TrafficMeter,
    state: StateCell,
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Timestamp base of this reader
    pub fn base(&self) -> &RwBase {
        &self.base
    }
}

impl Endpoint for PipeReader {
    fn info(&self) -> StreamInfo {
        self.info.clone()
    }

    fn close(&self, err: Error) {
        if !self.state.begin_close() {
            return;
        }
        tracing::debug!(stream = %self.info.key, uid = %self.info.uid, reason = %err, "Pipe reader closed");
        self.shared.reader_closed.cancel();
        self.state.finish_close();
    }

    fn is_alive(&self) -> bool {
        self.state.is_open() && self.base.is_alive()
    }

    fn state(&self) -> EndpointState {
        self.state.get()
    }

    fn traffic(&self) -> TrafficSnapshot {
        self.meter.snapshot()
    }
}

#[async_trait]
impl Reader for PipeReader {
    async fn read(&self) -> Result<Packet> {
        if !self.state.is_open() {
            return Err(Error::Closed);
        }

        let mut rx = tokio::select! {
            biased;
            _ = self.shared.reader_closed.cancelled() => return Err(Error::Closed),
            rx = self.rx.lock() => rx,
        };

        let packet = tokio::select! {
            biased;
            _ = self.shared.reader_closed.cancelled() => return Err(Error::Closed),
            packet = rx.recv() => packet.ok_or(Error::EndOfStream)?,
            _ = self.shared.writer_closed.cancelled() => match rx.try_recv() {
                Ok(packet) => packet,
                Err(_) => return Err(Error::EndOfStream),
            },
        };

        if packet.is_audio || packet.is_video {
            self.base.record_timestamp(packet.timestamp, packet.type_id());
        }
        self.meter.record(&packet);
        self.base.refresh_liveness();
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn info() -> StreamInfo {
        StreamInfo::new("live/test", "rtmp://localhost/live/test")
    }

    #[tokio::test]
    async fn test_packets_arrive_in_order() {
        let (writer, reader) = pipe(info(), &PipeConfig::default());

        for ts in [0u32, 33, 66] {
            writer.write(Packet::video(ts, Bytes::from_static(&[0x27, 0x01]))).await.unwrap();
        }

        for expected in [0u32, 33, 66] {
            assert_eq!(reader.read().await.unwrap().timestamp, expected);
        }
        assert_eq!(reader.traffic().video_bytes_total, 6);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_with_slow_consumer() {
        let (writer, _reader) = pipe(info(), &PipeConfig::default().capacity(2));

        writer.write(Packet::audio(0, Bytes::new())).await.unwrap();
        writer.write(Packet::audio(1, Bytes::new())).await.unwrap();
        let err = writer.write(Packet::audio(2, Bytes::new())).await.unwrap_err();
        assert_eq!(err, Error::SlowConsumer);
    }

    #[tokio::test]
    async fn test_writer_close_drains_then_end_of_stream() {
        let (writer, reader) = pipe(info(), &PipeConfig::default());
        writer.write(Packet::audio(5, Bytes::new())).await.unwrap();
        writer.close(Error::EndOfStream);

        assert_eq!(writer.state(), EndpointState::Closed);
        assert_eq!(writer.write(Packet::audio(6, Bytes::new())).await, Err(Error::Closed));

        assert_eq!(reader.read().await.unwrap().timestamp, 5);
        assert_eq!(reader.read().await.unwrap_err(), Error::EndOfStream);
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        let (_writer, reader) = pipe(info(), &PipeConfig::default());
        let reader = Arc::new(reader);

        let pending = {
            let reader = Arc::clone(&reader);
            tokio::spawn(async move { reader.read().await })
        };
        tokio::task::yield_now().await;

        reader.close(Error::Closed);
        assert_eq!(pending.await.unwrap().unwrap_err(), Error::Closed);
        assert!(!reader.is_alive());
    }

    #[tokio::test]
    async fn test_close_unblocks_waiting_write() {
        let config = PipeConfig::default().capacity(1).backpressure(Backpressure::Wait);
        let (writer, _reader) = pipe(info(), &config);
        let writer = Arc::new(writer);
        writer.write(Packet::audio(0, Bytes::new())).await.unwrap();

        let pending = {
            let writer = Arc::clone(&writer);
            tokio::spawn(async move { writer.write(Packet::audio(1, Bytes::new())).await })
        };
        tokio::task::yield_now().await;

        writer.close(Error::Closed);
        assert_eq!(pending.await.unwrap(), Err(Error::Closed));
    }

    #[tokio::test]
    async fn test_reader_close_fails_writes() {
        let (writer, reader) = pipe(info(), &PipeConfig::default());
        reader.close(Error::Closed);
        assert_eq!(writer.write(Packet::video(0, Bytes::new())).await, Err(Error::Closed));
    }

    #[tokio::test]
    async fn test_writer_rebases_timestamps() {
        let (writer, reader) = pipe(info(), &PipeConfig::default());

        writer.write(Packet::audio(100, Bytes::new())).await.unwrap();
        writer.write(Packet::video(90, Bytes::new())).await.unwrap();
        writer.recompute_base();
        assert_eq!(writer.base().base_timestamp(), 100);

        // A restarted publisher begins again at zero
        writer.write(Packet::video(0, Bytes::new())).await.unwrap();
        writer.write(Packet::metadata(Bytes::new())).await.unwrap();

        let mut last = None;
        for _ in 0..4 {
            last = Some(reader.read().await.unwrap());
        }
        assert_eq!(reader.base().last_video_timestamp(), 100);
        assert!(last.unwrap().is_metadata);
    }
}
