//! Traffic statistics for readers and writers

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::av::Packet;

/// Default window over which per-interval byte counts are measured
pub const DEFAULT_TRAFFIC_INTERVAL: Duration = Duration::from_secs(5);

/// Point-in-time traffic counters of one endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficSnapshot {
    /// Transport stream id of the last counted packet
    pub stream_id: u32,
    pub audio_bytes_total: u64,
    /// Audio bytes counted during the last complete interval
    pub audio_bytes_per_interval: u64,
    pub video_bytes_total: u64,
    /// Video bytes counted during the last complete interval
    pub video_bytes_per_interval: u64,
}

#[derive(Debug)]
struct MeterState {
    snapshot: TrafficSnapshot,
    interval_started: Option<Instant>,
    audio_at_interval_start: u64,
    video_at_interval_start: u64,
}

/// Counts audio/video bytes passing through an endpoint
#[derive(Debug)]
pub struct TrafficMeter {
    interval: Duration,
    state: Mutex<MeterState>,
}

impl TrafficMeter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(MeterState {
                snapshot: TrafficSnapshot::default(),
                interval_started: None,
                audio_at_interval_start: 0,
                video_at_interval_start: 0,
            }),
        }
    }

    /// Count one packet; metadata packets are ignored
    pub fn record(&self, packet: &Packet) {
        if !packet.is_audio && !packet.is_video {
            return;
        }

        let now = Instant::now();
        let len = packet.size() as u64;
        let mut state = self.state.lock();

        state.snapshot.stream_id = packet.stream_id;
        if packet.is_video {
            state.snapshot.video_bytes_total += len;
        } else {
            state.snapshot.audio_bytes_total += len;
        }

        match state.interval_started {
            None => {
                state.interval_started = Some(now);
            }
            Some(started) if now.duration_since(started) >= self.interval => {
                state.snapshot.audio_bytes_per_interval =
                    state.snapshot.audio_bytes_total - state.audio_at_interval_start;
                state.snapshot.video_bytes_per_interval =
                    state.snapshot.video_bytes_total - state.video_at_interval_start;
                state.audio_at_interval_start = state.snapshot.audio_bytes_total;
                state.video_at_interval_start = state.snapshot.video_bytes_total;
                state.interval_started = Some(now);
            }
            Some(_) => {}
        }
    }

    pub fn snapshot(&self) -> TrafficSnapshot {
        self.state.lock().snapshot
    }
}

impl Default for TrafficMeter {
    fn default() -> Self {
        Self::new(DEFAULT_TRAFFIC_INTERVAL)
    }
}

/// Statistics row for one publisher or subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStat {
    pub key: String,
    pub url: String,
    pub stream_id: u32,
    #[serde(rename = "video_total_bytes")]
    pub video_bytes_total: u64,
    #[serde(rename = "video_speed")]
    pub video_bytes_per_interval: u64,
    #[serde(rename = "audio_total_bytes")]
    pub audio_bytes_total: u64,
    #[serde(rename = "audio_speed")]
    pub audio_bytes_per_interval: u64,
}

impl StreamStat {
    pub fn new(key: impl Into<String>, url: impl Into<String>, traffic: TrafficSnapshot) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
            stream_id: traffic.stream_id,
            video_bytes_total: traffic.video_bytes_total,
            video_bytes_per_interval: traffic.video_bytes_per_interval,
            audio_bytes_total: traffic.audio_bytes_total,
            audio_bytes_per_interval: traffic.audio_bytes_per_interval,
        }
    }
}

/// Registry-wide statistics snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct LiveStats {
    pub publishers: Vec<StreamStat>,
    pub players: Vec<StreamStat>,
}
