//! Per-endpoint timestamp base and liveness heartbeat
//!
//! Every reader and writer owns one [`RwBase`]. The per-track timestamps are
//! only written by the owner's I/O path; the liveness instant is also read by
//! the registry sweeper and sits behind its own lock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::packet::{TAG_AUDIO, TAG_VIDEO};

/// Timestamp base and liveness tracker
#[derive(Debug)]
pub struct RwBase {
    timeout: Duration,
    last_activity: Mutex<Instant>,
    base_timestamp: AtomicU32,
    last_audio_timestamp: AtomicU32,
    last_video_timestamp: AtomicU32,
}

impl RwBase {
    /// Create a tracker with the given liveness window
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_activity: Mutex::new(Instant::now()),
            base_timestamp: AtomicU32::new(0),
            last_audio_timestamp: AtomicU32::new(0),
            last_video_timestamp: AtomicU32::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Base snapshot taken by the last [`recompute_base`](Self::recompute_base)
    pub fn base_timestamp(&self) -> u32 {
        self.base_timestamp.load(Ordering::Acquire)
    }

    pub fn last_audio_timestamp(&self) -> u32 {
        self.last_audio_timestamp.load(Ordering::Acquire)
    }

    pub fn last_video_timestamp(&self) -> u32 {
        self.last_video_timestamp.load(Ordering::Acquire)
    }

    /// Record the latest timestamp for the track identified by an FLV tag id
    ///
    /// Unknown tag ids are logged and ignored.
    pub fn record_timestamp(&self, timestamp: u32, type_id: u8) {
        match type_id {
            TAG_VIDEO => self.last_video_timestamp.store(timestamp, Ordering::Release),
            TAG_AUDIO => self.last_audio_timestamp.store(timestamp, Ordering::Release),
            other => {
                tracing::warn!(type_id = other, timestamp, "Unexpected type id");
            }
        }
    }

    /// Set the base to the larger of the last audio and video timestamps
    ///
    /// Only called at track-switch or relay-restart boundaries.
    pub fn recompute_base(&self) {
        let audio = self.last_audio_timestamp();
        let video = self.last_video_timestamp();
        self.base_timestamp
            .store(audio.max(video), Ordering::Release);
    }

    /// Mark the owner as active now
    pub fn refresh_liveness(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Whether activity was seen within the liveness window
    pub fn is_alive(&self) -> bool {
        let last = *self.last_activity.lock();
        Instant::now().duration_since(last) < self.timeout
    }
}
