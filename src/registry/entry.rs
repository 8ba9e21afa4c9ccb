//! Stream entry and state types
//!
//! This module defines the per-stream state stored in the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::av::{Packet, Reader, Writer};
use crate::media::gop::GopCache;

use super::config::RegistryConfig;

/// State of a stream entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Stream has an active publisher
    Active,
    /// Publisher disconnected, within grace period
    GracePeriod,
}

/// A registered participant, identified by its endpoint uid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Participant {
    Publisher(String),
    Subscriber(String),
}

/// Entry for a single stream in the registry
pub struct StreamEntry {
    /// Current publisher (None during grace period)
    pub publisher: Option<Arc<dyn Reader>>,

    /// Subscribers keyed by endpoint uid
    pub subscribers: HashMap<String, Arc<dyn Writer>>,

    /// Late-joiner cache
    pub cache: GopCache,

    cache_enabled: bool,

    /// When the publisher disconnected (for grace period tracking)
    pub publisher_disconnected_at: Option<Instant>,

    /// When the stream was created
    pub created_at: Instant,

    /// Current stream state
    pub state: StreamState,

    /// Set once the entry left the registry map; holders of a stale handle
    /// must look the key up again
    pub(super) detached: bool,
}

impl StreamEntry {
    pub(super) fn new(config: &RegistryConfig, publisher: Arc<dyn Reader>) -> Self {
        Self {
            publisher: Some(publisher),
            subscribers: HashMap::new(),
            cache: GopCache::with_max_size(config.max_gop_size),
            cache_enabled: config.cache_enabled,
            publisher_disconnected_at: None,
            created_at: Instant::now(),
            state: StreamState::Active,
            detached: false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Check if the stream has an active publisher
    pub fn has_publisher(&self) -> bool {
        self.state == StreamState::Active && self.publisher.is_some()
    }

    pub fn publisher_uid(&self) -> Option<String> {
        self.publisher.as_ref().map(|p| p.info().uid)
    }

    /// Update the late-joiner cache
    pub(super) fn update_cache(&mut self, packet: &Packet) {
        if self.cache_enabled {
            self.cache.push(packet);
        }
    }

    /// Packets a new subscriber receives before live data
    pub fn catchup_packets(&self) -> Vec<Packet> {
        if self.cache_enabled {
            self.cache.catchup()
        } else {
            Vec::new()
        }
    }

    /// Consistent copy of the subscriber set for one fan-out
    pub(super) fn subscriber_snapshot(&self) -> Vec<(String, Arc<dyn Writer>)> {
        self.subscribers
            .iter()
            .map(|(uid, w)| (uid.clone(), Arc::clone(w)))
            .collect()
    }
}

/// Statistics for a stream
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Number of active subscribers
    pub subscriber_count: usize,
    /// Whether the stream has an active publisher
    pub has_publisher: bool,
    /// Current stream state
    pub state: StreamState,
    /// Number of packets in the GOP cache
    pub gop_frame_count: usize,
    /// Size of the GOP cache in bytes
    pub gop_size_bytes: usize,
    /// Time since the stream was created
    pub age: Duration,
}

impl From<&StreamEntry> for StreamStats {
    fn from(entry: &StreamEntry) -> Self {
        Self {
            subscriber_count: entry.subscriber_count(),
            has_publisher: entry.has_publisher(),
            state: entry.state,
            gop_frame_count: entry.cache.frame_count(),
            gop_size_bytes: entry.cache.size(),
            age: entry.created_at.elapsed(),
        }
    }
}
