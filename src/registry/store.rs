//! Stream registry implementation
//!
//! The central registry that maps a stream key to its publisher and
//! subscribers and routes packets from one to the others.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tokio::time::Instant;

use crate::av::{Handler, Packet, Reader, Writer};
use crate::error::{Error, Result};
use crate::stats::{LiveStats, StreamStat};

use super::config::RegistryConfig;
use super::entry::{Participant, StreamEntry, StreamState, StreamStats};

type EntryGuard = OwnedRwLockWriteGuard<StreamEntry>;

/// Central registry for all active streams
///
/// Lock order is entry first, then map: the map lock is never held while
/// waiting for an entry lock, so a stuck stream cannot stall lookups of
/// other streams. Removing a stream marks the entry detached before the key
/// leaves the map. Every subscriber write is bounded by
/// [`RegistryConfig::delivery_timeout`]; fan-out holds the entry lock only
/// to update the cache and snapshot the subscriber set.
pub struct StreamRegistry {
    /// Map of stream key to stream entry
    streams: RwLock<HashMap<String, Arc<RwLock<StreamEntry>>>>,

    /// Configuration
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a new stream registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    async fn entry(&self, key: &str) -> Option<Arc<RwLock<StreamEntry>>> {
        self.streams.read().await.get(key).cloned()
    }

    /// Write-lock the entry currently stored under `key`
    async fn lock_entry(&self, key: &str) -> Option<(Arc<RwLock<StreamEntry>>, EntryGuard)> {
        loop {
            let entry_arc = self.entry(key).await?;
            let entry = Arc::clone(&entry_arc).write_owned().await;
            // Removed while we waited: look again
            if !entry.detached {
                return Some((entry_arc, entry));
            }
        }
    }

    /// Take `key` out of the map; the caller holds the entry lock
    async fn detach(&self, key: &str, entry_arc: &Arc<RwLock<StreamEntry>>, entry: &mut StreamEntry) {
        entry.detached = true;
        let mut streams = self.streams.write().await;
        if streams
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, entry_arc))
        {
            streams.remove(key);
        }
    }

    /// One subscriber write, turned into `SlowConsumer` if it suspends too long
    async fn write_bounded(&self, writer: &dyn Writer, packet: Packet) -> Result<()> {
        tokio::time::timeout(self.config.delivery_timeout, writer.write(packet))
            .await
            .unwrap_or(Err(Error::SlowConsumer))
    }

    /// Register a publisher for a stream
    ///
    /// Creates the stream if needed. A stream in grace period is reclaimed and
    /// its subscribers rebase their timestamps. Fails with `Conflict` while a
    /// live publisher holds the key; a dead incumbent is closed and replaced.
    pub async fn register_publisher(&self, key: &str, reader: Arc<dyn Reader>) -> Result<()> {
        let uid = reader.info().uid;

        loop {
            let entry_arc = {
                let mut streams = self.streams.write().await;
                match streams.get(key) {
                    Some(entry_arc) => Arc::clone(entry_arc),
                    None => {
                        let entry = StreamEntry::new(&self.config, reader);
                        streams.insert(key.to_string(), Arc::new(RwLock::new(entry)));
                        tracing::info!(stream = %key, uid = %uid, "Publisher registered (new stream)");
                        return Ok(());
                    }
                }
            };

            let mut entry = entry_arc.write().await;
            if entry.detached {
                continue;
            }

            if let Some(incumbent) = entry.publisher.as_ref() {
                if incumbent.is_alive() {
                    return Err(Error::Conflict(format!("stream {key} already has a publisher")));
                }
                tracing::warn!(
                    stream = %key,
                    uid = %incumbent.info().uid,
                    "Replacing publisher that stopped responding"
                );
                incumbent.close(Error::Timeout);
            }

            // New source timeline: subscribers continue from their last output
            // and get a fresh liveness window for it
            for writer in entry.subscribers.values() {
                writer.recompute_base();
                writer.refresh_liveness();
            }
            entry.cache.clear();
            entry.publisher = Some(reader);
            entry.publisher_disconnected_at = None;
            entry.state = StreamState::Active;

            tracing::info!(
                stream = %key,
                uid = %uid,
                subscribers = entry.subscriber_count(),
                "Publisher registered (existing stream)"
            );
            return Ok(());
        }
    }

    /// Add a subscriber to a live stream
    ///
    /// The subscriber first receives the cached catch-up packets, then live
    /// packets. Fails with `NotFound` unless the stream has an active publisher.
    /// A subscriber that cannot take the catch-up within the delivery timeout
    /// is closed and rejected with `SlowConsumer`.
    pub async fn register_subscriber(&self, key: &str, writer: Arc<dyn Writer>) -> Result<()> {
        let not_found = || Error::NotFound(format!("stream {key}"));

        // Catch-up is written under the entry lock so no live packet overtakes it
        let (_, mut entry) = self.lock_entry(key).await.ok_or_else(not_found)?;
        if !entry.has_publisher() {
            return Err(not_found());
        }

        let uid = writer.info().uid;
        let catchup = entry.catchup_packets();
        let catchup_count = catchup.len();
        let caught_up = tokio::time::timeout(self.config.delivery_timeout, async {
            for packet in catchup {
                writer.write(packet).await?;
            }
            Ok::<(), Error>(())
        })
        .await
        .unwrap_or(Err(Error::SlowConsumer));

        if let Err(err) = caught_up {
            tracing::warn!(stream = %key, uid = %uid, error = %err, "Subscriber rejected during catch-up");
            writer.close(err.clone());
            return Err(err);
        }

        entry.subscribers.insert(uid.clone(), writer);

        tracing::debug!(
            stream = %key,
            uid = %uid,
            subscribers = entry.subscriber_count(),
            catchup_packets = catchup_count,
            "Subscriber added"
        );
        Ok(())
    }

    /// Remove a participant; removing an absent participant is a no-op
    ///
    /// When the publisher leaves and subscribers remain, the stream enters its
    /// grace period; otherwise the stream is dropped.
    pub async fn unregister(&self, key: &str, participant: &Participant) {
        let Some((entry_arc, mut entry)) = self.lock_entry(key).await else {
            return;
        };

        let remove = match participant {
            Participant::Publisher(uid) => {
                if entry.publisher_uid().as_deref() != Some(uid.as_str()) {
                    return;
                }
                entry.publisher = None;
                entry.publisher_disconnected_at = Some(Instant::now());

                if entry.subscribers.is_empty() {
                    tracing::info!(stream = %key, uid = %uid, "Publisher disconnected, no subscribers");
                    true
                } else {
                    entry.state = StreamState::GracePeriod;
                    tracing::info!(
                        stream = %key,
                        uid = %uid,
                        subscribers = entry.subscriber_count(),
                        grace_period_secs = self.config.publisher_grace_period.as_secs(),
                        "Publisher disconnected, entering grace period"
                    );
                    false
                }
            }
            Participant::Subscriber(uid) => {
                if entry.subscribers.remove(uid).is_none() {
                    return;
                }
                tracing::debug!(
                    stream = %key,
                    uid = %uid,
                    subscribers = entry.subscriber_count(),
                    "Subscriber removed"
                );
                entry.state == StreamState::GracePeriod && entry.subscribers.is_empty()
            }
        };

        if remove {
            self.detach(key, &entry_arc, &mut entry).await;
            tracing::info!(stream = %key, "Stream removed");
        }
    }

    /// Deliver a packet to every current subscriber of a stream
    ///
    /// Returns the number of subscribers that accepted the packet. A subscriber
    /// failing with an eviction-class error, or suspending longer than the
    /// delivery timeout, is closed and removed; delivery to the others is
    /// unaffected.
    pub async fn fan_out(&self, key: &str, packet: Packet) -> usize {
        self.deliver(key, None, packet).await
    }

    async fn deliver(&self, key: &str, from: Option<&str>, packet: Packet) -> usize {
        let subscribers = {
            let Some((_, mut entry)) = self.lock_entry(key).await else {
                return 0;
            };
            if let Some(uid) = from {
                // A replaced publisher must not feed the new timeline
                if entry.publisher_uid().as_deref() != Some(uid) {
                    return 0;
                }
            }
            entry.update_cache(&packet);
            entry.subscriber_snapshot()
        };
        if subscribers.is_empty() {
            return 0;
        }

        let results = join_all(
            subscribers
                .iter()
                .map(|(_, writer)| self.write_bounded(writer.as_ref(), packet.clone())),
        )
        .await;

        let mut delivered = 0;
        for ((uid, writer), result) in subscribers.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(err) if err.evicts_subscriber() => {
                    tracing::warn!(stream = %key, uid = %uid, error = %err, "Evicting subscriber");
                    writer.close(err);
                    self.unregister(key, &Participant::Subscriber(uid.clone())).await;
                }
                Err(err) => {
                    tracing::warn!(stream = %key, uid = %uid, error = %err, "Packet dropped for subscriber");
                }
            }
        }
        delivered
    }

    /// Close and remove every participant that is no longer alive
    ///
    /// Subscribers waiting out a grace period see no traffic and are not
    /// checked. Streams whose grace period elapsed end: their subscribers are
    /// closed with `EndOfStream`. Returns the number of participants closed.
    pub async fn sweep_liveness(&self) -> usize {
        let entries: Vec<(String, Arc<RwLock<StreamEntry>>)> = self
            .streams
            .read()
            .await
            .iter()
            .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
            .collect();

        let now = Instant::now();
        let mut closed = 0;

        for (key, entry_arc) in entries {
            let (dead_publisher, dead_subscribers, grace_expired) = {
                let entry = entry_arc.read().await;
                if entry.detached {
                    continue;
                }
                let dead_publisher = entry.publisher.as_ref().filter(|p| !p.is_alive()).cloned();
                let in_grace = entry.state == StreamState::GracePeriod;
                let dead_subscribers: Vec<(String, Arc<dyn Writer>)> = if in_grace {
                    Vec::new()
                } else {
                    entry
                        .subscribers
                        .iter()
                        .filter(|(_, w)| !w.is_alive())
                        .map(|(uid, w)| (uid.clone(), Arc::clone(w)))
                        .collect()
                };
                let grace_expired = in_grace
                    && entry
                        .publisher_disconnected_at
                        .map(|at| now.duration_since(at) >= self.config.publisher_grace_period)
                        .unwrap_or(false);
                (dead_publisher, dead_subscribers, grace_expired)
            };

            if let Some(publisher) = dead_publisher {
                let uid = publisher.info().uid;
                tracing::warn!(stream = %key, uid = %uid, "Publisher timed out");
                publisher.close(Error::Timeout);
                self.unregister(&key, &Participant::Publisher(uid)).await;
                closed += 1;
            }

            for (uid, writer) in dead_subscribers {
                tracing::warn!(stream = %key, uid = %uid, "Subscriber timed out");
                writer.close(Error::Timeout);
                self.unregister(&key, &Participant::Subscriber(uid)).await;
                closed += 1;
            }

            if grace_expired {
                closed += self.expire_grace_period(&key).await;
            }
        }

        closed
    }

    async fn expire_grace_period(&self, key: &str) -> usize {
        let Some((entry_arc, mut entry)) = self.lock_entry(key).await else {
            return 0;
        };
        // Reclaimed since the sweep snapshot
        if entry.state != StreamState::GracePeriod {
            return 0;
        }
        let subscribers: Vec<Arc<dyn Writer>> = entry.subscribers.values().cloned().collect();
        self.detach(key, &entry_arc, &mut entry).await;
        drop(entry);

        for writer in &subscribers {
            writer.close(Error::EndOfStream);
        }
        tracing::info!(
            stream = %key,
            subscribers = subscribers.len(),
            "Grace period expired, stream removed"
        );
        subscribers.len()
    }

    /// Spawn the periodic liveness sweeper
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_sweep_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let closed = registry.sweep_liveness().await;
                if closed > 0 {
                    tracing::debug!(closed, "Liveness sweep finished");
                }
            }
        })
    }

    /// Read from a publisher and fan its packets out until it ends
    async fn run_publisher(self: Arc<Self>, key: String, reader: Arc<dyn Reader>) {
        let uid = reader.info().uid;
        loop {
            match reader.read().await {
                Ok(packet) => {
                    self.deliver(&key, Some(&uid), packet).await;
                }
                Err(err) => {
                    if err.is_end_of_stream() {
                        tracing::info!(stream = %key, uid = %uid, "Publisher finished");
                    } else {
                        tracing::warn!(stream = %key, uid = %uid, error = %err, "Publisher read failed");
                    }
                    reader.close(err);
                    break;
                }
            }
        }
        self.unregister(&key, &Participant::Publisher(uid)).await;
    }

    /// Check if a stream exists and has an active publisher
    pub async fn has_active_stream(&self, key: &str) -> bool {
        match self.entry(key).await {
            Some(entry_arc) => entry_arc.read().await.has_publisher(),
            None => false,
        }
    }

    /// Number of subscribers of a stream (0 if absent)
    pub async fn subscriber_count(&self, key: &str) -> usize {
        match self.entry(key).await {
            Some(entry_arc) => entry_arc.read().await.subscriber_count(),
            None => 0,
        }
    }

    /// Get stream statistics
    pub async fn stream_stats(&self, key: &str) -> Option<StreamStats> {
        let entry_arc = self.entry(key).await?;
        let entry = entry_arc.read().await;
        Some(StreamStats::from(&*entry))
    }

    /// Get total number of streams
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Traffic snapshot of every publisher and subscriber
    pub async fn live_stats(&self) -> LiveStats {
        let entries: Vec<Arc<RwLock<StreamEntry>>> =
            self.streams.read().await.values().cloned().collect();

        let mut stats = LiveStats::default();
        for entry_arc in entries {
            let entry = entry_arc.read().await;
            if let Some(publisher) = entry.publisher.as_ref() {
                let info = publisher.info();
                stats
                    .publishers
                    .push(StreamStat::new(info.key, info.url, publisher.traffic()));
            }
            for writer in entry.subscribers.values() {
                let info = writer.info();
                stats
                    .players
                    .push(StreamStat::new(info.key, info.url, writer.traffic()));
            }
        }
        stats
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for Arc<StreamRegistry> {
    /// Register the publisher and start forwarding its packets
    async fn handle_reader(&self, reader: Arc<dyn Reader>) -> Result<()> {
        let key = reader.info().key;
        self.register_publisher(&key, Arc::clone(&reader)).await?;
        tokio::spawn(Arc::clone(self).run_publisher(key, reader));
        Ok(())
    }

    async fn handle_writer(&self, writer: Arc<dyn Writer>) -> Result<()> {
        let key = writer.info().key;
        self.register_subscriber(&key, writer).await
    }
}
