//! Relay session manager
//!
//! Sessions live in a table keyed by `"<op>:<app>/<channelKey>"`. A start
//! reserves its key before connecting, so a concurrent start of the same key
//! fails with `Conflict` while starts of other keys proceed in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::av::{Endpoint, Handler, Reader, StreamInfo, Writer};
use crate::endpoint::{pipe, Backpressure};
use crate::error::{Error, Result};
use crate::registry::StreamRegistry;

use super::config::RelayConfig;
use super::connector::RelayConnector;
use super::session::{pump, session_key, Endpoints, LocalSide, RelayOperation, RelaySession, SessionInfo};

enum SessionSlot {
    Starting {
        id: u64,
        info: SessionInfo,
        cancel: CancellationToken,
    },
    Running(RelaySession),
}

impl SessionSlot {
    fn info(&self) -> SessionInfo {
        match self {
            SessionSlot::Starting { info, .. } => info.clone(),
            SessionSlot::Running(session) => session.info.clone(),
        }
    }

    fn is_starting(&self, session_id: u64) -> bool {
        matches!(self, SessionSlot::Starting { id, .. } if *id == session_id)
    }
}

type SessionTable = Arc<Mutex<HashMap<String, SessionSlot>>>;

/// Releases a `Starting` reservation unless the session went live
struct Reservation {
    sessions: SessionTable,
    key: String,
    id: u64,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let mut sessions = self.sessions.lock();
        if sessions.get(&self.key).is_some_and(|slot| slot.is_starting(self.id)) {
            sessions.remove(&self.key);
        }
    }
}

/// Closes a freshly opened remote end unless the session took ownership of it
struct OpenRemote<T: Endpoint + ?Sized> {
    endpoint: Option<Arc<T>>,
}

impl<T: Endpoint + ?Sized> OpenRemote<T> {
    fn new(endpoint: Arc<T>) -> Self {
        Self {
            endpoint: Some(endpoint),
        }
    }

    fn get(&self) -> Option<&Arc<T>> {
        self.endpoint.as_ref()
    }

    fn into_inner(mut self) -> Option<Arc<T>> {
        self.endpoint.take()
    }
}

impl<T: Endpoint + ?Sized> Drop for OpenRemote<T> {
    fn drop(&mut self) {
        if let Some(endpoint) = self.endpoint.take() {
            endpoint.close(Error::Closed);
        }
    }
}

/// Operator-driven pull/push relay sessions
pub struct RelayManager {
    registry: Arc<StreamRegistry>,
    connector: Arc<dyn RelayConnector>,
    config: RelayConfig,
    sessions: SessionTable,
    next_id: AtomicU64,
}

impl RelayManager {
    pub fn new(
        registry: Arc<StreamRegistry>,
        connector: Arc<dyn RelayConnector>,
        config: RelayConfig,
    ) -> Self {
        Self {
            registry,
            connector,
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Start a relay session
    ///
    /// Fails with `Conflict` if a session with the same key exists. Any
    /// connection or registration failure is returned as is and leaves no
    /// session entry and no open endpoint behind.
    pub async fn start(
        &self,
        operation: RelayOperation,
        app: &str,
        channel_key: &str,
        remote_url: &str,
    ) -> Result<()> {
        for (name, value) in [("app", app), ("channel_key", channel_key), ("url", remote_url)] {
            if value.is_empty() {
                return Err(Error::InvalidParameter(format!("missing {name}")));
            }
        }

        let key = session_key(operation, app, channel_key);
        let local_url = self.config.local_url(app, channel_key);
        let (source_url, target_url) = match operation {
            RelayOperation::Pull => (remote_url.to_string(), local_url.clone()),
            RelayOperation::Push => (local_url.clone(), remote_url.to_string()),
        };
        let info = SessionInfo {
            key: key.clone(),
            operation,
            source_url,
            target_url,
            running: false,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let _reservation = {
            let mut sessions = self.sessions.lock();
            if sessions.contains_key(&key) {
                return Err(Error::Conflict(format!("session {key} already exists")));
            }
            sessions.insert(
                key.clone(),
                SessionSlot::Starting {
                    id,
                    info: info.clone(),
                    cancel: cancel.clone(),
                },
            );
            Reservation {
                sessions: Arc::clone(&self.sessions),
                key: key.clone(),
                id,
            }
        };

        let local_key = format!("{app}/{channel_key}");
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Closed),
            result = self.connect(operation, remote_url, local_key, local_url) => result,
        };
        let endpoints = match connected {
            Ok(endpoints) => endpoints,
            Err(err) => {
                tracing::warn!(session = %key, error = %err, "Relay session failed to start");
                return Err(err);
            }
        };

        // The task takes the table lock before touching its entry, so holding
        // the lock across spawn and insert keeps it from seeing a stale slot.
        let went_live = {
            let mut sessions = self.sessions.lock();
            if sessions.get(&key).is_some_and(|slot| slot.is_starting(id)) {
                let handle = tokio::spawn(run_session(
                    id,
                    key.clone(),
                    endpoints.clone(),
                    cancel.clone(),
                    Arc::clone(&self.registry),
                    Arc::clone(&self.sessions),
                ));
                sessions.insert(
                    key.clone(),
                    SessionSlot::Running(RelaySession {
                        id,
                        info: SessionInfo {
                            running: true,
                            ..info
                        },
                        cancel,
                        endpoints: endpoints.clone(),
                        handle,
                    }),
                );
                true
            } else {
                false
            }
        };

        if !went_live {
            // Stopped between connect and going live
            tracing::info!(session = %key, id, "Relay session stopped while starting");
            endpoints.release(&self.registry, Error::Closed).await;
            return Err(Error::Closed);
        }

        tracing::info!(session = %key, id, remote = %remote_url, "Relay session started");
        Ok(())
    }

    /// Open both ends of a session and attach the local end to the registry
    async fn connect(
        &self,
        operation: RelayOperation,
        remote_url: &str,
        local_key: String,
        local_url: String,
    ) -> Result<Endpoints> {
        let info = StreamInfo::interval(local_key.clone(), local_url);

        match operation {
            RelayOperation::Pull => {
                let remote = OpenRemote::new(self.connector.play(remote_url).await?);

                // The remote source is drained as fast as the local side takes it
                let config = self.config.pipe.clone().backpressure(Backpressure::Wait);
                let (writer, reader) = pipe(info, &config);
                let reader: Arc<dyn Reader> = Arc::new(reader);

                if let Err(err) = self.registry.handle_reader(Arc::clone(&reader)).await {
                    if let Some(remote) = remote.get() {
                        remote.close(err.clone());
                    }
                    return Err(err);
                }

                let source = remote.into_inner().ok_or(Error::Closed)?;
                Ok(Endpoints {
                    source,
                    dest: Arc::new(writer),
                    local: LocalSide::Publisher(reader),
                    local_key,
                })
            }
            RelayOperation::Push => {
                let config = self.config.pipe.clone().backpressure(Backpressure::Reject);
                let (writer, reader) = pipe(info, &config);
                let writer: Arc<dyn Writer> = Arc::new(writer);

                let remote = OpenRemote::new(self.connector.publish(remote_url).await?);

                if let Err(err) = self.registry.handle_writer(Arc::clone(&writer)).await {
                    if let Some(remote) = remote.get() {
                        remote.close(err.clone());
                    }
                    return Err(err);
                }

                let dest = remote.into_inner().ok_or(Error::Closed)?;
                Ok(Endpoints {
                    source: Arc::new(reader),
                    dest,
                    local: LocalSide::Subscriber(writer),
                    local_key,
                })
            }
        }
    }

    /// Stop a relay session
    ///
    /// Fails with `NotFound` for an unknown key. A session that is still
    /// connecting is cancelled and its pending `start` fails with `Closed`.
    /// Otherwise the key is removed and both ends are closed; teardown
    /// problems are logged, not returned.
    pub async fn stop(&self, operation: RelayOperation, app: &str, channel_key: &str) -> Result<()> {
        let key = session_key(operation, app, channel_key);

        let session = match self.sessions.lock().remove(&key) {
            None => return Err(Error::NotFound(format!("session {key}"))),
            Some(SessionSlot::Starting { id, cancel, .. }) => {
                cancel.cancel();
                tracing::info!(session = %key, id, "Relay session cancelled while starting");
                return Ok(());
            }
            Some(SessionSlot::Running(session)) => session,
        };

        self.shutdown_session(session).await;
        tracing::info!(session = %key, "Relay session stopped");
        Ok(())
    }

    async fn shutdown_session(&self, session: RelaySession) {
        let RelaySession {
            id,
            info,
            cancel,
            endpoints,
            mut handle,
        } = session;

        cancel.cancel();
        endpoints.close(Error::Closed);

        match tokio::time::timeout(self.config.stop_timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(session = %info.key, id, error = %err, "Relay pump task failed");
            }
            Err(_) => {
                tracing::warn!(session = %info.key, id, "Relay pump did not stop in time, aborting");
                handle.abort();
            }
        }

        // The pump task may have been aborted before releasing the local side
        endpoints.release(&self.registry, Error::Closed).await;
    }

    /// Snapshot of all sessions, starting ones included
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut list: Vec<SessionInfo> = self.sessions.lock().values().map(SessionSlot::info).collect();
        list.sort_by(|a, b| a.key.cmp(&b.key));
        list
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn contains(&self, operation: RelayOperation, app: &str, channel_key: &str) -> bool {
        self.sessions
            .lock()
            .contains_key(&session_key(operation, app, channel_key))
    }

    /// Stop every session, cancelling the ones still connecting
    pub async fn shutdown(&self) {
        let running: Vec<RelaySession> = self
            .sessions
            .lock()
            .drain()
            .filter_map(|(_, slot)| match slot {
                SessionSlot::Starting { cancel, .. } => {
                    cancel.cancel();
                    None
                }
                SessionSlot::Running(session) => Some(session),
            })
            .collect();

        let count = running.len();
        futures::future::join_all(running.into_iter().map(|s| self.shutdown_session(s))).await;
        if count > 0 {
            tracing::info!(sessions = count, "Relay sessions shut down");
        }
    }
}

/// Pump one session and clean up after it
async fn run_session(
    id: u64,
    key: String,
    endpoints: Endpoints,
    cancel: CancellationToken,
    registry: Arc<StreamRegistry>,
    sessions: SessionTable,
) {
    let result = pump(endpoints.source.as_ref(), endpoints.dest.as_ref(), &cancel).await;

    match result {
        Ok(()) => {
            tracing::debug!(session = %key, id, "Relay pump cancelled");
            endpoints.release(&registry, Error::Closed).await;
        }
        Err(err) if err.is_end_of_stream() => {
            // Let the local side drain what is queued and end on its own
            tracing::info!(session = %key, id, "Relay source ended");
            endpoints.finish(err);
        }
        Err(err) => {
            tracing::warn!(session = %key, id, error = %err, "Relay pump failed");
            endpoints.release(&registry, err).await;
        }
    }

    // Only our own entry: a newer session may already hold the key
    let mut sessions = sessions.lock();
    if matches!(sessions.get(&key), Some(SessionSlot::Running(s)) if s.id == id) {
        sessions.remove(&key);
        tracing::debug!(session = %key, id, "Relay session removed itself");
    }
}
