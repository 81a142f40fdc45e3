//! Notification hub: per-identity fan-out to connected sessions.
//!
//! One [`Hub`] task owns the identity → sessions map. Everything else talks
//! to it through a [`HubHandle`] over three bounded channels (register,
//! unregister, deliver). Each session gets its own bounded buffer; a full
//! buffer drops the message for that session only.

use crate::config::HubConfig;
use filesync_sync_types::{DeviceId, SyncError, UserId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};

/// Key sessions are registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Every session of a user.
    User(UserId),
    /// Every session of a device.
    Device(DeviceId),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::User(id) => write!(f, "user:{id}"),
            Identity::Device(id) => write!(f, "device:{id}"),
        }
    }
}

/// Hub-assigned session number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered session: the receiving end of its outbound buffer.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    identity: Identity,
    rx: mpsc::Receiver<String>,
}

impl Session {
    /// Session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Identity the session is registered under.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Next payload. `None` once the hub drops the session.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Next payload if one is buffered.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

/// Snapshot of hub gauges and counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Connected sessions.
    pub sessions: u64,
    /// Identities with at least one session.
    pub identities: u64,
    /// Payloads enqueued onto a session buffer.
    pub delivered: u64,
    /// Payloads dropped on a full session buffer or control channel.
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct HubCounters {
    sessions: AtomicU64,
    identities: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

struct Register {
    identity: Identity,
    reply: oneshot::Sender<Session>,
}

struct Unregister {
    id: SessionId,
    identity: Identity,
}

enum Target {
    Identity(Identity),
    All,
}

struct Delivery {
    target: Target,
    payload: String,
}

/// Clonable handle to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Register>,
    unregister_tx: mpsc::Sender<Unregister>,
    deliver_tx: mpsc::Sender<Delivery>,
    counters: Arc<HubCounters>,
}

impl fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubHandle")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl HubHandle {
    /// Register a new session under `identity`.
    pub async fn connect(&self, identity: Identity) -> Result<Session, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.register_tx
            .send(Register { identity, reply })
            .await
            .map_err(|_| SyncError::PublishFailure("hub stopped".to_string()))?;
        rx.await
            .map_err(|_| SyncError::PublishFailure("hub stopped".to_string()))
    }

    /// Remove a session. Unknown sessions are ignored.
    pub async fn disconnect(&self, id: SessionId, identity: Identity) {
        if self
            .unregister_tx
            .send(Unregister { id, identity })
            .await
            .is_err()
        {
            tracing::debug!(session_id = %id, "hub stopped before disconnect");
        }
    }

    /// Enqueue `payload` for every session of `identity`.
    pub fn deliver(&self, identity: Identity, payload: String) -> Result<(), SyncError> {
        self.enqueue(Delivery {
            target: Target::Identity(identity),
            payload,
        })
    }

    /// Enqueue `payload` for every connected session.
    pub fn broadcast(&self, payload: String) -> Result<(), SyncError> {
        self.enqueue(Delivery {
            target: Target::All,
            payload,
        })
    }

    /// False once the hub task has stopped.
    pub fn is_running(&self) -> bool {
        !self.register_tx.is_closed()
    }

    /// Current gauges and counters.
    pub fn stats(&self) -> HubStats {
        HubStats {
            sessions: self.counters.sessions.load(Ordering::Relaxed),
            identities: self.counters.identities.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    fn enqueue(&self, delivery: Delivery) -> Result<(), SyncError> {
        self.deliver_tx.try_send(delivery).map_err(|e| {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(_) => {
                    tracing::warn!("hub control channel full, dropping payload");
                    SyncError::PublishFailure("hub control channel full".to_string())
                }
                TrySendError::Closed(_) => {
                    SyncError::PublishFailure("hub stopped".to_string())
                }
            }
        })
    }
}

/// The hub task state. Construct with [`Hub::new`] and drive with
/// [`Hub::run`].
pub struct Hub {
    sessions: HashMap<Identity, HashMap<SessionId, mpsc::Sender<String>>>,
    next_id: u64,
    session_buffer: usize,
    register_rx: mpsc::Receiver<Register>,
    unregister_rx: mpsc::Receiver<Unregister>,
    deliver_rx: mpsc::Receiver<Delivery>,
    counters: Arc<HubCounters>,
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("identities", &self.sessions.len())
            .field("session_buffer", &self.session_buffer)
            .finish_non_exhaustive()
    }
}

impl Hub {
    /// Create the hub and its handle.
    pub fn new(config: &HubConfig) -> (Self, HubHandle) {
        let capacity = config.control_capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(capacity);
        let (deliver_tx, deliver_rx) = mpsc::channel(capacity);
        let counters = Arc::new(HubCounters::default());

        let hub = Self {
            sessions: HashMap::new(),
            next_id: 0,
            session_buffer: config.session_buffer.max(1),
            register_rx,
            unregister_rx,
            deliver_rx,
            counters: counters.clone(),
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            deliver_tx,
            counters,
        };
        (hub, handle)
    }

    /// Process control messages until shutdown is signalled.
    ///
    /// Dropping the hub closes every session buffer, which ends the
    /// sessions' writer tasks.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(session_buffer = self.session_buffer, "notification hub started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                Some(req) = self.register_rx.recv() => self.register(req),
                Some(req) = self.unregister_rx.recv() => self.unregister(req.id, &req.identity),
                Some(delivery) = self.deliver_rx.recv() => self.deliver(delivery),
                else => break,
            }
        }
        tracing::info!(identities = self.sessions.len(), "notification hub stopped");
    }

    fn register(&mut self, req: Register) {
        self.next_id += 1;
        let id = SessionId(self.next_id);
        let (tx, rx) = mpsc::channel(self.session_buffer);
        let session = Session {
            id,
            identity: req.identity,
            rx,
        };
        if req.reply.send(session).is_err() {
            tracing::debug!(identity = %req.identity, "connect abandoned");
            return;
        }
        self.sessions.entry(req.identity).or_default().insert(id, tx);
        self.update_gauges();
        tracing::debug!(identity = %req.identity, session_id = %id, "session registered");
    }

    fn unregister(&mut self, id: SessionId, identity: &Identity) {
        let Some(sessions) = self.sessions.get_mut(identity) else {
            return;
        };
        sessions.remove(&id);
        if sessions.is_empty() {
            self.sessions.remove(identity);
        }
        self.update_gauges();
        tracing::debug!(identity = %identity, session_id = %id, "session unregistered");
    }

    fn deliver(&mut self, delivery: Delivery) {
        match delivery.target {
            Target::Identity(identity) => self.deliver_to(&identity, &delivery.payload),
            Target::All => {
                let identities: Vec<Identity> = self.sessions.keys().copied().collect();
                for identity in identities {
                    self.deliver_to(&identity, &delivery.payload);
                }
            }
        }
    }

    fn deliver_to(&mut self, identity: &Identity, payload: &str) {
        let Some(sessions) = self.sessions.get_mut(identity) else {
            tracing::trace!(identity = %identity, "no sessions for identity");
            return;
        };
        let counters = &self.counters;
        sessions.retain(|id, tx| match tx.try_send(payload.to_string()) {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(identity = %identity, session_id = %id, "session buffer full, dropping payload");
                true
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(identity = %identity, session_id = %id, "pruning closed session");
                false
            }
        });
        if sessions.is_empty() {
            self.sessions.remove(identity);
        }
        self.update_gauges();
    }

    fn update_gauges(&self) {
        let sessions: usize = self.sessions.values().map(HashMap::len).sum();
        self.counters
            .sessions
            .store(sessions as u64, Ordering::Relaxed);
        self.counters
            .identities
            .store(self.sessions.len() as u64, Ordering::Relaxed);
    }
}
