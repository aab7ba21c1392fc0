//! Network registry
//!
//! Process-wide networking state shared by listeners, connectors, negotiators
//! and sessions: traffic counters, the running-connection count and the
//! passive port cursor. One `Arc<NetworkRegistry>` is created at start-up and
//! passed explicitly to everything that needs it.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use log::debug;
use tokio::time::Instant;

/// Passive data ports cycle through this many ports above the base.
pub const PASSIVE_PORT_WINDOW: u16 = 16;

/// Default base for the passive port window.
pub const DEFAULT_PASSIVE_PORT_BASE: u16 = 1024;

/// Identifies a connection in the per-connection traffic table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Traffic counters for one live connection.
#[derive(Debug, Default)]
struct TrafficCounters {
    peer: String,
    received: AtomicU64,
    sent: AtomicU64,
}

/// Snapshot of one connection's traffic, as shown by `netstat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTraffic {
    pub id: ConnectionId,
    pub peer: String,
    pub received: u64,
    pub sent: u64,
}

/// Shared networking state.
///
/// The traffic counters use relaxed atomics and are advisory only; they are
/// never used for control decisions.
#[derive(Debug)]
pub struct NetworkRegistry {
    started: Instant,
    next_id: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    connections: DashMap<ConnectionId, TrafficCounters>,
    running_connections: AtomicUsize,
    passive_port_base: u16,
    passive_port_cursor: Mutex<u16>,
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PASSIVE_PORT_BASE)
    }
}

impl NetworkRegistry {
    pub fn new(passive_port_base: u16) -> Self {
        Self {
            started: Instant::now(),
            next_id: AtomicU64::new(1),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            connections: DashMap::new(),
            running_connections: AtomicUsize::new(0),
            passive_port_base,
            passive_port_cursor: Mutex::new(0),
        }
    }

    // --- Connection table ---

    /// Registers a new connection with zeroed traffic counters.
    pub fn register(&self, peer: &str) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.connections.insert(
            id,
            TrafficCounters {
                peer: peer.to_string(),
                ..Default::default()
            },
        );
        id
    }

    /// Removes a closed connection from the traffic table.
    pub fn unregister(&self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    pub fn record_received(&self, id: ConnectionId, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        if let Some(entry) = self.connections.get(&id) {
            entry.received.fetch_add(bytes as u64, Ordering::Relaxed);
        }
    }

    pub fn record_sent(&self, id: ConnectionId, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        if let Some(entry) = self.connections.get(&id) {
            entry.sent.fetch_add(bytes as u64, Ordering::Relaxed);
        }
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Traffic of every live connection, ordered by id.
    pub fn connection_traffic(&self) -> Vec<ConnectionTraffic> {
        let mut traffic: Vec<ConnectionTraffic> = self
            .connections
            .iter()
            .map(|entry| ConnectionTraffic {
                id: *entry.key(),
                peer: entry.peer.clone(),
                received: entry.received.load(Ordering::Relaxed),
                sent: entry.sent.load(Ordering::Relaxed),
            })
            .collect();
        traffic.sort_by_key(|t| t.id);
        traffic
    }

    // --- Running sessions ---

    pub fn running_connections(&self) -> usize {
        self.running_connections.load(Ordering::SeqCst)
    }

    /// Counts a session as running until the returned guard is dropped.
    pub fn session_started(self: &Arc<Self>) -> RunningGuard {
        let running = self.running_connections.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("session started, {} running", running);
        RunningGuard {
            registry: Arc::clone(self),
        }
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    // --- Passive ports ---

    /// Next port of the passive window: `base + ((cursor + 1) % 16)`.
    pub fn next_passive_port(&self) -> u16 {
        let mut cursor = self
            .passive_port_cursor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cursor = (*cursor + 1) % PASSIVE_PORT_WINDOW;
        self.passive_port_base.saturating_add(*cursor)
    }
}

/// Decrements the running-session count when dropped.
#[derive(Debug)]
pub struct RunningGuard {
    registry: Arc<NetworkRegistry>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let running = self
            .registry
            .running_connections
            .fetch_sub(1, Ordering::SeqCst)
            - 1;
        debug!("session ended, {} running", running);
    }
}
