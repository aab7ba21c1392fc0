//! Sessions
//!
//! The seams between a `Listener` and the protocols it serves. A listener
//! hands every accepted `Connection` to a `SessionFactory`, which builds a
//! `Session` and runs it on its own task.

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use tokio::task::JoinHandle;

use crate::error::SessionError;
use crate::net::connection::Connection;
use crate::net::registry::NetworkRegistry;

/// A protocol conversation over one connection.
#[async_trait]
pub trait Session: Send + 'static {
    /// Runs until the peer leaves, a timeout fires or the protocol ends it.
    async fn run(&mut self);
}

/// Builds and starts a session for each accepted connection.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Takes ownership of `connection`. When the session cannot be started
    /// the factory answers the peer itself and closes the connection.
    async fn start_session(&self, connection: Connection) -> Result<(), SessionError>;
}

/// Runs `session` on a new task, counting it as running for its lifetime.
pub fn spawn_session<S: Session>(registry: &Arc<NetworkRegistry>, mut session: S) -> JoinHandle<()> {
    let guard = registry.session_started();
    tokio::spawn(async move {
        session.run().await;
        drop(guard);
    })
}

/// Refuses a connection when `max_connections` sessions are already running.
///
/// The peer gets `reply` and the connection is closed.
pub async fn refuse_if_exhausted(
    connection: &mut Connection,
    max_connections: usize,
    reply: impl FnOnce(usize) -> String,
) -> Result<(), SessionError> {
    let running = connection.registry().running_connections();
    if running < max_connections {
        return Ok(());
    }
    warn!(
        "refusing connection from {}, {} connections running",
        connection.peer_ip(),
        running
    );
    let _ = connection.send_string(&reply(running)).await;
    connection.close();
    Err(SessionError::Unavailable { running })
}
