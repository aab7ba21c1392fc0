//! Session factories
//!
//! Turn the connections accepted by the FTP and Telnet listeners into
//! running sessions, refusing them while the connection limit is reached.

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::Authenticator;
use crate::client::FtpSession;
use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::middleware::logging::log_connection;
use crate::net::session::refuse_if_exhausted;
use crate::net::{Connection, SessionFactory, spawn_session};
use crate::protocol::responses::service_unavailable;
use crate::storage::FileSystem;
use crate::telnet::{TelnetServices, TelnetSession};

pub struct FtpSessionFactory {
    config: Arc<ServerConfig>,
    fs: Arc<FileSystem>,
    auth: Arc<dyn Authenticator>,
}

impl FtpSessionFactory {
    pub fn new(config: Arc<ServerConfig>, fs: Arc<FileSystem>, auth: Arc<dyn Authenticator>) -> Self {
        Self { config, fs, auth }
    }
}

#[async_trait]
impl SessionFactory for FtpSessionFactory {
    async fn start_session(&self, mut connection: Connection) -> Result<(), SessionError> {
        refuse_if_exhausted(
            &mut connection,
            self.config.network.max_connections,
            service_unavailable,
        )
        .await?;
        log_connection("FTP", connection.peer_ip(), connection.local_ip());

        let registry = Arc::clone(connection.registry());
        let session = FtpSession::new(
            connection,
            &self.config,
            Arc::clone(&self.fs),
            Arc::clone(&self.auth),
        );
        spawn_session(&registry, session);
        Ok(())
    }
}

pub struct TelnetSessionFactory {
    config: Arc<ServerConfig>,
    services: TelnetServices,
}

impl TelnetSessionFactory {
    pub fn new(config: Arc<ServerConfig>, services: TelnetServices) -> Self {
        Self { config, services }
    }
}

fn telnet_unavailable(running: usize) -> String {
    format!(
        "Telnet service is currently unavailable, {} connections running\r\n",
        running
    )
}

#[async_trait]
impl SessionFactory for TelnetSessionFactory {
    async fn start_session(&self, mut connection: Connection) -> Result<(), SessionError> {
        refuse_if_exhausted(
            &mut connection,
            self.config.network.max_connections,
            telnet_unavailable,
        )
        .await?;
        log_connection("Telnet", connection.peer_ip(), connection.local_ip());

        let registry = Arc::clone(connection.registry());
        let session = TelnetSession::new(connection, &self.config, self.services.clone());
        spawn_session(&registry, session);
        Ok(())
    }
}
