//! Server
//!
//! Owns the process-wide state (network registry, log queue, file system,
//! authenticator) and the FTP and Telnet listeners built on top of it.

use std::sync::Arc;

use log::{error, info};

use crate::auth::{Authenticator, ConfigAuthenticator};
use crate::config::ServerConfig;
use crate::error::{ServerError, StorageError};
use crate::middleware::firewall::allow_list;
use crate::net::{Listener, ListenerOptions, NetworkRegistry, SessionFactory};
use crate::server::factories::{FtpSessionFactory, TelnetSessionFactory};
use crate::storage::FileSystem;
use crate::telnet::{TelnetCommandHandler, TelnetServices};
use crate::utils::logging::LogQueue;

pub struct Server {
    config: Arc<ServerConfig>,
    registry: Arc<NetworkRegistry>,
    log_queue: Arc<LogQueue>,
    fs: Arc<FileSystem>,
    auth: Arc<dyn Authenticator>,
    telnet_handler: Option<Arc<dyn TelnetCommandHandler>>,
    ftp_listener: Option<Listener>,
    telnet_listener: Option<Listener>,
}

impl Server {
    pub fn new(config: ServerConfig, log_queue: Arc<LogQueue>) -> Self {
        let registry = Arc::new(NetworkRegistry::new(config.ftp.passive_port_base));
        let fs = Arc::new(FileSystem::new(config.storage_root()));
        let auth: Arc<dyn Authenticator> = Arc::new(ConfigAuthenticator::new(&config.users));

        Self {
            config: Arc::new(config),
            registry,
            log_queue,
            fs,
            auth,
            telnet_handler: None,
            ftp_listener: None,
            telnet_listener: None,
        }
    }

    /// Application commands offered to Telnet sessions before the built-ins.
    pub fn with_telnet_handler(mut self, handler: Arc<dyn TelnetCommandHandler>) -> Self {
        self.telnet_handler = Some(handler);
        self
    }

    pub fn registry(&self) -> &Arc<NetworkRegistry> {
        &self.registry
    }

    /// Port of the running FTP listener.
    pub fn ftp_port(&self) -> Option<u16> {
        self.ftp_listener
            .as_ref()
            .filter(|listener| listener.is_running())
            .map(Listener::port)
    }

    /// Port of the running Telnet listener.
    pub fn telnet_port(&self) -> Option<u16> {
        self.telnet_listener
            .as_ref()
            .filter(|listener| listener.is_running())
            .map(Listener::port)
    }

    /// Prepares the storage root and starts the enabled listeners. Fails
    /// when none of them is running.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        tokio::fs::create_dir_all(self.fs.root())
            .await
            .map_err(StorageError::from)?;
        info!("serving files from {}", self.fs.root().display());

        if self.config.ftp.enabled {
            let factory = FtpSessionFactory::new(
                Arc::clone(&self.config),
                Arc::clone(&self.fs),
                Arc::clone(&self.auth),
            );
            self.ftp_listener = Some(self.listen("FTP", self.config.ftp.port, Arc::new(factory)));
        }

        if self.config.telnet.enabled {
            let services = TelnetServices {
                fs: Arc::clone(&self.fs),
                auth: Arc::clone(&self.auth),
                log_queue: Arc::clone(&self.log_queue),
                handler: self.telnet_handler.clone(),
            };
            let factory = TelnetSessionFactory::new(Arc::clone(&self.config), services);
            self.telnet_listener =
                Some(self.listen("Telnet", self.config.telnet.port, Arc::new(factory)));
        }

        if self.ftp_port().is_none() && self.telnet_port().is_none() {
            return Err(ServerError::NoListener);
        }
        Ok(())
    }

    fn listen(&self, service: &str, port: u16, factory: Arc<dyn SessionFactory>) -> Listener {
        let options = ListenerOptions {
            firewall: allow_list(&self.config.network.allowed_clients),
            factory: Some(factory),
            own_task: true,
        };
        let listener = Listener::bind(port, options, Arc::clone(&self.registry));
        if listener.is_running() {
            info!("{} server listening on port {}", service, listener.port());
        } else {
            error!("{} server is not running", service);
        }
        listener
    }

    /// Stops both listeners. Sessions already running finish on their own.
    pub async fn shutdown(&mut self) {
        for listener in [self.ftp_listener.take(), self.telnet_listener.take()]
            .into_iter()
            .flatten()
        {
            listener.shutdown().await;
        }
    }

    /// Starts the servers and runs them until Ctrl-C.
    pub async fn run(mut self) -> Result<(), ServerError> {
        self.start().await?;
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot wait for Ctrl-C: {}", e);
        }
        info!("shutting down");
        self.shutdown().await;
        Ok(())
    }
}
