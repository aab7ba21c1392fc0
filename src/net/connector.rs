//! Outbound connector
//!
//! Opens client connections: FTP active-mode data channels and the HTTP GET
//! helper both go through here.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::net::{TcpSocket, lookup_host};
use tokio::time::timeout;

use crate::error::ConnectError;
use crate::net::connection::Connection;
use crate::net::registry::NetworkRegistry;
use crate::utils::network::normalize_ip;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct Connector {
    registry: Arc<NetworkRegistry>,
    connect_timeout: Duration,
    idle_timeout: Duration,
}

impl Connector {
    pub fn new(registry: Arc<NetworkRegistry>) -> Self {
        Self {
            registry,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: Duration::ZERO,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Idle timeout given to the connections this connector opens.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Resolves `name` (host name or address text) and connects to `port`.
    pub async fn connect(&self, name: &str, port: u16) -> Result<Connection, ConnectError> {
        let address = lookup_host((name, port))
            .await
            .map_err(|e| {
                warn!("cannot resolve {}: {}", name, e);
                ConnectError::Resolve(e.to_string())
            })?
            .next()
            .ok_or_else(|| ConnectError::Resolve(format!("no address for {}", name)))?;

        let socket = if address.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|e| ConnectError::Socket(e.to_string()))?;

        let stream = match timeout(self.connect_timeout, socket.connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("connect to {} failed: {}", address, e);
                return Err(match e.kind() {
                    io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable => {
                        ConnectError::NotConnected
                    }
                    _ => ConnectError::Socket(e.to_string()),
                });
            }
            Err(_) => {
                warn!("connect to {} timed out", address);
                return Err(ConnectError::TimedOut);
            }
        };

        let local_ip = stream
            .local_addr()
            .map(|local| normalize_ip(local.ip()))
            .map_err(|e| ConnectError::Socket(e.to_string()))?;
        debug!("connected to {} from {}", address, local_ip);

        let mut connection = Connection::new(
            stream,
            normalize_ip(address.ip()),
            local_ip,
            Arc::clone(&self.registry),
        );
        connection.set_idle_timeout(self.idle_timeout);
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let registry = Arc::new(NetworkRegistry::default());
        let connector = Connector::new(registry.clone()).with_idle_timeout(Duration::from_secs(3));

        let accept = tokio::spawn(async move {
            let (mut stream, _) = server.accept().await.unwrap();
            stream.write_all(b"hi\n").await.unwrap();
            stream
        });

        let mut connection = connector.connect("127.0.0.1", port).await.unwrap();
        assert_eq!(connection.peer_ip(), "127.0.0.1");
        assert_eq!(connection.idle_timeout(), Duration::from_secs(3));

        let mut buf = [0u8; 16];
        let n = connection.recv_string(&mut buf, b"\n").await.unwrap();
        assert_eq!(&buf[..n], b"hi\n");
        let _stream = accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // grab a free port, then release it
        let port = {
            let spare = TcpListener::bind("127.0.0.1:0").await.unwrap();
            spare.local_addr().unwrap().port()
        };
        let connector = Connector::new(Arc::new(NetworkRegistry::default()));
        assert!(matches!(
            connector.connect("127.0.0.1", port).await,
            Err(ConnectError::Socket(_))
        ));
    }

    #[tokio::test]
    async fn test_unresolvable_name() {
        let connector = Connector::new(Arc::new(NetworkRegistry::default()));
        assert!(matches!(
            connector.connect("no such host.invalid", 80).await,
            Err(ConnectError::Resolve(_))
        ));
    }
}
