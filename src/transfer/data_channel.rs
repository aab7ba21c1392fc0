//! Module `data_channel`
//!
//! Negotiates the FTP data connection of one control session, in active
//! mode (PORT/EPRT, the server connects out) or passive mode (PASV/EPSV, the
//! server listens on a port from the shared passive window).
//!
//! A session has at most one data connection. Every new negotiation
//! discards the previous one, and a transfer takes the connection by value
//! so it is closed when the transfer is over.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::Instant;

use crate::error::NegotiationError;
use crate::net::{Connection, Connector, Listener, ListenerOptions, NetworkRegistry};
use crate::transfer::modes::{
    ActiveMode, PassiveMode, TransferMode, extended_passive_reply, parse_eprt_argument,
    parse_port_argument, passive_reply,
};
use crate::utils::network::parse_ipv4;

/// Idle timeout of data connections.
pub const DEFAULT_DATA_IDLE_TIMEOUT: Duration = Duration::from_secs(3);

/// How long a passive listener waits for the client to connect.
pub const DEFAULT_RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(3);

enum DataChannel {
    None,
    Active(Connection),
    Passive(Listener),
}

pub struct DataChannelNegotiator {
    registry: Arc<NetworkRegistry>,
    connector: Connector,
    data_idle_timeout: Duration,
    rendezvous_timeout: Duration,
    channel: DataChannel,
}

impl DataChannelNegotiator {
    pub fn new(registry: Arc<NetworkRegistry>) -> Self {
        let connector = Connector::new(Arc::clone(&registry));
        Self::with_connector(registry, connector)
    }

    pub fn with_connector(registry: Arc<NetworkRegistry>, connector: Connector) -> Self {
        Self {
            registry,
            connector: connector.with_idle_timeout(DEFAULT_DATA_IDLE_TIMEOUT),
            data_idle_timeout: DEFAULT_DATA_IDLE_TIMEOUT,
            rendezvous_timeout: DEFAULT_RENDEZVOUS_TIMEOUT,
            channel: DataChannel::None,
        }
    }

    pub fn with_timeouts(mut self, data_idle_timeout: Duration, rendezvous_timeout: Duration) -> Self {
        self.connector = self.connector.with_idle_timeout(data_idle_timeout);
        self.data_idle_timeout = data_idle_timeout;
        self.rendezvous_timeout = rendezvous_timeout;
        self
    }

    pub fn mode(&self) -> TransferMode {
        match self.channel {
            DataChannel::None => TransferMode::None,
            DataChannel::Active(_) => TransferMode::Active,
            DataChannel::Passive(_) => TransferMode::Passive,
        }
    }

    /// Port of the pending passive listener, if any.
    pub fn passive_port(&self) -> Option<u16> {
        match &self.channel {
            DataChannel::Passive(listener) => Some(listener.port()),
            _ => None,
        }
    }

    /// Closes the data connection or passive listener, if there is one.
    pub fn discard(&mut self) {
        match std::mem::replace(&mut self.channel, DataChannel::None) {
            DataChannel::None => {}
            DataChannel::Active(connection) => {
                debug!("discarding data connection to {}", connection.peer_ip());
            }
            DataChannel::Passive(listener) => {
                debug!("discarding passive listener on port {}", listener.port());
            }
        }
    }

    // --- Active mode ---

    /// PORT: connects to the endpoint given as `h1,h2,h3,h4,p1,p2`.
    pub async fn port(&mut self, arg: &str) -> Result<(), NegotiationError> {
        self.discard();
        let target = parse_port_argument(arg)?;
        self.open_active(target).await
    }

    /// EPRT: connects to the endpoint given as `|family|address|port|`.
    pub async fn eprt(&mut self, arg: &str) -> Result<(), NegotiationError> {
        self.discard();
        let target = parse_eprt_argument(arg)?;
        self.open_active(target).await
    }

    async fn open_active(&mut self, target: ActiveMode) -> Result<(), NegotiationError> {
        let connection = self
            .connector
            .connect(&target.client_ip, target.client_port)
            .await?;
        info!(
            "active data connection to {}:{} established",
            target.client_ip, target.client_port
        );
        self.channel = DataChannel::Active(connection);
        Ok(())
    }

    // --- Passive mode ---

    /// PASV: listens on the next passive port and returns the 227 reply
    /// announcing it at `control_local_ip`, the server side address of the
    /// control connection.
    pub fn pasv(&mut self, control_local_ip: &str) -> Result<String, NegotiationError> {
        self.discard();
        let server_ip = parse_ipv4(control_local_ip).ok_or_else(|| {
            NegotiationError::Passive(format!("{} is not an IPv4 address", control_local_ip))
        })?;
        let server_port = self.open_passive()?;
        Ok(passive_reply(&PassiveMode {
            server_ip,
            server_port,
        }))
    }

    /// EPSV: listens on the next passive port and returns the 229 reply.
    pub fn epsv(&mut self) -> Result<String, NegotiationError> {
        self.discard();
        let port = self.open_passive()?;
        Ok(extended_passive_reply(port))
    }

    fn open_passive(&mut self) -> Result<u16, NegotiationError> {
        let port = self.registry.next_passive_port();
        let listener = Listener::try_bind(port, ListenerOptions::default(), Arc::clone(&self.registry))
            .map_err(|e| {
                warn!("cannot listen for passive data connection: {}", e);
                NegotiationError::Passive(e.to_string())
            })?;
        debug!("waiting for passive data connection on port {}", port);
        self.channel = DataChannel::Passive(listener);
        Ok(port)
    }

    // --- Transfers ---

    /// Hands out the negotiated data connection, waiting for the client to
    /// connect first in passive mode.
    ///
    /// The negotiator is left without a data channel in every case; a
    /// passive listener is closed once the wait is over.
    pub async fn take_data_connection(&mut self) -> Result<Connection, NegotiationError> {
        match std::mem::replace(&mut self.channel, DataChannel::None) {
            DataChannel::None => Err(NegotiationError::NoDataChannel),
            DataChannel::Active(connection) => Ok(connection),
            DataChannel::Passive(listener) => self.rendezvous(listener).await,
        }
    }

    async fn rendezvous(&self, listener: Listener) -> Result<Connection, NegotiationError> {
        let started = Instant::now();
        loop {
            if let Some(mut connection) = listener.accept().await {
                connection.set_idle_timeout(self.data_idle_timeout);
                info!(
                    "passive data connection from {} on port {}",
                    connection.peer_ip(),
                    listener.port()
                );
                return Ok(connection);
            }
            if started.elapsed() >= self.rendezvous_timeout {
                warn!(
                    "no data connection on passive port {} within {:?}",
                    listener.port(),
                    self.rendezvous_timeout
                );
                return Err(NegotiationError::Passive(format!(
                    "nobody connected to port {}",
                    listener.port()
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectError;
    use crate::error::handlers::negotiation_error_reply;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn negotiator(passive_base: u16) -> DataChannelNegotiator {
        DataChannelNegotiator::new(Arc::new(NetworkRegistry::new(passive_base)))
    }

    #[tokio::test]
    async fn test_pasv_announces_control_address_and_next_port() {
        let mut negotiator = negotiator(46000);
        let reply = negotiator.pasv("127.0.0.1").unwrap();
        // 46001 = 179 * 256 + 177
        assert_eq!(reply, "227 entering passive mode (127,0,0,1,179,177)\r\n");
        assert_eq!(negotiator.mode(), TransferMode::Passive);
        assert_eq!(negotiator.passive_port(), Some(46001));
    }

    #[tokio::test]
    async fn test_passive_rendezvous_when_client_connects_late() {
        let mut negotiator = negotiator(46100);
        negotiator.pasv("127.0.0.1").unwrap();
        let port = negotiator.passive_port().unwrap();

        let client = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).await.unwrap();
            received
        });

        let mut data = negotiator.take_data_connection().await.unwrap();
        assert_eq!(data.idle_timeout(), DEFAULT_DATA_IDLE_TIMEOUT);
        assert_eq!(negotiator.mode(), TransferMode::None);
        data.send_string("listing\r\n").await.unwrap();
        drop(data);

        assert_eq!(client.await.unwrap(), b"listing\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_passive_rendezvous_times_out_and_closes_listener() {
        let mut negotiator = negotiator(46200);
        negotiator.pasv("127.0.0.1").unwrap();
        let port = negotiator.passive_port().unwrap();

        let started = Instant::now();
        let err = negotiator.take_data_connection().await.unwrap_err();
        assert!(started.elapsed() >= DEFAULT_RENDEZVOUS_TIMEOUT);
        assert_eq!(
            negotiation_error_reply(&err),
            "425 can't open passive data connection\r\n"
        );
        assert_eq!(negotiator.mode(), TransferMode::None);
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }

    #[tokio::test]
    async fn test_second_pasv_discards_first_listener() {
        let mut negotiator = negotiator(46300);
        negotiator.pasv("127.0.0.1").unwrap();
        let first = negotiator.passive_port().unwrap();
        negotiator.pasv("127.0.0.1").unwrap();
        let second = negotiator.passive_port().unwrap();

        assert_ne!(first, second);
        assert!(TcpStream::connect(("127.0.0.1", first)).await.is_err());

        let _client = TcpStream::connect(("127.0.0.1", second)).await.unwrap();
        assert!(negotiator.take_data_connection().await.is_ok());
        // consumed: nothing left for a second transfer
        assert!(matches!(
            negotiator.take_data_connection().await,
            Err(NegotiationError::NoDataChannel)
        ));
    }

    #[tokio::test]
    async fn test_epsv_opens_passive_listener() {
        let mut negotiator = negotiator(46400);
        let reply = negotiator.epsv().unwrap();
        assert_eq!(reply, "229 entering passive mode (|||46401|)\r\n");

        let _client = TcpStream::connect(("127.0.0.1", 46401)).await.unwrap();
        assert!(negotiator.take_data_connection().await.is_ok());
    }

    #[tokio::test]
    async fn test_pasv_needs_ipv4_control_address() {
        let mut negotiator = negotiator(46500);
        let err = negotiator.pasv("fe80::1").unwrap_err();
        assert!(err.is_passive());
        assert_eq!(negotiator.mode(), TransferMode::None);
    }

    #[tokio::test]
    async fn test_port_connects_to_client() {
        let client = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let [p1, p2] = client.local_addr().unwrap().port().to_be_bytes();
        let mut negotiator = negotiator(46600);

        negotiator
            .port(&format!("127,0,0,1,{},{}", p1, p2))
            .await
            .unwrap();
        assert_eq!(negotiator.mode(), TransferMode::Active);

        let (mut accepted, _) = client.accept().await.unwrap();
        let mut data = negotiator.take_data_connection().await.unwrap();
        assert_eq!(data.idle_timeout(), DEFAULT_DATA_IDLE_TIMEOUT);
        data.send_string("x").await.unwrap();
        let mut buf = [0u8; 1];
        accepted.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"x");
        accepted.write_all(b"y").await.unwrap();
    }

    #[tokio::test]
    async fn test_eprt_connects_to_client() {
        let client = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = client.local_addr().unwrap().port();
        let mut negotiator = negotiator(46700);

        negotiator
            .eprt(&format!("|1|127.0.0.1|{}|", port))
            .await
            .unwrap();
        let _accepted = client.accept().await.unwrap();
        assert!(negotiator.take_data_connection().await.is_ok());
    }

    #[tokio::test]
    async fn test_port_failures_leave_no_channel() {
        let refused = {
            let spare = TcpListener::bind("127.0.0.1:0").await.unwrap();
            spare.local_addr().unwrap().port()
        };
        let [p1, p2] = refused.to_be_bytes();
        let mut negotiator = negotiator(46800);
        negotiator.pasv("127.0.0.1").unwrap();

        let err = negotiator
            .port(&format!("127,0,0,1,{},{}", p1, p2))
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::Active(ConnectError::Socket(_))));
        assert_eq!(
            negotiation_error_reply(&err),
            "425 can't open active data connection\r\n"
        );
        assert_eq!(negotiator.mode(), TransferMode::None);

        let err = negotiator.port("garbage").await.unwrap_err();
        assert_eq!(
            negotiation_error_reply(&err),
            "425 can't open active data connection\r\n"
        );
    }
}
