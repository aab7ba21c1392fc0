//! Listener
//!
//! A dual-stack listening socket. Construction binds and listens at once; a
//! listener that failed to come up stays `NotRunning` and is never retried.
//!
//! Accepted connections are either handed to a `SessionFactory` or returned
//! to the caller of `accept`. With `own_task` set, a spawned task accepts
//! until the listener is shut down.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;

use crate::error::ListenerError;
use crate::middleware::Firewall;
use crate::net::connection::Connection;
use crate::net::registry::NetworkRegistry;
use crate::net::session::SessionFactory;
use crate::utils::network::normalize_ip;

/// How long a single `accept` call waits for a pending connection.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

const LISTEN_BACKLOG: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Starting,
    Running,
    NotRunning,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ListenerState::Starting,
            1 => ListenerState::Running,
            _ => ListenerState::NotRunning,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ListenerState::Starting => 0,
            ListenerState::Running => 1,
            ListenerState::NotRunning => 2,
        }
    }
}

/// What a listener does with the connections it accepts.
#[derive(Default)]
pub struct ListenerOptions {
    pub firewall: Option<Firewall>,
    pub factory: Option<Arc<dyn SessionFactory>>,
    /// Accept on a dedicated task instead of through `Listener::accept`.
    pub own_task: bool,
}

pub struct Listener {
    port: u16,
    state: Arc<AtomicU8>,
    acceptor: Option<Acceptor>,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Listener {
    /// Binds `port` on all interfaces (IPv6 and IPv4). Failure is logged and
    /// leaves the listener in the `NotRunning` state.
    pub fn bind(port: u16, options: ListenerOptions, registry: Arc<NetworkRegistry>) -> Self {
        match Self::try_bind(port, options, registry) {
            Ok(listener) => listener,
            Err(e) => {
                error!("listener on port {} not running: {}", port, e);
                Self {
                    port,
                    state: Arc::new(AtomicU8::new(ListenerState::NotRunning.as_u8())),
                    acceptor: None,
                    stop: CancellationToken::new(),
                    task: None,
                }
            }
        }
    }

    /// Like `bind`, but reports why the listener could not be started.
    pub fn try_bind(
        port: u16,
        options: ListenerOptions,
        registry: Arc<NetworkRegistry>,
    ) -> Result<Self, ListenerError> {
        let socket = TcpListener::from_std(open_socket(port)?).map_err(ListenerError::Socket)?;
        let port = socket.local_addr().map(|a| a.port()).unwrap_or(port);

        let acceptor = Acceptor {
            port,
            socket,
            firewall: options.firewall,
            factory: options.factory,
            registry,
        };
        let state = Arc::new(AtomicU8::new(ListenerState::Starting.as_u8()));
        let stop = CancellationToken::new();
        debug!("listening on port {}", port);

        if !options.own_task {
            state.store(ListenerState::Running.as_u8(), Ordering::SeqCst);
            return Ok(Self {
                port,
                state,
                acceptor: Some(acceptor),
                stop,
                task: None,
            });
        }

        state.store(ListenerState::Running.as_u8(), Ordering::SeqCst);
        let task_state = Arc::clone(&state);
        let task_stop = stop.clone();
        let task = tokio::spawn(async move {
            acceptor.run(task_stop).await;
            task_state.store(ListenerState::NotRunning.as_u8(), Ordering::SeqCst);
        });

        Ok(Self {
            port,
            state,
            acceptor: None,
            stop,
            task: Some(task),
        })
    }

    // --- Accessors ---

    /// The bound port (the one actually assigned when 0 was requested).
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ListenerState::Running
    }

    /// One bounded accept attempt.
    ///
    /// Returns the connection when there is no session factory; with a
    /// factory the connection is handed over and `None` is returned. Also
    /// `None` when nothing was pending, on accept errors, on firewall
    /// rejection, and on listeners that accept on their own task.
    pub async fn accept(&self) -> Option<Connection> {
        let deadline = Instant::now() + ACCEPT_POLL_INTERVAL;
        let Some(acceptor) = self.acceptor.as_ref() else {
            sleep_until(deadline).await;
            return None;
        };
        match timeout_at(deadline, acceptor.socket.accept()).await {
            Err(_) => None,
            Ok(Ok((stream, remote))) => acceptor.admit(stream, remote).await,
            Ok(Err(e)) => {
                // a failed attempt still lasts the whole poll interval
                acceptor.accept_failed(e);
                sleep_until(deadline).await;
                None
            }
        }
    }

    /// Stops accepting and waits until the accept task has finished and the
    /// socket is closed.
    pub async fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("accept task on port {} failed: {}", self.port, e);
            }
        }
        self.acceptor = None;
        self.state
            .store(ListenerState::NotRunning.as_u8(), Ordering::SeqCst);
        info!("listener on port {} stopped", self.port);
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

struct Acceptor {
    port: u16,
    socket: TcpListener,
    firewall: Option<Firewall>,
    factory: Option<Arc<dyn SessionFactory>>,
    registry: Arc<NetworkRegistry>,
}

impl Acceptor {
    async fn run(self, stop: CancellationToken) {
        info!("accepting connections on port {}", self.port);
        loop {
            let accepted = tokio::select! {
                _ = stop.cancelled() => break,
                accepted = self.socket.accept() => accepted,
            };
            match accepted {
                Ok((stream, remote)) => {
                    if let Some(connection) = self.admit(stream, remote).await {
                        warn!(
                            "no session factory on port {}, closing connection from {}",
                            self.port,
                            connection.peer_ip()
                        );
                    }
                }
                Err(e) => {
                    self.accept_failed(e);
                    tokio::time::sleep(ACCEPT_POLL_INTERVAL).await;
                }
            }
        }
        debug!("accept task on port {} exiting", self.port);
    }

    /// Applies the firewall and hands the connection to the factory.
    async fn admit(&self, stream: TcpStream, remote: SocketAddr) -> Option<Connection> {
        let peer_ip = normalize_ip(remote.ip());
        let local_ip = match stream.local_addr() {
            Ok(local) => normalize_ip(local.ip()),
            Err(e) => {
                error!("cannot get local address of connection from {}: {}", peer_ip, e);
                return None;
            }
        };

        if let Some(firewall) = &self.firewall {
            if !firewall(&peer_ip, &local_ip) {
                warn!(
                    "firewall rejected connection from {} on port {}",
                    peer_ip, self.port
                );
                return None;
            }
        }

        let connection = Connection::new(stream, peer_ip, local_ip, Arc::clone(&self.registry));
        match &self.factory {
            Some(factory) => {
                if let Err(e) = factory.start_session(connection).await {
                    warn!("session on port {} not started: {}", self.port, e);
                }
                None
            }
            None => Some(connection),
        }
    }

    fn accept_failed(&self, e: io::Error) {
        if e.kind() != io::ErrorKind::WouldBlock {
            error!("accept error on port {}: {}", self.port, e);
        }
    }
}

/// Creates the listening socket: IPv6 wildcard accepting IPv4-mapped
/// clients, falling back to IPv4 only on hosts without IPv6.
fn open_socket(port: u16) -> Result<std::net::TcpListener, ListenerError> {
    let (socket, address) = match dual_stack_socket() {
        Ok(socket) => (socket, SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))),
        Err(e) => {
            warn!("IPv6 not available ({}), listening on IPv4 only", e);
            let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
                .map_err(ListenerError::Socket)?;
            (socket, SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        }
    };
    socket
        .set_reuse_address(true)
        .map_err(ListenerError::Socket)?;
    socket
        .bind(&address.into())
        .map_err(|source| ListenerError::Bind { port, source })?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|source| ListenerError::Listen { port, source })?;
    socket
        .set_nonblocking(true)
        .map_err(ListenerError::Socket)?;
    Ok(socket.into())
}

fn dual_stack_socket() -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_only_v6(false)?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use async_trait::async_trait;
    use tokio::io::AsyncReadExt;
    use tokio::sync::mpsc;

    struct RecordingFactory {
        peers: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl SessionFactory for RecordingFactory {
        async fn start_session(&self, connection: Connection) -> Result<(), SessionError> {
            let _ = self.peers.send(connection.peer_ip().to_string());
            Ok(())
        }
    }

    fn registry() -> Arc<NetworkRegistry> {
        Arc::new(NetworkRegistry::default())
    }

    async fn accept_within(listener: &Listener, attempts: usize) -> Option<Connection> {
        for _ in 0..attempts {
            if let Some(connection) = listener.accept().await {
                return Some(connection);
            }
        }
        None
    }

    #[tokio::test]
    async fn test_accept_without_pending_connection_returns_none() {
        let listener = Listener::bind(0, ListenerOptions::default(), registry());
        assert!(listener.is_running());
        assert!(listener.accept().await.is_none());
    }

    #[tokio::test]
    async fn test_accept_returns_normalized_connection() {
        let listener = Listener::bind(0, ListenerOptions::default(), registry());
        let _client = TcpStream::connect(("127.0.0.1", listener.port()))
            .await
            .unwrap();

        let connection = accept_within(&listener, 40).await.expect("no connection");
        assert_eq!(connection.peer_ip(), "127.0.0.1");
        assert_eq!(connection.local_ip(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_firewall_rejection_closes_connection() {
        let firewall: Firewall = Arc::new(|_client: &str, _server: &str| false);
        let options = ListenerOptions {
            firewall: Some(firewall),
            ..Default::default()
        };
        let listener = Listener::bind(0, options, registry());
        let mut client = TcpStream::connect(("127.0.0.1", listener.port()))
            .await
            .unwrap();

        assert!(accept_within(&listener, 20).await.is_none());
        let mut buf = [0u8; 1];
        let read = client.read(&mut buf).await;
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    #[tokio::test]
    async fn test_second_bind_on_same_port_is_not_running() {
        let first = Listener::bind(0, ListenerOptions::default(), registry());
        let second = Listener::bind(first.port(), ListenerOptions::default(), registry());
        assert!(first.is_running());
        assert_eq!(second.state(), ListenerState::NotRunning);
        assert!(second.accept().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_that_cannot_succeed_still_waits_the_poll_interval() {
        let first = Listener::bind(0, ListenerOptions::default(), registry());
        let second = Listener::bind(first.port(), ListenerOptions::default(), registry());
        assert_eq!(second.state(), ListenerState::NotRunning);

        let started = Instant::now();
        for _ in 0..4 {
            assert!(second.accept().await.is_none());
        }
        assert!(started.elapsed() >= ACCEPT_POLL_INTERVAL * 4);
    }

    #[tokio::test]
    async fn test_own_task_hands_connections_to_factory_until_shutdown() {
        let (peers, mut received) = mpsc::unbounded_channel();
        let options = ListenerOptions {
            factory: Some(Arc::new(RecordingFactory { peers })),
            own_task: true,
            ..Default::default()
        };
        let listener = Listener::bind(0, options, registry());
        let port = listener.port();
        assert!(listener.is_running());
        // the task owns the socket
        assert!(listener.accept().await.is_none());

        let _client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        assert_eq!(received.recv().await.as_deref(), Some("127.0.0.1"));

        listener.shutdown().await;
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }
}
