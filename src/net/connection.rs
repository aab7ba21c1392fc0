//! Connection
//!
//! A connected stream socket with an idle timeout and traffic accounting.
//! Every protocol session (FTP control, FTP data, Telnet, HTTP client) talks
//! to its peer through a `Connection`.
//!
//! All reads go through a small read-ahead buffer so that `recv_string` and
//! `peek` can hand back bytes they looked at without losing them; reads on a
//! connection are therefore strictly ordered.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use log::{debug, error, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};

use crate::error::ConnectionError;
use crate::net::registry::{ConnectionId, NetworkRegistry};

/// Largest segment handed to the socket by `send_block`.
pub const MAX_SEGMENT_SIZE: usize = 1440;

/// Delay between retries after a transient (would-block) I/O result.
const RETRY_INTERVAL: Duration = Duration::from_millis(25);

const PEEK_CHUNK_SIZE: usize = 256;

/// Anything a `Connection` can run over.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {}

pub type Result<T> = std::result::Result<T, ConnectionError>;

/// A connected socket plus its bookkeeping.
///
/// Dropping a `Connection` closes the socket.
pub struct Connection<S = TcpStream> {
    id: ConnectionId,
    stream: Option<S>,
    peer_ip: String,
    local_ip: String,
    idle_timeout: Duration,
    last_active: Instant,
    read_ahead: BytesMut,
    registry: Arc<NetworkRegistry>,
}

impl<S: Stream> Connection<S> {
    /// Wraps an already connected stream. The idle timeout starts out
    /// disabled.
    pub fn new(
        stream: S,
        peer_ip: impl Into<String>,
        local_ip: impl Into<String>,
        registry: Arc<NetworkRegistry>,
    ) -> Self {
        let peer_ip = peer_ip.into();
        let id = registry.register(&peer_ip);
        Self {
            id,
            stream: Some(stream),
            peer_ip,
            local_ip: local_ip.into(),
            idle_timeout: Duration::ZERO,
            last_active: Instant::now(),
            read_ahead: BytesMut::new(),
            registry,
        }
    }

    // --- Accessors ---

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_ip(&self) -> &str {
        &self.peer_ip
    }

    pub fn local_ip(&self) -> &str {
        &self.local_ip
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// `Duration::ZERO` disables the idle timeout.
    pub fn set_idle_timeout(&mut self, idle_timeout: Duration) {
        self.idle_timeout = idle_timeout;
    }

    pub fn registry(&self) -> &Arc<NetworkRegistry> {
        &self.registry
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Marks the connection as active now.
    pub fn still_active(&mut self) {
        self.last_active = Instant::now();
    }

    /// Whether no I/O has succeeded within the idle timeout.
    pub fn timed_out(&self) -> bool {
        !self.idle_timeout.is_zero() && self.last_active.elapsed() > self.idle_timeout
    }

    fn deadline(&self) -> Option<Instant> {
        if self.idle_timeout.is_zero() {
            None
        } else {
            Some(self.last_active + self.idle_timeout)
        }
    }

    // --- Receiving ---

    /// Reads whatever is available, waiting for at least one byte.
    ///
    /// Returns the number of bytes read; an orderly shutdown by the peer is
    /// reported as `ConnectionError::PeerClosed`.
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.read_ahead.is_empty() {
            let n = buf.len().min(self.read_ahead.len());
            buf[..n].copy_from_slice(&self.read_ahead[..n]);
            self.read_ahead.advance(n);
            self.still_active();
            return Ok(n);
        }
        self.read_from_socket(buf).await
    }

    /// Fills `buf` completely or fails with the first error.
    pub async fn recv_block(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            filled += self.recv(&mut buf[filled..]).await?;
        }
        Ok(filled)
    }

    /// Reads until `terminator` has been received.
    ///
    /// Returns the number of bytes up to and including the terminator. One
    /// byte of `buf` is kept in reserve; if `buf.len() - 1` bytes arrive
    /// without the terminator, `buf.len()` is returned to signal that the
    /// buffer is too small. Bytes that arrived after the terminator stay
    /// buffered for the next read.
    pub async fn recv_string(&mut self, buf: &mut [u8], terminator: &[u8]) -> Result<usize> {
        if terminator.is_empty() {
            return Ok(0);
        }
        let limit = buf.len().saturating_sub(1);
        let mut received = 0;
        while received < limit {
            let n = self.recv(&mut buf[received..limit]).await?;
            let scan_from = received.saturating_sub(terminator.len() - 1);
            received += n;
            if let Some(pos) = find(&buf[scan_from..received], terminator) {
                let end = scan_from + pos + terminator.len();
                self.unread(&buf[end..received]);
                return Ok(end);
            }
        }
        Ok(buf.len())
    }

    /// Copies pending bytes without consuming them and without waiting.
    ///
    /// Returns `Ok(0)` when nothing is pending. A peer that has closed the
    /// connection is reported as an error, as is an expired idle timeout.
    pub async fn peek(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.read_ahead.is_empty() {
            let stream = self.stream.as_mut().ok_or(ConnectionError::Closed)?;
            let mut chunk = [0u8; PEEK_CHUNK_SIZE];
            match timeout(Duration::ZERO, stream.read(&mut chunk)).await {
                Err(_) => {
                    if self.timed_out() {
                        warn!("idle time-out on connection from {}", self.peer_ip);
                        return Err(ConnectionError::TimedOut);
                    }
                    return Ok(0);
                }
                Ok(Ok(0)) => {
                    debug!("connection closed by {}", self.peer_ip);
                    return Err(ConnectionError::PeerClosed);
                }
                Ok(Ok(n)) => {
                    self.registry.record_received(self.id, n);
                    self.read_ahead.extend_from_slice(&chunk[..n]);
                }
                Ok(Err(e)) if is_transient(&e) => return Ok(0),
                Ok(Err(e)) => return Err(self.io_failure(e)),
            }
        }
        let n = buf.len().min(self.read_ahead.len());
        buf[..n].copy_from_slice(&self.read_ahead[..n]);
        self.still_active();
        Ok(n)
    }

    async fn read_from_socket(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let deadline = self.deadline();
            let stream = self.stream.as_mut().ok_or(ConnectionError::Closed)?;
            let result = match deadline {
                Some(deadline) => match timeout_at(deadline, stream.read(buf)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("idle time-out on connection from {}", self.peer_ip);
                        return Err(ConnectionError::TimedOut);
                    }
                },
                None => stream.read(buf).await,
            };
            match result {
                Ok(0) => {
                    debug!("connection closed by {}", self.peer_ip);
                    return Err(ConnectionError::PeerClosed);
                }
                Ok(n) => {
                    self.still_active();
                    self.registry.record_received(self.id, n);
                    return Ok(n);
                }
                Err(e) if is_transient(&e) => {
                    if self.timed_out() {
                        warn!("idle time-out on connection from {}", self.peer_ip);
                        return Err(ConnectionError::TimedOut);
                    }
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(e) => return Err(self.io_failure(e)),
            }
        }
    }

    /// Puts bytes back in front of the read-ahead buffer.
    fn unread(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut pending = BytesMut::with_capacity(bytes.len() + self.read_ahead.len());
        pending.extend_from_slice(bytes);
        pending.extend_from_slice(&self.read_ahead);
        self.read_ahead = pending;
    }

    // --- Sending ---

    /// Sends all of `buf` in segments of at most `MAX_SEGMENT_SIZE` bytes.
    pub async fn send_block(&mut self, buf: &[u8]) -> Result<usize> {
        let mut sent = 0;
        while sent < buf.len() {
            let end = buf.len().min(sent + MAX_SEGMENT_SIZE);
            sent += self.send_segment(&buf[sent..end]).await?;
        }
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.flush().await {
                return Err(self.io_failure(e));
            }
        }
        Ok(sent)
    }

    pub async fn send_string(&mut self, s: &str) -> Result<usize> {
        self.send_block(s.as_bytes()).await
    }

    async fn send_segment(&mut self, segment: &[u8]) -> Result<usize> {
        loop {
            let deadline = self.deadline();
            let stream = self.stream.as_mut().ok_or(ConnectionError::Closed)?;
            let result = match deadline {
                Some(deadline) => match timeout_at(deadline, stream.write(segment)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("idle time-out sending to {}", self.peer_ip);
                        return Err(ConnectionError::TimedOut);
                    }
                },
                None => stream.write(segment).await,
            };
            match result {
                Ok(0) => {
                    debug!("connection closed by {}", self.peer_ip);
                    return Err(ConnectionError::PeerClosed);
                }
                Ok(n) => {
                    self.still_active();
                    self.registry.record_sent(self.id, n);
                    return Ok(n);
                }
                Err(e) if is_transient(&e) => {
                    if self.timed_out() {
                        warn!("idle time-out sending to {}", self.peer_ip);
                        return Err(ConnectionError::TimedOut);
                    }
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(e) => return Err(self.io_failure(e)),
            }
        }
    }

    /// Closes the socket. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            self.read_ahead.clear();
            self.registry.unregister(self.id);
            debug!("connection to {} closed", self.peer_ip);
        }
    }

    /// Classifies a hard I/O error, logging everything except the ones that
    /// just mean the peer went away.
    fn io_failure(&self, e: io::Error) -> ConnectionError {
        match e.kind() {
            io::ErrorKind::NotConnected => ConnectionError::Closed,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => {
                debug!("connection to {} lost: {}", self.peer_ip, e);
                ConnectionError::PeerClosed
            }
            _ => {
                error!("I/O error on connection with {}: {}", self.peer_ip, e);
                ConnectionError::Io(e)
            }
        }
    }
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_ip", &self.peer_ip)
            .field("local_ip", &self.local_ip)
            .field("idle_timeout", &self.idle_timeout)
            .field("closed", &self.stream.is_none())
            .finish()
    }
}

impl<S> Drop for Connection<S> {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            self.registry.unregister(self.id);
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
