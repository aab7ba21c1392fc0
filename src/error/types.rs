//! Error types
//!
//! Defines the error types for each layer of the engine. Socket-level results
//! are expressed as `ConnectionError` rather than sentinel integers; the
//! negotiator and storage layers have their own enums that are rendered as
//! FTP replies by `error::handlers`.

use std::io;

use thiserror::Error;

/// Failure of a single I/O operation on a `Connection`.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The peer performed an orderly shutdown. Not an error condition.
    #[error("connection closed by peer")]
    PeerClosed,

    /// No successful I/O within the idle timeout.
    #[error("idle time-out")]
    TimedOut,

    /// The connection was already closed locally.
    #[error("connection is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ConnectionError {
    /// True for outcomes that end a session without anything to report.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, ConnectionError::PeerClosed | ConnectionError::Closed)
    }
}

/// Failure to bring a `Listener` into the running state.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("socket error: {0}")]
    Socket(io::Error),

    #[error("bind error on port {port}: {source}")]
    Bind { port: u16, source: io::Error },

    #[error("listen error on port {port}: {source}")]
    Listen { port: u16, source: io::Error },
}

/// Failure of an outbound connect.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("not connected")]
    NotConnected,

    #[error("{0}")]
    Resolve(String),

    #[error("{0}")]
    Socket(String),

    #[error("connect time-out")]
    TimedOut,
}

/// A session factory declined to start a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("service unavailable, {running} connections running")]
    Unavailable { running: usize },
}

/// Failure while negotiating or opening an FTP data channel.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("invalid address argument: {0}")]
    InvalidAddress(String),

    #[error("active data connection failed: {0}")]
    Active(#[from] ConnectError),

    #[error("passive data connection failed: {0}")]
    Passive(String),

    #[error("no data connection has been negotiated")]
    NoDataChannel,
}

impl NegotiationError {
    /// Whether the failure happened on the passive side of the negotiation.
    pub fn is_passive(&self) -> bool {
        matches!(self, NegotiationError::Passive(_))
    }
}

/// File system collaborator errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file system not mounted")]
    NotMounted,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failure while moving data over an open data connection.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("data connection failed: {0}")]
    Connection(#[from] ConnectionError),

    #[error("cannot list directory: {0}")]
    Listing(StorageError),

    #[error("cannot open file: {0}")]
    Open(StorageError),

    #[error("cannot read file: {0}")]
    Read(io::Error),

    #[error("cannot write file: {0}")]
    Write(io::Error),
}

/// Failure of the HTTP GET helper.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("malformed response")]
    MalformedResponse,
}

/// Umbrella error for server start-up.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("logger already installed: {0}")]
    Logger(#[from] log::SetLoggerError),

    #[error("no listener could be started")]
    NoListener,

    #[error(transparent)]
    Storage(#[from] StorageError),
}
