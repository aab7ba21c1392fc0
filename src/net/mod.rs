//! Networking core
//!
//! Connections, listeners and the outbound connector shared by every
//! protocol, plus the registry holding process-wide network state.

pub mod connection;
pub mod connector;
pub mod http;
pub mod listener;
pub mod registry;
pub mod session;

pub use connection::{Connection, MAX_SEGMENT_SIZE, Stream};
pub use connector::Connector;
pub use listener::{Listener, ListenerOptions, ListenerState};
pub use registry::{ConnectionId, NetworkRegistry};
pub use session::{Session, SessionFactory, spawn_session};
