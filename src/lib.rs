//! lwnet - FTP and Telnet servers on a small networking engine
//!
//! `net` holds the engine (connections, listeners, the outbound connector);
//! the FTP server lives in `client`, `protocol` and `transfer`, the Telnet
//! server in `telnet`. `server` puts everything together.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod middleware;
pub mod navigate;
pub mod net;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod telnet;
pub mod transfer;
pub mod utils;

pub use config::ServerConfig;
pub use server::Server;
