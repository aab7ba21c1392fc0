//! Server core functionality
//!
//! Assembles the FTP and Telnet servers from the networking core, the
//! storage and authentication collaborators and the configuration.

pub mod core;
pub mod factories;

pub use core::Server;
pub use factories::{FtpSessionFactory, TelnetSessionFactory};
