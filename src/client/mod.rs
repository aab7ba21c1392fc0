//! FTP client sessions
//!
//! Login state of a client and the control session serving it.

pub mod handler;
pub mod state;

pub use handler::FtpSession;
pub use state::{Client, RenameSource};
