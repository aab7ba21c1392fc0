//! Telnet server side
//!
//! `iac` strips the protocol from the byte stream, `line` edits input lines,
//! `session` runs the conversation and `commands` holds the built-ins.

pub mod commands;
pub mod iac;
pub mod line;
pub mod session;

pub use iac::{TelnetConnection, WindowSize};
pub use line::LineEvent;
pub use session::{TelnetCommandHandler, TelnetContext, TelnetServices, TelnetSession};
