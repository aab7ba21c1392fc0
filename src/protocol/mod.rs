//! FTP Protocol implementation
//!
//! Handles FTP command parsing, dispatch and reply generation.

pub mod commands;
pub mod handlers;
pub mod parser;
pub mod responses;

pub use commands::{Command, CommandResult, CommandStatus};
pub use handlers::handle_command;
pub use parser::parse_command;
