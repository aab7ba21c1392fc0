//! Navigate module
//!
//! Handles directory navigation for FTP and Telnet sessions.

mod operations;

pub use operations::change_directory;
