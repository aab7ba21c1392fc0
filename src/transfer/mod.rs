//! Transfer module for FTP server
//!
//! Negotiates data channels (active and passive mode) and moves listings
//! and files over them.

pub mod data_channel;
pub mod file_ops;
pub mod modes;

pub use data_channel::DataChannelNegotiator;
pub use file_ops::{receive_file, send_file, send_listing};
pub use modes::TransferMode;
