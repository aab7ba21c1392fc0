//! Utility functions
//!
//! Logging setup and address helpers.

pub mod logging;
pub mod network;
