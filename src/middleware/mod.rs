//! Server middleware
//!
//! Provides connection filtering and logging helpers.

pub mod firewall;
pub mod logging;

pub use firewall::Firewall;
