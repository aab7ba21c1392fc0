//! Authentication system
//!
//! Handles user authentication and home directory lookup.

pub mod credentials;
pub mod validator;

pub use validator::{ANONYMOUS_HOME, Authenticator, ConfigAuthenticator};
