//! Authentication validator
//!
//! Decides who may log in and where they land. Both the FTP and the Telnet
//! sessions ask an `Authenticator` for the home directory of a user name and
//! password pair.

use log::{info, warn};

use super::credentials::CredentialStore;
use crate::config::UserConfig;

/// Home directory of anonymous users
pub const ANONYMOUS_HOME: &str = "/";

const MAX_INPUT_LENGTH: usize = 64;

/// Checks credentials. `None` means the login is denied.
pub trait Authenticator: Send + Sync {
    fn home_directory(&self, user_name: &str, password: &str) -> Option<String>;
}

/// Authenticates against the `users` table of the configuration. With no
/// users configured everybody is let in with home directory `/`.
#[derive(Debug, Clone, Default)]
pub struct ConfigAuthenticator {
    store: CredentialStore,
}

impl ConfigAuthenticator {
    pub fn new(users: &[UserConfig]) -> Self {
        Self {
            store: CredentialStore::from_config(users),
        }
    }
}

/// Performs basic input sanitation to check for malicious or malformed usernames/passwords.
fn is_valid_input(input: &str) -> bool {
    input.len() <= MAX_INPUT_LENGTH && !input.contains(['\r', '\n', '\0'])
}

impl Authenticator for ConfigAuthenticator {
    fn home_directory(&self, user_name: &str, password: &str) -> Option<String> {
        if !is_valid_input(user_name) || !is_valid_input(password) {
            warn!("malformed credentials rejected");
            return None;
        }
        if self.store.is_empty() {
            return Some(ANONYMOUS_HOME.to_string());
        }
        match self.store.get(user_name) {
            Some(credentials) if credentials.password == password => {
                info!("user {} authenticated", user_name);
                Some(credentials.home_directory.clone())
            }
            Some(_) => {
                warn!("wrong password for user {}", user_name);
                None
            }
            None => {
                warn!("unknown user {}", user_name);
                None
            }
        }
    }
}
