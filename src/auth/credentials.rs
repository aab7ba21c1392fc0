//! Credential storage
//!
//! The user table the configuration authenticator checks against.

use std::collections::HashMap;

use crate::config::UserConfig;

/// What is known about one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub password: String,
    pub home_directory: String,
}

/// Users by name
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: HashMap<String, Credentials>,
}

impl CredentialStore {
    pub fn from_config(users: &[UserConfig]) -> Self {
        let users = users
            .iter()
            .map(|user| {
                (
                    user.name.clone(),
                    Credentials {
                        password: user.password.clone(),
                        home_directory: user.home.clone(),
                    },
                )
            })
            .collect();
        Self { users }
    }

    pub fn get(&self, user_name: &str) -> Option<&Credentials> {
        self.users.get(user_name)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
