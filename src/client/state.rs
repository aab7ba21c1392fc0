//! Module `client`
//!
//! Defines the `Client` struct holding the login state of one FTP control
//! session: user name, home and working directory, and a pending rename.

/// What RNFR selected for the following RNTO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameSource {
    File(String),
    Directory(String),
}

/// Represents the state of a connected FTP client.
///
/// A client is logged in once it has a home directory.
#[derive(Debug, Clone, Default)]
pub struct Client {
    username: Option<String>,
    home_directory: Option<String>,
    working_directory: String,
    rename_from: Option<RenameSource>,
}

impl Client {
    /// Completes the login; the working directory starts at home.
    pub fn login(&mut self, home_directory: String) {
        self.working_directory = home_directory.clone();
        self.home_directory = Some(home_directory);
    }

    /// Resets the client state, logging out and clearing all stored data.
    pub fn logout(&mut self) {
        *self = Self::default();
    }

    // --------------------
    // Getter methods
    // --------------------

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.home_directory.is_some()
    }

    pub fn home_directory(&self) -> Option<&str> {
        self.home_directory.as_deref()
    }

    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }

    // --------------------
    // Setter methods
    // --------------------

    /// Sets the user name for the next PASS. Any previous login is dropped.
    pub fn set_username(&mut self, username: &str) {
        self.logout();
        self.username = Some(username.to_string());
    }

    pub fn set_working_directory(&mut self, path: String) {
        self.working_directory = path;
    }

    pub fn set_rename_from(&mut self, source: Option<RenameSource>) {
        self.rename_from = source;
    }

    pub fn take_rename_from(&mut self) -> Option<RenameSource> {
        self.rename_from.take()
    }
}
