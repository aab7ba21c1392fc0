//! Configuration management for the lwnet servers
//!
//! Settings come from an optional `config.toml` with environment overrides
//! (`LWNET_FTP__PORT=2121`, `LWNET_STORAGE__ROOT=/srv`, ...). Everything has
//! a built-in default, so the servers start without any configuration file.

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

/// Complete server configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Name the servers introduce themselves with
    pub hostname: String,

    /// Number of log lines kept for `dmesg`
    pub log_queue_size: usize,

    pub network: NetworkConfig,
    pub ftp: FtpConfig,
    pub telnet: TelnetConfig,
    pub storage: StorageConfig,

    /// Users allowed to log in. Empty means anonymous access to `/`.
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    /// Bound on outbound connects (active FTP data, curl)
    pub connect_timeout_secs: u64,

    /// Sessions running at once across all servers
    pub max_connections: usize,

    /// Client addresses allowed to connect (`10.0.0.5`, `192.168.1.*`).
    /// Empty allows everybody.
    pub allowed_clients: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FtpConfig {
    pub enabled: bool,
    pub port: u16,
    pub control_timeout_secs: u64,
    pub data_timeout_secs: u64,

    /// Passive data ports are taken from the 16 ports above this one
    pub passive_port_base: u16,

    /// How long to wait for the client to connect to a passive port
    pub rendezvous_timeout_secs: u64,

    pub command_buffer_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelnetConfig {
    pub enabled: bool,
    pub port: u16,
    pub idle_timeout_secs: u64,
    pub command_buffer_size: usize,

    /// For terminals that send DEL for backspace and vice versa
    pub swap_backspace_and_delete: bool,

    /// Ask for user name and password before the prompt
    pub login_required: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Host directory served as `/`
    pub root: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct UserConfig {
    pub name: String,
    pub password: String,
    pub home: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "lwnet".to_string(),
            log_queue_size: 64,
            network: NetworkConfig::default(),
            ftp: FtpConfig::default(),
            telnet: TelnetConfig::default(),
            storage: StorageConfig::default(),
            users: Vec::new(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            max_connections: 32,
            allowed_clients: Vec::new(),
        }
    }
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 2121,
            control_timeout_secs: 300,
            data_timeout_secs: 3,
            passive_port_base: 1024,
            rendezvous_timeout_secs: 3,
            command_buffer_size: 300,
        }
    }
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 2323,
            idle_timeout_secs: 256,
            command_buffer_size: 300,
            swap_backspace_and_delete: false,
            login_required: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "./server_root".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from ./config.toml with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from `path` (extension optional) with environment
    /// overrides. A missing file is not an error.
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("LWNET")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.ftp.enabled && self.ftp.port == 0 {
            return Err(config::ConfigError::Message("ftp.port cannot be 0".into()));
        }

        if self.telnet.enabled && self.telnet.port == 0 {
            return Err(config::ConfigError::Message(
                "telnet.port cannot be 0".into(),
            ));
        }

        if self.ftp.passive_port_base == 0 || self.ftp.passive_port_base > u16::MAX - 16 {
            return Err(config::ConfigError::Message(
                "ftp.passive_port_base leaves no room for the passive port window".into(),
            ));
        }

        if self.ftp.command_buffer_size < 16 || self.telnet.command_buffer_size < 16 {
            return Err(config::ConfigError::Message(
                "command buffers must hold at least 16 bytes".into(),
            ));
        }

        if self.storage.root.is_empty() {
            return Err(config::ConfigError::Message(
                "storage.root cannot be empty".into(),
            ));
        }

        if self.network.max_connections == 0 {
            return Err(config::ConfigError::Message(
                "network.max_connections must be greater than 0".into(),
            ));
        }

        if let Some(user) = self.users.iter().find(|u| !u.home.starts_with('/')) {
            return Err(config::ConfigError::Message(format!(
                "home directory of user {} must start with /",
                user.name
            )));
        }

        Ok(())
    }

    pub fn storage_root(&self) -> PathBuf {
        PathBuf::from(&self.storage.root)
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl FtpConfig {
    pub fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.control_timeout_secs)
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_timeout_secs)
    }

    pub fn rendezvous_timeout(&self) -> Duration {
        Duration::from_secs(self.rendezvous_timeout_secs)
    }
}

impl TelnetConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ftp.data_timeout(), Duration::from_secs(3));
        assert_eq!(config.telnet.idle_timeout(), Duration::from_secs(256));
        assert_eq!(config.log_queue_size, 64);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
hostname = "testbox"

[ftp]
port = 2100
passive_port_base = 50000

[telnet]
login_required = true

[[users]]
name = "joe"
password = "secret"
home = "/home/joe"
"#
        )
        .unwrap();

        let config = ServerConfig::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.hostname, "testbox");
        assert_eq!(config.ftp.port, 2100);
        assert_eq!(config.ftp.passive_port_base, 50000);
        // untouched values keep their defaults
        assert_eq!(config.ftp.control_timeout_secs, 300);
        assert!(config.telnet.login_required);
        assert_eq!(config.users.len(), 1);
        assert_eq!(config.users[0].home, "/home/joe");
    }

    #[test]
    fn test_validation_rejects_nonsense() {
        let mut config = ServerConfig::default();
        config.network.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.users.push(UserConfig {
            name: "joe".into(),
            password: "x".into(),
            home: "home/joe".into(),
        });
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.storage.root.clear();
        assert!(config.validate().is_err());
    }
}
