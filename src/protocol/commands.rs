//! Module `command`
//!
//! Data structures representing parsed FTP commands and the outcome of
//! executing them.

/// Represents an FTP command parsed from the client input.
///
/// Commands that take an argument carry the rest of the command line, so
/// file names containing spaces arrive intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    QUIT,
    OPTS(String),
    USER(String),
    PASS(String),
    PWD,
    TYPE,
    NOOP,
    SYST,
    FEAT,
    PORT(String),
    EPRT(String),
    PASV,
    EPSV,
    LIST(Option<String>), // LIST and NLST
    SIZE(String),
    MKD(String),  // MKD and XMKD
    RMD(String),  // RMD, XRMD and DELE
    CWD(String),
    RNFR(String),
    RNTO(String),
    RETR(String),
    STOR(String),
    UNKNOWN(String), // verb as received
}

impl Command {
    /// Commands that consume the negotiated data connection.
    pub fn uses_data_connection(&self) -> bool {
        matches!(self, Command::LIST(_) | Command::RETR(_) | Command::STOR(_))
    }
}

/// Represents the outcome status of executing a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure,
    CloseConnection,
}

/// Struct encapsulating the full result of a command execution.
///
/// `message` is the reply still to be sent. Transfers send their `150`
/// themselves and leave the final reply here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub message: Option<String>,
}

impl CommandResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: Some(message.into()),
        }
    }

    pub fn close(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::CloseConnection,
            message: Some(message.into()),
        }
    }

    /// Ends the session without a reply, the control connection is gone.
    pub fn abort() -> Self {
        Self {
            status: CommandStatus::CloseConnection,
            message: None,
        }
    }
}
