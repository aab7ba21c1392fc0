//! Error handlers
//!
//! Converts engine errors into FTP control replies.

use crate::error::types::{NegotiationError, StorageError, TransferError};
use crate::protocol::responses::{
    ACCESS_DENIED, ACTIVE_FAILED, CANNOT_OPEN_FILE, CANNOT_WRITE_FILE, NO_DATA_CONNECTION,
    NOT_MOUNTED, PASSIVE_FAILED, TRANSFER_ERROR,
};

/// Reply sent on the control connection when a data channel cannot be
/// negotiated or opened. The control connection stays open.
pub fn negotiation_error_reply(err: &NegotiationError) -> &'static str {
    match err {
        NegotiationError::InvalidAddress(_) | NegotiationError::Active(_) => ACTIVE_FAILED,
        NegotiationError::Passive(_) => PASSIVE_FAILED,
        NegotiationError::NoDataChannel => NO_DATA_CONNECTION,
    }
}

/// Reply for a storage guard failure.
pub fn storage_error_reply(err: &StorageError) -> String {
    match err {
        StorageError::NotMounted => NOT_MOUNTED.to_string(),
        StorageError::InvalidPath(what) => format!("501 invalid {}\r\n", what),
        StorageError::AccessDenied(_) => ACCESS_DENIED.to_string(),
        StorageError::Io(_) => "550 requested action not taken\r\n".to_string(),
    }
}

/// Final reply of a transfer that failed after `150` was sent.
pub fn transfer_error_reply(err: &TransferError) -> &'static str {
    match err {
        TransferError::Connection(_) | TransferError::Listing(_) | TransferError::Read(_) => {
            TRANSFER_ERROR
        }
        TransferError::Open(_) => CANNOT_OPEN_FILE,
        TransferError::Write(_) => CANNOT_WRITE_FILE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConnectError, ConnectionError};

    #[test]
    fn test_negotiation_replies() {
        assert_eq!(
            negotiation_error_reply(&NegotiationError::Passive("timeout".into())),
            "425 can't open passive data connection\r\n"
        );
        assert_eq!(
            negotiation_error_reply(&NegotiationError::Active(ConnectError::TimedOut)),
            "425 can't open active data connection\r\n"
        );
        assert_eq!(
            negotiation_error_reply(&NegotiationError::InvalidAddress("1,2".into())),
            "425 can't open active data connection\r\n"
        );
    }

    #[test]
    fn test_storage_replies() {
        assert_eq!(
            storage_error_reply(&StorageError::InvalidPath("directory name".into())),
            "501 invalid directory name\r\n"
        );
        assert_eq!(
            storage_error_reply(&StorageError::AccessDenied("/x".into())),
            "550 access denyed\r\n"
        );
    }

    #[test]
    fn test_transfer_replies() {
        assert_eq!(
            transfer_error_reply(&TransferError::Connection(ConnectionError::TimedOut)),
            "426 data transfer error\r\n"
        );
        assert_eq!(
            transfer_error_reply(&TransferError::Open(StorageError::NotMounted)),
            "450 can not open the file\r\n"
        );
    }
}
