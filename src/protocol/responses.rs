//! FTP Response handling
//!
//! Reply lines sent on the control connection. The wording is part of the
//! observable behaviour of the server, spelling included.

pub const GREETING_TAIL: &str = " FTP server - please login\r\n220 \r\n";

pub const CLOSING: &str = "221 closing connection\r\n";
pub const OK: &str = "200 ok\r\n";
pub const UTF8_ENABLED: &str = "200 UTF8 enabled\r\n";
pub const OPTS_NOT_SUPPORTED: &str = "502 OPTS arguments not supported\r\n";
pub const SYSTEM_TYPE: &str = "215 UNIX Type: L8\r\n";
pub const FEATURES: &str = "211-Extensions supported:\r\n UTF8\r\n211 end\r\n";
pub const PORT_OK: &str = "200 port ok\r\n";

pub const ENTER_PASSWORD: &str = "331 enter password\r\n";
pub const LOGIN_DENIED: &str = "530 login denyed\r\n";
pub const INVALID_HOME: &str = "530 invalid user's home directory\r\n";
pub const NOT_LOGGED_IN: &str = "530 not logged in\r\n";

pub const NOT_MOUNTED: &str = "421 file system not mounted\r\n";
pub const ACCESS_DENIED: &str = "550 access denyed\r\n";

pub const DIRECTORY_CREATED: &str = "257 directory created\r\n";
pub const CANNOT_CREATE_DIRECTORY: &str = "550 could not create directory\r\n";
pub const FILE_DELETED: &str = "250 file deleted\r\n";
pub const CANNOT_DELETE_FILE: &str = "452 could not delete file\r\n";
pub const DIRECTORY_REMOVED: &str = "250 directory removed\r\n";
pub const CANNOT_REMOVE_DIRECTORY: &str = "452 could not remove directory\r\n";
pub const CANNOT_REMOVE_HOME: &str = "550 you can't remove your home directory\r\n";
pub const CANNOT_REMOVE_WORKING: &str = "550 you can't remove your working directory\r\n";
pub const NEED_MORE_INFORMATION: &str = "350 need more information\r\n";
pub const RENAMED: &str = "250 renamed\r\n";
pub const CANNOT_RENAME: &str = "553 unable to rename\r\n";

pub const ACTIVE_FAILED: &str = "425 can't open active data connection\r\n";
pub const PASSIVE_FAILED: &str = "425 can't open passive data connection\r\n";
pub const NO_DATA_CONNECTION: &str = "425 can't open data connection\r\n";

pub const TRANSFER_STARTING: &str = "150 starting data transfer\r\n";
pub const TRANSFER_COMPLETE: &str = "226 data transfer complete\r\n";
pub const TRANSFER_ERROR: &str = "426 data transfer error\r\n";
pub const CANNOT_OPEN_FILE: &str = "450 can not open the file\r\n";
pub const CANNOT_WRITE_FILE: &str = "450 can not write the file\r\n";

/// Multi-line greeting sent when a control connection opens
pub fn greeting(hostname: &str) -> String {
    format!("220-{}{}", hostname, GREETING_TAIL)
}

/// `230` reply naming the home directory
pub fn logged_on(home_directory: &str) -> String {
    format!(
        "230 logged on, your home directory is \"{}\"\r\n",
        display_path(home_directory)
    )
}

/// `257` reply naming the working directory
pub fn working_directory(path: &str) -> String {
    format!("257 \"{}\"\r\n", display_path(path))
}

pub fn directory_changed(path: &str) -> String {
    format!("250 your working directory is {}\r\n", path)
}

pub fn file_size(size: u64) -> String {
    format!("213 {}\r\n", size)
}

pub fn not_implemented(verb: &str) -> String {
    format!("502 command {} not implemented\r\n", verb)
}

/// Reply sent instead of a greeting when no more sessions can be started
pub fn service_unavailable(running: usize) -> String {
    format!(
        "421 FTP service is currently unavailable, {} connections running\r\n",
        running
    )
}

/// Path without a trailing slash, `/` for the root.
fn display_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting() {
        assert_eq!(
            greeting("esp32"),
            "220-esp32 FTP server - please login\r\n220 \r\n"
        );
    }

    #[test]
    fn test_paths_in_replies() {
        assert_eq!(
            logged_on("/home/joe/"),
            "230 logged on, your home directory is \"/home/joe\"\r\n"
        );
        assert_eq!(logged_on("/"), "230 logged on, your home directory is \"/\"\r\n");
        assert_eq!(working_directory("/"), "257 \"/\"\r\n");
    }

    #[test]
    fn test_not_implemented() {
        assert_eq!(not_implemented("MDTM"), "502 command MDTM not implemented\r\n");
    }
}
