//! Logging middleware
//!
//! Connection and command logging shared by the FTP and Telnet sessions.

use log::{debug, info};

/// Log a newly accepted connection
pub fn log_connection(service: &str, peer_ip: &str, local_ip: &str) {
    info!("{} connection from {} to {}", service, peer_ip, local_ip);
}

/// Log a received command. Passwords never reach the log.
pub fn log_command(peer_ip: &str, command_line: &str) {
    debug!("{} sent: {}", peer_ip, mask_password(command_line));
}

fn mask_password(command_line: &str) -> String {
    let trimmed = command_line.trim_end();
    match trimmed.get(..4) {
        Some(verb) if verb.eq_ignore_ascii_case("PASS") => "PASS ****".to_string(),
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(mask_password("PASS secret\r\n"), "PASS ****");
        assert_eq!(mask_password("pass secret"), "PASS ****");
        assert_eq!(mask_password("LIST /home\r\n"), "LIST /home");
    }
}
