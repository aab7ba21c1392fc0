//! FTP Command parsing
//!
//! Handles parsing of FTP commands from client input.

use crate::protocol::Command;

/// Parses a raw command line received from a client into the `Command` enum.
///
/// The verb is matched case-insensitively; the argument is the rest of the
/// line with surrounding white space removed.
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or("");
    let arg = parts.next().unwrap_or("").trim().to_string();

    match verb.to_ascii_uppercase().as_str() {
        "QUIT" => Command::QUIT,
        "OPTS" => Command::OPTS(arg),
        "USER" => Command::USER(arg),
        "PASS" => Command::PASS(arg),
        "PWD" | "XPWD" => Command::PWD,
        "TYPE" => Command::TYPE,
        "NOOP" => Command::NOOP,
        "SYST" => Command::SYST,
        "FEAT" => Command::FEAT,
        "PORT" => Command::PORT(arg),
        "EPRT" => Command::EPRT(arg),
        "PASV" => Command::PASV,
        "EPSV" => Command::EPSV,
        "LIST" | "NLST" => Command::LIST(list_argument(arg)),
        "SIZE" => Command::SIZE(arg),
        "MKD" | "XMKD" => Command::MKD(arg),
        "RMD" | "XRMD" | "DELE" => Command::RMD(arg),
        "CWD" => Command::CWD(arg),
        "RNFR" => Command::RNFR(arg),
        "RNTO" => Command::RNTO(arg),
        "RETR" => Command::RETR(arg),
        "STOR" => Command::STOR(arg),
        _ => Command::UNKNOWN(verb.to_string()),
    }
}

/// LIST options such as `-la` are ignored; what remains is the directory.
fn list_argument(arg: String) -> Option<String> {
    let directory: Vec<&str> = arg
        .split_whitespace()
        .skip_while(|word| word.starts_with('-'))
        .collect();
    if directory.is_empty() {
        None
    } else {
        Some(directory.join(" "))
    }
}
