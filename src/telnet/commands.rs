//! Built-in Telnet commands
//!
//! Everything a Telnet user can type without an application supplied
//! `TelnetCommandHandler`: session and system information, network tools
//! and file commands confined to the user's home directory.

use std::sync::Arc;
use std::time::Duration;

use jiff::Zoned;
use jiff::tz::TimeZone;
use tokio::io::AsyncReadExt;
use tokio::time::sleep;

use crate::error::{ConnectionError, HttpError, StorageError};
use crate::navigate::change_directory;
use crate::net::Stream;
use crate::net::http::http_get;
use crate::telnet::session::TelnetSession;
use crate::utils::logging::LogEntry;

/// Words beyond this many are ignored.
pub const MAX_ARGC: usize = 24;

const CLEAR_SCREEN: &str = "\x1b[2J";
const DMESG_FOLLOW_INTERVAL: Duration = Duration::from_millis(100);
const MAX_NOHUP_SECONDS: u64 = 3600;
const CAT_CHUNK_SIZE: usize = 1024;

const NOT_MOUNTED: &str = "File system not mounted";
const INVALID_DIRECTORY: &str = "Invalid directory name";
const INVALID_FILE: &str = "Invalid file name";
const ACCESS_DENIED: &str = "Access denyed";
const WRONG_URL: &str = "Wrong url, use form of http://server/address or http://server:port/address";

const HELP: &str = "Supported commands:\
    \r\n      help\
    \r\n      clear\
    \r\n      uname\
    \r\n      free\
    \r\n      nohup [<n>]   (where 0 < n <= 3600)\
    \r\n      dmesg [-follow] [-time]\
    \r\n      quit\
    \r\n  time commands:\
    \r\n      uptime\
    \r\n  network commands:\
    \r\n      netstat\
    \r\n      curl [method] http://url\
    \r\n  file commands:\
    \r\n      ls [<directoryName>]\
    \r\n      mkdir <directoryName>\
    \r\n      rmdir <directoryName>\
    \r\n      cd <directoryName or ..>\
    \r\n      pwd\
    \r\n      cat <fileName>\
    \r\n      rm <fileName>";

/// Outcome of a built-in command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Text for the client, without a trailing line end.
    Text(String),
    /// The command already sent its output.
    Done,
    /// End the session.
    Quit,
    /// Not a built-in command.
    Unknown,
}

fn text(s: impl Into<String>) -> Reply {
    Reply::Text(s.into())
}

fn wrong_syntax(usage: &str) -> Reply {
    Reply::Text(format!("Wrong syntax, use {}", usage))
}

/// Splits a command line at spaces. Text between double quotes stays in one
/// word, quotes included.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut argv = Vec::new();
    let mut word = String::new();
    let mut inside_quotes = false;
    for c in line.chars() {
        match c {
            ' ' if !inside_quotes => {
                if !word.is_empty() {
                    argv.push(std::mem::take(&mut word));
                }
            }
            '"' => {
                inside_quotes = !inside_quotes;
                word.push(c);
            }
            c => word.push(c),
        }
    }
    if !word.is_empty() {
        argv.push(word);
    }
    argv.truncate(MAX_ARGC);
    argv
}

/// `[D days, ]hh:mm:ss`
fn format_uptime(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let rest = total_seconds % 86_400;
    let clock = format!("{:02}:{:02}:{:02}", rest / 3600, rest % 3600 / 60, rest % 60);
    if days > 0 {
        format!("{} days, {}", days, clock)
    } else {
        clock
    }
}

fn format_log_entry(entry: &LogEntry, true_time: bool) -> String {
    if true_time {
        let time = entry.time.to_zoned(TimeZone::system());
        format!("[{}] {}", time.strftime("%Y/%m/%d %H:%M:%S"), entry.message)
    } else {
        format!("[{:>10}] {}", entry.uptime_millis, entry.message)
    }
}

/// LF line ends become CRLF, CRs in the file are dropped.
fn to_crlf(chunk: &[u8]) -> Vec<u8> {
    let mut converted = Vec::with_capacity(chunk.len() + chunk.len() / 16);
    for &byte in chunk {
        match byte {
            b'\r' => {}
            b'\n' => converted.extend_from_slice(b"\r\n"),
            byte => converted.push(byte),
        }
    }
    converted
}

impl<S: Stream> TelnetSession<S> {
    /// Runs a built-in command. Only a failing connection is an error.
    pub(crate) async fn run_builtin(&mut self, argv: &[String]) -> Result<Reply, ConnectionError> {
        let args: Vec<&str> = argv.iter().map(String::as_str).collect();
        let reply = match args.as_slice() {
            ["help"] => text(HELP),
            ["help", ..] => wrong_syntax("help"),
            ["quit"] => Reply::Quit,
            ["quit", ..] => wrong_syntax("quit"),
            ["clear"] => text(CLEAR_SCREEN),
            ["clear", ..] => wrong_syntax("clear"),
            ["uname"] => text(self.uname()),
            ["uname", ..] => wrong_syntax("uname"),
            ["uptime"] => text(self.uptime()),
            ["uptime", ..] => wrong_syntax("uptime"),
            ["free"] => text(self.free()),
            ["free", ..] => wrong_syntax("free"),
            ["nohup"] => text(self.nohup(0)),
            ["nohup", seconds] => match seconds.parse::<u64>() {
                Ok(n) if (1..=MAX_NOHUP_SECONDS).contains(&n) => text(self.nohup(n)),
                _ => wrong_syntax("nohup [<n>]   (where 0 < n <= 3600)"),
            },
            ["nohup", ..] => wrong_syntax("nohup [<n>]   (where 0 < n <= 3600)"),
            ["dmesg", options @ ..] => {
                let follow = options.contains(&"-follow");
                let true_time = options.contains(&"-time");
                if options.iter().all(|o| *o == "-follow" || *o == "-time") {
                    self.dmesg(follow, true_time).await?
                } else {
                    wrong_syntax("dmesg [-follow] [-time]")
                }
            }
            ["netstat"] => text(self.netstat()),
            ["netstat", ..] => wrong_syntax("netstat"),
            ["curl", url] => self.curl("GET", url).await?,
            ["curl", method, url] => self.curl(method, url).await?,
            ["curl", ..] => wrong_syntax("curl [method] http://url"),
            ["ls"] => self.ls("").await?,
            ["ls", directory] => self.ls(directory).await?,
            ["ls", ..] => wrong_syntax("ls [<directoryName>]"),
            ["mkdir", directory] => self.mkdir(directory).await,
            ["mkdir", ..] => wrong_syntax("mkdir <directoryName>"),
            ["rmdir", directory] => self.rmdir(directory).await,
            ["rmdir", ..] => wrong_syntax("rmdir <directoryName>"),
            ["cd", directory] => self.cd(directory).await,
            ["cd.."] => self.cd("..").await,
            ["cd", ..] | ["cd..", ..] => wrong_syntax("cd <directoryName>"),
            ["pwd"] => self.pwd().await,
            ["pwd", ..] => wrong_syntax("pwd"),
            ["cat", file] => self.cat(file).await?,
            ["cat", ..] => wrong_syntax("cat <fileName>"),
            ["rm", file] => self.rm(file).await,
            ["rm", ..] => wrong_syntax("rm <fileName>"),
            _ => Reply::Unknown,
        };
        Ok(reply)
    }

    // --- System ---

    fn uname(&self) -> String {
        format!(
            "{} {} {} {}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            self.hostname,
            std::env::consts::OS,
            std::env::consts::ARCH
        )
    }

    fn uptime(&self) -> String {
        let now = Zoned::now();
        let up = self.telnet.connection().registry().uptime().as_secs();
        format!("{} up {}", now.strftime("%H:%M:%S"), format_uptime(up))
    }

    fn free(&self) -> String {
        format!(
            "running connections: {} of {}",
            self.telnet.connection().registry().running_connections(),
            self.max_connections
        )
    }

    /// Zero seconds disables the idle timeout.
    fn nohup(&mut self, seconds: u64) -> String {
        self.telnet
            .connection_mut()
            .set_idle_timeout(Duration::from_secs(seconds));
        if seconds == 0 {
            "The connection timeout is infinite".to_string()
        } else {
            format!("The connection timeout is {} seconds", seconds)
        }
    }

    /// Prints the log queue. With `follow` new messages keep coming until
    /// the user presses a key.
    async fn dmesg(&mut self, follow: bool, true_time: bool) -> Result<Reply, ConnectionError> {
        let queue = Arc::clone(&self.services.log_queue);
        let entries = queue.entries();
        let mut last = entries.last().map(|entry| entry.sequence);
        let listing = entries
            .iter()
            .map(|entry| format_log_entry(entry, true_time))
            .collect::<Vec<_>>()
            .join("\r\n");
        if !listing.is_empty() {
            self.telnet.send_string(&listing).await?;
        }

        if !follow {
            return Ok(Reply::Done);
        }
        loop {
            sleep(DMESG_FOLLOW_INTERVAL).await;
            if self.telnet.peek_char().await?.is_some() {
                self.telnet.recv_char().await?;
                return Ok(Reply::Done);
            }
            let newer = match last {
                Some(sequence) => queue.entries_after(sequence),
                None => queue.entries(),
            };
            for entry in newer {
                let line = format!("\r\n{}", format_log_entry(&entry, true_time));
                self.telnet.send_string(&line).await?;
                last = Some(entry.sequence);
            }
        }
    }

    // --- Network ---

    fn netstat(&self) -> String {
        let registry = self.telnet.connection().registry();
        let mut s = format!(
            "total bytes received and sent: {:>12} {:>12}\r\n\r\n",
            registry.bytes_received(),
            registry.bytes_sent()
        );
        s.push_str("connection  remote address                            received         sent\r\n");
        s.push_str(&"-".repeat(78));
        for traffic in registry.connection_traffic() {
            s.push_str(&format!(
                "\r\n{:<11} {:<40} {:>12} {:>12}",
                traffic.id.to_string(),
                traffic.peer,
                traffic.received,
                traffic.sent
            ));
        }
        s
    }

    async fn curl(&mut self, method: &str, url: &str) -> Result<Reply, ConnectionError> {
        if !method.eq_ignore_ascii_case("GET") {
            return Ok(text(format!("Method {} is not supported, use GET", method)));
        }
        match http_get(&self.connector, url).await {
            Ok(response) => {
                self.telnet.send_string(&response.header).await?;
                if !response.body.is_empty() {
                    self.telnet.send_block(&response.body).await?;
                }
                Ok(Reply::Done)
            }
            Err(HttpError::InvalidUrl(_)) => Ok(text(WRONG_URL)),
            Err(e) => Ok(text(e.to_string())),
        }
    }

    // --- Files ---

    /// Resolves `name` against the working directory of a mounted file
    /// system.
    async fn resolve(&self, name: &str, invalid: &str) -> Result<String, Reply> {
        if !self.services.fs.is_mounted().await {
            return Err(text(NOT_MOUNTED));
        }
        self.services
            .fs
            .make_full_path(name, self.client.working_directory())
            .ok_or_else(|| text(invalid))
    }

    async fn accessible_directory(&self, name: &str) -> Result<String, Reply> {
        let full_path = self.resolve(name, INVALID_DIRECTORY).await?;
        if !self.services.fs.is_directory(&full_path).await {
            return Err(text(INVALID_DIRECTORY));
        }
        if !self
            .services
            .fs
            .user_has_right_to_access_directory(&full_path, self.home_directory())
        {
            return Err(text(ACCESS_DENIED));
        }
        Ok(full_path)
    }

    async fn accessible_file(&self, name: &str) -> Result<String, Reply> {
        let full_path = self.resolve(name, INVALID_FILE).await?;
        if !self.services.fs.is_file(&full_path).await {
            return Err(text(INVALID_FILE));
        }
        if !self
            .services
            .fs
            .user_has_right_to_access_file(&full_path, self.home_directory())
        {
            return Err(text(ACCESS_DENIED));
        }
        Ok(full_path)
    }

    async fn ls(&mut self, name: &str) -> Result<Reply, ConnectionError> {
        let full_path = match self.accessible_directory(name).await {
            Ok(full_path) => full_path,
            Err(reply) => return Ok(reply),
        };
        let fs = Arc::clone(&self.services.fs);
        let Ok(entries) = fs.list_directory(&full_path).await else {
            return Ok(text(format!("Can't list {}", full_path)));
        };
        let mut lines = Vec::with_capacity(entries.len());
        for entry in &entries {
            if let Ok(line) = fs.file_information(entry, false).await {
                lines.push(line);
            }
        }
        if !lines.is_empty() {
            self.telnet.send_string(&lines.join("\r\n")).await?;
        }
        Ok(Reply::Done)
    }

    async fn mkdir(&self, name: &str) -> Reply {
        let full_path = match self.resolve(name, INVALID_DIRECTORY).await {
            Ok(full_path) => full_path,
            Err(reply) => return reply,
        };
        if !self
            .services
            .fs
            .user_has_right_to_access_directory(&full_path, self.home_directory())
        {
            return text(ACCESS_DENIED);
        }
        match self.services.fs.make_directory(&full_path).await {
            Ok(()) => text(format!("{} made", full_path)),
            Err(_) => text(format!("Can't make {}", full_path)),
        }
    }

    async fn rmdir(&self, name: &str) -> Reply {
        let full_path = match self.accessible_directory(name).await {
            Ok(full_path) => full_path,
            Err(reply) => return reply,
        };
        if full_path == self.home_directory() {
            return text("You can't remove your home directory");
        }
        if full_path == self.client.working_directory() {
            return text("You can't remove your working directory");
        }
        match self.services.fs.remove_directory(&full_path).await {
            Ok(()) => text(format!("{} removed", full_path)),
            Err(_) => text(format!("Can't remove {}", full_path)),
        }
    }

    async fn cd(&mut self, name: &str) -> Reply {
        let fs = Arc::clone(&self.services.fs);
        if !fs.is_mounted().await {
            return text(NOT_MOUNTED);
        }
        let home_directory = self.home_directory().to_string();
        match change_directory(&fs, &mut self.client, &home_directory, name).await {
            Ok(working_directory) => text(format!("Your working directory is {}", working_directory)),
            Err(StorageError::AccessDenied(_)) => text(ACCESS_DENIED),
            Err(_) => text(INVALID_DIRECTORY),
        }
    }

    async fn pwd(&self) -> Reply {
        if !self.services.fs.is_mounted().await {
            return text(NOT_MOUNTED);
        }
        text(format!(
            "Your working directory is {}",
            self.client.working_directory()
        ))
    }

    async fn cat(&mut self, name: &str) -> Result<Reply, ConnectionError> {
        let full_path = match self.accessible_file(name).await {
            Ok(full_path) => full_path,
            Err(reply) => return Ok(reply),
        };
        let Ok(mut file) = self.services.fs.open_read(&full_path).await else {
            return Ok(text(format!("Can't read {}", full_path)));
        };
        let mut chunk = [0u8; CAT_CHUNK_SIZE];
        loop {
            match file.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    self.telnet.send_block(&to_crlf(&chunk[..n])).await?;
                }
                Err(_) => return Ok(text(format!("\r\nCan't read {}", full_path))),
            }
        }
        Ok(Reply::Done)
    }

    async fn rm(&self, name: &str) -> Reply {
        let full_path = match self.accessible_file(name).await {
            Ok(full_path) => full_path,
            Err(reply) => return reply,
        };
        match self.services.fs.remove_file(&full_path).await {
            Ok(()) => text(format!("{} deleted", full_path)),
            Err(_) => text(format!("Can't delete {}", full_path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::Timestamp;

    #[test]
    fn test_split_command_line() {
        assert_eq!(split_command_line("  ls   /home  "), vec!["ls", "/home"]);
        assert_eq!(
            split_command_line("cat \"my file.txt\" x"),
            vec!["cat", "\"my file.txt\"", "x"]
        );
        assert!(split_command_line("   ").is_empty());

        let long = (0..30).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let argv = split_command_line(&long);
        assert_eq!(argv.len(), MAX_ARGC);
        assert_eq!(argv[MAX_ARGC - 1], "23");
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(0), "00:00:00");
        assert_eq!(format_uptime(3_725), "01:02:05");
        assert_eq!(format_uptime(2 * 86_400 + 59), "2 days, 00:00:59");
    }

    #[test]
    fn test_format_log_entry_with_uptime() {
        let entry = LogEntry {
            sequence: 7,
            uptime_millis: 1234,
            time: Timestamp::UNIX_EPOCH,
            message: "[listener] listener on port 23 started".into(),
        };
        assert_eq!(
            format_log_entry(&entry, false),
            "[      1234] [listener] listener on port 23 started"
        );
        assert!(format_log_entry(&entry, true).ends_with("] [listener] listener on port 23 started"));
    }

    #[test]
    fn test_to_crlf() {
        assert_eq!(to_crlf(b"a\nb\r\nc"), b"a\r\nb\r\nc");
    }
}
