//! Line editor
//!
//! Collects clean characters from a `TelnetConnection` into a line, with
//! the minimal editing a terminal user expects.

use crate::error::ConnectionError;
use crate::net::Stream;
use crate::telnet::iac::{
    BACKSPACE, CR, CTRL_C, CTRL_D, DELETE, ESC, LF, TAB, TelnetConnection,
};

const ERASE: &[u8] = b"\x08 \x08";
const MAX_ESCAPE_PARAMETERS: usize = 8;

/// How reading a line ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Enter(String),
    CtrlC,
    /// Ctrl-D or Ctrl-Z
    Eof,
}

impl<S: Stream> TelnetConnection<S> {
    /// Reads one line of at most `max_len` bytes. Input beyond that is
    /// dropped. With `trim` leading and trailing white space is removed.
    pub async fn recv_line(&mut self, max_len: usize, trim: bool) -> Result<LineEvent, ConnectionError> {
        let mut line: Vec<u8> = Vec::with_capacity(max_len);
        loop {
            match self.recv_char().await? {
                CTRL_C => return Ok(LineEvent::CtrlC),
                CTRL_D => return Ok(LineEvent::Eof),
                BACKSPACE | DELETE => self.erase_last(&mut line).await?,
                ESC => {
                    if self.escape_sequence().await? {
                        self.erase_last(&mut line).await?;
                    }
                }
                CR | LF => {
                    let text = String::from_utf8_lossy(&line);
                    let text: &str = if trim { text.trim() } else { &text };
                    let text = text.to_string();
                    if self.echo() {
                        self.send_string("\r\n").await?;
                    }
                    return Ok(LineEvent::Enter(text));
                }
                TAB => {
                    self.append(&mut line, max_len, b' ').await?;
                    self.append(&mut line, max_len, b' ').await?;
                }
                c => self.append(&mut line, max_len, c).await?,
            }
        }
    }

    /// Reads the rest of an escape sequence and tells whether it was the
    /// Delete key (`ESC [ 3 ~`). Other sequences are dropped. A control
    /// character cuts a sequence short and is kept as input.
    async fn escape_sequence(&mut self) -> Result<bool, ConnectionError> {
        let c = self.recv_char().await?;
        if c != b'[' {
            self.keep_control(c);
            return Ok(false);
        }
        let mut parameters = Vec::new();
        loop {
            let c = self.recv_char().await?;
            match c {
                b'0'..=b'?' if parameters.len() < MAX_ESCAPE_PARAMETERS => parameters.push(c),
                b'@'..=b'~' => return Ok(c == b'~' && parameters == b"3"),
                _ => {
                    self.keep_control(c);
                    return Ok(false);
                }
            }
        }
    }

    fn keep_control(&mut self, c: u8) {
        if c < b' ' || c == DELETE {
            self.unread(c);
        }
    }

    async fn append(&mut self, line: &mut Vec<u8>, max_len: usize, c: u8) -> Result<(), ConnectionError> {
        if line.len() >= max_len {
            return Ok(());
        }
        line.push(c);
        if self.echo() {
            self.send_block(&[c]).await?;
        }
        Ok(())
    }

    /// Removes the last printable character, all bytes of it when it is a
    /// multi-byte UTF-8 sequence.
    async fn erase_last(&mut self, line: &mut Vec<u8>) -> Result<(), ConnectionError> {
        match line.last() {
            Some(&last) if last >= b' ' => {}
            _ => return Ok(()),
        }
        while let Some(byte) = line.pop() {
            // stop at anything but a UTF-8 continuation byte
            if byte & 0xC0 != 0x80 {
                break;
            }
        }
        if self.echo() {
            self.send_block(ERASE).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Connection, NetworkRegistry};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

    fn telnet_pair() -> (TelnetConnection<DuplexStream>, DuplexStream) {
        let (ours, theirs) = duplex(64 * 1024);
        let registry = Arc::new(NetworkRegistry::default());
        let connection = Connection::new(ours, "10.0.0.9", "10.0.0.5", registry);
        (TelnetConnection::new(connection), theirs)
    }

    async fn echoed(client: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        client.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_backspace_erases() {
        let (mut telnet, mut client) = telnet_pair();
        client.write_all(b"hello\x08\r\n").await.unwrap();

        assert_eq!(
            telnet.recv_line(80, true).await.unwrap(),
            LineEvent::Enter("hell".into())
        );
        assert_eq!(echoed(&mut client, 10).await, b"hello\x08 \x08\r\n");
    }

    #[tokio::test]
    async fn test_backspace_on_empty_line() {
        let (mut telnet, mut client) = telnet_pair();
        client.write_all(b"\x7f\x7fok\r").await.unwrap();

        assert_eq!(
            telnet.recv_line(80, true).await.unwrap(),
            LineEvent::Enter("ok".into())
        );
        assert_eq!(echoed(&mut client, 4).await, b"ok\r\n");
    }

    #[tokio::test]
    async fn test_delete_escape_sequence() {
        let (mut telnet, mut client) = telnet_pair();
        client.write_all(b"abc\x1b[3~\x1b[A\r").await.unwrap();

        assert_eq!(
            telnet.recv_line(80, false).await.unwrap(),
            LineEvent::Enter("ab".into())
        );
    }

    #[tokio::test]
    async fn test_control_character_cuts_escape_sequence_short() {
        let (mut telnet, mut client) = telnet_pair();
        client.write_all(b"ab\x1b\r").await.unwrap();
        assert_eq!(
            telnet.recv_line(80, false).await.unwrap(),
            LineEvent::Enter("ab".into())
        );

        client.write_all(b"\x1b[\x03").await.unwrap();
        assert_eq!(telnet.recv_line(80, false).await.unwrap(), LineEvent::CtrlC);
    }

    #[tokio::test]
    async fn test_unknown_escape_sequences_are_dropped() {
        let (mut telnet, mut client) = telnet_pair();
        client.write_all(b"a\x1b[1;5Cb\x1bxc\x1b[2~d\r").await.unwrap();
        assert_eq!(
            telnet.recv_line(80, false).await.unwrap(),
            LineEvent::Enter("abcd".into())
        );
    }

    #[tokio::test]
    async fn test_multibyte_character_erased_whole() {
        let (mut telnet, mut client) = telnet_pair();
        client.write_all("aš\x08\r".as_bytes()).await.unwrap();

        assert_eq!(
            telnet.recv_line(80, false).await.unwrap(),
            LineEvent::Enter("a".into())
        );
    }

    #[tokio::test]
    async fn test_tab_trim_and_overflow() {
        let (mut telnet, mut client) = telnet_pair();
        client.write_all(b"  ls\t \r").await.unwrap();
        assert_eq!(
            telnet.recv_line(80, true).await.unwrap(),
            LineEvent::Enter("ls".into())
        );

        client.write_all(b"abcdefgh\r").await.unwrap();
        assert_eq!(
            telnet.recv_line(4, false).await.unwrap(),
            LineEvent::Enter("abcd".into())
        );
    }

    #[tokio::test]
    async fn test_control_characters() {
        let (mut telnet, mut client) = telnet_pair();
        client.write_all(b"abc\x03").await.unwrap();
        assert_eq!(telnet.recv_line(80, true).await.unwrap(), LineEvent::CtrlC);

        client.write_all(b"x\x1a").await.unwrap();
        assert_eq!(telnet.recv_line(80, true).await.unwrap(), LineEvent::Eof);
    }

    #[tokio::test]
    async fn test_no_echo() {
        let (mut telnet, mut client) = telnet_pair();
        telnet.set_echo(false);
        client.write_all(b"secret\r").await.unwrap();
        assert_eq!(
            telnet.recv_line(64, true).await.unwrap(),
            LineEvent::Enter("secret".into())
        );

        telnet.send_string("done").await.unwrap();
        assert_eq!(echoed(&mut client, 4).await, b"done");
    }
}
