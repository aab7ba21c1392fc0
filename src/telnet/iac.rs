//! Telnet byte classifier
//!
//! Turns the raw byte stream of a Telnet client into clean characters.
//! IAC command sequences are consumed and acted upon (window size, charset
//! request) and never reach the caller.

use log::{debug, warn};
use tokio::net::TcpStream;

use crate::error::ConnectionError;
use crate::net::{Connection, Stream};

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;

pub const ECHO: u8 = 1;
pub const SUPPRESS_GO_AHEAD: u8 = 3;
pub const NAWS: u8 = 31;
pub const CHARSET: u8 = 42;
const CHARSET_REQUEST: u8 = 1;

pub const NUL: u8 = 0;
pub const CTRL_C: u8 = 3;
pub const CTRL_D: u8 = 4;
pub const BACKSPACE: u8 = 8;
pub const TAB: u8 = 9;
pub const LF: u8 = 10;
pub const CR: u8 = 13;
pub const CTRL_Z: u8 = 26;
pub const ESC: u8 = 27;
pub const DELETE: u8 = 127;

type Result<T> = std::result::Result<T, ConnectionError>;

/// Client window size reported through NAWS. Zero means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSize {
    pub width: u16,
    pub height: u16,
}

/// A `Connection` speaking Telnet.
pub struct TelnetConnection<S = TcpStream> {
    connection: Connection<S>,
    lookahead: Option<u8>,
    window: WindowSize,
    echo: bool,
    swap_backspace_and_delete: bool,
    after_cr: bool,
}

impl<S: Stream> TelnetConnection<S> {
    pub fn new(connection: Connection<S>) -> Self {
        Self {
            connection,
            lookahead: None,
            window: WindowSize::default(),
            echo: true,
            swap_backspace_and_delete: false,
            after_cr: false,
        }
    }

    /// For terminals whose Backspace key sends DEL and vice versa.
    pub fn with_swapped_backspace(mut self, swap: bool) -> Self {
        self.swap_backspace_and_delete = swap;
        self
    }

    pub fn connection(&self) -> &Connection<S> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection<S> {
        &mut self.connection
    }

    pub fn window_size(&self) -> WindowSize {
        self.window
    }

    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Whether the line editor echoes what the client types.
    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    pub async fn send_string(&mut self, s: &str) -> Result<usize> {
        self.connection.send_string(s).await
    }

    pub async fn send_block(&mut self, buf: &[u8]) -> Result<usize> {
        self.connection.send_block(buf).await
    }

    /// Reads the next clean character, waiting for it if necessary.
    pub async fn recv_char(&mut self) -> Result<u8> {
        if let Some(c) = self.lookahead.take() {
            return Ok(c);
        }
        loop {
            let byte = self.read_byte().await?;
            if let Some(c) = self.classify(byte).await? {
                return Ok(c);
            }
        }
    }

    /// Returns the next clean character without consuming it, or `None` if
    /// the client has not sent anything yet. Never waits for input, though a
    /// partially received IAC sequence is read to its end.
    pub async fn peek_char(&mut self) -> Result<Option<u8>> {
        if let Some(c) = self.lookahead {
            return Ok(Some(c));
        }
        let mut pending = [0u8; 1];
        while self.connection.peek(&mut pending).await? > 0 {
            let byte = self.read_byte().await?;
            if let Some(c) = self.classify(byte).await? {
                self.lookahead = Some(c);
                return Ok(Some(c));
            }
        }
        Ok(None)
    }

    /// Puts a character returned by `recv_char` back in front of the input.
    pub(crate) fn unread(&mut self, c: u8) {
        self.lookahead = Some(c);
    }

    /// Reads and drops everything the client has already sent. Closing a
    /// socket with unread input makes the peer see a reset.
    pub async fn discard_pending(&mut self) -> Result<()> {
        self.lookahead = None;
        while self.peek_char().await?.is_some() {
            self.lookahead = None;
        }
        Ok(())
    }

    async fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.connection.recv_block(&mut byte).await?;
        Ok(byte[0])
    }

    /// `None` for bytes that only carry protocol.
    async fn classify(&mut self, byte: u8) -> Result<Option<u8>> {
        if byte == IAC {
            self.after_cr = false;
            self.negotiate().await?;
            return Ok(None);
        }

        let after_cr = std::mem::replace(&mut self.after_cr, byte == CR);
        let c = match byte {
            NUL => return Ok(None),
            LF if after_cr => return Ok(None),
            CTRL_Z => CTRL_D,
            BACKSPACE if self.swap_backspace_and_delete => DELETE,
            DELETE if self.swap_backspace_and_delete => BACKSPACE,
            byte => byte,
        };
        Ok(Some(c))
    }

    /// Consumes the command following IAC.
    async fn negotiate(&mut self) -> Result<()> {
        match self.read_byte().await? {
            SB => {
                let option = self.read_byte().await?;
                if option == NAWS {
                    let mut size = [0u8; 4];
                    self.connection.recv_block(&mut size).await?;
                    self.window = WindowSize {
                        width: u16::from_be_bytes([size[0], size[1]]),
                        height: u16::from_be_bytes([size[2], size[3]]),
                    };
                    debug!(
                        "window size of {} is {}x{}",
                        self.connection.peer_ip(),
                        self.window.width,
                        self.window.height
                    );
                }
                let mut byte = option;
                while byte != SE {
                    byte = self.read_byte().await?;
                }
            }
            WILL | WONT | DONT => {
                self.read_byte().await?;
            }
            DO => {
                if self.read_byte().await? == CHARSET {
                    let mut request = vec![IAC, SB, CHARSET, CHARSET_REQUEST];
                    request.extend_from_slice(b"UTF-8");
                    request.extend_from_slice(&[IAC, SE]);
                    // the client's answer is not checked
                    if let Err(e) = self.connection.send_block(&request).await {
                        warn!("cannot send charset request: {}", e);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}
