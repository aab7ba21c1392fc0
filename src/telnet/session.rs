//! Telnet session
//!
//! Greets the client, logs the user in when required and then reads command
//! lines until the user quits, presses Ctrl-C or stays idle too long. Every
//! line is offered to the application's `TelnetCommandHandler` first; what
//! it declines goes to the built-in commands.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio::time::sleep;

use crate::auth::{ANONYMOUS_HOME, Authenticator};
use crate::client::Client;
use crate::config::ServerConfig;
use crate::error::ConnectionError;
use crate::middleware::logging::log_command;
use crate::net::{Connection, Connector, Session, Stream};
use crate::storage::FileSystem;
use crate::telnet::commands::{Reply, split_command_line};
use crate::telnet::iac::{DO, ECHO, IAC, NAWS, SUPPRESS_GO_AHEAD, TelnetConnection, WILL, WindowSize};
use crate::telnet::line::LineEvent;
use crate::utils::logging::LogQueue;

/// User of sessions that do not ask for a login.
pub const ROOT: &str = "root";

const MAX_CREDENTIAL_LENGTH: usize = 64;
const LOGIN_FAILURE_DELAY: Duration = Duration::from_millis(100);
const INVALID_COMMAND: &str = "Invalid command, use \"help\" to display available commands";

/// What a `TelnetCommandHandler` gets to know about the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelnetContext {
    pub user_name: String,
    pub home_directory: String,
    pub working_directory: String,
    pub peer_ip: String,
    pub window: WindowSize,
}

/// Application commands, tried before the built-in ones.
pub trait TelnetCommandHandler: Send + Sync {
    /// The reply to `argv`, or `None` to leave the line to the built-ins.
    fn handle(&self, argv: &[String], context: &TelnetContext) -> Option<String>;

    /// Called after a successful login.
    fn session_started(&self, _context: &TelnetContext) {}

    fn session_ended(&self, _context: &TelnetContext) {}
}

/// Collaborators shared by all Telnet sessions of a server.
#[derive(Clone)]
pub struct TelnetServices {
    pub fs: Arc<FileSystem>,
    pub auth: Arc<dyn Authenticator>,
    pub log_queue: Arc<LogQueue>,
    pub handler: Option<Arc<dyn TelnetCommandHandler>>,
}

/// State of one Telnet connection.
pub struct TelnetSession<S = TcpStream> {
    pub(crate) telnet: TelnetConnection<S>,
    pub(crate) services: TelnetServices,
    pub(crate) connector: Connector,
    pub(crate) client: Client,
    pub(crate) hostname: String,
    pub(crate) max_connections: usize,
    login_required: bool,
    command_buffer_size: usize,
}

impl<S: Stream> TelnetSession<S> {
    pub fn new(mut connection: Connection<S>, config: &ServerConfig, services: TelnetServices) -> Self {
        connection.set_idle_timeout(config.telnet.idle_timeout());
        let connector = Connector::new(Arc::clone(connection.registry()))
            .with_connect_timeout(config.network.connect_timeout());
        let telnet = TelnetConnection::new(connection)
            .with_swapped_backspace(config.telnet.swap_backspace_and_delete);

        Self {
            telnet,
            services,
            connector,
            client: Client::default(),
            hostname: config.hostname.clone(),
            max_connections: config.network.max_connections,
            login_required: config.telnet.login_required,
            command_buffer_size: config.telnet.command_buffer_size,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn home_directory(&self) -> &str {
        self.client.home_directory().unwrap_or(ANONYMOUS_HOME)
    }

    pub fn context(&self) -> TelnetContext {
        TelnetContext {
            user_name: self.client.username().unwrap_or(ROOT).to_string(),
            home_directory: self.home_directory().to_string(),
            working_directory: self.client.working_directory().to_string(),
            peer_ip: self.telnet.connection().peer_ip().to_string(),
            window: self.telnet.window_size(),
        }
    }

    fn prompt(&self) -> char {
        if self.client.username() == Some(ROOT) { '#' } else { '$' }
    }

    /// Serves the connection until the user leaves.
    pub async fn serve(&mut self) {
        let peer_ip = self.telnet.connection().peer_ip().to_string();
        match self.login().await {
            Ok(true) => {}
            Ok(false) => {
                self.hang_up().await;
                return;
            }
            Err(e) => {
                debug!("telnet connection from {} ended before login: {}", peer_ip, e);
                self.hang_up().await;
                return;
            }
        }

        let context = self.context();
        info!("{} logged in from {}", context.user_name, peer_ip);
        let welcome = format!(
            "\r\nWelcome {}, use \"help\" to display available commands.\r\n\n",
            context.user_name
        );
        if let Some(handler) = &self.services.handler {
            handler.session_started(&context);
        }

        if let Err(e) = self.command_loop(welcome).await {
            debug!("telnet connection from {} ended: {}", peer_ip, e);
        }

        if let Some(handler) = &self.services.handler {
            handler.session_ended(&self.context());
        }
        self.hang_up().await;
        info!("{} logged out", context.user_name);
    }

    /// Closes the connection once the input the client already sent (the LF
    /// of a final CRLF, typically) is consumed.
    async fn hang_up(&mut self) {
        if !self.telnet.connection().is_closed() {
            if let Err(e) = self.telnet.discard_pending().await {
                debug!(
                    "telnet connection from {} ended while closing: {}",
                    self.telnet.connection().peer_ip(),
                    e
                );
            }
        }
        self.telnet.connection_mut().close();
    }

    /// Sends the greeting and asks for credentials when a login is required.
    /// `false` means the session ends here.
    async fn login(&mut self) -> Result<bool, ConnectionError> {
        let peer_ip = self.telnet.connection().peer_ip().to_string();
        let mut greeting = vec![IAC, WILL, ECHO, IAC, WILL, SUPPRESS_GO_AHEAD, IAC, DO, NAWS];

        if !self.login_required {
            greeting.extend_from_slice(format!("{} says hello to {}.\r\n", self.hostname, peer_ip).as_bytes());
            self.telnet.send_block(&greeting).await?;
            self.client.set_username(ROOT);
            self.client.login(ANONYMOUS_HOME.to_string());
            return Ok(true);
        }

        greeting.extend_from_slice(
            format!("{} says hello to {}, please login.\r\nuser: ", self.hostname, peer_ip).as_bytes(),
        );
        self.telnet.send_block(&greeting).await?;
        let LineEvent::Enter(user_name) = self.telnet.recv_line(MAX_CREDENTIAL_LENGTH, true).await? else {
            return Ok(false);
        };

        self.telnet.send_string("password: ").await?;
        self.telnet.set_echo(false);
        let password = self.telnet.recv_line(MAX_CREDENTIAL_LENGTH, true).await;
        self.telnet.set_echo(true);
        let LineEvent::Enter(password) = password? else {
            return Ok(false);
        };

        let home_directory = self
            .services
            .auth
            .home_directory(&user_name, &password)
            .and_then(|home| self.services.fs.make_full_path(&home, "/"));
        match home_directory {
            Some(home_directory) => {
                self.client.set_username(&user_name);
                self.client.login(home_directory);
                Ok(true)
            }
            None => {
                warn!("telnet login denied for {} from {}", user_name, peer_ip);
                self.telnet
                    .send_string("\r\nUsername and/or password incorrect")
                    .await?;
                sleep(LOGIN_FAILURE_DELAY).await;
                Ok(false)
            }
        }
    }

    /// Prompts for and executes command lines. `pending` is sent together
    /// with the next prompt.
    async fn command_loop(&mut self, mut pending: String) -> Result<(), ConnectionError> {
        loop {
            pending.push(self.prompt());
            pending.push(' ');
            self.telnet.send_string(&pending).await?;
            pending.clear();

            let line = match self.telnet.recv_line(self.command_buffer_size, false).await {
                Ok(LineEvent::Enter(line)) => line,
                Ok(LineEvent::CtrlC) => {
                    self.telnet.send_string("\r\nCtrl-C").await?;
                    return Ok(());
                }
                Ok(LineEvent::Eof) => return Ok(()),
                Err(ConnectionError::TimedOut) => {
                    // the idle timeout must not stop the farewell
                    self.telnet.connection_mut().set_idle_timeout(Duration::ZERO);
                    self.telnet.send_string("\r\ntimeout").await?;
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let argv = split_command_line(&line);
            if argv.is_empty() {
                continue;
            }
            log_command(self.telnet.connection().peer_ip(), &line);

            let external = self
                .services
                .handler
                .as_ref()
                .and_then(|handler| handler.handle(&argv, &self.context()));
            let reply = match external {
                Some(reply) => Reply::Text(reply),
                None => self.run_builtin(&argv).await?,
            };
            match reply {
                Reply::Text(text) => {
                    self.telnet.send_string(&text).await?;
                }
                Reply::Done => {}
                Reply::Quit => return Ok(()),
                Reply::Unknown => {
                    self.telnet.send_string(INVALID_COMMAND).await?;
                }
            }
            pending.push_str("\r\n");
        }
    }
}

#[async_trait]
impl<S: Stream> Session for TelnetSession<S> {
    async fn run(&mut self) {
        self.serve().await;
    }
}
