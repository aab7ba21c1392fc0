//! FTP control session
//!
//! Reads command lines from the control connection, dispatches them through
//! `handle_command` and writes the replies back.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::net::TcpStream;

use crate::auth::Authenticator;
use crate::client::Client;
use crate::config::ServerConfig;
use crate::middleware::logging::log_command;
use crate::net::{Connection, Connector, Session, Stream};
use crate::protocol::responses::greeting;
use crate::protocol::{CommandStatus, handle_command, parse_command};
use crate::storage::FileSystem;
use crate::transfer::DataChannelNegotiator;

/// State of one FTP control connection.
pub struct FtpSession<S = TcpStream> {
    pub(crate) control: Connection<S>,
    pub(crate) client: Client,
    pub(crate) negotiator: DataChannelNegotiator,
    pub(crate) fs: Arc<FileSystem>,
    pub(crate) auth: Arc<dyn Authenticator>,
    hostname: String,
    command_buffer_size: usize,
}

impl<S: Stream> FtpSession<S> {
    pub fn new(
        mut control: Connection<S>,
        config: &ServerConfig,
        fs: Arc<FileSystem>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        control.set_idle_timeout(config.ftp.control_timeout());
        let registry = Arc::clone(control.registry());
        let connector = Connector::new(Arc::clone(&registry))
            .with_connect_timeout(config.network.connect_timeout());
        let negotiator = DataChannelNegotiator::with_connector(registry, connector)
            .with_timeouts(config.ftp.data_timeout(), config.ftp.rendezvous_timeout());

        Self {
            control,
            client: Client::default(),
            negotiator,
            fs,
            auth,
            hostname: config.hostname.clone(),
            command_buffer_size: config.ftp.command_buffer_size,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Serves the control connection until QUIT, a timeout or the client
    /// going away.
    pub async fn serve(&mut self) {
        let peer_ip = self.control.peer_ip().to_string();
        if self.control.send_string(&greeting(&self.hostname)).await.is_err() {
            return;
        }

        let mut buffer = vec![0u8; self.command_buffer_size];
        loop {
            let received = match self.control.recv_string(&mut buffer, b"\n").await {
                Ok(n) if n == buffer.len() => {
                    warn!("command line from {} does not fit the buffer", peer_ip);
                    break;
                }
                Ok(n) => n,
                Err(e) if e.is_peer_closed() => {
                    debug!("control connection from {} ended: {}", peer_ip, e);
                    break;
                }
                Err(e) => {
                    warn!("control connection from {} failed: {}", peer_ip, e);
                    break;
                }
            };

            let line = String::from_utf8_lossy(&buffer[..received]);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            log_command(&peer_ip, line);

            let command = parse_command(line);
            let result = handle_command(self, &command).await;
            if let Some(message) = result.message {
                if self.control.send_string(&message).await.is_err() {
                    break;
                }
            }
            if result.status == CommandStatus::CloseConnection {
                break;
            }
        }

        self.negotiator.discard();
        self.control.close();
        info!(
            "{} logged out",
            self.client.username().unwrap_or("anonymous client")
        );
    }
}

#[async_trait]
impl<S: Stream> Session for FtpSession<S> {
    async fn run(&mut self) {
        self.serve().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ConfigAuthenticator;
    use crate::config::UserConfig;
    use crate::net::NetworkRegistry;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};
    use tokio::task::JoinHandle;

    struct Peer {
        reader: BufReader<DuplexStream>,
    }

    impl Peer {
        async fn reply(&mut self) -> String {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            line
        }

        async fn send(&mut self, line: &str) -> String {
            self.reader
                .get_mut()
                .write_all(format!("{}\r\n", line).as_bytes())
                .await
                .unwrap();
            self.reply().await
        }
    }

    fn start(root: &TempDir, passive_port_base: u16, users: Vec<UserConfig>) -> (Peer, JoinHandle<()>) {
        let mut config = ServerConfig::default();
        config.hostname = "testhost".into();
        config.ftp.rendezvous_timeout_secs = 1;
        config.users = users.clone();

        let registry = Arc::new(NetworkRegistry::new(passive_port_base));
        let (ours, theirs) = duplex(64 * 1024);
        let control = Connection::new(ours, "127.0.0.1", "127.0.0.1", registry);
        let fs = Arc::new(FileSystem::new(root.path()));
        let auth: Arc<dyn Authenticator> = Arc::new(ConfigAuthenticator::new(&users));
        let mut session = FtpSession::new(control, &config, fs, auth);
        let task = tokio::spawn(async move { session.serve().await });
        (
            Peer {
                reader: BufReader::new(theirs),
            },
            task,
        )
    }

    async fn login(peer: &mut Peer) {
        assert_eq!(peer.reply().await, "220-testhost FTP server - please login\r\n");
        assert_eq!(peer.reply().await, "220 \r\n");
        assert_eq!(peer.send("USER anonymous").await, "331 enter password\r\n");
        assert_eq!(
            peer.send("PASS guest").await,
            "230 logged on, your home directory is \"/\"\r\n"
        );
    }

    fn root_with_file() -> TempDir {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("hello.txt"), b"hello world").unwrap();
        root
    }

    #[tokio::test]
    async fn test_passive_download() {
        let root = root_with_file();
        let (mut peer, task) = start(&root, 47000, Vec::new());
        login(&mut peer).await;

        assert_eq!(peer.send("PWD").await, "257 \"/\"\r\n");
        assert_eq!(
            peer.send("PASV").await,
            "227 entering passive mode (127,0,0,1,183,153)\r\n"
        );
        let mut data = TcpStream::connect("127.0.0.1:47001").await.unwrap();

        assert_eq!(peer.send("RETR hello.txt").await, "150 starting data transfer\r\n");
        let mut content = Vec::new();
        data.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, b"hello world");
        assert_eq!(peer.reply().await, "226 data transfer complete\r\n");

        assert_eq!(peer.send("QUIT").await, "221 closing connection\r\n");
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_passive_upload_then_listing_without_channel() {
        let root = root_with_file();
        let (mut peer, task) = start(&root, 47100, Vec::new());
        login(&mut peer).await;

        assert_eq!(
            peer.send("EPSV").await,
            "229 entering passive mode (|||47101|)\r\n"
        );
        let mut data = TcpStream::connect("127.0.0.1:47101").await.unwrap();
        assert_eq!(peer.send("STOR upload.bin").await, "150 starting data transfer\r\n");
        data.write_all(b"uploaded").await.unwrap();
        drop(data);
        assert_eq!(peer.reply().await, "226 data transfer complete\r\n");
        assert_eq!(
            std::fs::read(root.path().join("upload.bin")).unwrap(),
            b"uploaded"
        );

        // the data channel does not outlive the transfer
        assert_eq!(peer.send("LIST").await, "425 can't open data connection\r\n");
        assert_eq!(peer.send("SIZE upload.bin").await, "213 8\r\n");

        assert_eq!(peer.send("QUIT").await, "221 closing connection\r\n");
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_passive_rendezvous_timeout() {
        let root = root_with_file();
        let (mut peer, task) = start(&root, 47200, Vec::new());
        login(&mut peer).await;

        assert_eq!(
            peer.send("PASV").await,
            "227 entering passive mode (127,0,0,1,184,97)\r\n"
        );
        // nobody connects to 47201
        assert_eq!(
            peer.send("LIST").await,
            "425 can't open passive data connection\r\n"
        );
        assert!(TcpStream::connect("127.0.0.1:47201").await.is_err());

        assert_eq!(peer.send("QUIT").await, "221 closing connection\r\n");
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_before_login() {
        let root = root_with_file();
        let (mut peer, task) = start(&root, 47300, Vec::new());
        peer.reply().await;
        peer.reply().await;

        assert_eq!(peer.send("LIST").await, "530 not logged in\r\n");
        assert_eq!(peer.send("PASV").await, "530 not logged in\r\n");
        assert_eq!(peer.send("syst").await, "215 UNIX Type: L8\r\n");
        assert_eq!(peer.send("OPTS UTF8 ON").await, "200 UTF8 enabled\r\n");
        assert_eq!(
            peer.send("MDTM hello.txt").await,
            "502 command MDTM not implemented\r\n"
        );
        assert_eq!(peer.send("QUIT").await, "221 closing connection\r\n");
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_and_home_directory() {
        let root = root_with_file();
        std::fs::create_dir_all(root.path().join("home/joe")).unwrap();
        std::fs::create_dir_all(root.path().join("home/ann")).unwrap();
        let users = vec![UserConfig {
            name: "joe".into(),
            password: "secret".into(),
            home: "/home/joe/".into(),
        }];
        let (mut peer, task) = start(&root, 47400, users);
        peer.reply().await;
        peer.reply().await;

        peer.send("USER joe").await;
        assert_eq!(peer.send("PASS wrong").await, "530 login denyed\r\n");
        peer.send("USER joe").await;
        assert_eq!(
            peer.send("PASS secret").await,
            "230 logged on, your home directory is \"/home/joe\"\r\n"
        );

        assert_eq!(peer.send("MKD docs").await, "257 directory created\r\n");
        assert_eq!(
            peer.send("CWD docs").await,
            "250 your working directory is /home/joe/docs\r\n"
        );
        assert_eq!(peer.send("CWD ../../ann").await, "550 access denyed\r\n");
        assert_eq!(
            peer.send("RMD /home/joe/docs").await,
            "550 you can't remove your working directory\r\n"
        );
        assert_eq!(
            peer.send("RMD /home/joe").await,
            "550 you can't remove your home directory\r\n"
        );
        assert_eq!(peer.send("CWD ..").await, "250 your working directory is /home/joe\r\n");
        assert_eq!(peer.send("RNFR docs").await, "350 need more information\r\n");
        assert_eq!(peer.send("RNTO papers").await, "250 renamed\r\n");
        assert!(root.path().join("home/joe/papers").is_dir());
        assert_eq!(peer.send("RMD papers").await, "250 directory removed\r\n");
        assert_eq!(
            peer.send("RNTO whatever").await,
            "501 invalid file or directory name\r\n"
        );

        assert_eq!(peer.send("QUIT").await, "221 closing connection\r\n");
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_overlong_command_ends_session() {
        let root = root_with_file();
        let (mut peer, task) = start(&root, 47500, Vec::new());
        peer.reply().await;
        peer.reply().await;

        let long = "X".repeat(400);
        peer.reader.get_mut().write_all(long.as_bytes()).await.unwrap();
        task.await.unwrap();
        assert_eq!(peer.reply().await, "");
    }
}
