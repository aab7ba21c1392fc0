//! Module `file_transfer`
//!
//! Moves directory listings and file contents over an open data connection.
//! The caller owns the connection and closes it when the transfer returns.

use log::{debug, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{ConnectionError, TransferError};
use crate::net::{Connection, Stream};
use crate::storage::FileSystem;

const BUFFER_SIZE: usize = 1024;

/// Sends one `ls -l` style line per directory entry.
pub async fn send_listing<S: Stream>(
    data: &mut Connection<S>,
    fs: &FileSystem,
    directory: &str,
) -> Result<usize, TransferError> {
    let entries = fs
        .list_directory(directory)
        .await
        .map_err(TransferError::Listing)?;
    for entry in &entries {
        match fs.file_information(entry, false).await {
            Ok(line) => {
                data.send_string(&format!("{}\r\n", line)).await?;
            }
            Err(e) => debug!("skipping {} in listing: {}", entry, e),
        }
    }
    Ok(entries.len())
}

/// Sends the contents of a file.
pub async fn send_file<S: Stream>(
    data: &mut Connection<S>,
    fs: &FileSystem,
    path: &str,
) -> Result<u64, TransferError> {
    let mut file = fs.open_read(path).await.map_err(TransferError::Open)?;
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buffer).await.map_err(TransferError::Read)?;
        if n == 0 {
            break;
        }
        data.send_block(&buffer[..n]).await?;
        total += n as u64;
    }
    info!("{} bytes of {} sent to {}", total, path, data.peer_ip());
    Ok(total)
}

/// Stores everything the peer sends until it closes the data connection.
pub async fn receive_file<S: Stream>(
    data: &mut Connection<S>,
    fs: &FileSystem,
    path: &str,
) -> Result<u64, TransferError> {
    let mut file = fs.create(path).await.map_err(TransferError::Open)?;
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        match data.recv(&mut buffer).await {
            Ok(n) => {
                file.write_all(&buffer[..n])
                    .await
                    .map_err(TransferError::Write)?;
                total += n as u64;
            }
            Err(ConnectionError::PeerClosed) => break,
            Err(e) => return Err(e.into()),
        }
    }
    file.flush().await.map_err(TransferError::Write)?;
    info!("{} bytes from {} stored in {}", total, data.peer_ip(), path);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::NetworkRegistry;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::{DuplexStream, duplex};

    fn data_pair() -> (Connection<DuplexStream>, DuplexStream) {
        let (ours, theirs) = duplex(64 * 1024);
        let registry = Arc::new(NetworkRegistry::default());
        (Connection::new(ours, "10.0.0.9", "10.0.0.5", registry), theirs)
    }

    fn file_system() -> (TempDir, FileSystem) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("pub")).unwrap();
        std::fs::write(dir.path().join("pub/a.txt"), b"alpha").unwrap();
        std::fs::write(dir.path().join("pub/b.txt"), vec![b'b'; 3000]).unwrap();
        let fs = FileSystem::new(dir.path());
        (dir, fs)
    }

    #[tokio::test]
    async fn test_send_listing() {
        let (_dir, fs) = file_system();
        let (mut data, mut peer) = data_pair();

        assert_eq!(send_listing(&mut data, &fs, "/pub").await.unwrap(), 2);
        drop(data);

        let mut listing = String::new();
        peer.read_to_string(&mut listing).await.unwrap();
        let lines: Vec<&str> = listing.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" a.txt"));
        assert!(lines[1].contains("   3000  "));
    }

    #[tokio::test]
    async fn test_send_file() {
        let (_dir, fs) = file_system();
        let (mut data, mut peer) = data_pair();

        assert_eq!(send_file(&mut data, &fs, "/pub/b.txt").await.unwrap(), 3000);
        drop(data);

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, vec![b'b'; 3000]);
    }

    #[tokio::test]
    async fn test_send_missing_file() {
        let (_dir, fs) = file_system();
        let (mut data, _peer) = data_pair();
        assert!(matches!(
            send_file(&mut data, &fs, "/pub/none.txt").await,
            Err(TransferError::Open(_))
        ));
    }

    #[tokio::test]
    async fn test_receive_file() {
        let (dir, fs) = file_system();
        let (mut data, mut peer) = data_pair();
        peer.write_all(b"uploaded content").await.unwrap();
        drop(peer);

        assert_eq!(receive_file(&mut data, &fs, "/pub/new.txt").await.unwrap(), 16);
        let stored = std::fs::read(dir.path().join("pub/new.txt")).unwrap();
        assert_eq!(stored, b"uploaded content");
    }
}
