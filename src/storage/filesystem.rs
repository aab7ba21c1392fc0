//! File system operations
//!
//! `FileSystem` serves a directory of the host as a virtual `/`-rooted tree.
//! Paths given to it are virtual full paths as produced by
//! `make_full_path`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use jiff::Timestamp;
use log::{debug, warn};
use tokio::fs::{self, File};

use crate::error::StorageError;
use crate::storage::permissions;
use crate::storage::validation::{self, file_name, virtual_to_real_path};

#[derive(Debug, Clone)]
pub struct FileSystem {
    root: PathBuf,
}

impl FileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the root directory is there to be served.
    pub async fn is_mounted(&self) -> bool {
        fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    // --- Paths and access ---

    pub fn make_full_path(&self, name: &str, working_directory: &str) -> Option<String> {
        validation::make_full_path(name, working_directory)
    }

    pub fn real_path(&self, full_path: &str) -> PathBuf {
        virtual_to_real_path(&self.root, full_path)
    }

    pub fn user_has_right_to_access_file(&self, full_path: &str, home_directory: &str) -> bool {
        permissions::user_has_right_to_access_file(full_path, home_directory)
    }

    pub fn user_has_right_to_access_directory(&self, full_path: &str, home_directory: &str) -> bool {
        permissions::user_has_right_to_access_directory(full_path, home_directory)
    }

    pub async fn is_file(&self, full_path: &str) -> bool {
        fs::metadata(self.real_path(full_path))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    pub async fn is_directory(&self, full_path: &str) -> bool {
        fs::metadata(self.real_path(full_path))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    // --- Queries ---

    pub async fn file_size(&self, full_path: &str) -> Result<u64, StorageError> {
        Ok(fs::metadata(self.real_path(full_path)).await?.len())
    }

    /// Full paths of the entries of a directory, sorted by name.
    pub async fn list_directory(&self, full_path: &str) -> Result<Vec<String>, StorageError> {
        let mut entries = fs::read_dir(self.real_path(full_path)).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        let parent = full_path.trim_end_matches('/');
        Ok(names
            .into_iter()
            .map(|name| format!("{}/{}", parent, name))
            .collect())
    }

    /// One `ls -l` style line describing a file or directory, which is what
    /// FTP clients expect from LIST.
    pub async fn file_information(
        &self,
        full_path: &str,
        show_full_path: bool,
    ) -> Result<String, StorageError> {
        let metadata = fs::metadata(self.real_path(full_path)).await?;
        let kind = if metadata.is_dir() { 'd' } else { '-' };
        let size = if metadata.is_dir() { 0 } else { metadata.len() };
        let modified = metadata
            .modified()
            .map(format_modified)
            .unwrap_or_else(|_| "Jan 01 00:00".to_string());
        let name = if show_full_path {
            full_path
        } else {
            file_name(full_path)
        };
        Ok(format!(
            "{}rw-rw-rw-   1 root     root          {:>7}  {}      {}",
            kind, size, modified, name
        ))
    }

    // --- Modifications ---

    pub async fn make_directory(&self, full_path: &str) -> Result<(), StorageError> {
        fs::create_dir(self.real_path(full_path)).await?;
        debug!("directory {} created", full_path);
        Ok(())
    }

    pub async fn remove_file(&self, full_path: &str) -> Result<(), StorageError> {
        fs::remove_file(self.real_path(full_path)).await?;
        debug!("file {} deleted", full_path);
        Ok(())
    }

    pub async fn remove_directory(&self, full_path: &str) -> Result<(), StorageError> {
        fs::remove_dir(self.real_path(full_path)).await?;
        debug!("directory {} removed", full_path);
        Ok(())
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        fs::rename(self.real_path(from), self.real_path(to)).await?;
        debug!("{} renamed to {}", from, to);
        Ok(())
    }

    pub async fn open_read(&self, full_path: &str) -> Result<File, StorageError> {
        File::open(self.real_path(full_path)).await.map_err(|e| {
            warn!("cannot open {} for reading: {}", full_path, e);
            e.into()
        })
    }

    /// Creates (or truncates) a file for writing.
    pub async fn create(&self, full_path: &str) -> Result<File, StorageError> {
        File::create(self.real_path(full_path)).await.map_err(|e| {
            warn!("cannot open {} for writing: {}", full_path, e);
            e.into()
        })
    }
}

fn format_modified(modified: SystemTime) -> String {
    match Timestamp::try_from(modified) {
        Ok(timestamp) => timestamp.strftime("%b %d %H:%M").to_string(),
        Err(_) => "Jan 01 00:00".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn file_system() -> (TempDir, FileSystem) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("home/joe")).unwrap();
        std::fs::write(dir.path().join("home/joe/notes.txt"), b"hello world").unwrap();
        let fs = FileSystem::new(dir.path());
        (dir, fs)
    }

    #[tokio::test]
    async fn test_file_kinds() {
        let (_dir, fs) = file_system().await;
        assert!(fs.is_mounted().await);
        assert!(fs.is_directory("/home/joe").await);
        assert!(!fs.is_file("/home/joe").await);
        assert!(fs.is_file("/home/joe/notes.txt").await);
        assert!(!fs.is_directory("/missing").await);
        assert_eq!(fs.file_size("/home/joe/notes.txt").await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_not_mounted() {
        let fs = FileSystem::new("/definitely/not/here");
        assert!(!fs.is_mounted().await);
    }

    #[tokio::test]
    async fn test_file_information_line() {
        let (_dir, fs) = file_system().await;
        let line = fs
            .file_information("/home/joe/notes.txt", false)
            .await
            .unwrap();
        assert!(line.starts_with("-rw-rw-rw-   1 root     root               11  "));
        assert!(line.ends_with("      notes.txt"));

        let line = fs.file_information("/home/joe", true).await.unwrap();
        assert!(line.starts_with("drw-rw-rw-"));
        assert!(line.ends_with("/home/joe"));
    }

    #[tokio::test]
    async fn test_list_and_modify() {
        let (_dir, fs) = file_system().await;
        fs.make_directory("/home/joe/sub").await.unwrap();
        assert_eq!(
            fs.list_directory("/home/joe").await.unwrap(),
            vec!["/home/joe/notes.txt", "/home/joe/sub"]
        );

        fs.rename("/home/joe/notes.txt", "/home/joe/sub/n.txt")
            .await
            .unwrap();
        assert!(fs.is_file("/home/joe/sub/n.txt").await);

        assert!(fs.remove_directory("/home/joe/sub").await.is_err());
        fs.remove_file("/home/joe/sub/n.txt").await.unwrap();
        fs.remove_directory("/home/joe/sub").await.unwrap();
        assert!(fs.list_directory("/home/joe").await.unwrap().is_empty());
    }
}
