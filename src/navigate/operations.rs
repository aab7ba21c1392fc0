//! Navigation operations implementation

use crate::client::Client;
use crate::error::StorageError;
use crate::storage::FileSystem;

/// Changes the working directory of a logged in client.
///
/// Returns the new working directory.
pub async fn change_directory(
    fs: &FileSystem,
    client: &mut Client,
    home_directory: &str,
    target_path: &str,
) -> Result<String, StorageError> {
    let full_path = fs
        .make_full_path(target_path, client.working_directory())
        .ok_or_else(|| StorageError::InvalidPath("directory name".into()))?;

    if !fs.is_directory(&full_path).await {
        return Err(StorageError::InvalidPath("directory name".into()));
    }
    if !fs.user_has_right_to_access_directory(&full_path, home_directory) {
        return Err(StorageError::AccessDenied(full_path));
    }

    client.set_working_directory(full_path.clone());
    Ok(full_path)
}
