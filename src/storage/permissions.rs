//! File permissions
//!
//! A user may access everything inside their home directory and nothing
//! outside of it.

/// Whether the file at `full_path` lies inside `home_directory`.
pub fn user_has_right_to_access_file(full_path: &str, home_directory: &str) -> bool {
    full_path.starts_with(&with_trailing_slash(home_directory))
}

/// Whether `full_path` is `home_directory` or one of its subdirectories.
pub fn user_has_right_to_access_directory(full_path: &str, home_directory: &str) -> bool {
    with_trailing_slash(full_path).starts_with(&with_trailing_slash(home_directory))
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}
