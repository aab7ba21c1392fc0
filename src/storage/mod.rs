//! File system storage management
//!
//! Sandboxed file system under the storage root, with path normalization
//! and the home directory access rules.

pub mod filesystem;
pub mod permissions;
pub mod validation;

pub use filesystem::FileSystem;
pub use validation::make_full_path;
