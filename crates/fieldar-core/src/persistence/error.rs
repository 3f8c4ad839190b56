//! Error type shared by every store operation.

use std::path::PathBuf;

use thiserror::Error;

/// Everything a store operation can fail with.
///
/// Each variant carries the value that caused it, so callers can match on
/// the kind and still report the underlying cause.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The platform could not supply a writable root location.
    #[error("Root storage directory unavailable: {0}")]
    RootDirectoryUnavailable(String),

    #[error("Machine not found: {0}")]
    MachineNotFound(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The document bytes did not match the schema.
    #[error("Failed to decode document: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid image data")]
    InvalidImageData,

    /// A machine id or file name that is not a single plain path component.
    #[error("Invalid name: {0:?}")]
    InvalidName(String),
}

impl StoreError {
    /// True for the "absent" kinds (`MachineNotFound`, `FileNotFound`).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::MachineNotFound(_) | StoreError::FileNotFound(_)
        )
    }
}
