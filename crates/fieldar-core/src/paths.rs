use std::env;
use std::path::PathBuf;

use crate::persistence::StoreError;

/// Environment variable that overrides the documents directory.
pub const DOCUMENTS_DIR_ENV: &str = "FIELDAR_DOCUMENTS_DIR";

/// Return the user's home directory path.
///
/// Uses HOME on Unix-like systems and USERPROFILE on Windows.
pub fn get_home_dir() -> Result<PathBuf, StoreError> {
    if let Ok(home) = env::var("HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    if let Ok(profile) = env::var("USERPROFILE") {
        if !profile.is_empty() {
            return Ok(PathBuf::from(profile));
        }
    }

    Err(StoreError::RootDirectoryUnavailable(
        "Home directory not set".to_string(),
    ))
}

/// Return the writable documents directory the store lives under.
///
/// `FIELDAR_DOCUMENTS_DIR` wins when set; otherwise `<home>/Documents`.
pub fn documents_dir() -> Result<PathBuf, StoreError> {
    if let Ok(dir) = env::var(DOCUMENTS_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    Ok(get_home_dir()?.join("Documents"))
}
