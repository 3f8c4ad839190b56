//! Crash-safe file replacement.
//!
//! # Atomic Write Strategy
//!
//! 1. Write the bytes to a randomly named temp file next to the
//!    destination (`.<file>.<random>.tmp`) and fsync it
//! 2. Rename it over the destination (atomic on the same filesystem)
//!
//! Readers see the old complete content or the new complete content, never
//! a partial write. A crash strictly between the two steps can leave an
//! orphaned hidden temp file behind; nothing reclaims it automatically.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::error::StoreError;

/// A write in progress.
///
/// Dropping a `StagedWrite` without committing removes its temp file and
/// leaves the destination untouched.
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    destination: PathBuf,
}

impl StagedWrite {
    /// Create the temp file in the destination's directory.
    pub fn new(destination: &Path) -> Result<Self, StoreError> {
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file_name = destination
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no file name in {}", destination.display()),
                )
            })?;

        let temp = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".tmp")
            .tempfile_in(dir)?;

        Ok(Self {
            temp,
            destination: destination.to_path_buf(),
        })
    }

    /// Path of the temp file backing this write.
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        self.temp.write_all(bytes)?;
        Ok(())
    }

    /// Move the temp file over the destination, replacing it if present.
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.flush()?;
        // On failure PersistError hands the temp file back and dropping it
        // deletes it.
        self.temp
            .persist(&self.destination)
            .map_err(|e| StoreError::Io(e.error))?;
        sync_parent(&self.destination);
        Ok(())
    }

    /// Like [`commit`](Self::commit) but fails with `AlreadyExists` instead
    /// of replacing an existing destination.
    pub fn commit_new(mut self) -> Result<(), StoreError> {
        self.flush()?;
        self.temp
            .persist_noclobber(&self.destination)
            .map_err(|e| StoreError::Io(e.error))?;
        sync_parent(&self.destination);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.temp.flush()?;
        self.temp.as_file().sync_all()?;
        Ok(())
    }
}

/// Write `bytes` to `destination` atomically, replacing any previous file.
pub fn write_atomically(bytes: &[u8], destination: &Path) -> Result<(), StoreError> {
    let mut staged = StagedWrite::new(destination)?;
    staged.write_all(bytes)?;
    staged.commit()?;
    log::debug!(
        "Wrote {} bytes to {}",
        bytes.len(),
        destination.display()
    );
    Ok(())
}

/// Write `bytes` to `destination` atomically, refusing to replace an
/// existing file (`StoreError::Io` with `ErrorKind::AlreadyExists`).
pub fn write_atomically_new(bytes: &[u8], destination: &Path) -> Result<(), StoreError> {
    let mut staged = StagedWrite::new(destination)?;
    staged.write_all(bytes)?;
    staged.commit_new()?;
    log::debug!(
        "Created {} ({} bytes)",
        destination.display(),
        bytes.len()
    );
    Ok(())
}

/// Persist the rename itself. Best effort; not every platform can open
/// a directory for syncing.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            if let Ok(dir) = fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
