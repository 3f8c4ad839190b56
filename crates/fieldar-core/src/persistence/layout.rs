//! Path resolution for the machine store.
//!
//! # File Structure
//!
//! ```text
//! <documents>/FieldAR/Machines/<machine_id>/
//! ├── base_photo.png
//! ├── overlays.json
//! └── overlay_images/
//!     └── <asset files>
//! ```
//!
//! Paths are plain values recomputed on every call. Nothing here touches
//! the filesystem.

use std::path::{Component, Path, PathBuf};

use super::error::StoreError;

pub const BASE_FOLDER_NAME: &str = "FieldAR";
pub const MACHINES_FOLDER_NAME: &str = "Machines";
pub const OVERLAY_IMAGES_FOLDER_NAME: &str = "overlay_images";
pub const DOCUMENT_FILENAME: &str = "overlays.json";
pub const BASE_IMAGE_FILENAME: &str = "base_photo.png";

/// Maps a documents root and machine ids onto the on-disk layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    documents_root: PathBuf,
}

impl StoreLayout {
    pub fn new(documents_root: impl Into<PathBuf>) -> Self {
        Self {
            documents_root: documents_root.into(),
        }
    }

    pub fn documents_root(&self) -> &Path {
        &self.documents_root
    }

    /// `<documents>/FieldAR`
    pub fn root_folder(&self) -> PathBuf {
        self.documents_root.join(BASE_FOLDER_NAME)
    }

    /// `<documents>/FieldAR/Machines`
    pub fn machines_folder(&self) -> PathBuf {
        self.root_folder().join(MACHINES_FOLDER_NAME)
    }

    pub fn machine_folder(&self, machine_id: &str) -> Result<PathBuf, StoreError> {
        validate_name(machine_id)?;
        Ok(self.machines_folder().join(machine_id))
    }

    pub fn document_path(&self, machine_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.machine_folder(machine_id)?.join(DOCUMENT_FILENAME))
    }

    pub fn base_image_path(&self, machine_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.machine_folder(machine_id)?.join(BASE_IMAGE_FILENAME))
    }

    pub fn overlay_images_folder(&self, machine_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self
            .machine_folder(machine_id)?
            .join(OVERLAY_IMAGES_FOLDER_NAME))
    }

    pub fn overlay_image_path(
        &self,
        machine_id: &str,
        image_name: &str,
    ) -> Result<PathBuf, StoreError> {
        validate_name(image_name)?;
        Ok(self.overlay_images_folder(machine_id)?.join(image_name))
    }
}

/// Check that `name` is usable as a single directory entry.
///
/// Rejects empty names, separators, `.`/`..`, and leading dots. Hidden
/// names are reserved for in-flight temp files.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let invalid = || StoreError::InvalidName(name.to_string());

    if name.is_empty() || name.starts_with('.') || name.contains(&['/', '\\'][..]) {
        return Err(invalid());
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}

/// Whether a directory entry name is hidden (leading dot).
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}
