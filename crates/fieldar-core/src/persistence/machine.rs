//! The machine store: CRUD, export and import over the machine folders.
//!
//! Every public operation is async. The filesystem work runs on tokio's
//! blocking pool; there is no locking between operations, so two saves to
//! the same machine race and the last rename wins. Callers that need
//! ordering must serialize writes per machine themselves.
//!
//! # Example
//!
//! ```ignore
//! let store = MachineStore::new("/home/user/Documents");
//! store.create_machine("M1", None).await?;
//! let mut doc = store.load_document("M1").await?;
//! doc.last_modified = "2024-05-01T12:00:00Z".to_string();
//! store.save_document("M1", &doc).await?;
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

use super::assets;
use super::atomic::write_atomically;
use super::document::{decode_document, encode_document};
use super::error::StoreError;
use super::folders::{copy_dir_recursive, ensure_folder, is_file, is_folder, remove_path};
use super::layout::{is_hidden, validate_name, StoreLayout, DOCUMENT_FILENAME};
use super::types::Document;
use crate::paths::documents_dir;

/// Directory-backed store of machines rooted at a documents directory.
#[derive(Debug, Clone)]
pub struct MachineStore {
    layout: StoreLayout,
}

impl MachineStore {
    /// Create a store rooted at `documents_root`. Nothing is touched on
    /// disk until the first operation.
    pub fn new(documents_root: impl Into<PathBuf>) -> Self {
        Self {
            layout: StoreLayout::new(documents_root),
        }
    }

    /// Create a store under the platform documents directory.
    pub fn open_default() -> Result<Self, StoreError> {
        Ok(Self::new(documents_dir()?))
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Run filesystem work off the async runtime.
    async fn run<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&StoreLayout) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let layout = self.layout.clone();
        tokio::task::spawn_blocking(move || work(&layout))
            .await
            .map_err(|e| StoreError::Io(io::Error::other(e)))?
    }

    // ========================================================================
    // Folders
    // ========================================================================

    /// Ensure `FieldAR/` and `FieldAR/Machines/` exist.
    pub async fn ensure_base_folders(&self) -> Result<(), StoreError> {
        self.run(ensure_base_folders).await
    }

    pub async fn machine_exists(&self, machine_id: &str) -> Result<bool, StoreError> {
        let machine_id = machine_id.to_string();
        self.run(move |layout| Ok(is_folder(&layout.machine_folder(&machine_id)?)))
            .await
    }

    pub async fn document_exists(&self, machine_id: &str) -> Result<bool, StoreError> {
        let machine_id = machine_id.to_string();
        self.run(move |layout| Ok(is_file(&layout.document_path(&machine_id)?)))
            .await
    }

    // ========================================================================
    // Machines
    // ========================================================================

    /// Create a machine folder, optionally writing its base image.
    ///
    /// A default document is written only if none exists yet, so calling
    /// this again never overwrites saved work. A given base image always
    /// replaces the current one.
    pub async fn create_machine(
        &self,
        machine_id: &str,
        base_image: Option<Vec<u8>>,
    ) -> Result<(), StoreError> {
        let machine_id = machine_id.to_string();
        self.run(move |layout| create_machine(layout, &machine_id, base_image.as_deref()))
            .await
    }

    /// Delete a machine folder and everything inside it.
    pub async fn delete_machine(&self, machine_id: &str) -> Result<(), StoreError> {
        let machine_id = machine_id.to_string();
        self.run(move |layout| {
            let machine_dir = layout.machine_folder(&machine_id)?;
            if !is_folder(&machine_dir) {
                return Err(StoreError::MachineNotFound(machine_id));
            }
            fs::remove_dir_all(&machine_dir)?;
            log::info!("Deleted machine {machine_id}");
            Ok(())
        })
        .await
    }

    /// List machine ids, sorted.
    ///
    /// Returns an empty list if the machines folder doesn't exist yet.
    pub async fn list_machines(&self) -> Result<Vec<String>, StoreError> {
        self.run(list_machines).await
    }

    // ========================================================================
    // Documents
    // ========================================================================

    pub async fn load_document(&self, machine_id: &str) -> Result<Document, StoreError> {
        let machine_id = machine_id.to_string();
        self.run(move |layout| load_document(layout, &machine_id))
            .await
    }

    /// Overwrite the machine's document.
    ///
    /// `last_modified` is written exactly as given.
    pub async fn save_document(
        &self,
        machine_id: &str,
        document: &Document,
    ) -> Result<(), StoreError> {
        let machine_id = machine_id.to_string();
        let document = document.clone();
        self.run(move |layout| save_document(layout, &machine_id, &document))
            .await
    }

    // ========================================================================
    // Base image
    // ========================================================================

    pub async fn load_base_image_data(&self, machine_id: &str) -> Result<Vec<u8>, StoreError> {
        let machine_id = machine_id.to_string();
        self.run(move |layout| {
            let path = layout.base_image_path(&machine_id)?;
            match fs::read(&path) {
                Ok(data) => Ok(data),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    Err(StoreError::FileNotFound(path))
                }
                Err(e) => Err(StoreError::Io(e)),
            }
        })
        .await
    }

    pub async fn save_base_image(&self, machine_id: &str, data: Vec<u8>) -> Result<(), StoreError> {
        let machine_id = machine_id.to_string();
        self.run(move |layout| {
            if data.is_empty() {
                return Err(StoreError::InvalidImageData);
            }
            require_machine(layout, &machine_id)?;
            write_atomically(&data, &layout.base_image_path(&machine_id)?)
        })
        .await
    }

    // ========================================================================
    // Overlay images
    // ========================================================================

    /// Store an overlay image and return the name it was saved under,
    /// which may differ from `suggested_name`.
    pub async fn save_overlay_image(
        &self,
        machine_id: &str,
        data: Vec<u8>,
        suggested_name: Option<&str>,
    ) -> Result<String, StoreError> {
        let machine_id = machine_id.to_string();
        let suggested_name = suggested_name.map(str::to_string);
        self.run(move |layout| {
            assets::save_overlay_image(layout, &machine_id, &data, suggested_name.as_deref())
        })
        .await
    }

    pub async fn list_overlay_images(&self, machine_id: &str) -> Result<Vec<String>, StoreError> {
        let machine_id = machine_id.to_string();
        self.run(move |layout| assets::list_overlay_images(layout, &machine_id))
            .await
    }

    pub async fn load_overlay_image_data(
        &self,
        machine_id: &str,
        image_name: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let machine_id = machine_id.to_string();
        let image_name = image_name.to_string();
        self.run(move |layout| assets::load_overlay_image_data(layout, &machine_id, &image_name))
            .await
    }

    /// Delete an overlay image. Missing files are not an error.
    pub async fn delete_overlay_image(
        &self,
        machine_id: &str,
        image_name: &str,
    ) -> Result<(), StoreError> {
        let machine_id = machine_id.to_string();
        let image_name = image_name.to_string();
        self.run(move |layout| assets::delete_overlay_image(layout, &machine_id, &image_name))
            .await
    }

    // ========================================================================
    // Export / import
    // ========================================================================

    /// Copy a machine folder to `<destination_root>/<machine_id>`.
    ///
    /// An existing destination is deleted first, not merged. A failure
    /// mid-copy leaves a partial destination behind. `destination_root` is
    /// created if missing; if it exists and is not a folder the export
    /// fails and the path is left untouched.
    pub async fn export_machine(
        &self,
        machine_id: &str,
        destination_root: impl AsRef<Path>,
    ) -> Result<PathBuf, StoreError> {
        let machine_id = machine_id.to_string();
        let destination_root = destination_root.as_ref().to_path_buf();
        self.run(move |layout| {
            let machine_dir = require_machine(layout, &machine_id)?;
            prepare_export_root(&destination_root)?;
            let dest = destination_root.join(&machine_id);
            replace_with_copy(&machine_dir, &dest)?;
            log::info!("Exported machine {machine_id} to {}", dest.display());
            Ok(dest)
        })
        .await
    }

    /// Import machines from `source`.
    ///
    /// If `source` itself contains `overlays.json` it is imported as one
    /// machine named after the folder. Otherwise each child folder is
    /// imported under its own name. Existing machines with the same id are
    /// replaced. Returns the imported ids.
    pub async fn import_machine(&self, source: impl AsRef<Path>) -> Result<Vec<String>, StoreError> {
        let source = source.as_ref().to_path_buf();
        self.run(move |layout| import_machine(layout, &source)).await
    }
}

// ============================================================================
// Blocking implementations
// ============================================================================

fn ensure_base_folders(layout: &StoreLayout) -> Result<(), StoreError> {
    ensure_folder(&layout.root_folder())?;
    ensure_folder(&layout.machines_folder())
}

fn require_machine(layout: &StoreLayout, machine_id: &str) -> Result<PathBuf, StoreError> {
    let machine_dir = layout.machine_folder(machine_id)?;
    if !is_folder(&machine_dir) {
        return Err(StoreError::MachineNotFound(machine_id.to_string()));
    }
    Ok(machine_dir)
}

fn create_machine(
    layout: &StoreLayout,
    machine_id: &str,
    base_image: Option<&[u8]>,
) -> Result<(), StoreError> {
    let machine_dir = layout.machine_folder(machine_id)?;
    if matches!(base_image, Some(data) if data.is_empty()) {
        return Err(StoreError::InvalidImageData);
    }

    ensure_base_folders(layout)?;
    ensure_folder(&machine_dir)?;
    ensure_folder(&layout.overlay_images_folder(machine_id)?)?;

    if let Some(data) = base_image {
        write_atomically(data, &layout.base_image_path(machine_id)?)?;
    }

    let document_path = layout.document_path(machine_id)?;
    if !document_path.exists() {
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let doc = Document::new(machine_id, created_at);
        write_atomically(&encode_document(&doc)?, &document_path)?;
        log::info!("Created machine {machine_id}");
    } else {
        log::debug!("Machine {machine_id} already has a document; left unchanged");
    }

    Ok(())
}

fn list_machines(layout: &StoreLayout) -> Result<Vec<String>, StoreError> {
    let entries = match fs::read_dir(layout.machines_folder()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::Io(e)),
    };

    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !is_folder(&entry.path()) {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !is_hidden(name) {
                ids.push(name.to_string());
            }
        }
    }

    ids.sort();
    Ok(ids)
}

fn load_document(layout: &StoreLayout, machine_id: &str) -> Result<Document, StoreError> {
    let path = layout.document_path(machine_id)?;

    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StoreError::FileNotFound(path))
        }
        Err(e) => return Err(StoreError::Io(e)),
    };

    decode_document(&bytes)
}

fn save_document(
    layout: &StoreLayout,
    machine_id: &str,
    document: &Document,
) -> Result<(), StoreError> {
    require_machine(layout, machine_id)?;

    if document.machine_id != machine_id {
        log::warn!(
            "Saving document with machine_id {:?} into machine {machine_id}",
            document.machine_id
        );
    }

    let bytes = encode_document(document)?;
    write_atomically(&bytes, &layout.document_path(machine_id)?)
}

/// Export targets live outside the store, so nothing there is repaired.
fn prepare_export_root(path: &Path) -> Result<(), StoreError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(StoreError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("export destination {} is not a folder", path.display()),
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(StoreError::Io)
        }
        Err(e) => Err(StoreError::Io(e)),
    }
}

/// Delete whatever is at `dest`, then copy `src` there.
fn replace_with_copy(src: &Path, dest: &Path) -> Result<(), StoreError> {
    if dest.exists() || fs::symlink_metadata(dest).is_ok() {
        log::debug!("Replacing existing {}", dest.display());
        remove_path(dest)?;
    }
    copy_dir_recursive(src, dest)
}

fn same_folder(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn import_one(layout: &StoreLayout, folder: &Path) -> Result<Option<String>, StoreError> {
    // Relative sources such as `.` or `..` only have a name once resolved.
    let folder = fs::canonicalize(folder)?;
    let folder = folder.as_path();
    let machine_id = folder
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| StoreError::InvalidName(folder.display().to_string()))?;
    validate_name(&machine_id)?;

    let dest = layout.machine_folder(&machine_id)?;
    if same_folder(folder, &dest) {
        log::debug!("Skipping import of {machine_id}: source is the stored machine");
        return Ok(None);
    }

    replace_with_copy(folder, &dest)?;
    log::info!("Imported machine {machine_id} from {}", folder.display());
    Ok(Some(machine_id))
}

fn import_machine(layout: &StoreLayout, source: &Path) -> Result<Vec<String>, StoreError> {
    ensure_base_folders(layout)?;

    if is_file(&source.join(DOCUMENT_FILENAME)) {
        return Ok(import_one(layout, source)?.into_iter().collect());
    }

    let mut children: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_str().map(is_hidden).unwrap_or(true) {
            continue;
        }
        if !is_folder(&entry.path()) {
            log::warn!(
                "Skipping non-folder import entry {}",
                entry.path().display()
            );
            continue;
        }
        children.push(entry.path());
    }
    children.sort();

    let mut imported = Vec::new();
    for child in children {
        if let Some(id) = import_one(layout, &child)? {
            imported.push(id);
        }
    }
    Ok(imported)
}
