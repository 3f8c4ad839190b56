//! Persistence layer for machines, their documents and image assets.
//!
//! # Overview
//!
//! Each machine owns one folder holding a base photo, an overlay document
//! and a pool of overlay images:
//!
//! - **Layout** - Pure path computation and name validation
//! - **Folders** - Idempotent folder creation/repair, recursive copy
//! - **Atomic** - Write-then-rename primitive used for every file
//! - **Document** - Canonical JSON codec for `overlays.json`
//! - **Assets** - Collision-safe overlay image storage
//! - **Machine** - The async `MachineStore` facade
//!
//! # File Locations
//!
//! ```text
//! <documents>/FieldAR/
//! └── Machines/
//!     └── <machine-id>/
//!         ├── base_photo.png       # Base image
//!         ├── overlays.json        # Overlay document
//!         └── overlay_images/
//!             ├── bolt.png
//!             └── ...
//! ```
//!
//! # Design Principles
//!
//! ## Atomic Writes
//!
//! Every save writes a hidden temp file next to the target and renames it
//! into place, so a reader never sees a half-written file. See [`atomic`].
//!
//! ## Caller-owned Versioning
//!
//! `last_modified` and the undo/redo slots are stored exactly as given.
//!
//! # Usage
//!
//! ```ignore
//! use fieldar_core::persistence::{MachineStore, Document};
//!
//! let store = MachineStore::new(documents_dir);
//! store.create_machine("M1", None).await?;
//! let name = store.save_overlay_image("M1", bytes, Some("bolt.png")).await?;
//! ```

pub mod assets;
pub mod atomic;
pub mod document;
pub mod error;
pub mod folders;
pub mod layout;
pub mod machine;
pub mod types;

// Re-export commonly used items for convenience
pub use atomic::{write_atomically, write_atomically_new, StagedWrite};
pub use document::{decode_document, encode_document};
pub use error::StoreError;
pub use folders::ensure_folder;
pub use layout::{
    StoreLayout, BASE_FOLDER_NAME, BASE_IMAGE_FILENAME, DOCUMENT_FILENAME, MACHINES_FOLDER_NAME,
    OVERLAY_IMAGES_FOLDER_NAME,
};
pub use machine::MachineStore;
pub use types::*;
