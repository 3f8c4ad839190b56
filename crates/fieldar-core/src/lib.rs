//! # fieldar-core
//!
//! Directory-backed storage for FieldAR machines.
//!
//! This crate is framework-agnostic and can be used by:
//! - The `fieldar` command-line tool
//! - Any UI that draws overlays and needs somewhere durable to put them
//!
//! ## Key Concepts
//!
//! - **Machine**: A top-level entity that owns one folder on disk
//! - **Document**: The `overlays.json` file describing a machine's overlays
//! - **Overlay**: One image placed on the base photo in normalized coordinates

pub mod paths;
pub mod persistence;

// Re-export commonly used types
pub use persistence::{Document, MachineStore, Overlay, StoreError};
