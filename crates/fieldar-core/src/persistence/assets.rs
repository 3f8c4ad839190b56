//! Overlay image storage under `<machine>/overlay_images/`.
//!
//! # Design Notes
//!
//! - **Collision-safe names**: a taken name gets `-1`, `-2`, ... before the
//!   extension. Callers must use the returned name, not the suggested one.
//! - **No clobbering**: the final rename refuses to overwrite, so two
//!   concurrent saves of `bolt.png` still end up as two files.

use std::fs;
use std::io;
use std::path::Path;

use uuid::Uuid;

use super::atomic::write_atomically_new;
use super::error::StoreError;
use super::folders::{ensure_folder, is_folder};
use super::layout::{is_hidden, validate_name, StoreLayout};

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Whether `data` starts with the PNG file signature.
pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&PNG_SIGNATURE)
}

/// Extension to use when the caller gave none.
pub fn sniff_extension(data: &[u8]) -> &'static str {
    if is_png(data) {
        "png"
    } else {
        "jpg"
    }
}

/// Split a suggested name into a base name and an optional lower-cased
/// extension.
fn split_suggested_name(name: &str) -> (String, Option<String>) {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty());
    (stem, ext)
}

fn candidate_name(base: &str, ext: &str, counter: u32) -> String {
    if counter == 0 {
        format!("{base}.{ext}")
    } else {
        format!("{base}-{counter}.{ext}")
    }
}

/// Save an overlay image and return the file name it was stored under.
///
/// The machine must exist. The extension comes from `suggested_name` or,
/// without one, from the byte signature (PNG, else JPEG). Without a
/// suggested name the base name is a fresh UUID.
pub fn save_overlay_image(
    layout: &StoreLayout,
    machine_id: &str,
    data: &[u8],
    suggested_name: Option<&str>,
) -> Result<String, StoreError> {
    if data.is_empty() {
        return Err(StoreError::InvalidImageData);
    }

    let machine_dir = layout.machine_folder(machine_id)?;
    if !is_folder(&machine_dir) {
        return Err(StoreError::MachineNotFound(machine_id.to_string()));
    }

    let (base, ext) = match suggested_name {
        Some(name) => {
            validate_name(name)?;
            split_suggested_name(name)
        }
        None => (Uuid::new_v4().to_string(), None),
    };
    let ext = ext.unwrap_or_else(|| sniff_extension(data).to_string());

    let images_dir = layout.overlay_images_folder(machine_id)?;
    ensure_folder(&images_dir)?;

    let mut counter = 0;
    loop {
        let filename = candidate_name(&base, &ext, counter);
        counter += 1;

        let path = images_dir.join(&filename);
        if path.exists() {
            continue;
        }

        match write_atomically_new(data, &path) {
            Ok(()) => {
                log::debug!("Saved overlay image {filename} for machine {machine_id}");
                return Ok(filename);
            }
            // Taken between the existence check and the rename
            Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
}

/// List overlay image file names for a machine, sorted.
///
/// Returns an empty list if the folder doesn't exist. Hidden entries
/// (including in-flight temp files) and subfolders are skipped.
pub fn list_overlay_images(
    layout: &StoreLayout,
    machine_id: &str,
) -> Result<Vec<String>, StoreError> {
    let images_dir = layout.overlay_images_folder(machine_id)?;

    let entries = match fs::read_dir(&images_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::Io(e)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !is_hidden(name) {
                names.push(name.to_string());
            }
        }
    }

    names.sort();
    Ok(names)
}

/// Load overlay image bytes, or `FileNotFound` if absent.
pub fn load_overlay_image_data(
    layout: &StoreLayout,
    machine_id: &str,
    image_name: &str,
) -> Result<Vec<u8>, StoreError> {
    let path = layout.overlay_image_path(machine_id, image_name)?;

    match fs::read(&path) {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::FileNotFound(path)),
        Err(e) => Err(StoreError::Io(e)),
    }
}

/// Delete an overlay image.
///
/// # Returns
///
/// `Ok(())` if deleted or didn't exist, `Err` on I/O error.
pub fn delete_overlay_image(
    layout: &StoreLayout,
    machine_id: &str,
    image_name: &str,
) -> Result<(), StoreError> {
    let path = layout.overlay_image_path(machine_id, image_name)?;

    match fs::remove_file(&path) {
        Ok(()) => {
            log::debug!("Deleted overlay image {image_name} for machine {machine_id}");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    const PNG_BYTES: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
    const JPEG_BYTES: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];

    fn layout_with_machine(id: &str) -> (TempDir, StoreLayout) {
        let dir = tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        fs::create_dir_all(layout.machine_folder(id).unwrap()).unwrap();
        (dir, layout)
    }

    #[test]
    fn png_detection() {
        assert!(is_png(&PNG_BYTES));
        assert!(!is_png(&JPEG_BYTES));
        assert!(!is_png(&PNG_BYTES[..7]));
        assert_eq!(sniff_extension(&PNG_BYTES), "png");
        assert_eq!(sniff_extension(&JPEG_BYTES), "jpg");
    }

    #[test]
    fn suggested_name_splitting() {
        assert_eq!(
            split_suggested_name("bolt.PNG"),
            ("bolt".to_string(), Some("png".to_string()))
        );
        assert_eq!(split_suggested_name("bolt"), ("bolt".to_string(), None));
        assert_eq!(
            split_suggested_name("bolt.v2.jpg"),
            ("bolt.v2".to_string(), Some("jpg".to_string()))
        );
    }

    #[test]
    fn colliding_names_get_counter_suffix() {
        let (_dir, layout) = layout_with_machine("M1");

        let first = save_overlay_image(&layout, "M1", &PNG_BYTES, Some("bolt.png")).unwrap();
        let second = save_overlay_image(&layout, "M1", &PNG_BYTES, Some("bolt.png")).unwrap();
        let third = save_overlay_image(&layout, "M1", &PNG_BYTES, Some("bolt.png")).unwrap();

        assert_eq!(first, "bolt.png");
        assert_eq!(second, "bolt-1.png");
        assert_eq!(third, "bolt-2.png");
    }

    #[test]
    fn extension_is_sniffed_without_suggestion() {
        let (_dir, layout) = layout_with_machine("M1");

        let png = save_overlay_image(&layout, "M1", &PNG_BYTES, Some("gasket")).unwrap();
        let jpg = save_overlay_image(&layout, "M1", &JPEG_BYTES, Some("valve")).unwrap();

        assert_eq!(png, "gasket.png");
        assert_eq!(jpg, "valve.jpg");
    }

    #[test]
    fn generated_name_without_suggestion() {
        let (_dir, layout) = layout_with_machine("M1");

        let name = save_overlay_image(&layout, "M1", &PNG_BYTES, None).unwrap();

        assert!(name.ends_with(".png"));
        let stem = name.trim_end_matches(".png");
        assert!(Uuid::parse_str(stem).is_ok());
    }

    #[test]
    fn saved_bytes_round_trip() {
        let (_dir, layout) = layout_with_machine("M1");

        let name = save_overlay_image(&layout, "M1", &JPEG_BYTES, Some("a.jpg")).unwrap();

        assert_eq!(
            load_overlay_image_data(&layout, "M1", &name).unwrap(),
            JPEG_BYTES.to_vec()
        );
    }

    #[test]
    fn save_creates_images_folder() {
        let (_dir, layout) = layout_with_machine("M1");
        let images = layout.overlay_images_folder("M1").unwrap();
        assert!(!images.exists());

        save_overlay_image(&layout, "M1", &PNG_BYTES, Some("a.png")).unwrap();

        assert!(images.is_dir());
    }

    #[test]
    fn save_requires_machine() {
        let dir = tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());

        let result = save_overlay_image(&layout, "ghost", &PNG_BYTES, None);

        assert!(matches!(result, Err(StoreError::MachineNotFound(_))));
    }

    #[test]
    fn empty_data_is_rejected() {
        let (_dir, layout) = layout_with_machine("M1");

        let result = save_overlay_image(&layout, "M1", &[], Some("a.png"));

        assert!(matches!(result, Err(StoreError::InvalidImageData)));
    }

    #[test]
    fn path_like_suggestions_are_rejected() {
        let (_dir, layout) = layout_with_machine("M1");

        let result = save_overlay_image(&layout, "M1", &PNG_BYTES, Some("../base_photo.png"));

        assert!(matches!(result, Err(StoreError::InvalidName(_))));
    }

    #[test]
    fn list_missing_folder_is_empty() {
        let (_dir, layout) = layout_with_machine("M1");
        assert!(list_overlay_images(&layout, "M1").unwrap().is_empty());
    }

    #[test]
    fn list_skips_hidden_entries_and_folders() {
        let (_dir, layout) = layout_with_machine("M1");
        save_overlay_image(&layout, "M1", &PNG_BYTES, Some("b.png")).unwrap();
        save_overlay_image(&layout, "M1", &PNG_BYTES, Some("a.png")).unwrap();
        let images = layout.overlay_images_folder("M1").unwrap();
        fs::write(images.join(".a.png.x1y2.tmp"), "orphan").unwrap();
        fs::create_dir(images.join("nested")).unwrap();

        let names = list_overlay_images(&layout, "M1").unwrap();

        assert_eq!(names, vec!["a.png", "b.png"]);
    }

    #[test]
    fn load_missing_image_is_file_not_found() {
        let (_dir, layout) = layout_with_machine("M1");

        let result = load_overlay_image_data(&layout, "M1", "nope.png");

        assert!(matches!(result, Err(StoreError::FileNotFound(_))));
    }

    #[test]
    fn delete_removes_file() {
        let (_dir, layout) = layout_with_machine("M1");
        let name = save_overlay_image(&layout, "M1", &PNG_BYTES, Some("a.png")).unwrap();

        delete_overlay_image(&layout, "M1", &name).unwrap();

        assert!(list_overlay_images(&layout, "M1").unwrap().is_empty());
    }

    #[test]
    fn delete_nonexistent_succeeds() {
        let (_dir, layout) = layout_with_machine("M1");
        let result = delete_overlay_image(&layout, "M1", "nonexistent.png");
        assert!(result.is_ok());
    }

    #[test]
    fn freed_name_is_reused() {
        let (_dir, layout) = layout_with_machine("M1");
        save_overlay_image(&layout, "M1", &PNG_BYTES, Some("bolt.png")).unwrap();
        save_overlay_image(&layout, "M1", &PNG_BYTES, Some("bolt.png")).unwrap();
        delete_overlay_image(&layout, "M1", "bolt.png").unwrap();

        let name = save_overlay_image(&layout, "M1", &PNG_BYTES, Some("bolt.png")).unwrap();

        assert_eq!(name, "bolt.png");
    }
}
