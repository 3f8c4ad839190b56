//! Folder creation, repair, recursive copy and removal.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use super::error::StoreError;

/// Make sure `path` is a directory.
///
/// - Already a directory: nothing happens.
/// - Exists but is not a directory (file, dangling symlink): it is removed
///   and a directory is created in its place.
/// - Missing: created together with any missing ancestors.
///
/// Calling this twice in a row converges to the same state. A concurrent
/// deletion between the check and the create is not guarded against.
pub fn ensure_folder(path: &Path) -> Result<(), StoreError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            log::warn!(
                "Replacing non-directory at {} with a directory",
                path.display()
            );
            fs::remove_file(path)?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            // metadata() follows links, so a dangling symlink lands here too
            if fs::symlink_metadata(path).is_ok() {
                log::warn!("Removing dangling link at {}", path.display());
                fs::remove_file(path)?;
            }
        }
        Err(e) => return Err(StoreError::Io(e)),
    }

    fs::create_dir_all(path)?;
    log::debug!("Created folder {}", path.display());
    Ok(())
}

/// Whether `path` exists and is a directory.
pub fn is_folder(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Whether `path` exists and is a regular file.
pub fn is_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Remove a file or a whole directory tree. Missing paths are fine.
pub fn remove_path(path: &Path) -> Result<(), StoreError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::Io(e)),
    };

    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }

    Ok(())
}

/// Copy the tree rooted at `src` to `dst`.
///
/// `dst` must not exist yet. On failure the partial copy is left in place.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), StoreError> {
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let rel_path = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = dst.join(rel_path);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        } else {
            log::warn!("Skipping non-regular entry {}", entry.path().display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ensure_folder_creates_missing_ancestors() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a").join("b").join("c");

        ensure_folder(&target).unwrap();

        assert!(target.is_dir());
    }

    #[test]
    fn ensure_folder_is_idempotent() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("machines");

        ensure_folder(&target).unwrap();
        fs::write(target.join("keep.txt"), "data").unwrap();
        ensure_folder(&target).unwrap();

        assert!(target.is_dir());
        assert_eq!(
            fs::read_to_string(target.join("keep.txt")).unwrap(),
            "data"
        );
    }

    #[test]
    fn ensure_folder_replaces_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("overlay_images");
        fs::write(&target, "not a folder").unwrap();

        ensure_folder(&target).unwrap();

        assert!(target.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn ensure_folder_replaces_dangling_symlink() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("link");
        std::os::unix::fs::symlink(dir.path().join("missing"), &target).unwrap();

        ensure_folder(&target).unwrap();

        assert!(target.is_dir());
        assert!(!fs::symlink_metadata(&target)
            .unwrap()
            .file_type()
            .is_symlink());
    }

    #[test]
    fn remove_path_handles_files_dirs_and_missing() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file.txt");
        let tree = dir.path().join("tree");
        fs::write(&file, "x").unwrap();
        fs::create_dir_all(tree.join("nested")).unwrap();
        fs::write(tree.join("nested").join("y"), "y").unwrap();

        remove_path(&file).unwrap();
        remove_path(&tree).unwrap();
        remove_path(&dir.path().join("never-existed")).unwrap();

        assert!(!file.exists());
        assert!(!tree.exists());
    }

    #[test]
    fn copy_dir_recursive_copies_nested_files() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join("overlay_images")).unwrap();
        fs::write(src.join("overlays.json"), "{}").unwrap();
        fs::write(src.join("overlay_images").join("bolt.png"), [1u8, 2, 3]).unwrap();

        copy_dir_recursive(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("overlays.json")).unwrap(), "{}");
        assert_eq!(
            fs::read(dst.join("overlay_images").join("bolt.png")).unwrap(),
            vec![1u8, 2, 3]
        );
    }

    #[test]
    fn copy_dir_recursive_keeps_empty_folders() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join("overlay_images")).unwrap();

        copy_dir_recursive(&src, &dst).unwrap();

        assert!(dst.join("overlay_images").is_dir());
    }

    #[test]
    fn is_folder_and_is_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, "").unwrap();

        assert!(is_folder(dir.path()));
        assert!(!is_folder(&file));
        assert!(is_file(&file));
        assert!(!is_file(dir.path()));
        assert!(!is_file(&dir.path().join("missing")));
    }
}
