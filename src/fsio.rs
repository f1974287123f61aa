//! Atomic file writes: temp file in the same directory, fsync, rename.
//!
//! A concurrent reader sees either the old or the new contents, never a partial
//! write.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Result, StoreError};

/// Atomically replace `path` with `bytes`, creating parent directories.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::io(path, std::io::Error::other("path has no parent")))?;
    fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = parent.join(format!(".{file_name}.{}.tmp", std::process::id()));

    let mut file = fs::File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| StoreError::io(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StoreError::io(path, e)
    })
}

/// Remove a file; a missing file is not an error. Returns whether it existed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Remove a directory left empty by a deletion. A directory that is already
/// gone or still has entries is left alone; anything else is logged.
pub fn remove_empty_dir(dir: &Path) {
    match fs::remove_dir(dir) {
        Ok(()) => {}
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::DirectoryNotEmpty
            ) => {}
        Err(e) => tracing::warn!(path = %dir.display(), error = %e, "failed to remove empty directory"),
    }
}

/// Read a file; a missing file yields `None`.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_atomic_creates_parents_and_replaces() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a").join("b.md");

        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"two");
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn remove_missing_is_ok() {
        let tmp = TempDir::new().unwrap();
        assert!(!remove_if_exists(&tmp.path().join("nope")).unwrap());
        assert!(read_optional(&tmp.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn only_empty_directories_are_removed() {
        let tmp = TempDir::new().unwrap();
        let full = tmp.path().join("skills").join("deploy");
        write_atomic(&full.join("SKILL.md"), b"x").unwrap();

        remove_empty_dir(&full);
        assert!(full.join("SKILL.md").exists());

        remove_if_exists(&full.join("SKILL.md")).unwrap();
        remove_empty_dir(&full);
        assert!(!full.exists());

        // Already gone: nothing to do, nothing to report.
        remove_empty_dir(&full);
        assert!(tmp.path().join("skills").exists());
    }
}
