//! Filesystem operations module.
//!
//! This module provides the low-level operations the strategies and the job
//! loop build on:
//! - Enumerating directory trees into flat file entries
//! - Copying files with modification-time preservation
//! - Creating destination directories recursively
//! - Resetting a target tree before a complete backup

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::EngineError;

/// One file found while enumerating a source tree.
///
/// `destination` is the corresponding path under the target root, computed
/// by relative-path substitution during enumeration.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Enumerate every file under `source`, depth-first.
///
/// Directories themselves are not returned; missing destination directories
/// are created lazily when a file is copied. Entry order is the directory
/// traversal order of the underlying filesystem.
///
/// # Arguments
/// * `source` - Source directory to enumerate
/// * `destination_root` - Target root the relative destination paths hang off
///
/// # Errors
/// Returns `EngineError::EnumerationFailed` if any directory in the tree
/// cannot be read.
pub fn enumerate_files(
    source: &Path,
    destination_root: &Path,
) -> Result<Vec<FileEntry>, EngineError> {
    fn recurse(
        path: &Path,
        rel_path: &Path,
        destination_root: &Path,
        entries: &mut Vec<FileEntry>,
    ) -> Result<(), EngineError> {
        let dir = fs::read_dir(path).map_err(|e| EngineError::EnumerationFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        for entry in dir {
            let entry = entry.map_err(|e| EngineError::EnumerationFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
            let metadata = entry.metadata().map_err(|e| EngineError::EnumerationFailed {
                path: entry.path(),
                source: e,
            })?;

            let rel_full_path = rel_path.join(entry.file_name());
            let entry_path = entry.path();

            if metadata.is_dir() {
                recurse(&entry_path, &rel_full_path, destination_root, entries)?;
            } else {
                entries.push(FileEntry {
                    source: entry_path,
                    destination: destination_root.join(&rel_full_path),
                    size: metadata.len(),
                    modified: metadata.modified().ok(),
                });
            }
        }
        Ok(())
    }

    if !source.is_dir() {
        return Err(EngineError::SourceNotFound {
            path: source.to_path_buf(),
        });
    }

    let mut entries = Vec::new();
    recurse(source, Path::new(""), destination_root, &mut entries)?;
    Ok(entries)
}

/// Copy a file from source to destination, preserving the modification time.
///
/// # Returns
/// Number of bytes copied
///
/// # Errors
/// Returns `EngineError::ReadError` / `EngineError::WriteError` depending on
/// which side of the copy failed.
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    ensure_parent_dir_exists(dst)?;

    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let src_metadata = src_file.metadata().map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;
    let src_mtime = src_metadata.modified().ok();

    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = io::copy(&mut src_file, &mut dst_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            }
        } else {
            EngineError::ReadError {
                path: src.to_path_buf(),
                source: e,
            }
        }
    })?;

    // Preserve modification time so differential runs can compare mtimes
    if let Some(mtime) = src_mtime {
        let _ = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime));
    }

    Ok(bytes_copied)
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns `EngineError::DirectoryCreationFailed` if creation fails or the
/// parent exists but is not a directory.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Ok(()),
    };

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}

/// Remove a pre-existing target tree so a complete backup starts fresh.
///
/// A target that does not exist is fine; anything else that prevents the
/// removal fails the caller's job before any file is copied.
///
/// # Errors
/// Returns `EngineError::TargetResetFailed` if the tree exists and cannot be
/// removed.
pub fn reset_target_tree(target: &Path) -> Result<(), EngineError> {
    match fs::metadata(target) {
        Ok(metadata) if metadata.is_dir() => {
            fs::remove_dir_all(target).map_err(|e| EngineError::TargetResetFailed {
                path: target.to_path_buf(),
                source: e,
            })
        }
        Ok(_) => fs::remove_file(target).map_err(|e| EngineError::TargetResetFailed {
            path: target.to_path_buf(),
            source: e,
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::TargetResetFailed {
            path: target.to_path_buf(),
            source: e,
        }),
    }
}
