//! Backup strategies.
//!
//! A strategy is a pure function over a source/target pair: it produces the
//! ordered plan of files the job must handle, with no shared state. The two
//! shipped strategies are:
//! - `CompleteBackup`: destroy the target, mirror everything
//! - `DifferentialBackup`: copy only files absent from the target or with a
//!   strictly newer source modification time
//!
//! Up-to-date files under the differential strategy stay in the plan marked
//! `up_to_date`, so totals and the progress counter advance for every
//! scanned source file, copied or skipped.

use std::path::Path;

use crate::error::EngineError;
use crate::fs_ops::{self, FileEntry};
use crate::model::BackupType;

/// One planned file: where it comes from, where it goes, whether it still
/// needs copying.
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub file: FileEntry,
    /// True when the target copy is already current (differential only);
    /// the job counts the file but does not copy it.
    pub up_to_date: bool,
}

/// The ordered list of files a job must process, with batch totals.
///
/// Totals count every scanned source file, including up-to-date ones.
#[derive(Debug, Default)]
pub struct BackupPlan {
    pub entries: Vec<PlanEntry>,
    pub total_files: usize,
    pub total_bytes: u64,
}

impl BackupPlan {
    fn from_entries(entries: Vec<PlanEntry>) -> Self {
        let total_files = entries.len();
        let total_bytes = entries.iter().map(|e| e.file.size).sum();
        BackupPlan {
            entries,
            total_files,
            total_bytes,
        }
    }

    /// Stable-partition the plan so files matching `is_priority` come first.
    ///
    /// Jobs call this with the coordinator's extension predicate before
    /// copying, so their own priority files are attempted ahead of the bulk.
    pub fn prioritize<F>(&mut self, is_priority: F)
    where
        F: Fn(&Path) -> bool,
    {
        let (priority, rest): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|entry| is_priority(&entry.file.source));
        self.entries = priority;
        self.entries.extend(rest);
    }
}

/// Decides which files a job must copy.
pub trait BackupStrategy: Send + Sync {
    /// Enumerate the source tree and produce the job's plan.
    ///
    /// # Errors
    /// Fails with an I/O error if the source cannot be enumerated or (for a
    /// complete backup) a pre-existing target cannot be removed.
    fn files_to_copy(&self, source: &Path, target: &Path) -> Result<BackupPlan, EngineError>;
}

/// Select the strategy implementation for a backup type.
pub fn strategy_for(backup_type: BackupType) -> Box<dyn BackupStrategy> {
    match backup_type {
        BackupType::Complete => Box::new(CompleteBackup),
        BackupType::Differential => Box::new(DifferentialBackup),
    }
}

/// Byte-for-byte fresh mirror.
///
/// A pre-existing target tree is removed first; failing to remove it fails
/// the job before anything is copied, never leaving a half-deleted target
/// behind silently.
pub struct CompleteBackup;

impl BackupStrategy for CompleteBackup {
    fn files_to_copy(&self, source: &Path, target: &Path) -> Result<BackupPlan, EngineError> {
        fs_ops::reset_target_tree(target)?;
        let entries = fs_ops::enumerate_files(source, target)?
            .into_iter()
            .map(|file| PlanEntry {
                file,
                up_to_date: false,
            })
            .collect();
        Ok(BackupPlan::from_entries(entries))
    }
}

/// Changed-only mirror.
///
/// A file is selected for copy iff its target copy is absent or the source
/// modification time is strictly newer. Modification times are the only
/// comparison; there is no byte-level diffing.
pub struct DifferentialBackup;

impl BackupStrategy for DifferentialBackup {
    fn files_to_copy(&self, source: &Path, target: &Path) -> Result<BackupPlan, EngineError> {
        let entries = fs_ops::enumerate_files(source, target)?
            .into_iter()
            .map(|file| {
                let up_to_date = is_up_to_date(&file);
                PlanEntry { file, up_to_date }
            })
            .collect();
        Ok(BackupPlan::from_entries(entries))
    }
}

fn is_up_to_date(file: &FileEntry) -> bool {
    let dst_metadata = match std::fs::metadata(&file.destination) {
        Ok(metadata) => metadata,
        // Absent or unreadable target copy: copy it
        Err(_) => return false,
    };
    match (file.modified, dst_metadata.modified().ok()) {
        (Some(src_mtime), Some(dst_mtime)) => src_mtime <= dst_mtime,
        // Missing mtime on either side: copy to be safe
        _ => false,
    }
}
