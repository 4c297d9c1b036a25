//! Core data model for backup jobs.
//!
//! This module defines the main data structures of the engine:
//! - BackupJob: one configured source-to-target mapping with its own lifecycle
//! - BackupType, JobState: enums controlling strategy selection and lifecycle
//! - JobStatus: the read-only snapshot row handed to UI/remote consumers
//!
//! A job is shared between its worker thread and the manager, so the mutable
//! pieces (state, progress) live behind their own synchronization rather
//! than behind `&mut` access.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::events::{JobEvent, JobObserver, JobSnapshot};

/// Which strategy decides the files a job must copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    /// Byte-for-byte fresh mirror; a pre-existing target is removed first
    Complete,
    /// Copy only files absent from the target or newer than their mirror
    Differential,
}

impl std::fmt::Display for BackupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupType::Complete => write!(f, "complete"),
            BackupType::Differential => write!(f, "differential"),
        }
    }
}

impl FromStr for BackupType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "complete" | "full" => Ok(BackupType::Complete),
            "differential" | "diff" => Ok(BackupType::Differential),
            _ => Err(EngineError::InvalidBackupType {
                value: s.to_string(),
            }),
        }
    }
}

/// The lifecycle state of a backup job.
///
/// `Inactive` is both the initial state and the state a cancelled job
/// returns to. `Paused` is a transient sub-state of an active run: the
/// worker sets it while it blocks on the pause gate and restores `Active`
/// on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Inactive,
    Active,
    Paused,
    Completed,
    Error,
    Cancelled,
}

impl JobState {
    /// True once a run has ended (successfully or not).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Error | JobState::Cancelled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Inactive => write!(f, "inactive"),
            JobState::Active => write!(f, "active"),
            JobState::Paused => write!(f, "paused"),
            JobState::Completed => write!(f, "completed"),
            JobState::Error => write!(f, "error"),
            JobState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One registered backup mapping.
///
/// The worker thread mutates state and progress while the manager (and any
/// status consumer) reads them, hence the interior synchronization. The
/// observer list is per job; the manager attaches its global observers to
/// every job it creates.
pub struct BackupJob {
    id: Uuid,
    name: String,
    source: PathBuf,
    target: PathBuf,
    backup_type: BackupType,
    state: Mutex<JobState>,
    progress: AtomicU8,
    observers: Mutex<Vec<Arc<dyn JobObserver>>>,
}

impl std::fmt::Debug for BackupJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupJob")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("backup_type", &self.backup_type)
            .field("state", &self.state())
            .field("progress", &self.progress())
            .finish()
    }
}

impl BackupJob {
    /// Create a job in the `Inactive` state with progress 0.
    ///
    /// Paths are not validated here; a missing source surfaces as an
    /// enumeration error when the job runs.
    pub fn new<P: AsRef<Path>>(name: &str, source: P, target: P, backup_type: BackupType) -> Self {
        BackupJob {
            id: Uuid::new_v4(),
            name: name.to_string(),
            source: source.as_ref().to_path_buf(),
            target: target.as_ref().to_path_buf(),
            backup_type,
            state: Mutex::new(JobState::Inactive),
            progress: AtomicU8::new(0),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn backup_type(&self) -> BackupType {
        self.backup_type
    }

    pub fn state(&self) -> JobState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: JobState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Current progress, 0-100.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    pub(crate) fn set_progress(&self, progress: u8) {
        self.progress.store(progress.min(100), Ordering::SeqCst);
    }

    /// Subscribe an observer to this job's lifecycle events.
    pub fn attach_observer(&self, observer: Arc<dyn JobObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Remove a previously attached observer (matched by identity).
    pub fn detach_observer(&self, observer: &Arc<dyn JobObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|o| !Arc::ptr_eq(o, observer));
    }

    /// Capture the job's identity and current state for a notification.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            name: self.name.clone(),
            backup_type: self.backup_type,
            state: self.state(),
            source: self.source.clone(),
            target: self.target.clone(),
            progress: self.progress(),
            timestamp: Utc::now(),
        }
    }

    /// Fan one event out to every attached observer, synchronously.
    pub(crate) fn emit(&self, event: JobEvent) {
        let snapshot = self.snapshot();
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer.notify(&snapshot, &event);
        }
    }
}

/// Read-only status row for UI and remote consumers.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub index: usize,
    pub name: String,
    pub state: JobState,
    pub progress: u8,
}
