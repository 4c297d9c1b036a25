//! Error types for the backup engine.
//!
//! The primary error type is `EngineError`. Configuration errors (duplicate
//! names, bad indices, unknown backup types) are reported synchronously by
//! the manager with no partial mutation. I/O errors are caught per job and
//! transition only that job to the `Error` state. `Cancelled` is not a
//! failure: it carries the reset semantics of a stopped job.

use std::error::Error;
use std::fmt::{self, Display};
use std::io;
use std::path::PathBuf;

/// Errors surfaced by the manager, the strategies and the job loop.
///
/// File copy failures are job-terminal here: a failed copy moves the owning
/// job to the `Error` state without touching sibling jobs.
#[derive(Debug)]
pub enum EngineError {
    /// A job with this name is already registered
    DuplicateJobName { name: String },

    /// No registered job carries this name
    JobNotFound { name: String },

    /// Positional index outside the registry
    IndexOutOfRange { index: usize, len: usize },

    /// Backup type string is neither "complete" nor "differential"
    InvalidBackupType { value: String },

    /// Source directory does not exist
    SourceNotFound { path: PathBuf },

    /// Failed to enumerate the source tree
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// Failed to remove a pre-existing target tree before a complete backup
    TargetResetFailed { path: PathBuf, source: io::Error },

    /// Failed to create a destination directory
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Failed to read from a source file
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to write to a destination file
    WriteError { path: PathBuf, source: io::Error },

    /// Settings file exists but could not be parsed
    SettingsInvalid { path: PathBuf, reason: String },

    /// The current execution was cancelled cooperatively
    Cancelled,

    /// Execution refused while the monitored process is running
    BusinessSoftwareRunning { process: String },

    /// One or more jobs of a batch did not complete
    JobsFailed { failed: usize, launched: usize },
}

impl Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateJobName { name } => {
                write!(f, "A job named '{}' is already registered", name)
            }
            Self::JobNotFound { name } => {
                write!(f, "No job named '{}' is registered", name)
            }
            Self::IndexOutOfRange { index, len } => {
                write!(f, "Job index {} is out of range ({} registered)", index, len)
            }
            Self::InvalidBackupType { value } => {
                write!(f, "Invalid backup type '{}'", value)
            }
            Self::SourceNotFound { path } => {
                write!(f, "Source directory not found: {}", path.display())
            }
            Self::EnumerationFailed { path, .. } => {
                write!(f, "Failed to enumerate directory: {}", path.display())
            }
            Self::TargetResetFailed { path, .. } => {
                write!(f, "Failed to reset target directory: {}", path.display())
            }
            Self::DirectoryCreationFailed { path, .. } => {
                write!(f, "Failed to create directory: {}", path.display())
            }
            Self::ReadError { path, .. } => {
                write!(f, "Failed to read file: {}", path.display())
            }
            Self::WriteError { path, .. } => {
                write!(f, "Failed to write file: {}", path.display())
            }
            Self::SettingsInvalid { path, reason } => {
                write!(f, "Invalid settings file {}: {}", path.display(), reason)
            }
            Self::Cancelled => {
                write!(f, "Execution cancelled")
            }
            Self::BusinessSoftwareRunning { process } => {
                write!(
                    f,
                    "Execution refused: business software '{}' is running",
                    process
                )
            }
            Self::JobsFailed { failed, launched } => {
                write!(f, "{} of {} jobs did not complete", failed, launched)
            }
        }
    }
}

impl Error for EngineError {}

impl EngineError {
    /// True for the cooperative-cancellation variant.
    ///
    /// Cancellation is distinguished from real failures everywhere: a
    /// cancelled job resets to `Inactive`/0 instead of freezing at `Error`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
