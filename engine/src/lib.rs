//! # Mirrorsafe Engine - Concurrent Backup Orchestration Library
//!
//! A headless engine that executes independent backup jobs concurrently.
//! Designed as the foundation for multiple front ends (CLI, GUI, remote
//! console).
//!
//! ## Overview
//!
//! The engine provides a registry of backup jobs, each one mapping a source
//! tree to a target tree under a backup strategy. It features:
//! - Complete (fresh mirror) and differential (changed-only) strategies
//! - One worker thread per executing job, with cooperative pause, resume
//!   and cancellation
//! - A process-wide transfer coordinator so priority files are never
//!   starved by bulk copies
//! - A business-software detector that transparently pauses every job while
//!   a monitored process runs
//! - Per-file encryption hand-off to an external program
//! - Lifecycle notifications via observer fan-out (decoupled from UI
//!   technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use engine::{BackupType, JobManager, NoEncryption, TransferCoordinator};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = Arc::new(TransferCoordinator::new(["pri"], 0));
//! let manager = JobManager::new(coordinator, Arc::new(NoEncryption));
//!
//! // Register a job and execute it
//! manager.add_job("documents", "/home/me/docs", "/backup/docs", BackupType::Complete)?;
//! manager.execute_jobs(&[0])?;
//!
//! for status in manager.job_statuses() {
//!     println!("{}: {} ({}%)", status.name, status.state, status.progress);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (BackupJob, BackupType, JobState)
//! - **error**: Error types and handling
//! - **events**: Lifecycle notifications and the observer trait
//! - **fs_ops**: Low-level filesystem operations
//! - **strategy**: Complete and differential backup strategies
//! - **coordinator**: Priority-based transfer admission gate
//! - **control**: Pause gate and cancellation token
//! - **job**: The per-job execution loop
//! - **manager**: The job registry and orchestration entry point
//! - **detector**: Business-software polling and edge detection
//! - **encryption**: Encryption hand-off to an external program
//! - **settings**: JSON configuration

pub mod control;
pub mod coordinator;
pub mod detector;
pub mod encryption;
pub mod error;
pub mod events;
pub mod fs_ops;
pub mod job;
pub mod manager;
pub mod model;
pub mod settings;
pub mod strategy;

// Re-export main types
pub use control::{CancelToken, PauseGate};
pub use coordinator::TransferCoordinator;
pub use detector::{
    BusinessSoftwareDetector, DetectorSink, ProcessProbe, SysinfoProbe, DEFAULT_POLL_INTERVAL,
};
pub use encryption::{CommandEncryptor, EncryptionGate, NoEncryption};
pub use error::EngineError;
pub use events::{JobEvent, JobObserver, JobSnapshot};
pub use fs_ops::FileEntry;
pub use manager::{JobManager, StopOutcome};
pub use model::{BackupJob, BackupType, JobState, JobStatus};
pub use settings::{JobSpec, Settings};
pub use strategy::{BackupPlan, BackupStrategy, CompleteBackup, DifferentialBackup, PlanEntry};
