//! Job lifecycle notifications.
//!
//! Observers receive a `(JobSnapshot, JobEvent)` pair on every transition a
//! job makes. The snapshot carries the job's identity and its state at the
//! moment of the event; the event itself is a tagged variant, so sinks that
//! only care about, say, completions can match on one arm and ignore the
//! rest. Delivery is synchronous on the worker thread: a slow observer slows
//! that job's loop, nothing more.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{BackupType, JobState};

/// The state of a job at the instant an event was emitted.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub name: String,
    pub backup_type: BackupType,
    pub state: JobState,
    pub source: PathBuf,
    pub target: PathBuf,
    /// 0-100
    pub progress: u8,
    pub timestamp: DateTime<Utc>,
}

/// One transition in a job's lifecycle.
///
/// Within one run, `Started` precedes all `Processing` events, which precede
/// exactly one terminal event (`Completed`, `Failed` or `Cancelled`);
/// `Paused`/`Resumed` pairs may interleave anywhere in between.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Started {
        total_files: usize,
        total_bytes: u64,
    },
    /// One source file was handled (copied, or counted as up to date).
    Processing {
        file: PathBuf,
        destination: PathBuf,
        bytes: u64,
        transfer_ms: u64,
        /// 0 when the file was not encrypted or encryption failed
        encryption_ms: u64,
    },
    Paused,
    Resumed,
    Completed {
        total_files: usize,
        total_bytes: u64,
        elapsed_ms: u64,
    },
    /// Carries the failure message only; no partial file/byte totals are
    /// reported on this event.
    Failed {
        message: String,
    },
    Cancelled,
}

impl JobEvent {
    /// Short action name, for log lines and test assertions.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Started { .. } => "start",
            Self::Processing { .. } => "processing",
            Self::Paused => "pause",
            Self::Resumed => "resume",
            Self::Completed { .. } => "complete",
            Self::Failed { .. } => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Receives job lifecycle notifications.
///
/// Implementations must be shareable across worker threads. The engine never
/// retries or reorders deliveries; an observer that needs decoupling from
/// the worker should hand the pair off to its own channel.
pub trait JobObserver: Send + Sync {
    fn notify(&self, job: &JobSnapshot, event: &JobEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_labels() {
        let started = JobEvent::Started {
            total_files: 2,
            total_bytes: 10,
        };
        assert_eq!(started.label(), "start");
        assert_eq!(JobEvent::Cancelled.label(), "cancelled");
        let failed = JobEvent::Failed {
            message: "boom".to_string(),
        };
        assert_eq!(failed.label(), "error");
    }
}
