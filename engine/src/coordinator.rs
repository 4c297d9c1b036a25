//! Transfer admission control.
//!
//! The `TransferCoordinator` is the process-wide gate every job worker asks
//! before copying a file. It enforces two rules over the shared storage
//! bandwidth:
//!
//! 1. A non-priority file is not admitted while any priority-extension file
//!    is registered pending anywhere in the process. Jobs pre-register their
//!    priority files before the batch starts, so the backlog is visible to
//!    every other job's admission check.
//! 2. At most one transfer larger than the configured threshold is in flight
//!    at a time (threshold 0 disables the rule).
//!
//! The coordinator is shared by reference across all jobs and synchronizes
//! independently from the manager's registry lock.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, PoisonError};

use log::debug;

use crate::control::{CancelToken, WAIT_POLL};
use crate::error::EngineError;

#[derive(Debug, Default)]
struct CoordinatorState {
    /// Priority-extension files queued to be copied, across all jobs.
    pending_priority: HashSet<PathBuf>,
    /// Number of over-threshold transfers currently admitted.
    large_in_flight: usize,
}

/// Priority admission gate shared by all concurrently running jobs.
#[derive(Debug)]
pub struct TransferCoordinator {
    /// Lower-cased extensions (no leading dot) granted priority admission.
    priority_extensions: HashSet<String>,
    /// Transfers strictly larger than this many bytes are single-flight.
    /// 0 disables the rule.
    large_file_threshold: u64,
    state: Mutex<CoordinatorState>,
    admitted: Condvar,
}

impl TransferCoordinator {
    pub fn new<I, S>(priority_extensions: I, large_file_threshold: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let priority_extensions = priority_extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        TransferCoordinator {
            priority_extensions,
            large_file_threshold,
            state: Mutex::new(CoordinatorState::default()),
            admitted: Condvar::new(),
        }
    }

    /// Membership test against the configured priority-extension set.
    ///
    /// Comparison is case-insensitive and ignores a leading dot.
    pub fn is_priority_extension(&self, ext: &str) -> bool {
        self.priority_extensions
            .contains(&ext.trim_start_matches('.').to_lowercase())
    }

    /// True when the path's extension is a priority extension.
    pub fn is_priority_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.is_priority_extension(ext))
            .unwrap_or(false)
    }

    /// Add a file to the pending-priority set. Idempotent.
    pub fn register_pending_priority(&self, path: &Path) {
        let mut state = self.lock_state();
        state.pending_priority.insert(path.to_path_buf());
        self.admitted.notify_all();
    }

    /// Remove a file from the pending-priority set. Idempotent.
    ///
    /// Called the instant the file's own copy attempt finishes, success or
    /// failure, and again for any leftovers when a batch aborts.
    pub fn unregister_pending_priority(&self, path: &Path) {
        let mut state = self.lock_state();
        if state.pending_priority.remove(path) {
            self.admitted.notify_all();
        }
    }

    /// Number of files currently registered pending-priority.
    pub fn pending_priority_count(&self) -> usize {
        self.lock_state().pending_priority.len()
    }

    /// Block until the transfer of `path` may proceed.
    ///
    /// A priority file is never held back by the pending backlog; a
    /// non-priority file waits until the backlog drains. Over-threshold
    /// transfers additionally wait for the single large-transfer slot.
    ///
    /// # Errors
    /// Returns `EngineError::Cancelled` if the caller's token fires while
    /// blocked.
    pub fn request_transfer(
        &self,
        path: &Path,
        size: u64,
        cancel: &CancelToken,
    ) -> Result<(), EngineError> {
        let priority = self.is_priority_path(path);
        let over_threshold = self.large_file_threshold > 0 && size > self.large_file_threshold;

        let mut state = self.lock_state();
        loop {
            let backlog_blocks =
                !priority && !state.pending_priority.is_empty() && !state.pending_priority.contains(path);
            let large_blocks = over_threshold && state.large_in_flight > 0;

            if !backlog_blocks && !large_blocks {
                if over_threshold {
                    state.large_in_flight += 1;
                }
                return Ok(());
            }

            if cancel.check().is_err() {
                return Err(EngineError::Cancelled);
            }

            debug!(
                "transfer of {} waiting (pending priority: {}, large in flight: {})",
                path.display(),
                state.pending_priority.len(),
                state.large_in_flight
            );
            let (guard, _) = self
                .admitted
                .wait_timeout(state, WAIT_POLL)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Signal that the transfer of `path` finished, releasing waiters.
    ///
    /// `size` must match the value passed to `request_transfer` so the large
    /// transfer slot is returned.
    pub fn release_transfer(&self, path: &Path, size: u64) {
        let over_threshold = self.large_file_threshold > 0 && size > self.large_file_threshold;
        let mut state = self.lock_state();
        if over_threshold {
            state.large_in_flight = state.large_in_flight.saturating_sub(1);
        }
        debug!("transfer of {} released", path.display());
        self.admitted.notify_all();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
