//! Backup job manager.
//!
//! The `JobManager` is the process-wide registry of jobs and the sole entry
//! point external callers (CLI, remote console) use to add, update, remove,
//! list, execute, pause, resume and stop them. Each registry entry carries
//! the job together with its pause gate and the cancellation token of its
//! current execution, so removal shifts all three as one unit and the
//! bookkeeping can never refer to mismatched indices.
//!
//! All mutating operations run under one coarse registry lock. The lock is
//! held for the duration of the operation, never across a job's file loop:
//! `execute_jobs` allocates tokens under the lock, then spawns and joins the
//! worker threads outside it.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::control::{CancelToken, PauseGate};
use crate::coordinator::TransferCoordinator;
use crate::detector::{BusinessSoftwareDetector, DetectorSink, ProcessProbe};
use crate::encryption::EncryptionGate;
use crate::error::EngineError;
use crate::events::{JobObserver, JobSnapshot};
use crate::job::{run_job, RunOutcome};
use crate::model::{BackupJob, BackupType, JobState, JobStatus};

/// What `stop_job` found at the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A live execution was cancelled; the worker observes it cooperatively.
    Stopped,
    /// No execution was running; the job was hard-reset to inactive.
    NotRunning,
}

/// One registry slot: the job plus its per-index bookkeeping.
struct RegistryEntry {
    job: Arc<BackupJob>,
    pause: Arc<PauseGate>,
    /// Token of the current execution; `None` while the job is idle.
    cancel: Option<CancelToken>,
}

/// Process-wide registry and orchestrator of backup jobs.
pub struct JobManager {
    registry: Mutex<Vec<RegistryEntry>>,
    observers: Mutex<Vec<Arc<dyn JobObserver>>>,
    coordinator: Arc<TransferCoordinator>,
    encryption: Arc<dyn EncryptionGate>,
    business_running: AtomicBool,
    monitored_process: Mutex<Option<String>>,
    detector: Mutex<Option<BusinessSoftwareDetector>>,
}

impl JobManager {
    pub fn new(
        coordinator: Arc<TransferCoordinator>,
        encryption: Arc<dyn EncryptionGate>,
    ) -> Arc<Self> {
        Arc::new(JobManager {
            registry: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
            coordinator,
            encryption,
            business_running: AtomicBool::new(false),
            monitored_process: Mutex::new(None),
            detector: Mutex::new(None),
        })
    }

    /// Register a new job.
    ///
    /// # Errors
    /// Fails with `DuplicateJobName` (and no mutation) if the name is taken.
    pub fn add_job<P: AsRef<Path>>(
        &self,
        name: &str,
        source: P,
        target: P,
        backup_type: BackupType,
    ) -> Result<(), EngineError> {
        let mut registry = self.lock_registry();
        if registry.iter().any(|entry| entry.job.name() == name) {
            return Err(EngineError::DuplicateJobName {
                name: name.to_string(),
            });
        }

        let job = Arc::new(BackupJob::new(name, source, target, backup_type));
        for observer in self.global_observers() {
            job.attach_observer(observer);
        }

        info!("job '{}' registered at index {}", name, registry.len());
        registry.push(RegistryEntry {
            job,
            pause: Arc::new(PauseGate::new()),
            cancel: None,
        });
        Ok(())
    }

    /// Replace a job in place, preserving its index and pause state.
    ///
    /// # Errors
    /// Fails with `JobNotFound` if no job carries the name.
    pub fn update_job<P: AsRef<Path>>(
        &self,
        name: &str,
        source: P,
        target: P,
        backup_type: BackupType,
    ) -> Result<(), EngineError> {
        let mut registry = self.lock_registry();
        let entry = registry
            .iter_mut()
            .find(|entry| entry.job.name() == name)
            .ok_or_else(|| EngineError::JobNotFound {
                name: name.to_string(),
            })?;

        let job = Arc::new(BackupJob::new(name, source, target, backup_type));
        for observer in self.global_observers() {
            job.attach_observer(observer);
        }

        info!("job '{}' updated", name);
        entry.job = job;
        Ok(())
    }

    /// Remove the job at `index`, shifting every higher index down by one.
    ///
    /// The entry carries the job, its pause gate and its cancellation token
    /// together, so the single removal keeps all per-index bookkeeping
    /// consistent. A live execution of the removed job is cancelled so its
    /// worker winds down.
    ///
    /// # Errors
    /// Fails with `IndexOutOfRange` (and no mutation) on a bad index.
    pub fn remove_job(&self, index: usize) -> Result<(), EngineError> {
        let mut registry = self.lock_registry();
        if index >= registry.len() {
            return Err(EngineError::IndexOutOfRange {
                index,
                len: registry.len(),
            });
        }

        let entry = registry.remove(index);
        info!("job '{}' removed from index {}", entry.job.name(), index);
        if let Some(token) = entry.cancel {
            entry.pause.resume();
            token.cancel();
        }
        Ok(())
    }

    pub fn job_count(&self) -> usize {
        self.lock_registry().len()
    }

    /// Snapshot of every registered job's configuration and current state,
    /// in registry order.
    pub fn list_jobs(&self) -> Vec<JobSnapshot> {
        self.lock_registry()
            .iter()
            .map(|entry| entry.job.snapshot())
            .collect()
    }

    /// Read-only snapshot of every registered job.
    pub fn job_statuses(&self) -> Vec<JobStatus> {
        self.lock_registry()
            .iter()
            .enumerate()
            .map(|(index, entry)| JobStatus {
                index,
                name: entry.job.name().to_string(),
                state: entry.job.state(),
                progress: entry.job.progress(),
            })
            .collect()
    }

    /// Whether the pause flag is set for the job at `index`.
    ///
    /// # Errors
    /// Fails with `IndexOutOfRange` on a bad index.
    pub fn is_job_paused(&self, index: usize) -> Result<bool, EngineError> {
        let registry = self.lock_registry();
        registry
            .get(index)
            .map(|entry| entry.pause.is_paused())
            .ok_or(EngineError::IndexOutOfRange {
                index,
                len: registry.len(),
            })
    }

    /// Execute the jobs at `indices` concurrently and await them all.
    ///
    /// Refused outright, with no job started, while the monitored business
    /// process is detected. Each valid index gets a fresh cancellation token
    /// (any prior token for that index is cancelled first) and one worker
    /// thread; invalid indices are skipped. Overall success requires every
    /// launched job to complete; a cancelled job counts as a failure of the
    /// batch, never as a propagated error.
    ///
    /// # Errors
    /// `BusinessSoftwareRunning` on refusal, `JobsFailed` when one or more
    /// launched jobs did not complete.
    pub fn execute_jobs(&self, indices: &[usize]) -> Result<(), EngineError> {
        if self.business_running.load(Ordering::SeqCst) {
            let process = self
                .monitored_process
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
                .unwrap_or_default();
            return Err(EngineError::BusinessSoftwareRunning { process });
        }

        let mut launches = Vec::new();
        {
            let mut registry = self.lock_registry();
            let mut seen = std::collections::HashSet::new();
            for &index in indices {
                if !seen.insert(index) {
                    continue;
                }
                let Some(entry) = registry.get_mut(index) else {
                    warn!("execute: skipping out-of-range index {}", index);
                    continue;
                };
                // A new execution of the same index invalidates the
                // previous handle first
                if let Some(previous) = entry.cancel.take() {
                    previous.cancel();
                }
                let token = CancelToken::new();
                entry.cancel = Some(token.clone());
                launches.push((Arc::clone(&entry.job), Arc::clone(&entry.pause), token));
            }
        }

        if launches.is_empty() {
            return Ok(());
        }
        let launched = launches.len();

        let mut handles = Vec::new();
        for (job, pause, token) in launches {
            let coordinator = Arc::clone(&self.coordinator);
            let encryption = Arc::clone(&self.encryption);
            handles.push(thread::spawn(move || {
                let outcome = run_job(&job, &coordinator, encryption.as_ref(), &pause, &token);
                (token, outcome)
            }));
        }

        let mut failed = 0;
        for handle in handles {
            match handle.join() {
                Ok((token, outcome)) => {
                    self.clear_finished_token(&token);
                    if outcome != RunOutcome::Completed {
                        failed += 1;
                    }
                }
                Err(_) => failed += 1,
            }
        }

        if failed == 0 {
            Ok(())
        } else {
            Err(EngineError::JobsFailed { failed, launched })
        }
    }

    /// Set the pause flag for the given jobs, or for all when `None`.
    ///
    /// Safe for jobs that are not running: the flag simply takes effect at
    /// the next per-file check of their next execution.
    pub fn pause_jobs(&self, indices: Option<&[usize]>) {
        let registry = self.lock_registry();
        for (index, entry) in select(&registry, indices) {
            debug!("pausing job '{}' (index {})", entry.job.name(), index);
            entry.pause.pause();
        }
    }

    /// Clear the pause flag for the given jobs, or for all when `None`.
    pub fn resume_jobs(&self, indices: Option<&[usize]>) {
        let registry = self.lock_registry();
        for (index, entry) in select(&registry, indices) {
            debug!("resuming job '{}' (index {})", entry.job.name(), index);
            entry.pause.resume();
        }
    }

    /// Stop the job at `index`.
    ///
    /// With a live execution, its token is cancelled; a paused job is
    /// resumed first so the worker can reach a cancellation check instead of
    /// staying parked forever. With no live execution the job is hard-reset
    /// to `Inactive` with progress 0 and `NotRunning` is reported.
    ///
    /// # Errors
    /// Fails with `IndexOutOfRange` on a bad index.
    pub fn stop_job(&self, index: usize) -> Result<StopOutcome, EngineError> {
        let mut registry = self.lock_registry();
        let len = registry.len();
        let entry = registry
            .get_mut(index)
            .ok_or(EngineError::IndexOutOfRange { index, len })?;

        match &entry.cancel {
            Some(token) => {
                info!("stopping job '{}' (index {})", entry.job.name(), index);
                let token = token.clone();
                if entry.pause.is_paused() {
                    entry.pause.resume();
                }
                token.cancel();
                Ok(StopOutcome::Stopped)
            }
            None => {
                debug!(
                    "stop requested for idle job '{}' (index {})",
                    entry.job.name(),
                    index
                );
                entry.job.set_state(JobState::Inactive);
                entry.job.set_progress(0);
                Ok(StopOutcome::NotRunning)
            }
        }
    }

    /// Attach an observer to every existing job and every job created later.
    pub fn attach_observer(&self, observer: Arc<dyn JobObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&observer));
        for entry in self.lock_registry().iter() {
            entry.job.attach_observer(Arc::clone(&observer));
        }
    }

    /// Detach a previously attached global observer (matched by identity).
    pub fn detach_observer(&self, observer: &Arc<dyn JobObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|o| !Arc::ptr_eq(o, observer));
        for entry in self.lock_registry().iter() {
            entry.job.detach_observer(observer);
        }
    }

    /// Start watching for the configured business process.
    ///
    /// The detector holds the manager weakly and reports edges through the
    /// `DetectorSink` implementation below.
    pub fn start_business_monitor(
        self: &Arc<Self>,
        probe: Arc<dyn ProcessProbe>,
        process_name: Option<String>,
        poll_interval: Duration,
    ) {
        *self
            .monitored_process
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = process_name.clone();

        let sink: Arc<dyn DetectorSink> = Arc::clone(self) as Arc<dyn DetectorSink>;
        let detector =
            BusinessSoftwareDetector::spawn(probe, Arc::downgrade(&sink), process_name, poll_interval);
        *self
            .detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(detector);
    }

    /// Replace the monitored process name on a running monitor.
    pub fn set_monitored_process(&self, process_name: Option<&str>) {
        *self
            .monitored_process
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = process_name.map(str::to_string);
        if let Some(detector) = self
            .detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            detector.set_process_name(process_name);
        }
    }

    /// True while the monitored business process is reported running.
    pub fn business_software_active(&self) -> bool {
        self.business_running.load(Ordering::SeqCst)
    }

    fn clear_finished_token(&self, token: &CancelToken) {
        let mut registry = self.lock_registry();
        for entry in registry.iter_mut() {
            let is_current = entry
                .cancel
                .as_ref()
                .map(|current| current.same_token(token))
                .unwrap_or(false);
            if is_current {
                entry.cancel = None;
                break;
            }
        }
    }

    fn global_observers(&self) -> Vec<Arc<dyn JobObserver>> {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_registry(&self) -> MutexGuard<'_, Vec<RegistryEntry>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DetectorSink for JobManager {
    /// Pause every job when the business process appears, if any is active.
    fn business_software_detected(&self) {
        self.business_running.store(true, Ordering::SeqCst);
        let registry = self.lock_registry();
        if registry
            .iter()
            .any(|entry| entry.job.state() == JobState::Active)
        {
            info!("business software detected: pausing all jobs");
            for entry in registry.iter() {
                entry.pause.pause();
            }
        }
    }

    /// Resume every paused job once the business process is gone.
    fn business_software_cleared(&self) {
        self.business_running.store(false, Ordering::SeqCst);
        let registry = self.lock_registry();
        if registry.iter().any(|entry| entry.pause.is_paused()) {
            info!("business software cleared: resuming all jobs");
            for entry in registry.iter() {
                entry.pause.resume();
            }
        }
    }
}

fn select<'a>(
    registry: &'a [RegistryEntry],
    indices: Option<&[usize]>,
) -> Vec<(usize, &'a RegistryEntry)> {
    match indices {
        Some(indices) => indices
            .iter()
            .filter_map(|&index| registry.get(index).map(|entry| (index, entry)))
            .collect(),
        None => registry.iter().enumerate().collect(),
    }
}
