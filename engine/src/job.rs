//! Per-job execution loop.
//!
//! `run_job` drives one execution of one backup job on the calling worker
//! thread: plan via the job's strategy, then a per-file loop of checking
//! cancellation, waiting out a pause, requesting admission, copying,
//! encrypting and reporting progress.
//! Cancellation is cooperative: the token is observed at the loop boundary
//! and inside the pause and admission waits, never mid-copy.
//!
//! Terminal transitions: `Completed` with progress 100 on success;
//! `Inactive` with progress 0 on cancellation; `Error` on any other failure,
//! in which case partial work is left in place and not rolled back.

use std::path::PathBuf;
use std::time::Instant;

use log::{info, warn};

use crate::control::{CancelToken, PauseGate};
use crate::coordinator::TransferCoordinator;
use crate::encryption::EncryptionGate;
use crate::error::EngineError;
use crate::events::JobEvent;
use crate::fs_ops;
use crate::model::{BackupJob, JobState};
use crate::strategy::{strategy_for, BackupPlan};

/// How one execution ended, as the manager counts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// Execute one run of `job` to its terminal state.
///
/// The caller provides the shared coordinator and encryption gate, the
/// job's own pause gate, and the token allocated for this execution.
pub(crate) fn run_job(
    job: &BackupJob,
    coordinator: &TransferCoordinator,
    encryption: &dyn EncryptionGate,
    pause: &PauseGate,
    cancel: &CancelToken,
) -> RunOutcome {
    let started = Instant::now();
    job.set_state(JobState::Active);
    job.set_progress(0);
    info!("job '{}' starting ({})", job.name(), job.backup_type());

    match run_batch(job, coordinator, encryption, pause, cancel) {
        Ok((total_files, total_bytes)) => {
            job.set_progress(100);
            job.set_state(JobState::Completed);
            job.emit(JobEvent::Completed {
                total_files,
                total_bytes,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
            info!("job '{}' completed ({} files)", job.name(), total_files);
            RunOutcome::Completed
        }
        Err(e) if e.is_cancelled() => {
            job.set_state(JobState::Inactive);
            job.set_progress(0);
            job.emit(JobEvent::Cancelled);
            info!("job '{}' cancelled", job.name());
            RunOutcome::Cancelled
        }
        Err(e) => {
            job.set_state(JobState::Error);
            job.emit(JobEvent::Failed {
                message: e.to_string(),
            });
            warn!("job '{}' failed: {}", job.name(), e);
            RunOutcome::Failed
        }
    }
}

/// Plan the batch, register its priority files, and copy everything.
///
/// Returns the batch totals for the `Completed` event.
fn run_batch(
    job: &BackupJob,
    coordinator: &TransferCoordinator,
    encryption: &dyn EncryptionGate,
    pause: &PauseGate,
    cancel: &CancelToken,
) -> Result<(usize, u64), EngineError> {
    cancel.check()?;

    let strategy = strategy_for(job.backup_type());
    let mut plan = strategy.files_to_copy(job.source(), job.target())?;
    plan.prioritize(|path| coordinator.is_priority_path(path));

    // Pre-register every priority file of this batch so the admission
    // checks of concurrently running jobs see the backlog before the first
    // copy starts.
    let mut registered: Vec<PathBuf> = Vec::new();
    for entry in &plan.entries {
        if !entry.up_to_date && coordinator.is_priority_path(&entry.file.source) {
            coordinator.register_pending_priority(&entry.file.source);
            registered.push(entry.file.source.clone());
        }
    }

    job.emit(JobEvent::Started {
        total_files: plan.total_files,
        total_bytes: plan.total_bytes,
    });

    let result = copy_entries(
        job,
        &plan,
        coordinator,
        encryption,
        pause,
        cancel,
        &mut registered,
    );

    // An aborted run withdraws whatever it still had registered
    for path in &registered {
        coordinator.unregister_pending_priority(path);
    }

    result.map(|()| (plan.total_files, plan.total_bytes))
}

fn copy_entries(
    job: &BackupJob,
    plan: &BackupPlan,
    coordinator: &TransferCoordinator,
    encryption: &dyn EncryptionGate,
    pause: &PauseGate,
    cancel: &CancelToken,
    registered: &mut Vec<PathBuf>,
) -> Result<(), EngineError> {
    let total = plan.total_files.max(1);

    for (index, entry) in plan.entries.iter().enumerate() {
        cancel.check()?;
        wait_if_paused(job, pause, cancel)?;

        if entry.up_to_date {
            // Scanned but current: counts toward progress, copies nothing
            job.set_progress(percent(index + 1, total));
            job.emit(JobEvent::Processing {
                file: entry.file.source.clone(),
                destination: entry.file.destination.clone(),
                bytes: entry.file.size,
                transfer_ms: 0,
                encryption_ms: 0,
            });
            continue;
        }

        fs_ops::ensure_parent_dir_exists(&entry.file.destination)?;

        coordinator.request_transfer(&entry.file.source, entry.file.size, cancel)?;
        let copy_started = Instant::now();
        let copy_result = fs_ops::copy_file_with_metadata(&entry.file.source, &entry.file.destination);
        let transfer_ms = copy_started.elapsed().as_millis() as u64;
        let encryption_ms = match &copy_result {
            Ok(_) if encryption.should_encrypt(&entry.file.destination) => {
                encryption.encrypt(&entry.file.destination)
            }
            _ => 0,
        };
        coordinator.release_transfer(&entry.file.source, entry.file.size);

        // The file leaves the pending-priority set the instant its own copy
        // attempt finished, success or failure, independent of the rest of
        // the batch
        if let Some(pos) = registered.iter().position(|p| p == &entry.file.source) {
            coordinator.unregister_pending_priority(&entry.file.source);
            registered.swap_remove(pos);
        }

        let bytes = copy_result?;
        job.set_progress(percent(index + 1, total));
        job.emit(JobEvent::Processing {
            file: entry.file.source.clone(),
            destination: entry.file.destination.clone(),
            bytes,
            transfer_ms,
            encryption_ms,
        });
    }

    Ok(())
}

/// Block while the job's gate is closed, with the pause/resume transitions
/// visible to observers.
fn wait_if_paused(
    job: &BackupJob,
    pause: &PauseGate,
    cancel: &CancelToken,
) -> Result<(), EngineError> {
    if !pause.is_paused() {
        return Ok(());
    }

    job.set_state(JobState::Paused);
    job.emit(JobEvent::Paused);
    pause.wait_while_paused(cancel)?;
    job.set_state(JobState::Active);
    job.emit(JobEvent::Resumed);
    Ok(())
}

fn percent(processed: usize, total: usize) -> u8 {
    ((processed * 100) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::NoEncryption;
    use crate::events::{JobObserver, JobSnapshot};
    use crate::model::BackupType;
    use std::fs;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        labels: Mutex<Vec<String>>,
        files: Mutex<Vec<PathBuf>>,
        encryption_ms: Mutex<Vec<u64>>,
        progress: Mutex<Vec<u8>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Recorder {
                labels: Mutex::new(Vec::new()),
                files: Mutex::new(Vec::new()),
                encryption_ms: Mutex::new(Vec::new()),
                progress: Mutex::new(Vec::new()),
            })
        }

        fn labels(&self) -> Vec<String> {
            self.labels.lock().unwrap().clone()
        }
    }

    impl JobObserver for Recorder {
        fn notify(&self, job: &JobSnapshot, event: &JobEvent) {
            self.labels.lock().unwrap().push(event.label().to_string());
            if let JobEvent::Processing {
                file,
                encryption_ms,
                ..
            } = event
            {
                self.files.lock().unwrap().push(file.clone());
                self.encryption_ms.lock().unwrap().push(*encryption_ms);
                self.progress.lock().unwrap().push(job.progress);
            }
        }
    }

    fn fixture(files: &[(&str, &[u8])]) -> (tempfile::TempDir, PathBuf, PathBuf) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src");
        for (name, contents) in files {
            fs::write(src.join(name), contents).expect("Failed to write fixture file");
        }
        let dst = temp_dir.path().join("dst");
        (temp_dir, src, dst)
    }

    fn run(
        job: &BackupJob,
        coordinator: &TransferCoordinator,
    ) -> RunOutcome {
        run_job(
            job,
            coordinator,
            &NoEncryption,
            &PauseGate::new(),
            &CancelToken::new(),
        )
    }

    #[test]
    fn test_run_copies_files_and_orders_events() {
        let (_guard, src, dst) = fixture(&[("a.txt", b"aaa"), ("b.txt", b"bb")]);
        let job = BackupJob::new("docs", &src, &dst, BackupType::Complete);
        let recorder = Recorder::new();
        job.attach_observer(recorder.clone());

        let coordinator = TransferCoordinator::new(Vec::<String>::new(), 0);
        let outcome = run(&job, &coordinator);

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.progress(), 100);
        assert!(dst.join("a.txt").exists());
        assert!(dst.join("b.txt").exists());

        let labels = recorder.labels();
        assert_eq!(
            labels,
            vec!["start", "processing", "processing", "complete"]
        );

        let progress = recorder.progress.lock().unwrap().clone();
        assert!(
            progress.windows(2).all(|w| w[0] <= w[1]),
            "Progress must never decrease during a run: {:?}",
            progress
        );
        assert_eq!(progress.last(), Some(&100));
    }

    #[test]
    fn test_empty_source_completes_at_full_progress() {
        let (_guard, src, dst) = fixture(&[]);
        let job = BackupJob::new("empty", &src, &dst, BackupType::Complete);
        let coordinator = TransferCoordinator::new(Vec::<String>::new(), 0);

        assert_eq!(run(&job, &coordinator), RunOutcome::Completed);
        assert_eq!(job.progress(), 100);
    }

    #[test]
    fn test_cancelled_run_resets_state_and_progress() {
        let (_guard, src, dst) = fixture(&[("a.txt", b"aaa")]);
        let job = BackupJob::new("docs", &src, &dst, BackupType::Complete);
        let recorder = Recorder::new();
        job.attach_observer(recorder.clone());

        let coordinator = TransferCoordinator::new(Vec::<String>::new(), 0);
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = run_job(&job, &coordinator, &NoEncryption, &PauseGate::new(), &cancel);

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(job.state(), JobState::Inactive);
        assert_eq!(job.progress(), 0);
        assert_eq!(recorder.labels(), vec!["cancelled"]);
    }

    #[test]
    fn test_missing_source_fails_the_job() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("nonexistent");
        let dst = temp_dir.path().join("dst");
        let job = BackupJob::new("docs", &src, &dst, BackupType::Complete);
        let recorder = Recorder::new();
        job.attach_observer(recorder.clone());

        let coordinator = TransferCoordinator::new(Vec::<String>::new(), 0);
        let outcome = run(&job, &coordinator);

        assert_eq!(outcome, RunOutcome::Failed);
        assert_eq!(job.state(), JobState::Error);
        assert_eq!(recorder.labels(), vec!["error"]);
    }

    #[test]
    fn test_up_to_date_files_advance_progress_without_copying() {
        let (_guard, src, dst) = fixture(&[("a.txt", b"aaa")]);
        let job = BackupJob::new("docs", &src, &dst, BackupType::Differential);
        let coordinator = TransferCoordinator::new(Vec::<String>::new(), 0);

        // First run mirrors everything
        assert_eq!(run(&job, &coordinator), RunOutcome::Completed);

        // Second run finds the mirror current: progress still reaches 100
        let recorder = Recorder::new();
        job.attach_observer(recorder.clone());
        assert_eq!(run(&job, &coordinator), RunOutcome::Completed);
        assert_eq!(job.progress(), 100);

        let labels = recorder.labels();
        assert_eq!(labels, vec!["start", "processing", "complete"]);
    }

    #[test]
    fn test_priority_files_are_copied_first_and_drained() {
        let (_guard, src, dst) = fixture(&[
            ("bulk1.txt", b"xxxx"),
            ("urgent.pri", b"yy"),
            ("bulk2.txt", b"zzz"),
        ]);
        let job = BackupJob::new("docs", &src, &dst, BackupType::Complete);
        let recorder = Recorder::new();
        job.attach_observer(recorder.clone());

        let coordinator = TransferCoordinator::new(["pri"], 0);
        assert_eq!(run(&job, &coordinator), RunOutcome::Completed);

        let files = recorder.files.lock().unwrap().clone();
        assert!(
            files[0].ends_with("urgent.pri"),
            "Priority file must be copied first, got {:?}",
            files
        );
        assert_eq!(coordinator.pending_priority_count(), 0);
    }

    #[test]
    fn test_encryption_time_is_recorded_per_file() {
        struct FixedGate;

        impl EncryptionGate for FixedGate {
            fn should_encrypt(&self, path: &Path) -> bool {
                path.extension().map(|e| e == "key").unwrap_or(false)
            }

            fn encrypt(&self, _path: &Path) -> u64 {
                7
            }
        }

        let (_guard, src, dst) = fixture(&[("secret.key", b"k"), ("plain.txt", b"p")]);
        let job = BackupJob::new("docs", &src, &dst, BackupType::Complete);
        let recorder = Recorder::new();
        job.attach_observer(recorder.clone());

        let coordinator = TransferCoordinator::new(Vec::<String>::new(), 0);
        let outcome = run_job(
            &job,
            &coordinator,
            &FixedGate,
            &PauseGate::new(),
            &CancelToken::new(),
        );
        assert_eq!(outcome, RunOutcome::Completed);

        let files = recorder.files.lock().unwrap().clone();
        let timings = recorder.encryption_ms.lock().unwrap().clone();
        for (file, encryption_ms) in files.iter().zip(timings) {
            if file.ends_with("secret.key") {
                assert_eq!(encryption_ms, 7);
            } else {
                assert_eq!(encryption_ms, 0);
            }
        }
    }

    #[test]
    fn test_paused_gate_emits_pause_and_resume() {
        use std::thread;
        use std::time::Duration;

        let (_guard, src, dst) = fixture(&[("a.txt", b"aaa")]);
        let job = Arc::new(BackupJob::new("docs", &src, &dst, BackupType::Complete));
        let recorder = Recorder::new();
        job.attach_observer(recorder.clone());

        let coordinator = Arc::new(TransferCoordinator::new(Vec::<String>::new(), 0));
        let pause = Arc::new(PauseGate::new());
        pause.pause();

        let worker_job = Arc::clone(&job);
        let worker_coordinator = Arc::clone(&coordinator);
        let worker_pause = Arc::clone(&pause);
        let handle = thread::spawn(move || {
            run_job(
                &worker_job,
                &worker_coordinator,
                &NoEncryption,
                &worker_pause,
                &CancelToken::new(),
            )
        });

        // Wait for the worker to park on the closed gate
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while job.state() != JobState::Paused {
            assert!(
                std::time::Instant::now() < deadline,
                "Job never reached the paused state"
            );
            thread::sleep(Duration::from_millis(10));
        }

        pause.resume();
        let outcome = handle.join().expect("Worker thread panicked");

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(job.progress(), 100);
        assert_eq!(
            recorder.labels(),
            vec!["start", "pause", "resume", "processing", "complete"]
        );
    }
}
