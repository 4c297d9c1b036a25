//! Mirrorsafe - Command-line interface for the backup engine.
//!
//! Loads a JSON settings file, registers the configured jobs with the
//! manager, and lists or executes them with console progress reporting.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::info;
use engine::{
    CommandEncryptor, EncryptionGate, EngineError, JobEvent, JobManager, JobObserver, JobSnapshot,
    NoEncryption, Settings, SysinfoProbe, TransferCoordinator, DEFAULT_POLL_INTERVAL,
};

/// Mirrorsafe - Concurrent backup jobs with priority-aware transfers
#[derive(Parser, Debug)]
#[command(name = "mirrorsafe")]
#[command(version = "0.1.0")]
#[command(about = "Run configured backup jobs concurrently")]
struct Args {
    /// Path to the JSON settings file
    #[arg(long, value_name = "PATH", default_value = "mirrorsafe.json")]
    config: PathBuf,

    /// Enable per-file output
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the configured jobs
    List,

    /// Execute configured jobs concurrently
    Run {
        /// Names of the jobs to run; every configured job when omitted
        jobs: Vec<String>,
    },

    /// Show the registry snapshot (index, name, state, progress)
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Console implementation of JobObserver for displaying job progress
struct ConsoleProgress {
    verbose: bool,
}

impl ConsoleProgress {
    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(ms: u64) -> String {
        let secs = ms / 1000;
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else if secs > 0 {
            format!("{}s", secs)
        } else {
            format!("{}ms", ms)
        }
    }
}

impl JobObserver for ConsoleProgress {
    fn notify(&self, job: &JobSnapshot, event: &JobEvent) {
        match event {
            JobEvent::Started {
                total_files,
                total_bytes,
            } => {
                eprintln!(
                    "[{}] starting: {} files, {} ({} backup)",
                    job.name,
                    total_files,
                    Self::format_bytes(*total_bytes),
                    job.backup_type
                );
            }
            JobEvent::Processing {
                file,
                transfer_ms,
                encryption_ms,
                bytes,
                ..
            } => {
                if self.verbose {
                    let name = file
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("(unknown)");
                    let encrypted = if *encryption_ms > 0 {
                        format!(", encrypted in {}ms", encryption_ms)
                    } else {
                        String::new()
                    };
                    eprintln!(
                        "[{}] {:3}% {} ({}, {}ms{})",
                        job.name,
                        job.progress,
                        name,
                        Self::format_bytes(*bytes),
                        transfer_ms,
                        encrypted
                    );
                }
            }
            JobEvent::Paused => eprintln!("[{}] paused", job.name),
            JobEvent::Resumed => eprintln!("[{}] resumed", job.name),
            JobEvent::Completed {
                total_files,
                total_bytes,
                elapsed_ms,
            } => {
                eprintln!(
                    "[{}] complete: {} files, {} in {}",
                    job.name,
                    total_files,
                    Self::format_bytes(*total_bytes),
                    Self::format_duration(*elapsed_ms)
                );
            }
            JobEvent::Failed { message } => eprintln!("[{}] failed: {}", job.name, message),
            JobEvent::Cancelled => eprintln!("[{}] cancelled", job.name),
        }
    }
}

fn main() {
    pretty_env_logger::init();
    let args = Args::parse();

    let exit_code = match run_cli(&args) {
        Ok(code) => code,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability. Returns the exit code.
fn run_cli(args: &Args) -> Result<i32, String> {
    let settings =
        Settings::load(&args.config).map_err(|e| format!("Failed to load settings: {}", e))?;
    info!(
        "loaded {} configured jobs from {}",
        settings.jobs.len(),
        args.config.display()
    );

    match &args.command {
        Command::List => {
            let manager = build_manager(&settings)?;
            list_jobs(&manager);
            Ok(0)
        }
        Command::Run { jobs } => run_jobs(args, &settings, jobs),
        Command::Status { json } => {
            let manager = build_manager(&settings)?;
            let statuses = manager.job_statuses();
            if *json {
                let rendered = serde_json::to_string_pretty(&statuses)
                    .map_err(|e| format!("Failed to render statuses: {}", e))?;
                println!("{}", rendered);
            } else {
                for status in statuses {
                    println!(
                        "{:3}  {:20} {:10} {:3}%",
                        status.index, status.name, status.state, status.progress
                    );
                }
            }
            Ok(0)
        }
    }
}

fn list_jobs(manager: &JobManager) {
    let jobs = manager.list_jobs();
    if jobs.is_empty() {
        println!("No jobs configured.");
        return;
    }
    for (index, job) in jobs.iter().enumerate() {
        println!(
            "{:3}  {:20} {:12} {} -> {}",
            index,
            job.name,
            job.backup_type.to_string(),
            job.source.display(),
            job.target.display()
        );
    }
}

/// Build the coordinator, encryption gate and manager from settings and
/// register every configured job.
fn build_manager(settings: &Settings) -> Result<Arc<JobManager>, String> {
    let coordinator = Arc::new(TransferCoordinator::new(
        settings.priority_extensions.iter().map(String::as_str),
        settings.large_file_threshold,
    ));

    let encryption: Arc<dyn EncryptionGate> = match &settings.encryption_program {
        Some(program) => Arc::new(CommandEncryptor::new(
            program,
            settings.encryption_extensions.iter().map(String::as_str),
        )),
        None => Arc::new(NoEncryption),
    };

    let manager = JobManager::new(coordinator, encryption);
    for job in &settings.jobs {
        manager
            .add_job(&job.name, &job.source, &job.target, job.backup_type)
            .map_err(|e| format!("Failed to register job '{}': {}", job.name, e))?;
    }
    Ok(manager)
}

fn run_jobs(args: &Args, settings: &Settings, names: &[String]) -> Result<i32, String> {
    let manager = build_manager(settings)?;
    manager.attach_observer(Arc::new(ConsoleProgress {
        verbose: args.verbose,
    }));

    if settings.business_process.is_some() {
        info!(
            "monitoring business process '{}'",
            settings.business_process.as_deref().unwrap_or_default()
        );
        manager.start_business_monitor(
            Arc::new(SysinfoProbe::new()),
            settings.business_process.clone(),
            DEFAULT_POLL_INTERVAL,
        );
    }

    let indices = resolve_indices(settings, names)?;
    if indices.is_empty() {
        return Err("No jobs configured to run".to_string());
    }

    match manager.execute_jobs(&indices) {
        Ok(()) => Ok(0),
        Err(EngineError::JobsFailed { failed, launched }) => {
            eprintln!("{} of {} jobs did not complete", failed, launched);
            Ok(1)
        }
        Err(e) => Err(e.to_string()),
    }
}

/// Map requested job names to registry indices; all jobs when none given.
fn resolve_indices(settings: &Settings, names: &[String]) -> Result<Vec<usize>, String> {
    if names.is_empty() {
        return Ok((0..settings.jobs.len()).collect());
    }

    names
        .iter()
        .map(|name| {
            settings
                .jobs
                .iter()
                .position(|job| &job.name == name)
                .ok_or_else(|| format!("No configured job named '{}'", name))
        })
        .collect()
}
