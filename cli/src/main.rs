//! DiffBackup - Command-line interface for the differential backup engine.
//!
//! Runs one backup pass (ad hoc or from a saved task), renders progress to
//! stderr and the engine's message stream to stdout, and manages the saved
//! task registry.

mod registry;

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use backup_engine::{
    spawn_backup, BackupTask, CancellationToken, ChecksumAlgorithm, ProgressSnapshot, RunOutcome,
    VerifyMode,
};
use clap::{Parser, Subcommand};
use crossbeam_channel::select;
use tracing_subscriber::EnvFilter;

use registry::{TaskEntry, TaskRegistry, DEFAULT_REGISTRY_FILE};

/// Exit code for a run stopped by the user.
const EXIT_CANCELLED: i32 = 130;

/// DiffBackup - differential file backup
#[derive(Parser, Debug)]
#[command(name = "diffbackup")]
#[command(version)]
#[command(about = "Copy only new or changed files, then optionally verify the result")]
struct Cli {
    /// Saved task registry file
    #[arg(long, value_name = "PATH", default_value = DEFAULT_REGISTRY_FILE, global = true)]
    registry: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one backup pass
    Run(RunArgs),

    /// Manage saved tasks
    #[command(subcommand)]
    Task(TaskCommand),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Saved task to run
    #[arg(long, value_name = "NAME", conflicts_with_all = ["src", "dst"])]
    task: Option<String>,

    /// Source directory
    #[arg(long, value_name = "PATH", requires = "dst")]
    src: Option<PathBuf>,

    /// Destination directory
    #[arg(long, value_name = "PATH", requires = "src")]
    dst: Option<PathBuf>,

    /// Verification after copy: none, size, or deep
    #[arg(long, value_name = "MODE", default_value = "none")]
    verify: String,

    /// Checksum algorithm for deep verification: md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM", default_value = "md5")]
    hash: String,

    /// Suppress the progress bar
    #[arg(long)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// Save a new task
    Add {
        name: String,
        #[arg(long, value_name = "PATH")]
        src: PathBuf,
        #[arg(long, value_name = "PATH")]
        dst: PathBuf,
    },
    /// Rename a saved task
    Rename { old: String, new: String },
    /// Delete a saved task
    Delete { name: String },
    /// List saved tasks
    List,
}

/// Terminal renderer for a run's event streams.
struct CliProgress {
    quiet: bool,
    start_time: Instant,
    last_progress_update: Option<Instant>,
    line_active: bool,
}

impl CliProgress {
    const THROTTLE: Duration = Duration::from_millis(200);

    fn new(quiet: bool) -> Self {
        CliProgress {
            quiet,
            start_time: Instant::now(),
            last_progress_update: None,
            line_active: false,
        }
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}]", "=".repeat(filled), " ".repeat(empty))
    }

    fn progress_line(snapshot: &ProgressSnapshot) -> String {
        if snapshot.total == 0 {
            return "Scanning...".to_string();
        }
        format!(
            "{} Processing... {}/{} ({}%)",
            Self::progress_bar(snapshot.percent()),
            snapshot.processed,
            snapshot.total,
            snapshot.percent()
        )
    }

    fn on_progress(&mut self, snapshot: &ProgressSnapshot) {
        if self.quiet {
            return;
        }
        // Always draw the final snapshot; throttle the rest.
        let is_last = snapshot.processed == snapshot.total;
        if let Some(last) = self.last_progress_update {
            if !is_last && last.elapsed() < Self::THROTTLE {
                return;
            }
        }
        self.last_progress_update = Some(Instant::now());

        eprint!("\r{}", Self::progress_line(snapshot));
        let _ = std::io::stderr().flush();
        self.line_active = true;
    }

    fn on_message(&mut self, message: &str) {
        self.end_line();
        println!("{}", message);
    }

    fn on_finished(&mut self, outcome: RunOutcome) {
        self.end_line();
        let summary = match outcome {
            RunOutcome::Done => "Backup finished!",
            RunOutcome::Error => "Errors occurred. Check log.",
            RunOutcome::Cancelled => "Backup cancelled.",
        };
        eprintln!(
            "{} (elapsed: {})",
            summary,
            Self::format_duration(self.start_time.elapsed())
        );
    }

    fn end_line(&mut self) {
        if self.line_active {
            eprintln!();
            self.line_active = false;
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

/// Ctrl-C handlers bound to one run's token, removed again on drop.
///
/// The first Ctrl-C cancels the run; a second one exits at once.
struct InterruptHandlers {
    #[cfg(unix)]
    ids: Vec<signal_hook::SigId>,
}

impl InterruptHandlers {
    #[cfg(unix)]
    fn install(token: &CancellationToken) -> std::io::Result<Self> {
        use signal_hook::consts::SIGINT;

        // Must be registered before the flag so it sees the previous value.
        let shutdown =
            signal_hook::flag::register_conditional_shutdown(SIGINT, EXIT_CANCELLED, token.flag())?;
        let cancel = signal_hook::flag::register(SIGINT, token.flag())?;
        Ok(InterruptHandlers {
            ids: vec![shutdown, cancel],
        })
    }

    #[cfg(not(unix))]
    fn install(_token: &CancellationToken) -> std::io::Result<Self> {
        Ok(InterruptHandlers {})
    }
}

impl Drop for InterruptHandlers {
    fn drop(&mut self) {
        #[cfg(unix)]
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run_cli(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability. Returns the process exit code.
fn run_cli(cli: &Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Command::Run(args) => run_backup(cli, args),
        Command::Task(command) => {
            manage_tasks(cli, command)?;
            Ok(0)
        }
    }
}

fn parse_verify_mode(s: &str) -> anyhow::Result<VerifyMode> {
    VerifyMode::from_str(s).with_context(|| {
        format!("Invalid verification mode '{}'. Must be 'none', 'size', or 'deep'", s)
    })
}

fn parse_algorithm(s: &str) -> anyhow::Result<ChecksumAlgorithm> {
    ChecksumAlgorithm::from_str(s).with_context(|| {
        format!("Invalid hash algorithm '{}'. Must be 'md5', 'sha256', or 'blake3'", s)
    })
}

/// Resolve the task for a `run` invocation.
fn resolve_task(cli: &Cli, args: &RunArgs) -> anyhow::Result<BackupTask> {
    let verify_mode = parse_verify_mode(&args.verify)?;

    match (&args.task, &args.src, &args.dst) {
        (Some(name), _, _) => {
            let registry = TaskRegistry::load(&cli.registry)?;
            let entry = registry
                .get(name)
                .with_context(|| format!("No saved task named '{}'", name))?;
            println!("--- Starting: {} ---", name);
            Ok(entry.to_task(verify_mode))
        }
        (None, Some(src), Some(dst)) => Ok(BackupTask::new(src, dst, verify_mode)),
        _ => bail!("Specify either --task NAME or both --src and --dst"),
    }
}

fn run_backup(cli: &Cli, args: &RunArgs) -> anyhow::Result<i32> {
    let task = resolve_task(cli, args)?;
    let algorithm = parse_algorithm(&args.hash)?;

    let outcome = execute(task, algorithm, args.quiet);

    Ok(match outcome {
        RunOutcome::Done => 0,
        RunOutcome::Error => 1,
        RunOutcome::Cancelled => EXIT_CANCELLED,
    })
}

/// Run a task on the engine's worker thread and render its events until it ends.
fn execute(task: BackupTask, algorithm: ChecksumAlgorithm, quiet: bool) -> RunOutcome {
    let mut handle = spawn_backup(task, algorithm);
    let _interrupts = match InterruptHandlers::install(&handle.cancellation_token()) {
        Ok(handlers) => Some(handlers),
        Err(e) => {
            tracing::warn!("could not install Ctrl-C handler: {}", e);
            None
        }
    };

    let mut display = CliProgress::new(quiet);
    let progress = handle.progress().clone();
    let messages = handle.messages().clone();
    let outcomes = handle.outcome().clone();

    let outcome = loop {
        select! {
            recv(progress) -> snapshot => {
                if let Ok(snapshot) = snapshot {
                    display.on_progress(&snapshot);
                }
            }
            recv(messages) -> line => {
                if let Ok(line) = line {
                    display.on_message(&line);
                }
            }
            // The outcome is sent last, so it is always present once the
            // other channels disconnect; a closed channel means the worker died.
            recv(outcomes) -> outcome => break outcome.unwrap_or(RunOutcome::Error),
        }
    };

    // Events queued before the terminal event are still owed to the user.
    for snapshot in progress.try_iter() {
        display.on_progress(&snapshot);
    }
    for line in messages.try_iter() {
        display.on_message(&line);
    }

    handle.join();
    display.on_finished(outcome);
    outcome
}

fn manage_tasks(cli: &Cli, command: &TaskCommand) -> anyhow::Result<()> {
    let mut registry = TaskRegistry::load(&cli.registry)?;

    match command {
        TaskCommand::Add { name, src, dst } => {
            registry.add(
                name,
                TaskEntry {
                    source: src.clone(),
                    destination: dst.clone(),
                },
            )?;
            registry.save()?;
            println!("Task '{}' added.", name);
        }
        TaskCommand::Rename { old, new } => {
            registry.rename(old, new)?;
            registry.save()?;
            println!("Task '{}' renamed to '{}'.", old, new);
        }
        TaskCommand::Delete { name } => {
            registry.remove(name)?;
            registry.save()?;
            println!("Task '{}' deleted.", name);
        }
        TaskCommand::List => {
            if registry.is_empty() {
                println!("No saved tasks in {}", registry.path().display());
            }
            for (name, entry) in registry.iter() {
                println!(
                    "{}: {} -> {}",
                    name,
                    entry.source.display(),
                    entry.destination.display()
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::TempDir;

    // Signal handlers are process-wide; runs and raised signals must not overlap.
    static SIGNAL_LOCK: Mutex<()> = Mutex::new(());

    fn signal_lock() -> MutexGuard<'static, ()> {
        SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run_args(src: &TempDir, dst: &TempDir, verify: &str, hash: &str) -> RunArgs {
        RunArgs {
            task: None,
            src: Some(src.path().to_path_buf()),
            dst: Some(dst.path().to_path_buf()),
            verify: verify.to_string(),
            hash: hash.to_string(),
            quiet: true,
        }
    }

    fn cli(registry: PathBuf, command: Command) -> Cli {
        Cli {
            registry,
            verbose: false,
            command,
        }
    }

    #[test]
    fn test_cli_with_valid_directories() {
        let _serial = signal_lock();
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("test.txt"), "hello").expect("Failed to write file");

        let cli = cli(
            dst_dir.path().join("unused.json"),
            Command::Run(run_args(&src_dir, &dst_dir, "none", "md5")),
        );

        assert_eq!(run_cli(&cli).expect("CLI should succeed"), 0);
        assert!(dst_dir.path().join("test.txt").exists());
    }

    #[test]
    fn test_cli_with_deep_verification() {
        let _serial = signal_lock();
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("test.txt"), "hello").expect("Failed to write file");

        let cli = cli(
            dst_dir.path().join("unused.json"),
            Command::Run(run_args(&src_dir, &dst_dir, "deep", "sha256")),
        );

        assert_eq!(run_cli(&cli).expect("CLI should succeed"), 0);
    }

    #[test]
    fn test_cli_missing_source_exits_with_error_code() {
        let _serial = signal_lock();
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let mut args = run_args(&dst_dir, &dst_dir, "none", "md5");
        args.src = Some(PathBuf::from("/nonexistent/path"));

        let cli = cli(dst_dir.path().join("unused.json"), Command::Run(args));
        assert_eq!(run_cli(&cli).expect("run reaches the engine"), 1);
    }

    #[test]
    fn test_cli_rejects_invalid_verify_mode() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");

        let cli = cli(
            dst_dir.path().join("unused.json"),
            Command::Run(run_args(&src_dir, &dst_dir, "sometimes", "md5")),
        );
        assert!(run_cli(&cli).is_err(), "CLI should reject invalid verify mode");
    }

    #[test]
    fn test_cli_rejects_invalid_hash_algorithm() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");

        let cli = cli(
            dst_dir.path().join("unused.json"),
            Command::Run(run_args(&src_dir, &dst_dir, "deep", "crc32")),
        );
        assert!(run_cli(&cli).is_err(), "CLI should reject invalid hash algorithm");
    }

    #[test]
    fn test_cli_runs_saved_task() {
        let _serial = signal_lock();
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let registry_dir = TempDir::new().expect("Failed to create temp dir");
        let registry_path = registry_dir.path().join("backups.json");
        std::fs::write(src_dir.path().join("saved.txt"), "data").expect("Failed to write file");

        let add = cli(
            registry_path.clone(),
            Command::Task(TaskCommand::Add {
                name: "nightly".to_string(),
                src: src_dir.path().to_path_buf(),
                dst: dst_dir.path().to_path_buf(),
            }),
        );
        assert_eq!(run_cli(&add).expect("add should succeed"), 0);

        let mut args = run_args(&src_dir, &dst_dir, "size", "md5");
        args.src = None;
        args.dst = None;
        args.task = Some("nightly".to_string());
        let run = cli(registry_path, Command::Run(args));

        assert_eq!(run_cli(&run).expect("run should succeed"), 0);
        assert!(dst_dir.path().join("saved.txt").exists());
    }

    #[test]
    fn test_cli_unknown_task_is_rejected() {
        let registry_dir = TempDir::new().expect("Failed to create temp dir");
        let args = RunArgs {
            task: Some("ghost".to_string()),
            src: None,
            dst: None,
            verify: "none".to_string(),
            hash: "md5".to_string(),
            quiet: true,
        };

        let cli = cli(registry_dir.path().join("backups.json"), Command::Run(args));
        assert!(run_cli(&cli).is_err());
    }

    #[test]
    fn test_cli_task_lifecycle() {
        let registry_dir = TempDir::new().expect("Failed to create temp dir");
        let path = registry_dir.path().join("backups.json");

        let add = |name: &str| {
            cli(
                path.clone(),
                Command::Task(TaskCommand::Add {
                    name: name.to_string(),
                    src: PathBuf::from("/s"),
                    dst: PathBuf::from("/d"),
                }),
            )
        };

        run_cli(&add("a")).expect("add a");
        assert!(run_cli(&add("a")).is_err(), "duplicate name rejected");

        let rename = cli(
            path.clone(),
            Command::Task(TaskCommand::Rename {
                old: "a".to_string(),
                new: "b".to_string(),
            }),
        );
        run_cli(&rename).expect("rename");

        let registry = TaskRegistry::load(&path).expect("load");
        assert!(registry.get("a").is_none());
        assert!(registry.get("b").is_some());

        let delete = cli(
            path.clone(),
            Command::Task(TaskCommand::Delete {
                name: "b".to_string(),
            }),
        );
        run_cli(&delete).expect("delete");
        assert!(TaskRegistry::load(&path).expect("load").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_interrupt_trips_cancellation_token() {
        let _serial = signal_lock();
        let token = CancellationToken::new();
        let handlers = InterruptHandlers::install(&token).expect("Failed to install handler");
        assert!(!token.is_cancelled());

        // One signal only: a second would exit the test process.
        signal_hook::low_level::raise(signal_hook::consts::SIGINT).expect("Failed to raise");
        assert!(token.is_cancelled());
        drop(handlers);
    }

    #[test]
    fn test_progress_line_formats() {
        assert_eq!(CliProgress::progress_line(&ProgressSnapshot::new(0)), "Scanning...");

        let snapshot = ProgressSnapshot {
            copied: 1,
            skipped: 0,
            failed: 0,
            total: 4,
            processed: 1,
        };
        assert_eq!(
            CliProgress::progress_line(&snapshot),
            "[=====               ] Processing... 1/4 (25%)"
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(CliProgress::format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(CliProgress::format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(CliProgress::format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_cli_parses_run_arguments() {
        let cli = Cli::try_parse_from([
            "diffbackup", "run", "--src", "/a", "--dst", "/b", "--verify", "deep", "--hash", "blake3",
        ])
        .expect("valid arguments");

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.src, Some(PathBuf::from("/a")));
                assert_eq!(args.verify, "deep");
                assert_eq!(args.hash, "blake3");
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.registry, PathBuf::from(DEFAULT_REGISTRY_FILE));
    }

    #[test]
    fn test_cli_rejects_task_with_paths() {
        let result = Cli::try_parse_from([
            "diffbackup", "run", "--task", "x", "--src", "/a", "--dst", "/b",
        ]);
        assert!(result.is_err());
    }
}
