//! `replicatord` — out-of-process stand-in for the UI boundary (§1, §4.12).
//!
//! Exercises the library's public API without implementing any of the
//! desktop UI, tray, notification, or settings surfaces that are explicitly
//! out of scope for the core. Installs `env_logger` from `RUST_LOG` the same
//! way the teacher initializes logging in its desktop shell, and a panic
//! hook that logs and does not kill worker threads silently (§7).

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use replicator::id::TaskId;
use replicator::scheduler::ScheduleType;
use replicator::task::{ConflictStrategy, SyncMode, Task};
use replicator::{Error, TaskManager};

#[derive(Parser)]
#[command(name = "replicatord", version, about = "Continuous, policy-driven file-tree replicator")]
struct Cli {
    /// Directory holding tasks.json and state.json (defaults to the
    /// platform config directory).
    #[arg(long, global = true)]
    storage_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Task definition management.
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// Run a one-shot full sync for a task.
    Sync {
        id: String,
        /// Plan only; never touch the filesystem.
        #[arg(long)]
        dry_run: bool,
    },
    /// Safety-alert re-entry points.
    Alert {
        #[command(subcommand)]
        command: AlertCommand,
    },
    /// Start the daemon: load tasks, auto-start flagged tasks, run until
    /// interrupted.
    Run,
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Register a new task.
    Add {
        name: String,
        source: PathBuf,
        /// One or more target directories.
        #[arg(required = true)]
        targets: Vec<PathBuf>,
        #[arg(long, value_enum, default_value = "one-way")]
        mode: ModeArg,
        #[arg(long, value_enum, default_value = "newest-wins")]
        conflict_strategy: ConflictArg,
    },
    /// List registered tasks and their runtime status.
    List,
    Start { id: String },
    Stop { id: String },
    Pause { id: String },
    Resume { id: String },
    /// Schedule a periodic full sync for a task.
    Schedule {
        id: String,
        #[arg(value_enum)]
        schedule_type: ScheduleArg,
        /// "30m"/"2h"/"1d" for interval, "09:00" for daily, "monday 09:00"
        /// for weekly, an RFC3339 timestamp for once.
        value: String,
    },
}

#[derive(Subcommand)]
enum AlertCommand {
    /// Drain and enqueue a task's paused batch.
    Confirm { id: String },
    /// Discard a task's paused batch without executing anything.
    Reset { id: String },
}

#[derive(Clone, clap::ValueEnum)]
enum ModeArg {
    OneWay,
    TwoWay,
}

#[derive(Clone, clap::ValueEnum)]
enum ConflictArg {
    NewestWins,
    SourceWins,
    TargetWins,
    KeepBoth,
    AskUser,
    Skip,
}

#[derive(Clone, clap::ValueEnum)]
enum ScheduleArg {
    Interval,
    Daily,
    Weekly,
    Once,
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log::error!(target: "replicator", "panic: {info}");
        default_hook(info);
    }));
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    install_panic_hook();

    let cli = Cli::parse();
    let storage = match cli.storage_root {
        Some(root) => replicator::config::StorageRoot::new(root),
        None => replicator::config::StorageRoot::default_platform(),
    };

    let manager = TaskManager::with_storage(storage);
    manager.load()?;

    match cli.command {
        Commands::Task { command } => run_task_command(&manager, command)?,
        Commands::Sync { id, dry_run } => run_sync(&manager, &id, dry_run)?,
        Commands::Alert { command } => run_alert_command(&manager, command)?,
        Commands::Run => run_daemon(&manager)?,
    }

    Ok(())
}

fn find_task_id(manager: &TaskManager, id_or_name: &str) -> Result<TaskId, Error> {
    let direct = TaskId::from(id_or_name);
    if manager.get_task(&direct).is_some() {
        return Ok(direct);
    }
    manager
        .list_tasks()
        .into_iter()
        .find(|t| t.name == id_or_name)
        .map(|t| t.id)
        .ok_or_else(|| Error::TaskNotFound(TaskId::from(id_or_name)))
}

fn run_task_command(manager: &std::sync::Arc<TaskManager>, command: TaskCommand) -> Result<(), Error> {
    match command {
        TaskCommand::Add { name, source, targets, mode, conflict_strategy } => {
            let sync_mode = match mode {
                ModeArg::OneWay => SyncMode::OneWay,
                ModeArg::TwoWay => SyncMode::TwoWay,
            };
            let mut task = Task::new(name, source, targets, sync_mode);
            task.conflict_strategy = match conflict_strategy {
                ConflictArg::NewestWins => ConflictStrategy::NewestWins,
                ConflictArg::SourceWins => ConflictStrategy::SourceWins,
                ConflictArg::TargetWins => ConflictStrategy::TargetWins,
                ConflictArg::KeepBoth => ConflictStrategy::KeepBoth,
                ConflictArg::AskUser => ConflictStrategy::AskUser,
                ConflictArg::Skip => ConflictStrategy::Skip,
            };
            let id = manager.create_task(task)?;
            println_log(format!("created task {id}"));
        }
        TaskCommand::List => {
            for task in manager.list_tasks() {
                let status = manager.task_status(&task.id).map(|s| format!("{s:?}")).unwrap_or_else(|| "stopped".to_string());
                println_log(format!(
                    "{}  {}  {}  -> {:?}  [{:?}] ({status})",
                    task.id, task.name, task.source.display(), task.targets, task.mode
                ));
            }
        }
        TaskCommand::Start { id } => {
            let task_id = find_task_id(manager, &id)?;
            let ok = manager.start_task(&task_id)?;
            println_log(format!("start {task_id}: {ok}"));
        }
        TaskCommand::Stop { id } => {
            let task_id = find_task_id(manager, &id)?;
            manager.stop_task(&task_id);
            println_log(format!("stopped {task_id}"));
        }
        TaskCommand::Pause { id } => {
            let task_id = find_task_id(manager, &id)?;
            manager.pause_task(&task_id);
            println_log(format!("paused {task_id}"));
        }
        TaskCommand::Resume { id } => {
            let task_id = find_task_id(manager, &id)?;
            manager.resume_task(&task_id);
            println_log(format!("resumed {task_id}"));
        }
        TaskCommand::Schedule { id, schedule_type, value } => {
            let task_id = find_task_id(manager, &id)?;
            manager.enable_scheduler();
            let kind = match schedule_type {
                ScheduleArg::Interval => ScheduleType::Interval,
                ScheduleArg::Daily => ScheduleType::Daily,
                ScheduleArg::Weekly => ScheduleType::Weekly,
                ScheduleArg::Once => ScheduleType::Once,
            };
            let job_id = manager.schedule_task(task_id, kind, value)?;
            println_log(format!("scheduled job {job_id}"));
        }
    }
    Ok(())
}

fn run_sync(manager: &TaskManager, id: &str, dry_run: bool) -> Result<(), Error> {
    let task_id = find_task_id(manager, id)?;
    if dry_run {
        let safety = manager.check_sync_safety(&task_id)?;
        println_log(format!("dry run: safe={} changes={} {}", safety.safe, safety.changes_count, safety.message));
    } else {
        manager.run_full_sync(&task_id, None)?;
        println_log(format!("full sync queued for {task_id}"));
    }
    Ok(())
}

fn run_alert_command(manager: &TaskManager, command: AlertCommand) -> Result<(), Error> {
    match command {
        AlertCommand::Confirm { id } => {
            let task_id = find_task_id(manager, &id)?;
            manager.confirm_safety_alert(&task_id, None)?;
            println_log(format!("confirmed safety alert for {task_id}"));
        }
        AlertCommand::Reset { id } => {
            let task_id = find_task_id(manager, &id)?;
            manager.reset_safety_pause(&task_id)?;
            println_log(format!("reset safety pause for {task_id}"));
        }
    }
    Ok(())
}

/// Runs in the foreground until killed. Graceful SIGTERM/SIGINT handling is
/// UI/process-supervisor territory (§1's out-of-scope boundary); a process
/// manager that wants a clean shutdown can send the default signal and rely
/// on `TaskManager::shutdown`'s `Drop`-adjacent cleanup being unnecessary —
/// the queue and state store are durable across a hard kill by construction
/// (write-temp-then-rename, re-derivable batch state).
fn run_daemon(manager: &std::sync::Arc<TaskManager>) -> Result<(), Error> {
    let started = manager.start_all(false);
    println_log(format!("started {} auto-start task(s)", started.len()));

    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}

/// User-facing daemon output belongs on the CLI boundary, not the library —
/// matching the crate's `#![deny(clippy::print_stdout)]` scope, which only
/// applies to `src/lib.rs`'s module tree.
fn println_log(message: impl AsRef<str>) {
    log::info!(target: "replicatord", "{}", message.as_ref());
}
