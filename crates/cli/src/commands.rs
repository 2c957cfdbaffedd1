use std::fmt;
use std::io::Write;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, Utc};
use serde_json::json;

use crate::capture::TaskInput;
use crate::cli::{
    AddArgs, CliCommand, IdsArgs, ListArgs, PermissionAction, PermissionArgs, SweepArgs,
};
use crate::config::AppConfig;
use crate::core::commands::open_detached;
use crate::core::storage::{KeyValueStore, MemoryStorage, SqliteStorage, NOTIFICATIONS_KEY, TASKS_KEY};
use crate::core::{
    CatchUpSweeper, DetachedManager, DetachedTimer, DirectSink, PermissionState,
    RecordingBackend, TaskManager, TaskStore,
};
use crate::model::{DeleteResult, TaskFilter, TaskRecord, ToggleResult};
use crate::notify::NotifierKind;

pub fn execute<W: Write>(
    config: &AppConfig,
    notifier: NotifierKind,
    command: CliCommand,
    mut writer: W,
) -> Result<()> {
    let now = Utc::now();
    match command {
        CliCommand::Add(args) => handle_add(config, notifier, &args, now, &mut writer),
        CliCommand::List(args) => handle_list(config, notifier, &args, now, &mut writer),
        CliCommand::Toggle(args) => handle_toggle(config, notifier, &args, now, &mut writer),
        CliCommand::Delete(args) => handle_delete(config, notifier, &args, now, &mut writer),
        CliCommand::ClearCompleted => handle_clear(config, notifier, now, &mut writer),
        CliCommand::Sweep(args) => handle_sweep(config, notifier, &args, now, &mut writer),
        CliCommand::Permission(args) => handle_permission(config, notifier, &args, &mut writer),
        CliCommand::Live(_) => Err(anyhow!("launch the live session directly")),
    }
}

/// Every one-shot command is a fresh load: reconcile missed reminders before acting.
fn open_started(config: &AppConfig, notifier: NotifierKind, now: DateTime<Utc>) -> Result<DetachedManager> {
    let mut manager = open_detached(config, notifier.backend())?;
    let report = manager.startup(now);
    tracing::debug!(
        overdue = report.overdue,
        tiers_fired = report.tiers_fired,
        "startup sweep finished"
    );
    Ok(manager)
}

fn handle_add<W: Write>(
    config: &AppConfig,
    notifier: NotifierKind,
    args: &AddArgs,
    now: DateTime<Utc>,
    mut writer: W,
) -> Result<()> {
    let mut manager = open_started(config, notifier, now)?;
    let outcome = manager.add(&TaskInput::from(args), now)?;
    write!(writer, "Added task {}: {}", outcome.id, outcome.text)?;
    if let Some(due) = outcome.due_date {
        write!(writer, " (due {})", format_local(due))?;
    }
    writeln!(writer)?;
    Ok(())
}

fn handle_list<W: Write>(
    config: &AppConfig,
    notifier: NotifierKind,
    args: &ListArgs,
    now: DateTime<Utc>,
    mut writer: W,
) -> Result<()> {
    let manager = open_started(config, notifier, now)?;
    let tasks = manager.list(args.filter);
    let stats = manager.stats();

    if args.json {
        let payload = json!({
            "filter": args.filter.as_str(),
            "tasks": tasks,
            "stats": stats,
        });
        serde_json::to_writer_pretty(&mut writer, &payload)?;
        writeln!(writer)?;
        return Ok(());
    }

    if tasks.is_empty() {
        writeln!(writer, "{}", EmptyLine(args.filter))?;
    }
    for task in tasks {
        writeln!(writer, "{}", TaskLine { task, now })?;
    }
    writeln!(writer, "{}", stats)?;
    Ok(())
}

fn handle_toggle<W: Write>(
    config: &AppConfig,
    notifier: NotifierKind,
    args: &IdsArgs,
    now: DateTime<Utc>,
    mut writer: W,
) -> Result<()> {
    let mut manager = open_started(config, notifier, now)?;
    let results = manager.toggle_many(&args.ids, now)?;
    ToggleSummary::from_results(&results).write_to(&mut writer)
}

fn handle_delete<W: Write>(
    config: &AppConfig,
    notifier: NotifierKind,
    args: &IdsArgs,
    now: DateTime<Utc>,
    mut writer: W,
) -> Result<()> {
    let mut manager = open_started(config, notifier, now)?;
    let results = manager.delete_many(&args.ids, now)?;
    DeleteSummary::from_results(&results).write_to(&mut writer)
}

fn handle_clear<W: Write>(
    config: &AppConfig,
    notifier: NotifierKind,
    now: DateTime<Utc>,
    mut writer: W,
) -> Result<()> {
    let mut manager = open_started(config, notifier, now)?;
    let removed = manager.clear_completed(now)?;
    writeln!(writer, "Cleared {} completed task{}", removed, plural(removed))?;
    Ok(())
}

fn handle_sweep<W: Write>(
    config: &AppConfig,
    notifier: NotifierKind,
    args: &SweepArgs,
    now: DateTime<Utc>,
    mut writer: W,
) -> Result<()> {
    if args.dry_run {
        return handle_dry_run(config, now, writer);
    }
    let mut manager = open_detached(config, notifier.backend())?;
    let report = manager.startup(now);
    writeln!(
        writer,
        "Sweep delivered {} overdue notice{} and {} reminder{}",
        report.overdue,
        plural(report.overdue),
        report.tiers_fired,
        plural(report.tiers_fired)
    )?;
    Ok(())
}

/// Replay the sweep against an in-memory copy so stored flags stay untouched.
fn handle_dry_run<W: Write>(config: &AppConfig, now: DateTime<Utc>, mut writer: W) -> Result<()> {
    let persisted = SqliteStorage::initialize(config)?;
    let scratch = MemoryStorage::new();
    if let Some(tasks) = persisted.get(TASKS_KEY)? {
        scratch.set(TASKS_KEY, &tasks)?;
    }
    scratch.set(NOTIFICATIONS_KEY, "true")?;

    let backend = RecordingBackend::new();
    let permission = PermissionState::default();
    let mut manager = TaskManager::new(
        TaskStore::load(Box::new(scratch)),
        DetachedTimer::default(),
        DirectSink::new(backend.clone(), permission.clone()),
        permission,
        CatchUpSweeper::new(config.sweep_interval()),
    );
    manager.startup(now);

    let delivered = backend.delivered();
    if delivered.is_empty() {
        writeln!(writer, "Nothing due")?;
    }
    for notification in delivered {
        writeln!(writer, "Would notify: [{}] {}", notification.title, notification.body)?;
    }
    Ok(())
}

fn handle_permission<W: Write>(
    config: &AppConfig,
    notifier: NotifierKind,
    args: &PermissionArgs,
    mut writer: W,
) -> Result<()> {
    let mut manager = open_detached(config, notifier.backend())?;
    let permission = match args.action {
        PermissionAction::Grant => manager.set_permission(true)?,
        PermissionAction::Deny => manager.set_permission(false)?,
        PermissionAction::Status => manager.permission(),
    };
    writeln!(writer, "Notifications: {}", permission.as_str())?;
    Ok(())
}

fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

struct TaskLine<'a> {
    task: &'a TaskRecord,
    now: DateTime<Utc>,
}

impl fmt::Display for TaskLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.task.completed { "x" } else { " " };
        write!(f, "[{}] {}  {}", mark, self.task.id, self.task.text)?;
        if let Some(due) = self.task.due_date {
            write!(f, "  (due {})", format_local(due))?;
        }
        if self.task.is_overdue(self.now) {
            write!(f, "  OVERDUE")?;
        }
        Ok(())
    }
}

struct EmptyLine(TaskFilter);

impl fmt::Display for EmptyLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            TaskFilter::All => write!(f, "No tasks yet"),
            TaskFilter::Pending => write!(f, "No pending tasks"),
            TaskFilter::Completed => write!(f, "No completed tasks"),
        }
    }
}

struct ToggleSummary {
    completed: usize,
    reopened: usize,
    missing: Vec<String>,
}

impl ToggleSummary {
    fn from_results(results: &[ToggleResult]) -> Self {
        let mut summary = Self {
            completed: 0,
            reopened: 0,
            missing: Vec::new(),
        };
        for result in results {
            match (result.found, result.completed) {
                (false, _) => summary.missing.push(result.id.to_string()),
                (true, true) => summary.completed += 1,
                (true, false) => summary.reopened += 1,
            }
        }
        summary
    }

    fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        if self.completed > 0 {
            writeln!(writer, "Completed {} task{}", self.completed, plural(self.completed))?;
        }
        if self.reopened > 0 {
            writeln!(writer, "Reopened {} task{}", self.reopened, plural(self.reopened))?;
        }
        if self.completed == 0 && self.reopened == 0 {
            writeln!(writer, "No tasks changed")?;
        }
        if !self.missing.is_empty() {
            writeln!(writer, "Not found: {}", self.missing.join(", "))?;
        }
        Ok(())
    }
}

struct DeleteSummary {
    deleted: usize,
    missing: Vec<String>,
}

impl DeleteSummary {
    fn from_results(results: &[DeleteResult]) -> Self {
        let mut deleted = 0usize;
        let mut missing = Vec::new();
        for result in results {
            if result.deleted {
                deleted += 1;
            } else {
                missing.push(result.id.to_string());
            }
        }
        Self { deleted, missing }
    }

    fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "{}", SummaryLine::deleted(self.deleted))?;
        if !self.missing.is_empty() {
            writeln!(writer, "Not found: {}", self.missing.join(", "))?;
        }
        Ok(())
    }
}

enum SummaryLine {
    Deleted(usize),
    NoneDeleted,
}

impl SummaryLine {
    fn deleted(count: usize) -> Self {
        if count > 0 {
            SummaryLine::Deleted(count)
        } else {
            SummaryLine::NoneDeleted
        }
    }
}

impl fmt::Display for SummaryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryLine::Deleted(count) => write!(f, "Deleted {} task{}", count, plural(*count)),
            SummaryLine::NoneDeleted => write!(f, "No tasks deleted"),
        }
    }
}
