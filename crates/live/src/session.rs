use std::future::Future;
use std::io::Write;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{Local, Utc};
use tasklet_core::capture::TaskInput;
use tasklet_core::model::{TaskFilter, TaskId};
use tasklet_core::notify::NotificationSink;
use tasklet_core::timer::{ReminderEvent, Timer};
use tasklet_core::TaskManager;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{self, Instant, MissedTickBehavior};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineCommand {
    Add(TaskInput),
    Toggle(Vec<TaskId>),
    Delete(Vec<TaskId>),
    Clear,
    List(TaskFilter),
    Sweep,
    Grant,
    Deny,
    Quit,
}

impl FromStr for LineCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        match verb.to_ascii_lowercase().as_str() {
            "add" => Ok(LineCommand::Add(TaskInput::from_line(rest))),
            "toggle" | "done" => parse_ids(rest).map(LineCommand::Toggle),
            "delete" | "rm" => parse_ids(rest).map(LineCommand::Delete),
            "clear" => Ok(LineCommand::Clear),
            "list" | "ls" => {
                if rest.is_empty() {
                    Ok(LineCommand::List(TaskFilter::All))
                } else {
                    rest.parse().map(LineCommand::List)
                }
            }
            "sweep" => Ok(LineCommand::Sweep),
            "grant" => Ok(LineCommand::Grant),
            "deny" => Ok(LineCommand::Deny),
            "quit" | "exit" => Ok(LineCommand::Quit),
            "" => Err(anyhow!("empty command")),
            other => Err(anyhow!("unknown command '{}'", other)),
        }
    }
}

fn parse_ids(raw: &str) -> Result<Vec<TaskId>> {
    let ids = raw
        .split_whitespace()
        .map(|token| {
            token
                .parse::<TaskId>()
                .map_err(|_| anyhow!("'{}' is not a task id", token))
        })
        .collect::<Result<Vec<_>>>()?;
    if ids.is_empty() {
        return Err(anyhow!("expected at least one task id"));
    }
    Ok(ids)
}

/// The live event loop. Owns the manager outright; timer callbacks, periodic sweeps and
/// user commands are all serialized through [`Session::run`].
pub struct Session<T, S, W> {
    manager: TaskManager<T, S>,
    events: UnboundedReceiver<ReminderEvent>,
    output: W,
}

impl<T, S, W> Session<T, S, W>
where
    T: Timer,
    S: NotificationSink,
    W: Write,
{
    pub fn new(
        manager: TaskManager<T, S>,
        events: UnboundedReceiver<ReminderEvent>,
        output: W,
    ) -> Self {
        Self {
            manager,
            events,
            output,
        }
    }

    /// Run until `quit` is read or `shutdown` resolves. Reaching the end of `input` only
    /// stops reading commands; timers and sweeps keep going.
    pub async fn run<R, F>(mut self, input: R, shutdown: F) -> Result<TaskManager<T, S>>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let report = self.manager.startup(Utc::now());
        tracing::info!(
            overdue = report.overdue,
            tiers_fired = report.tiers_fired,
            armed = report.armed,
            "live session started"
        );

        let period = self.manager.sweep_interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut lines = input.lines();
        let mut reading = true;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                Some(event) = self.events.recv() => {
                    self.manager.handle_timer(event, Utc::now());
                }
                _ = ticker.tick() => {
                    self.manager.sweep(Utc::now());
                }
                line = lines.next_line(), if reading => {
                    match line? {
                        Some(line) => {
                            if !self.dispatch(&line)? {
                                break;
                            }
                        }
                        None => {
                            tracing::debug!("input closed; session keeps running");
                            reading = false;
                        }
                    }
                }
            }
        }

        self.manager.shutdown();
        Ok(self.manager)
    }

    /// Apply one line. Returns `false` once the session should stop.
    fn dispatch(&mut self, line: &str) -> Result<bool> {
        if line.trim().is_empty() {
            return Ok(true);
        }
        let command = match line.parse::<LineCommand>() {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring input line");
                return Ok(true);
            }
        };

        let now = Utc::now();
        match command {
            LineCommand::Quit => return Ok(false),
            LineCommand::Add(input) => match self.manager.add(&input, now) {
                Ok(outcome) => {
                    write!(self.output, "Added task {}: {}", outcome.id, outcome.text)?;
                    if let Some(due) = outcome.due_date {
                        write!(
                            self.output,
                            " (due {})",
                            due.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                        )?;
                    }
                    writeln!(self.output)?;
                }
                Err(err) => writeln!(self.output, "Error: {}", err)?,
            },
            LineCommand::Toggle(ids) => {
                for result in self.manager.toggle_many(&ids, now)? {
                    match (result.found, result.completed) {
                        (false, _) => writeln!(self.output, "Not found: {}", result.id)?,
                        (true, true) => writeln!(self.output, "Completed {}", result.id)?,
                        (true, false) => writeln!(self.output, "Reopened {}", result.id)?,
                    }
                }
            }
            LineCommand::Delete(ids) => {
                for result in self.manager.delete_many(&ids, now)? {
                    if result.deleted {
                        writeln!(self.output, "Deleted {}", result.id)?;
                    } else {
                        writeln!(self.output, "Not found: {}", result.id)?;
                    }
                }
            }
            LineCommand::Clear => {
                let removed = self.manager.clear_completed(now)?;
                writeln!(self.output, "Cleared {} completed", removed)?;
            }
            LineCommand::List(filter) => {
                for task in self.manager.list(filter) {
                    let mark = if task.completed { "x" } else { " " };
                    let overdue = if task.is_overdue(now) { "  OVERDUE" } else { "" };
                    writeln!(self.output, "[{}] {}  {}{}", mark, task.id, task.text, overdue)?;
                }
                writeln!(self.output, "{}", self.manager.stats())?;
            }
            LineCommand::Sweep => {
                let report = self.manager.sweep(now);
                writeln!(
                    self.output,
                    "Sweep delivered {} overdue, {} reminders",
                    report.overdue, report.tiers_fired
                )?;
            }
            LineCommand::Grant => {
                let permission = self.manager.set_permission(true)?;
                writeln!(self.output, "Notifications: {}", permission.as_str())?;
            }
            LineCommand::Deny => {
                let permission = self.manager.set_permission(false)?;
                writeln!(self.output, "Notifications: {}", permission.as_str())?;
            }
        }
        self.output.flush()?;
        Ok(true)
    }
}
