use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub type TaskId = i64;

/// Reminder lead times, ordered from the earliest trigger to the latest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReminderTier {
    HourBefore,
    QuarterBefore,
    AtDue,
}

impl ReminderTier {
    pub const ALL: [ReminderTier; 3] = [
        ReminderTier::HourBefore,
        ReminderTier::QuarterBefore,
        ReminderTier::AtDue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderTier::HourBefore => "hour-before",
            ReminderTier::QuarterBefore => "quarter-before",
            ReminderTier::AtDue => "at-due",
        }
    }

    /// How long before the due date this tier triggers.
    pub fn offset(&self) -> Duration {
        match self {
            ReminderTier::HourBefore => Duration::minutes(60),
            ReminderTier::QuarterBefore => Duration::minutes(15),
            ReminderTier::AtDue => Duration::zero(),
        }
    }

    pub fn trigger_at(&self, due: DateTime<Utc>) -> DateTime<Utc> {
        due - self.offset()
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReminderTier::HourBefore => "Task due in 1 hour",
            ReminderTier::QuarterBefore => "Task due in 15 minutes",
            ReminderTier::AtDue => "Task due now",
        }
    }

    pub fn body(&self, text: &str) -> String {
        match self {
            ReminderTier::HourBefore => format!("\"{}\" is due in 1 hour", text),
            ReminderTier::QuarterBefore => format!("\"{}\" is due in 15 minutes", text),
            ReminderTier::AtDue => format!("\"{}\" is scheduled for now", text),
        }
    }

    /// Tiers that trigger later than `self`.
    pub fn later(self) -> impl Iterator<Item = ReminderTier> {
        Self::ALL.into_iter().filter(move |tier| *tier > self)
    }
}

impl fmt::Display for ReminderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-tier at-most-once guards. Flags only ever move from false to true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReminderFlags {
    hour_before: bool,
    quarter_before: bool,
    at_due: bool,
}

impl ReminderFlags {
    pub fn is_fired(&self, tier: ReminderTier) -> bool {
        match tier {
            ReminderTier::HourBefore => self.hour_before,
            ReminderTier::QuarterBefore => self.quarter_before,
            ReminderTier::AtDue => self.at_due,
        }
    }

    pub fn mark_fired(&mut self, tier: ReminderTier) {
        match tier {
            ReminderTier::HourBefore => self.hour_before = true,
            ReminderTier::QuarterBefore => self.quarter_before = true,
            ReminderTier::AtDue => self.at_due = true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: TaskId,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "due_date_format")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notified: bool,
    #[serde(default)]
    pub reminders: ReminderFlags,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        text: String,
        due_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            text,
            completed: false,
            created_at: now,
            due_date,
            notified: false,
            reminders: ReminderFlags::default(),
        }
    }

    /// True while the task may still produce reminders.
    pub fn awaiting_reminders(&self) -> bool {
        self.due_date.is_some() && !self.completed && !self.notified
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.due_date {
            Some(due) if !self.completed => due <= now,
            _ => false,
        }
    }

    /// Whether `tier` may still fire: the task is live, the tier has not fired and no
    /// later tier has fired either.
    pub fn tier_pending(&self, tier: ReminderTier) -> bool {
        self.awaiting_reminders()
            && !self.reminders.is_fired(tier)
            && tier.later().all(|later| !self.reminders.is_fired(later))
    }

    pub fn mark_tier_fired(&mut self, tier: ReminderTier) {
        self.reminders.mark_fired(tier);
        if tier == ReminderTier::AtDue {
            self.notified = true;
        }
    }
}

/// Accepts RFC 3339 as well as the `YYYY-MM-DDTHH:MM` local form older data used.
mod due_date_format {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Some(parsed.with_timezone(&Utc)));
        }
        let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M")
            .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
            .map_err(|_| de::Error::custom(format!("invalid due date '{}'", trimmed)))?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .ok_or_else(|| de::Error::custom(format!("unresolvable local time '{}'", trimmed)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "lowercase")]
pub enum TaskFilter {
    #[default]
    All,
    Pending,
    Completed,
}

impl TaskFilter {
    pub fn matches(&self, task: &TaskRecord) -> bool {
        match self {
            TaskFilter::All => true,
            TaskFilter::Pending => !task.completed,
            TaskFilter::Completed => task.completed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskFilter::All => "all",
            TaskFilter::Pending => "pending",
            TaskFilter::Completed => "completed",
        }
    }
}

impl FromStr for TaskFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(TaskFilter::All),
            "pending" => Ok(TaskFilter::Pending),
            "completed" | "done" => Ok(TaskFilter::Completed),
            other => Err(anyhow!(
                "Unknown filter '{}': expected all|pending|completed",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
}

impl TaskStats {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a TaskRecord>) -> Self {
        let mut stats = TaskStats::default();
        for task in tasks {
            stats.total += 1;
            if task.completed {
                stats.completed += 1;
            }
        }
        stats.pending = stats.total - stats.completed;
        stats
    }
}

impl fmt::Display for TaskStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Pending: {} | Completed: {}",
            self.total, self.pending, self.completed
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AddOutcome {
    pub id: TaskId,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub armed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToggleResult {
    pub id: TaskId,
    pub found: bool,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub id: TaskId,
    pub deleted: bool,
}
