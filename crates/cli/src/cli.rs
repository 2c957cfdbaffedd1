use std::path::PathBuf;

use clap::{value_parser, Args, Parser, Subcommand, ValueEnum};

use crate::capture::TaskInput;
use crate::model::{TaskFilter, TaskId};
use crate::notify::NotifierKind;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tasklet",
    version,
    about = "A local task list whose reminders fire exactly once.",
    after_help = "Examples:\n  tasklet add Pay rent due:+2h\n  tasklet list --filter pending\n  tasklet permission grant\n  tasklet live --sweep-interval 30\n  tasklet delete 1717236000000"
)]
pub struct Cli {
    /// Override the data directory (defaults to platform-specific app dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override the tracing filter (e.g. "info", "debug", or full directives)
    #[arg(long = "log", value_name = "DIRECTIVE", global = true)]
    pub log_filter: Option<String>,

    /// Where reminders are displayed
    #[arg(long, value_enum, global = true, default_value_t = NotifierKind::Desktop)]
    pub notifier: NotifierKind,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Add a task, optionally with a due date (default command lists tasks)
    Add(AddArgs),
    /// List tasks with pending/completed counts
    List(ListArgs),
    /// Flip one or more tasks between pending and completed
    Toggle(IdsArgs),
    /// Delete one or more tasks by id
    Delete(IdsArgs),
    /// Remove every completed task
    ClearCompleted,
    /// Run a catch-up sweep and report what was delivered
    Sweep(SweepArgs),
    /// Grant, deny, or inspect permission to show notifications
    Permission(PermissionArgs),
    /// Keep running: arm live timers, sweep periodically, read commands from stdin
    Live(LiveArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Task text with an optional inline due:<DATE> token
    #[arg(value_name = "TEXT", required = true)]
    pub text: Vec<String>,

    /// Due date (YYYY-MM-DDTHH:MM, today, tomorrow, +30min, +2h, +3d, mon)
    #[arg(long = "due", value_name = "DATE")]
    pub due: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Which tasks to show
    #[arg(long, value_enum, default_value_t = TaskFilter::All)]
    pub filter: TaskFilter,

    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IdsArgs {
    /// One or more task ids (see `tasklet list`)
    #[arg(value_name = "ID", required = true, value_parser = value_parser!(i64))]
    pub ids: Vec<TaskId>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SweepArgs {
    /// Report what would be delivered without touching stored flags
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PermissionAction {
    Grant,
    Deny,
    Status,
}

#[derive(Args, Debug, Clone)]
pub struct PermissionArgs {
    #[arg(value_enum, default_value_t = PermissionAction::Status)]
    pub action: PermissionAction,
}

#[derive(Args, Debug, Clone)]
pub struct LiveArgs {
    /// Seconds between catch-up sweeps
    #[arg(long = "sweep-interval", value_name = "SECONDS", default_value_t = 60, value_parser = value_parser!(u64))]
    pub sweep_interval: u64,

    /// Show notifications inline instead of through the background worker
    #[arg(long)]
    pub direct: bool,
}

impl From<&AddArgs> for TaskInput {
    fn from(args: &AddArgs) -> Self {
        TaskInput {
            text: args.text.clone(),
            due: args.due.clone(),
        }
    }
}

impl From<AddArgs> for TaskInput {
    fn from(args: AddArgs) -> Self {
        TaskInput {
            text: args.text,
            due: args.due,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_add_with_inline_and_flag_due() {
        let cli = Cli::try_parse_from(["tasklet", "add", "Pay", "rent", "--due", "+2h"]).unwrap();
        match cli.command {
            Some(CliCommand::Add(args)) => {
                let input = TaskInput::from(args);
                assert_eq!(input.text, vec!["Pay", "rent"]);
                assert_eq!(input.due.as_deref(), Some("+2h"));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.notifier, NotifierKind::Desktop);
    }

    #[test]
    fn rejects_non_numeric_ids() {
        assert!(Cli::try_parse_from(["tasklet", "delete", "abc"]).is_err());
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = Cli::try_parse_from([
            "tasklet",
            "live",
            "--sweep-interval",
            "30",
            "--notifier",
            "console",
            "--log",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.notifier, NotifierKind::Console);
        assert_eq!(cli.log_filter.as_deref(), Some("debug"));
        match cli.command {
            Some(CliCommand::Live(args)) => assert_eq!(args.sweep_interval, 30),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[rstest]
    #[case("all", TaskFilter::All)]
    #[case("pending", TaskFilter::Pending)]
    #[case("completed", TaskFilter::Completed)]
    fn parses_list_filters(#[case] raw: &str, #[case] expected: TaskFilter) {
        let cli = Cli::try_parse_from(["tasklet", "list", "--filter", raw]).unwrap();
        match cli.command {
            Some(CliCommand::List(args)) => assert_eq!(args.filter, expected),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn permission_defaults_to_status() {
        let cli = Cli::try_parse_from(["tasklet", "permission"]).unwrap();
        match cli.command {
            Some(CliCommand::Permission(args)) => {
                assert_eq!(args.action, PermissionAction::Status)
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
