use std::path::PathBuf;

use clap::Parser;
use tasklet_core::notify::NotifierKind;
use tasklet_live::{run_live_blocking, LiveConfig};

#[derive(Parser, Debug)]
#[command(
    name = "tasklet-live",
    version,
    about = "Long-running tasklet session: live reminder timers plus commands on stdin"
)]
struct Args {
    /// Override the tasklet data directory (defaults to the same resolution as the CLI)
    #[arg(long = "data-dir", value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Override the tracing filter (e.g. "info", "debug", or full directives)
    #[arg(long = "log", value_name = "DIRECTIVE")]
    log_filter: Option<String>,

    /// Seconds between catch-up sweeps
    #[arg(long = "sweep-interval", value_name = "SECONDS", default_value_t = 60)]
    sweep_interval: u64,

    /// Where reminders are displayed
    #[arg(long, value_enum, default_value_t = NotifierKind::Desktop)]
    notifier: NotifierKind,

    /// Show notifications inline instead of through the background worker
    #[arg(long)]
    direct: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = LiveConfig {
        data_dir: args.data_dir,
        log_filter: args.log_filter,
        sweep_interval: args.sweep_interval,
        notifier: args.notifier,
        direct: args.direct,
    };

    run_live_blocking(config)
}
