pub use tasklet_core::config::*;

use crate::cli::{Cli, CliCommand};

/// Resolve the data directory, then apply the live sweep interval when one was given.
pub fn from_cli(cli: &Cli) -> anyhow::Result<AppConfig> {
    let config = AppConfig::discover(cli.data_dir.clone())?;
    match &cli.command {
        Some(CliCommand::Live(args)) => config.with_sweep_interval(args.sweep_interval),
        _ => Ok(config),
    }
}
