use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = tasklet::cli::Cli::parse();

    match cli.command.clone() {
        Some(tasklet::cli::CliCommand::Live(args)) => {
            let config = tasklet::live::LiveConfig {
                data_dir: cli.data_dir.clone(),
                log_filter: cli.log_filter.clone(),
                sweep_interval: args.sweep_interval,
                notifier: cli.notifier,
                direct: args.direct,
            };
            tasklet::live::run_live_blocking(config)?;
        }
        command => {
            // One-shot commands stay quiet on stderr unless asked.
            tasklet::live::init_tracing(Some(
                cli.log_filter.clone().unwrap_or_else(|| "warn".to_string()),
            ))?;
            let config = tasklet::config::from_cli(&cli)?;
            let command = command
                .unwrap_or_else(|| tasklet::cli::CliCommand::List(Default::default()));
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            tasklet::commands::execute(&config, cli.notifier, command, &mut handle)?;
        }
    }

    Ok(())
}
