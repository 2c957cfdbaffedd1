mod session;
mod timer;
mod worker;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tasklet_core::notify::{DirectSink, DisplayBackend, Notification, NotificationSink, NotifierKind};
use tasklet_core::{AppConfig, CatchUpSweeper, PermissionState, SqliteStorage, TaskManager, TaskStore};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

pub use session::{LineCommand, Session};
pub use timer::TokioTimer;
pub use worker::{WorkerHandle, WorkerMessage, WorkerSink};

/// Runtime configuration for a live session.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub data_dir: Option<PathBuf>,
    pub log_filter: Option<String>,
    pub sweep_interval: u64,
    pub notifier: NotifierKind,
    /// Show notifications on the session loop instead of the background worker.
    pub direct: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_filter: None,
            sweep_interval: tasklet_core::config::DEFAULT_SWEEP_INTERVAL.as_secs(),
            notifier: NotifierKind::default(),
            direct: false,
        }
    }
}

enum LiveSink {
    Direct(DirectSink<Box<dyn DisplayBackend>>),
    Worker(WorkerSink),
}

impl NotificationSink for LiveSink {
    fn deliver(&self, notification: &Notification) {
        match self {
            LiveSink::Direct(sink) => sink.deliver(notification),
            LiveSink::Worker(sink) => sink.deliver(notification),
        }
    }
}

/// Run a live session on stdin/stdout until `quit` or Ctrl-C.
pub async fn run_live(config: LiveConfig) -> Result<()> {
    init_tracing(config.log_filter.clone())?;

    let app_config = AppConfig::discover(config.data_dir.clone())
        .context("failed to resolve data directory")?
        .with_sweep_interval(config.sweep_interval)?;
    let storage =
        SqliteStorage::initialize(&app_config).context("failed to open task storage")?;

    let permission = PermissionState::default();
    let backend = config.notifier.backend();
    let (sink, worker) = if config.direct {
        (LiveSink::Direct(DirectSink::new(backend, permission.clone())), None)
    } else {
        let (sink, handle) = WorkerSink::spawn(backend, permission.clone());
        (LiveSink::Worker(sink), Some(handle))
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let manager = TaskManager::new(
        TaskStore::load(Box::new(storage)),
        TokioTimer::new(events_tx),
        sink,
        permission,
        CatchUpSweeper::new(app_config.sweep_interval()),
    );

    eprintln!(
        "Starting tasklet live v{} (data dir: {}, sweep every {}s). Commands: add, toggle, delete, clear, list, sweep, grant, deny, quit",
        env!("CARGO_PKG_VERSION"),
        app_config.data_dir().display(),
        app_config.sweep_interval().as_secs()
    );

    let input = BufReader::new(tokio::io::stdin());
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let manager = Session::new(manager, events_rx, std::io::stdout())
        .run(input, shutdown)
        .await?;
    drop(manager);

    if let Some(worker) = worker {
        worker.shutdown().await;
    }
    Ok(())
}

/// Run a live session by creating an internal Tokio runtime. A stdin read still parked on
/// the blocking pool is abandoned rather than awaited.
pub fn run_live_blocking(config: LiveConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = runtime.block_on(run_live(config));
    runtime.shutdown_background();
    result
}

/// Install the global subscriber. Later calls are no-ops. Output goes to stderr so it
/// never mixes with command output on stdout.
pub fn init_tracing(filter: Option<String>) -> Result<()> {
    let filter = filter.unwrap_or_else(|| "info".to_string());
    let directive: Directive = filter.parse()?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
    Ok(())
}
