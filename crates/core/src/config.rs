use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use directories::{BaseDirs, ProjectDirs};
use once_cell::sync::Lazy;

static DEFAULT_DB_NAME: &str = "tasklet.sqlite3";
static ENV_DATA_DIR: &str = "TASKLET_DATA_DIR";

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const MIN_SWEEP_INTERVAL_SECS: u64 = 30;
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 3600;

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("dev", "tasklet", "tasklet"));

#[derive(Debug, Clone)]
pub struct AppConfig {
    data_dir: PathBuf,
    db_path: PathBuf,
    sweep_interval: Duration,
}

impl AppConfig {
    /// Resolve the data directory (flag, `TASKLET_DATA_DIR`, then platform locations) and
    /// make sure it exists.
    pub fn discover(data_dir_override: Option<PathBuf>) -> Result<Self> {
        let (data_dir, source) = DataDirSource::resolve(data_dir_override)?;
        tracing::debug!(path = %data_dir.display(), source = source.as_str(), "data directory resolved");
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory at {}", data_dir.display()))?;
        Self::from_data_dir(data_dir)
    }

    /// Use `data_dir` as-is. The directory is expected to exist.
    pub fn from_data_dir(data_dir: PathBuf) -> Result<Self> {
        Ok(Self {
            db_path: data_dir.join(DEFAULT_DB_NAME),
            data_dir,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        })
    }

    /// Override how often the catch-up sweep runs in a live session.
    pub fn with_sweep_interval(mut self, seconds: u64) -> Result<Self> {
        if !(MIN_SWEEP_INTERVAL_SECS..=MAX_SWEEP_INTERVAL_SECS).contains(&seconds) {
            return Err(anyhow!(
                "Sweep interval must be between {} and {} seconds, got {}",
                MIN_SWEEP_INTERVAL_SECS,
                MAX_SWEEP_INTERVAL_SECS,
                seconds
            ));
        }
        self.sweep_interval = Duration::from_secs(seconds);
        Ok(self)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

/// Where the data directory came from, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataDirSource {
    Flag,
    Environment,
    DevBuild,
    Platform,
    Home,
    WorkingDir,
}

impl DataDirSource {
    fn as_str(self) -> &'static str {
        match self {
            DataDirSource::Flag => "flag",
            DataDirSource::Environment => "environment",
            DataDirSource::DevBuild => "dev-build",
            DataDirSource::Platform => "platform",
            DataDirSource::Home => "home",
            DataDirSource::WorkingDir => "working-dir",
        }
    }

    fn resolve(data_dir_override: Option<PathBuf>) -> Result<(PathBuf, Self)> {
        if let Some(dir) = data_dir_override {
            return Ok((dir, DataDirSource::Flag));
        }

        let from_env = env::var(ENV_DATA_DIR)
            .ok()
            .filter(|value| !value.trim().is_empty());
        if let Some(dir) = from_env {
            return Ok((PathBuf::from(dir), DataDirSource::Environment));
        }

        if cfg!(debug_assertions) {
            let workspace = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..");
            return Ok((workspace.join("tmp").join("dev-tasklet"), DataDirSource::DevBuild));
        }

        // macOS keeps the dotfile layout rather than Application Support.
        let home = BaseDirs::new().map(|base| base.home_dir().join(".tasklet"));
        if cfg!(target_os = "macos") {
            if let Some(home) = home {
                return Ok((home, DataDirSource::Home));
            }
        } else {
            if let Some(project) = &*PROJECT_DIRS {
                return Ok((project.data_dir().to_path_buf(), DataDirSource::Platform));
            }
            if let Some(home) = home {
                return Ok((home, DataDirSource::Home));
            }
        }

        let cwd = env::current_dir().context("Failed to read the working directory")?;
        Ok((cwd.join(".tasklet"), DataDirSource::WorkingDir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn override_wins_and_directory_is_created() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("data");
        let config = AppConfig::discover(Some(target.clone())).unwrap();
        assert!(target.exists());
        assert_eq!(config.data_dir(), target.as_path());
        assert_eq!(config.db_path(), target.join("tasklet.sqlite3").as_path());
        assert_eq!(config.sweep_interval(), DEFAULT_SWEEP_INTERVAL);
    }

    #[test]
    fn sweep_interval_is_bounded() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::from_data_dir(dir.path().to_path_buf()).unwrap();
        assert!(config.clone().with_sweep_interval(5).is_err());
        assert!(config.clone().with_sweep_interval(7200).is_err());
        let config = config.with_sweep_interval(30).unwrap();
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
    }

    #[test]
    fn flag_outranks_environment() {
        let (dir, source) = DataDirSource::resolve(Some(PathBuf::from("/srv/tasks"))).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/tasks"));
        assert_eq!(source, DataDirSource::Flag);
    }
}
