//! Core [`ConfigLoader`] struct: file-backed configuration with optional hot-reload.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{info, warn};

use logpush_core::{Config, ConfigError};

use crate::error::Result;
use crate::registry::RuleRegistry;

use super::watcher::handle_fs_event;

/// File-backed configuration loader with optional hot-reload.
pub struct ConfigLoader {
    /// Path of the configuration file.
    path: PathBuf,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _watcher: None,
        }
    }

    /// Read and parse the configuration file, then apply env overrides.
    pub fn load(&self) -> Result<Config> {
        Ok(read_config(&self.path)?)
    }

    /// Load the configuration and build its rule registry, failing on the
    /// first validation error.
    pub fn load_validated(&self) -> Result<(Config, RuleRegistry)> {
        let config = self.load()?;
        let registry = RuleRegistry::build(&config)?;
        Ok((config, registry))
    }

    /// Start watching the configuration file.
    ///
    /// The parent directory is watched so that editors replacing the file
    /// through a rename are picked up. Each change that parses is sent on the
    /// returned channel; parse errors are logged and the change is skipped.
    pub fn watch(&mut self) -> Result<mpsc::UnboundedReceiver<Config>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let path = self.path.clone();
        let last_contents = Mutex::new(fs::read_to_string(&self.path).ok());

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => handle_fs_event(&event, &path, &last_contents, &tx),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            },
        )?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let _ = watcher.configure(notify::Config::default().with_poll_interval(Duration::from_millis(500)));

        info!(path = %self.path.display(), "watching configuration file for changes");
        self._watcher = Some(watcher);
        Ok(rx)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read, parse and env-override a configuration file.
pub(super) fn read_config(path: &Path) -> std::result::Result<Config, ConfigError> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

pub(super) fn parse_config(contents: &str) -> std::result::Result<Config, ConfigError> {
    let mut config = Config::from_yaml_str(contents)?;
    config.apply_env_overrides();
    Ok(config)
}
