//! Watcher boundary: where records come from.
//!
//! A watcher is started once with [`Watcher::watch`], yields records through
//! a bounded channel, and is torn down with [`Watcher::stop`]. Its
//! [`WatcherKind`] decides which engine the monitor runs.

pub mod file;
pub mod translator;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{ConfigError, WatcherConfig};
use crate::types::Record;

pub use file::FileWatcher;
pub use translator::{RegexTranslator, SensuTranslator, TranslateError, Translator};

/// Capacity of the channel between a watcher and its monitor.
pub const RECORD_CHANNEL_CAPACITY: usize = 1000;

/// What kind of records a watcher yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherKind {
    /// Free-form log lines, handled by the rule engine.
    Log,
    /// Named check reports, handled by the check engine.
    Check,
}

/// Errors starting a watcher.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    /// The watched resource could not be opened.
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        /// Watched path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// `watch` was already called on this watcher.
    #[error("watcher is already running")]
    AlreadyWatching,
}

/// Source of records for one monitor.
pub trait Watcher: Send {
    /// Start producing records.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError`] when the underlying resource is unavailable.
    fn watch(&mut self) -> Result<mpsc::Receiver<Record>, WatcherError>;

    /// Stop producing records. Safe to call more than once.
    fn stop(&mut self);

    /// Kind of records produced.
    fn kind(&self) -> WatcherKind;
}

/// Build the watcher named by `config.plugin`.
///
/// # Errors
///
/// Returns [`ConfigError::Plugin`] for unknown plugins, a missing `logPath`,
/// or invalid plugin options.
pub fn create_watcher(config: &WatcherConfig) -> Result<Box<dyn Watcher>, ConfigError> {
    if config.log_path.as_os_str().is_empty() {
        return Err(ConfigError::Plugin {
            plugin: config.plugin.clone(),
            detail: "logPath is required".to_owned(),
        });
    }
    let lookback = config.lookback()?;

    match config.plugin.as_str() {
        "filelog" => Ok(Box::new(FileWatcher::new(
            config.log_path.clone(),
            RegexTranslator::from_plugin_config(&config.plugin_config)?,
            WatcherKind::Log,
            lookback,
        ))),
        "sensu" => Ok(Box::new(FileWatcher::new(
            config.log_path.clone(),
            SensuTranslator::from_plugin_config(&config.plugin_config)?,
            WatcherKind::Check,
            lookback,
        ))),
        other => Err(ConfigError::Plugin {
            plugin: other.to_owned(),
            detail: "unknown plugin, expected \"filelog\" or \"sensu\"".to_owned(),
        }),
    }
}

/// In-memory watcher fed through an [`mpsc::Sender`].
///
/// Useful for embedding the monitor behind another record source.
#[derive(Debug)]
pub struct ChannelWatcher {
    kind: WatcherKind,
    receiver: Option<mpsc::Receiver<Record>>,
    stopped: Arc<AtomicBool>,
}

impl ChannelWatcher {
    /// Create a watcher and the sender that feeds it.
    pub fn new(kind: WatcherKind) -> (Self, mpsc::Sender<Record>) {
        let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let watcher = Self {
            kind,
            receiver: Some(rx),
            stopped: Arc::new(AtomicBool::new(false)),
        };
        (watcher, tx)
    }

    /// Flag set once [`Watcher::stop`] has been called.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopped)
    }
}

impl Watcher for ChannelWatcher {
    fn watch(&mut self) -> Result<mpsc::Receiver<Record>, WatcherError> {
        self.receiver.take().ok_or(WatcherError::AlreadyWatching)
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn kind(&self) -> WatcherKind {
        self.kind
    }
}
