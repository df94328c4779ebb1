//! The monitor loop: watcher in, statuses out.
//!
//! One Tokio task per monitor owns the engine and the condition set. It
//! emits an initial status, then handles records one at a time until a stop
//! is requested or the watcher's stream ends.
//!
//! The output channel is bounded at [`STATUS_CHANNEL_CAPACITY`]. When the
//! consumer falls behind, the loop waits on `send`: statuses are never
//! dropped, and a stalled consumer stalls the monitor.

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::condition::initial_conditions;
use crate::config::{ConfigError, MonitorConfig};
use crate::engine::{build_engine, Engine};
use crate::types::{Condition, Event, Record, Status};
use crate::watcher::{Watcher, WatcherError};

/// Capacity of the status channel returned by [`LogMonitor::start`].
pub const STATUS_CHANNEL_CAPACITY: usize = 1000;

/// Errors returned by [`LogMonitor::start`].
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The watcher could not start. The monitor may be started again.
    #[error("failed to start watcher: {0}")]
    Watcher(#[from] WatcherError),
    /// The monitor is already running or has been stopped.
    #[error("monitor already started")]
    AlreadyStarted,
}

/// Everything the loop task owns while running.
struct MonitorLoop {
    source: String,
    watcher: Box<dyn Watcher>,
    engine: Box<dyn Engine>,
    conditions: Vec<Condition>,
    output: mpsc::Sender<Status>,
}

/// A monitor pairing one watcher with one engine.
pub struct LogMonitor {
    source: String,
    config: MonitorConfig,
    idle: Option<(Box<dyn Watcher>, Box<dyn Engine>)>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl LogMonitor {
    /// Build a monitor from a validated config and a watcher.
    ///
    /// The engine variant follows the watcher's kind.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config is invalid.
    pub fn new(config: MonitorConfig, watcher: Box<dyn Watcher>) -> Result<Self, ConfigError> {
        config.validate()?;
        let engine = build_engine(watcher.kind(), &config)?;
        info!(
            source = %config.source,
            engine = engine.name(),
            rules = config.rules.len(),
            conditions = config.default_conditions.len(),
            "log monitor created"
        );
        Ok(Self {
            source: config.source.clone(),
            config,
            idle: Some((watcher, engine)),
            shutdown: None,
            handle: None,
        })
    }

    /// Source name echoed in every status.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Start the watcher and the loop task.
    ///
    /// Returns the status stream. The first status is the freshly initialized
    /// condition set with no events. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Watcher`] if the watcher fails to start; the
    /// monitor is left untouched and `start` may be retried.
    pub fn start(&mut self) -> Result<mpsc::Receiver<Status>, MonitorError> {
        info!(source = %self.source, "starting log monitor");
        let (mut watcher, engine) = self.idle.take().ok_or(MonitorError::AlreadyStarted)?;

        let records = match watcher.watch() {
            Ok(records) => records,
            Err(e) => {
                warn!(source = %self.source, error = %e, "watcher failed to start");
                self.idle = Some((watcher, engine));
                return Err(e.into());
            }
        };

        let (output_tx, output_rx) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let monitor_loop = MonitorLoop {
            source: self.source.clone(),
            watcher,
            engine,
            conditions: initial_conditions(&self.config.default_conditions, Utc::now()),
            output: output_tx,
        };

        self.shutdown = Some(shutdown_tx);
        self.handle = Some(tokio::spawn(monitor_loop.run(records, shutdown_rx)));
        Ok(output_rx)
    }

    /// Stop the loop and wait for it to finish.
    ///
    /// The record being handled when the stop arrives is completed and its
    /// status sent. The watcher is stopped before this returns, and no
    /// status follows it. A no-op if the monitor never started.
    pub async fn stop(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            debug!(source = %self.source, "stop called on a monitor that is not running");
            return;
        };
        info!(source = %self.source, "stopping log monitor");

        // The loop may already have exited on its own; then there is no receiver.
        let _ = shutdown.send(true);

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(source = %self.source, error = %e, "monitor loop ended abnormally");
            }
        }
    }

    /// Stop the loop while still reading `statuses`.
    ///
    /// Plain [`stop`](Self::stop) waits on a loop that may be blocked sending
    /// into a full status channel. This drains the channel while waiting, so
    /// the loop can reach the stop signal. Returns every status sent before
    /// the loop exited, in order; `statuses` is closed afterwards.
    pub async fn stop_draining(&mut self, statuses: &mut mpsc::Receiver<Status>) -> Vec<Status> {
        let mut drained = Vec::new();
        {
            let stop = self.stop();
            tokio::pin!(stop);
            loop {
                tokio::select! {
                    () = &mut stop => break,
                    status = statuses.recv() => match status {
                        Some(status) => drained.push(status),
                        None => {
                            (&mut stop).await;
                            break;
                        }
                    },
                }
            }
        }
        while let Some(status) = statuses.recv().await {
            drained.push(status);
        }
        drained
    }
}

impl MonitorLoop {
    async fn run(
        mut self,
        mut records: mpsc::Receiver<Record>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!(
            source = %self.source,
            conditions = ?self.conditions,
            "initial conditions generated"
        );
        if !self.emit(Vec::new()).await {
            self.watcher.stop();
            return;
        }

        loop {
            tokio::select! {
                biased;

                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                record = records.recv() => {
                    let Some(record) = record else {
                        info!(source = %self.source, "watcher stream closed");
                        break;
                    };
                    if !self.handle_record(record).await {
                        break;
                    }
                }
            }
        }

        self.watcher.stop();
        info!(source = %self.source, "log monitor stopped");
    }

    /// Handle one record. Returns `false` once the status receiver is gone.
    async fn handle_record(&mut self, record: Record) -> bool {
        let emissions = match self.engine.process(&record, &mut self.conditions) {
            Ok(emissions) => emissions,
            Err(e) => {
                warn!(source = %self.source, error = %e, "skipping record");
                return true;
            }
        };

        for emission in emissions {
            if !self.emit(emission.events).await {
                return false;
            }
        }
        true
    }

    /// Send a status carrying `events` and a copy of the conditions.
    async fn emit(&mut self, events: Vec<Event>) -> bool {
        let status = Status {
            source: self.source.clone(),
            events,
            conditions: self.conditions.clone(),
        };
        debug!(source = %self.source, events = status.events.len(), "new status generated");

        if self.output.send(status).await.is_err() {
            warn!(source = %self.source, "status receiver dropped, monitor exiting");
            return false;
        }
        true
    }
}
