//! File tailing watcher.
//!
//! Polls a log file for appended lines, translating each one into a record.
//! Each poll runs on the blocking pool.

use std::fs;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::types::Record;
use crate::watcher::{
    Translator, Watcher, WatcherError, WatcherKind, RECORD_CHANNEL_CAPACITY,
};

/// Interval between polls of the watched file.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Lines longer than this are skipped.
pub const MAX_LINE_LEN: usize = 1_048_576;

/// Incremental reader that remembers how far into the file it has read.
#[derive(Debug)]
pub struct Tail {
    path: PathBuf,
    offset: u64,
    /// Inside an oversized line; discard up to the next newline.
    skipping: bool,
}

impl Tail {
    /// Tail `path` starting at byte `offset`.
    pub fn new(path: PathBuf, offset: u64) -> Self {
        Self {
            path,
            offset,
            skipping: false,
        }
    }

    /// Current read position.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn advance(&mut self, bytes: usize) {
        self.offset = self
            .offset
            .saturating_add(u64::try_from(bytes).unwrap_or(u64::MAX));
    }

    /// Read complete lines appended since the last call.
    ///
    /// A trailing line without a newline is left for the next poll. If the
    /// file shrank (truncation or rotation), reading restarts from the top.
    /// Blank and oversized lines are skipped; at most `MAX_LINE_LEN + 1`
    /// bytes of a line are held in memory. Invalid UTF-8 is replaced with
    /// U+FFFD rather than stalling the tail.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or read.
    pub fn poll_lines(&mut self) -> std::io::Result<Vec<String>> {
        let file = fs::File::open(&self.path)?;
        let file_len = file.metadata()?.len();

        if file_len < self.offset {
            debug!(path = %self.path.display(), "file shrank, rereading from start");
            self.offset = 0;
            self.skipping = false;
        }
        if file_len == self.offset {
            return Ok(Vec::new());
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(self.offset))?;

        let limit = u64::try_from(MAX_LINE_LEN)
            .unwrap_or(u64::MAX)
            .saturating_add(1);
        let mut lines = Vec::new();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let bytes_read = (&mut reader).take(limit).read_until(b'\n', &mut buf)?;
            if bytes_read == 0 {
                break;
            }
            let complete = buf.last() == Some(&b'\n');
            if !complete && !self.skipping && buf.len() <= MAX_LINE_LEN {
                break;
            }
            self.advance(bytes_read);

            if self.skipping {
                self.skipping = !complete;
                continue;
            }
            if !complete {
                warn!(path = %self.path.display(), limit = MAX_LINE_LEN, "skipping oversized line");
                self.skipping = true;
                continue;
            }

            let decoded = String::from_utf8_lossy(&buf);
            let trimmed = decoded.trim_end_matches(['\r', '\n']);
            if trimmed.trim().is_empty() {
                continue;
            }
            lines.push(trimmed.to_owned());
        }

        Ok(lines)
    }
}

/// Watcher that tails a file through a [`Translator`].
///
/// Without a lookback window only lines appended after `watch` are read.
/// With one, the file is read from the start and records older than the
/// window are dropped.
pub struct FileWatcher<T: Translator> {
    path: PathBuf,
    translator: Option<T>,
    kind: WatcherKind,
    lookback: Option<Duration>,
    shutdown: Option<watch::Sender<bool>>,
}

impl<T: Translator> FileWatcher<T> {
    /// Create a watcher for `path`.
    pub fn new(path: PathBuf, translator: T, kind: WatcherKind, lookback: Option<Duration>) -> Self {
        Self {
            path,
            translator: Some(translator),
            kind,
            lookback,
            shutdown: None,
        }
    }

    /// Watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: Translator> Watcher for FileWatcher<T> {
    fn watch(&mut self) -> Result<mpsc::Receiver<Record>, WatcherError> {
        let open_err = |source| WatcherError::Open {
            path: self.path.clone(),
            source,
        };
        let file_len = fs::metadata(&self.path).map_err(open_err)?.len();
        fs::File::open(&self.path).map_err(open_err)?;

        let translator = self.translator.take().ok_or(WatcherError::AlreadyWatching)?;
        let start = if self.lookback.is_some() { 0 } else { file_len };
        let tail = Tail::new(self.path.clone(), start);

        let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown = Some(shutdown_tx);

        info!(path = %self.path.display(), offset = start, "file watcher started");
        tokio::spawn(run_tail(tail, translator, tx, shutdown_rx, self.lookback));
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The tail task may already be gone; nothing to signal then.
            let _ = shutdown.send(true);
            info!(path = %self.path.display(), "file watcher stopped");
        }
    }

    fn kind(&self) -> WatcherKind {
        self.kind
    }
}

/// Poll loop feeding translated records into `tx` until shutdown.
async fn run_tail<T: Translator>(
    mut tail: Tail,
    translator: T,
    tx: mpsc::Sender<Record>,
    mut shutdown_rx: watch::Receiver<bool>,
    lookback: Option<Duration>,
) {
    let cutoff = lookback
        .and_then(|window| chrono::Duration::from_std(window).ok())
        .and_then(|window| Utc::now().checked_sub_signed(window));
    let mut interval = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let polled = tokio::task::spawn_blocking(move || {
                    let lines = tail.poll_lines();
                    (tail, lines)
                })
                .await;
                let lines = match polled {
                    Ok((returned, lines)) => {
                        tail = returned;
                        lines
                    }
                    Err(e) => {
                        warn!(error = %e, "tail poll task failed, tail exiting");
                        return;
                    }
                };
                let lines = match lines {
                    Ok(lines) => lines,
                    Err(e) => {
                        warn!(path = %tail.path.display(), error = %e, "failed to read watched file");
                        continue;
                    }
                };
                for line in lines {
                    let record = match translator.translate(&line) {
                        Ok(record) => record,
                        Err(e) => {
                            debug!(error = %e, "skipping untranslatable line");
                            continue;
                        }
                    };
                    if cutoff.is_some_and(|cutoff| record.timestamp() < cutoff) {
                        continue;
                    }
                    if tx.send(record).await.is_err() {
                        debug!("record receiver dropped, tail exiting");
                        return;
                    }
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    debug!(path = %tail.path.display(), "tail stopped");
}
