//! nodewatch CLI entry point.
//!
//! Provides `run` and `validate` subcommands for running a monitor that
//! writes statuses as JSON lines to stdout, or checking a config file.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncWriteExt, Stdout};
use tracing::info;

use nodewatch::config::load_monitor_config;
use nodewatch::logging;
use nodewatch::types::Status;
use nodewatch::watcher::create_watcher;
use nodewatch::LogMonitor;

/// nodewatch — node-health log monitor.
#[derive(Parser)]
#[command(name = "nodewatch", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run a monitor until interrupted, printing statuses to stdout.
    Run {
        /// Path to the monitor JSON config.
        #[arg(long)]
        config: PathBuf,
        /// Write rotated JSON logs here in addition to stderr.
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Load and validate a monitor config, then exit.
    Validate {
        /// Path to the monitor JSON config.
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, log_dir } => handle_run(&config, log_dir.as_deref()).await,
        Command::Validate { config } => handle_validate(&config),
    }
}

/// Run one monitor until Ctrl-C or until its status stream ends.
async fn handle_run(config_path: &Path, log_dir: Option<&Path>) -> anyhow::Result<()> {
    let _logging_guard = match log_dir {
        Some(dir) => Some(logging::init_production(dir)?),
        None => {
            logging::init_cli();
            None
        }
    };

    let config = load_monitor_config(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let watcher = create_watcher(&config.watcher).context("failed to create watcher")?;
    let mut monitor = LogMonitor::new(config, watcher).context("failed to create monitor")?;
    let mut statuses = monitor.start().context("failed to start monitor")?;

    let mut stdout = tokio::io::stdout();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            status = statuses.recv() => {
                let Some(status) = status else {
                    info!("status stream ended");
                    break;
                };
                write_status(&mut stdout, &status).await?;
            }
            _ = &mut ctrl_c => {
                info!("received shutdown signal, stopping monitor");
                break;
            }
        }
    }

    // The loop may be blocked on a full channel; drain while stopping.
    for status in monitor.stop_draining(&mut statuses).await {
        write_status(&mut stdout, &status).await?;
    }

    info!(source = %monitor.source(), "nodewatch shut down cleanly");
    Ok(())
}

/// Write one status as a JSON line.
async fn write_status(stdout: &mut Stdout, status: &Status) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(status).context("failed to serialize status")?;
    line.push(b'\n');
    stdout
        .write_all(&line)
        .await
        .context("failed to write status")?;
    stdout.flush().await.context("failed to flush stdout")?;
    Ok(())
}

/// Validate a config file and print a summary.
fn handle_validate(config_path: &Path) -> anyhow::Result<()> {
    logging::init_cli();

    let config = load_monitor_config(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    create_watcher(&config.watcher).context("invalid watcher configuration")?;

    println!(
        "{}: source={} plugin={} rules={} conditions={} bufferSize={}",
        config_path.display(),
        config.source,
        config.watcher.plugin,
        config.rules.len(),
        config.default_conditions.len(),
        config.buffer_size,
    );
    Ok(())
}
