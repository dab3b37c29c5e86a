//! graphwatch CLI
//!
//! Watches a graph directory and prints change events as JSON lines.

mod signals;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graphwatch_core::Config;
use graphwatch_engine::{resolve_root, ChangeEvent, Strategy, WalkRules, Walker, Watcher};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "graphwatch")]
#[command(about = "graphwatch - polling change detection for synced graph folders")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.graphwatch/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a directory and print events until interrupted
    Watch {
        /// Directory path or file:// URI
        path: String,

        /// Delay between scans in milliseconds
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        /// Delay before confirming a deletion in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Also tick early on native directory events
        #[arg(long)]
        hybrid: bool,

        /// Report files already present as adds
        #[arg(long)]
        initial: bool,
    },

    /// Scan a directory once and print tracked files
    Scan {
        /// Directory path or file:// URI
        path: String,
    },

    /// Print the effective configuration
    Config,
}

/// One line of `scan` output.
#[derive(Serialize)]
struct ScanLine<'a> {
    path: &'a str,
    size: u64,
    mtime: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load(),
    };

    // Logs go to stderr; stdout carries only events
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Watch {
            path,
            poll_interval_ms,
            debounce_ms,
            hybrid,
            initial,
        } => {
            let mut config = config;
            if let Some(ms) = poll_interval_ms {
                config.watch.poll_interval_ms = ms;
            }
            if let Some(ms) = debounce_ms {
                config.watch.delete_debounce_ms = ms;
            }
            if hybrid {
                config.watch.strategy = Strategy::Hybrid;
            }
            if initial {
                config.watch.emit_initial = true;
            }
            cmd_watch(config, &path).await
        }
        Commands::Scan { path } => cmd_scan(config, &path).await,
        Commands::Config => cmd_config(&config),
    }
}

async fn cmd_watch(config: Config, path: &str) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ChangeEvent>();

    // Start printing before watch() so initial adds are not held back
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let line = serde_json::to_string(&event)?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", line)?;
            stdout.flush()?;
        }
        anyhow::Ok(())
    });

    let watcher = Watcher::new(config.watch, Arc::new(tx));
    watcher
        .watch(path)
        .await
        .with_context(|| format!("Failed to watch {}", path))?;

    signals::wait_for_shutdown().await;
    watcher.shutdown().await;

    let metrics = watcher.metrics();
    tracing::info!(
        ticks = metrics.ticks,
        added = metrics.added,
        changed = metrics.changed,
        unlinked = metrics.unlinked,
        suppressed = metrics.unlinks_suppressed,
        "Watch finished"
    );

    // Dropping the watcher closes the sink and ends the printer
    drop(watcher);
    printer.await.context("Event printer panicked")??;

    Ok(())
}

async fn cmd_scan(config: Config, path: &str) -> Result<()> {
    let root = resolve_root(path).with_context(|| format!("Cannot scan {}", path))?;
    let walker = Walker::new(&root, WalkRules::from_options(&config.watch));

    let report = tokio::task::spawn_blocking(move || walker.walk())
        .await
        .context("Scan task failed")??;

    let mut entries: Vec<_> = report.snapshot.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut stdout = std::io::stdout().lock();
    for (key, entry) in &entries {
        let line = ScanLine {
            path: key,
            size: entry.record.size,
            mtime: entry.record.mtime_ms(),
        };
        writeln!(stdout, "{}", serde_json::to_string(&line)?)?;
    }

    eprintln!(
        "{} files under {} ({} skipped)",
        entries.len(),
        root.display(),
        report.errors
    );

    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}
