//! jbook dashboard: interactive review of a tagged J-Book dataset.
//!
//! Filters rows by text and relevance, shows each row's R-2 narrative,
//! applies manual overrides, re-tags the filtered rows, and exports the
//! result. Built with `ratatui` + `crossterm`.

mod app;
mod job;
mod screens;
mod widgets;

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use color_eyre::eyre::Result;
use jbook_core::{ReviewSession, parse_weights};
use jbook_shared::{config_dir, load_config, load_env_file};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Review, filter, re-tag and export a J-Book dataset.
#[derive(Parser)]
#[command(name = "jbook-dashboard", version, long_about = None)]
struct Args {
    /// Enriched or tagged CSV to review.
    #[arg(long)]
    input: PathBuf,

    /// Relevance weights, e.g. "High=1.0,Medium=0.5,Low=0.0"
    /// (defaults to tagging.weights from the config file).
    #[arg(long)]
    weights: Option<String>,

    /// Dotenv file to load (defaults to ./.env when present).
    #[arg(long)]
    env_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing();

    load_env_file(args.env_file.as_deref())?;
    let config = load_config()?;
    let weights = match &args.weights {
        Some(spec) => parse_weights(spec),
        None => config.tagging.weights,
    };
    let session = ReviewSession::load(&args.input, weights)?;
    tracing::info!(input = %args.input.display(), rows = session.len(), "starting dashboard");

    app::run(session, config)
}

/// Log to a file; the terminal belongs to the dashboard.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jbook=info"));

    let (log_file, warnings) = open_log_file();
    match log_file {
        Some((path, file)) => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(env_filter)
                .init();
            tracing::info!(path = %path.display(), "logging initialized");
            for warning in warnings {
                tracing::warn!("{warning}");
            }
        }
        None => tracing_subscriber::registry().with(env_filter).init(),
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut candidates = Vec::new();
    if let Ok(dir) = config_dir() {
        candidates.push(dir.join("logs").join("dashboard.log"));
    }
    candidates.push(PathBuf::from(".jbook").join("logs").join("dashboard.log"));

    let mut warnings = Vec::new();
    for candidate in candidates {
        if let Some(parent) = candidate.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warnings.push(format!("failed to create log dir {}: {e}", parent.display()));
                continue;
            }
        }
        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => warnings.push(format!("failed to open log file {}: {e}", candidate.display())),
        }
    }
    (None, warnings)
}
