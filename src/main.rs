//! CLI entry point for the mirror tool.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use mirror_core::{Mirror, WalkStats};
use tracing::{debug, error, info, warn};

mod cli;

use cli::Args;

/// Process outcome, mapped onto the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    /// Everything mirrored.
    Success,
    /// Some directories, leaves or archives failed, or the run was interrupted.
    Partial,
    /// The run could not proceed.
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(outcome: ProcessExit) -> Self {
        match outcome {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
            ProcessExit::Partial => ExitCode::from(2),
        }
    }
}

fn determine_exit_outcome(stats: &WalkStats) -> ProcessExit {
    if stats.is_clean() {
        ProcessExit::Success
    } else {
        ProcessExit::Partial
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match run(&args).await {
        Ok(stats) => determine_exit_outcome(&stats).into(),
        Err(err) => {
            error!("mirror failed: {err:#}");
            ProcessExit::Failure.into()
        }
    }
}

async fn run(args: &Args) -> Result<WalkStats> {
    let config = args.to_config().context("invalid arguments")?;
    info!(
        url = %config.base_url,
        path = %config.save_dir.display(),
        "Mirror starting"
    );
    if config.expand && !config.flat {
        warn!("expanding archives while preserving their layout; only do this for trusted sources");
    }
    if config.insecure {
        warn!("TLS certificate verification disabled");
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });

    let stats = Mirror::new(config)
        .with_interrupt_flag(interrupted)
        .run()
        .await
        .context("mirror run failed")?;

    info!(%stats, "Mirror finished");
    Ok(stats)
}
