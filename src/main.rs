mod app;
mod config;
mod error;
mod geometry;
mod metadata;
mod osm;
mod reader;
mod regulatory;
mod rewriter;
mod sinks;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;

use app::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("CLI: Failed to initialize thread pool")?;
    }

    let start = std::time::Instant::now();
    let report = app::run(&cli)?;

    let elapsed = start.elapsed();
    tracing::info!(
        "Done! Rewrote {} ways ({} split) in {:.2}s",
        report.ways_rewritten + report.ways_split,
        report.ways_split,
        elapsed.as_secs_f64()
    );

    Ok(())
}
