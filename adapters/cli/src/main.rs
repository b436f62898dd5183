#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a spheroid simulation on the reference lattice.

mod run_config;
mod runner;

use std::{io, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::{
    run_config::RunConfig,
    runner::{run, Output},
};

/// Runs a tumour spheroid simulation and prints its telemetry.
#[derive(Debug, Parser)]
#[command(name = "spheroid", version, about)]
struct Args {
    /// TOML run file.
    #[arg(short, long)]
    config: PathBuf,
    /// Number of ticks; overrides the run file.
    #[arg(short, long)]
    ticks: Option<u64>,
    /// Seed of the random draw service; overrides the run file.
    #[arg(short, long)]
    seed: Option<u64>,
    /// Emit one JSON object per telemetry report instead of a table row.
    #[arg(long)]
    json: bool,
}

/// Entry point for the spheroid command-line interface.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut config = RunConfig::load(&args.config)?;
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    let ticks = args.ticks.unwrap_or(config.ticks);
    let output = if args.json {
        Output::Json
    } else {
        Output::Table
    };

    let stdout = io::stdout();
    run(&config, ticks, output, &mut stdout.lock())
}
