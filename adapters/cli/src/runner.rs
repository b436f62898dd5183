use std::io::Write;

use anyhow::{Context, Result};
use spheroid_core::{Params, TelemetryReport};
use spheroid_lattice::{OxygenField, RelaxationEngine};
use spheroid_scheduler::Simulation;
use spheroid_world::query;
use tracing::info;

use crate::run_config::RunConfig;

/// How published telemetry reports are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Output {
    /// Fixed-width table with a header line.
    Table,
    /// One JSON object per line.
    Json,
}

/// Seeds the reference lattice and runs up to `ticks` ticks, writing every
/// published report to `out`. Stops early once the population is extinct.
pub(crate) fn run(
    config: &RunConfig,
    ticks: u64,
    output: Output,
    out: &mut impl Write,
) -> Result<()> {
    let params = Params::resolve(&config.simulation).context("invalid simulation parameters")?;
    info!(
        model = ?params.model,
        treatment = ?params.treatment.kind(),
        seed = params.seed,
        ticks,
        "configuration loaded"
    );

    let dimensions = config.lattice.dimensions();
    let mut engine = RelaxationEngine::new(dimensions);
    let mut field = OxygenField::new(
        dimensions,
        config.lattice.boundary_oxygen,
        config.lattice.consumption,
    )
    .with_name(&params.field);
    let phenotype = params.model.seed_phenotype();
    let uses_field = params.model.uses_field();

    let mut simulation = Simulation::new(params);
    if uses_field {
        let _ = simulation.bind_field(&field)?;
    }
    for position in config.lattice.seed_positions() {
        let agent = engine.spawn_seed(position, config.lattice.seed_volume);
        let _ = simulation.seed_agent(&mut engine, agent, phenotype);
    }

    if output == Output::Table {
        writeln!(out, "{}", table_header())?;
    }
    for _ in 0..ticks {
        field.refresh(&engine);
        if let Some(report) = simulation.step(&mut engine, Some(&field))? {
            match output {
                Output::Json => {
                    serde_json::to_writer(&mut *out, &report)?;
                    writeln!(out)?;
                }
                Output::Table => writeln!(out, "{}", table_row(&report))?,
            }
        }
        engine.relax();
        if query::population_size(simulation.world()) == 0 {
            info!(tick = query::tick(simulation.world()).get(), "population extinct");
            break;
        }
    }

    let counters = simulation.context().counters();
    info!(
        tick = query::tick(simulation.world()).get(),
        agents = query::population_size(simulation.world()),
        divisions = counters.divisions_total,
        division_failures = counters.division_failures,
        mutations = counters.mutations_total,
        mutations_vetoed = counters.mutations_vetoed,
        mutations_unpaired = counters.mutations_unpaired,
        kills = counters.kills_total,
        removals = counters.removals_total,
        removal_failures = counters.removal_failures,
        rejected_commands = counters.rejected_commands,
        "run finished"
    );
    Ok(())
}

fn table_header() -> String {
    format!(
        "{:>6} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10} {:>9} {:>9} {:>7}",
        "tick", "normoxic", "hypoxic", "stem", "somatic", "necrotic", "volume", "mutations",
        "divisions", "kills"
    )
}

fn table_row(report: &TelemetryReport) -> String {
    let counts = &report.counts;
    format!(
        "{:>6} {:>8} {:>8} {:>8} {:>8} {:>8} {:>10.1} {:>9} {:>9} {:>7}",
        report.tick.get(),
        counts.normoxic,
        counts.hypoxic,
        counts.stem,
        counts.somatic,
        counts.necrotic,
        report.total_volume,
        report.mutations_total,
        report.divisions_total,
        report.kills_total
    )
}
