use spheroid_core::{
    AgentSnapshot, Counters, Phenotype, PhenotypeCounts, PopulationView, TelemetryReport, Tick,
};

/// Aggregates the population and counters into one report.
///
/// Trait means are taken over stem agents, the only phenotype that mutates.
#[must_use]
pub fn summarize(tick: Tick, population: &PopulationView, counters: &Counters) -> TelemetryReport {
    let mut counts = PhenotypeCounts::default();
    let mut total_volume = 0.0;
    let mut total_target_volume = 0.0;
    for agent in population.iter() {
        counts.increment(agent.phenotype);
        total_volume += agent.geometry.volume;
        total_target_volume += agent.target.volume;
    }

    let stem: Vec<&AgentSnapshot> = population.with_phenotype(Phenotype::Stem).collect();

    TelemetryReport {
        tick,
        counts,
        total_volume,
        total_target_volume,
        mutations_total: counters.mutations_total,
        mutations_this_tick: counters.mutations_this_tick,
        divisions_total: counters.divisions_total,
        divisions_this_tick: counters.divisions_this_tick,
        kills_total: counters.kills_total,
        kills_this_tick: counters.kills_this_tick,
        mean_stemness: mean(&stem, |agent| agent.traits.stemness),
        mean_senescence: mean(&stem, |agent| agent.traits.senescence),
        observed_survival: counters.radiation.observed_survival(),
    }
}

fn mean(agents: &[&AgentSnapshot], value: impl Fn(&AgentSnapshot) -> f64) -> Option<f64> {
    if agents.is_empty() {
        return None;
    }
    let sum: f64 = agents.iter().map(|agent| value(*agent)).sum();
    Some(sum / agents.len() as f64)
}
