use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use spheroid_core::{
    DVec3, Event, GeometryEngine, LatticeDims, ModelKind, SimulationConfig, TreatmentPlan,
};
use spheroid_lattice::{OxygenField, RelaxationEngine};
use spheroid_scheduler::Simulation;
use spheroid_world::query;

#[test]
fn oxygen_replay_is_identical_across_runs() {
    let first = replay(oxygen_config(5), 300);
    let second = replay(oxygen_config(5), 300);

    assert_eq!(first, second, "replay diverged between runs");
    assert!(first.series.iter().any(|(name, values)| name == "normoxic" && !values.is_empty()));
}

#[test]
fn stemness_replay_is_identical_across_runs() {
    let first = replay(stemness_config(9), 400);
    let second = replay(stemness_config(9), 400);

    assert_eq!(first, second, "replay diverged between runs");
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert!(first.mutations > 0, "mutations should occur over the run");
}

#[test]
fn different_seeds_diverge() {
    let first = replay(stemness_config(1), 400);
    let second = replay(stemness_config(2), 400);
    assert_ne!(first.fingerprint(), second.fingerprint());
}

fn oxygen_config(seed: u64) -> SimulationConfig {
    SimulationConfig::new(ModelKind::Oxygen)
        .with_parameter("O2_Thresh_Hypoxic", 0.08)
        .with_parameter("O2_Thresh_Necrotic", 0.03)
        .with_parameter("Division_Volume", 55.0)
        .with_parameter("Growth_Normoxic", 0.5)
        .with_parameter("Necrotic_Lifetime", 40.0)
        .with_parameter("Telemetry_Interval", 10.0)
        .with_seed(seed)
}

fn stemness_config(seed: u64) -> SimulationConfig {
    SimulationConfig::new(ModelKind::Stemness)
        .with_parameter("P_Init", 0.9)
        .with_parameter("Rho_Init", 6.0)
        .with_parameter("Division_Volume", 50.0)
        .with_parameter("Growth_Stem", 0.5)
        .with_parameter("Growth_Somatic", 0.5)
        .with_parameter("Prob_P_Mutation", 0.5)
        .with_parameter("Prob_Rho_Mutation", 0.5)
        .with_parameter("Telemetry_Interval", 10.0)
        .with_treatment(TreatmentPlan::Constant {
            targets: spheroid_core::TargetSelection::all_living(),
        })
        .with_parameter("Kill_Efficacy", 1.0)
        .with_parameter("Kill_Reduction", 500.0)
        .with_seed(seed)
}

fn replay(config: SimulationConfig, ticks: u64) -> ReplayOutcome {
    let mut simulation = Simulation::from_config(&config).expect("valid configuration");
    let dimensions = LatticeDims::new(80, 80, 1);
    let mut engine = RelaxationEngine::new(dimensions);
    let mut field = OxygenField::new(dimensions, 0.4, 0.002);
    if config.model.uses_field() {
        let _ = simulation.bind_field(&field).expect("oxygen field");
    }
    let seed = engine.spawn_seed(DVec3::new(40.0, 40.0, 0.0), 40.0);
    let _ = simulation.seed_agent(&mut engine, seed, config.model.seed_phenotype());

    let mut events = Vec::new();
    for _ in 0..ticks {
        field.refresh(&engine);
        let _ = simulation
            .step(&mut engine, Some(&field))
            .expect("tick succeeds");
        events.extend(simulation.tick_events().iter().map(EventRecord::from));
        engine.relax();
    }

    let series = simulation.telemetry().series();
    ReplayOutcome {
        series: series
            .names()
            .map(|name| {
                let values = series.series(name).unwrap_or_default();
                (name.to_owned(), values.iter().map(|value| value.to_bits()).collect())
            })
            .collect(),
        agents: query::agents(simulation.world())
            .iter()
            .map(|record| {
                let geometry = engine.geometry(record.id()).expect("engine agent");
                AgentState {
                    id: record.id().get(),
                    phenotype: record.phenotype().label(),
                    target_volume: record.target().volume.to_bits(),
                    stemness: record.traits().stemness.to_bits(),
                    senescence: record.traits().senescence.to_bits(),
                    position: geometry.position.to_array().map(f64::to_bits),
                }
            })
            .collect(),
        mutations: simulation.context().counters().mutations_total,
        events,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ReplayOutcome {
    series: Vec<(String, Vec<u64>)>,
    agents: Vec<AgentState>,
    mutations: u64,
    events: Vec<EventRecord>,
}

impl ReplayOutcome {
    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct AgentState {
    id: u32,
    phenotype: &'static str,
    target_volume: u64,
    stemness: u64,
    senescence: u64,
    position: [u64; 3],
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum EventRecord {
    Divided { parent: u32, child: u32 },
    Necrotic { agent: u32 },
    Removed { agent: u32 },
    Transferred { sequence: u64, delta: u64 },
    Other,
}

impl From<&Event> for EventRecord {
    fn from(event: &Event) -> Self {
        match event {
            Event::AgentDivided { parent, child } => Self::Divided {
                parent: parent.get(),
                child: child.get(),
            },
            Event::AgentNecrotic { agent, .. } => Self::Necrotic { agent: agent.get() },
            Event::AgentRemoved { agent } => Self::Removed { agent: agent.get() },
            Event::TraitTransferred {
                sequence, delta, ..
            } => Self::Transferred {
                sequence: *sequence,
                delta: delta.to_bits(),
            },
            _ => Self::Other,
        }
    }
}
