#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative agent state for the spheroid simulation.
//!
//! The world owns every [`AgentRecord`] and is the only place agent state is
//! written. Systems describe the changes they want as [`Command`] values;
//! [`apply`] executes them, calls into the external geometry engine for
//! division and removal, enforces record invariants and reports the outcome
//! as [`Event`] values.

use spheroid_core::{
    AgentId, Command, ConstraintStrengths, EngineTargets, Event, GeometryEngine,
    HeritableTraits, MutationRecord, Params, Phenotype, RejectionReason, TargetGeometry, Tick,
    TraitKind,
};
use tracing::{debug, warn};

const DEFAULT_QUARANTINE_VOLUME: f64 = 1.0;
const DEFAULT_QUARANTINE_STRENGTH: f64 = 50.0;
const DEFAULT_SENESCENCE_MAX: f64 = 100.0;

/// Policies the world applies when the engine primitives fail.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldSettings {
    /// Target volume assigned to an agent the engine failed to remove.
    pub quarantine_volume: f64,
    /// Constraint strengths asserted on a quarantined agent.
    pub quarantine_constraints: ConstraintStrengths,
    /// Whether trait transfers are appended to lineage histories.
    pub record_history: bool,
    /// Largest senescence budget a transfer may leave on its recipient.
    pub senescence_max: f64,
}

impl WorldSettings {
    /// Derives the settings from resolved parameters.
    #[must_use]
    pub fn from_params(params: &Params) -> Self {
        Self {
            quarantine_volume: params.necrosis.min_volume,
            quarantine_constraints: params.constraints.necrotic,
            record_history: params.lineage.record_history,
            senescence_max: params.lineage.senescence.upper,
        }
    }

    /// Inclusive upper bound of a trait after a transfer.
    #[must_use]
    pub const fn trait_max(&self, kind: TraitKind) -> f64 {
        match kind {
            TraitKind::Stemness => 1.0,
            TraitKind::Senescence => self.senescence_max,
        }
    }
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            quarantine_volume: DEFAULT_QUARANTINE_VOLUME,
            quarantine_constraints: ConstraintStrengths::new(
                DEFAULT_QUARANTINE_STRENGTH,
                DEFAULT_QUARANTINE_STRENGTH,
            ),
            record_history: true,
            senescence_max: DEFAULT_SENESCENCE_MAX,
        }
    }
}

/// Typed per-agent state owned by the core.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentRecord {
    id: AgentId,
    phenotype: Phenotype,
    target: TargetGeometry,
    constraints: ConstraintStrengths,
    traits: HeritableTraits,
    division_threshold: Option<f64>,
    necrosis_onset: Option<Tick>,
    parent: Option<AgentId>,
    born: Tick,
    history: Vec<MutationRecord>,
}

impl AgentRecord {
    /// Identifier allocated by the engine.
    #[must_use]
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Current phenotype.
    #[must_use]
    pub const fn phenotype(&self) -> Phenotype {
        self.phenotype
    }

    /// Target geometry.
    #[must_use]
    pub const fn target(&self) -> TargetGeometry {
        self.target
    }

    /// Constraint strengths.
    #[must_use]
    pub const fn constraints(&self) -> ConstraintStrengths {
        self.constraints
    }

    /// Heritable traits.
    #[must_use]
    pub const fn traits(&self) -> HeritableTraits {
        self.traits
    }

    /// Per-agent division threshold, if persisted.
    #[must_use]
    pub const fn division_threshold(&self) -> Option<f64> {
        self.division_threshold
    }

    /// Tick at which the agent became necrotic, or was last re-armed.
    #[must_use]
    pub const fn necrosis_onset(&self) -> Option<Tick> {
        self.necrosis_onset
    }

    /// Parent agent, for agents created by division.
    #[must_use]
    pub const fn parent(&self) -> Option<AgentId> {
        self.parent
    }

    /// Tick at which the agent joined the population.
    #[must_use]
    pub const fn born(&self) -> Tick {
        self.born
    }

    /// Ordered lineage history.
    #[must_use]
    pub fn history(&self) -> &[MutationRecord] {
        &self.history
    }

    fn quarantine(&mut self, settings: &WorldSettings, tick: Tick) {
        let volume = self.target.volume.min(settings.quarantine_volume);
        let surface = if self.target.volume > 0.0 {
            self.target.surface * (volume / self.target.volume).powf(2.0 / 3.0)
        } else {
            0.0
        };
        self.target = TargetGeometry::new(volume, surface);
        self.constraints = settings.quarantine_constraints;
        if self.phenotype.is_necrotic() {
            self.necrosis_onset = Some(tick);
        }
    }
}

/// Represents the authoritative population state.
#[derive(Debug, Default)]
pub struct World {
    agents: Vec<AgentRecord>,
    tick: Tick,
    mutation_sequence: u64,
    settings: WorldSettings,
}

impl World {
    /// Creates an empty world with default failure policies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty world with the provided failure policies.
    #[must_use]
    pub fn with_settings(settings: WorldSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    fn position(&self, agent: AgentId) -> Result<usize, usize> {
        self.agents.binary_search_by_key(&agent, |record| record.id)
    }

    fn agent_mut(&mut self, agent: AgentId) -> Option<&mut AgentRecord> {
        let index = self.position(agent).ok()?;
        self.agents.get_mut(index)
    }

    fn next_sequence(&mut self) -> u64 {
        self.mutation_sequence = self.mutation_sequence.saturating_add(1);
        self.mutation_sequence
    }
}

fn reject(agent: AgentId, reason: RejectionReason, out_events: &mut Vec<Event>) {
    debug!(agent = agent.get(), ?reason, "command rejected");
    out_events.push(Event::CommandRejected { agent, reason });
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(
    world: &mut World,
    engine: &mut dyn GeometryEngine,
    command: Command,
    out_events: &mut Vec<Event>,
) {
    let tick = world.tick;
    match command {
        Command::Tick => {
            world.tick = world.tick.next();
            out_events.push(Event::TimeAdvanced { tick: world.tick });
        }
        Command::RegisterAgent {
            agent,
            phenotype,
            target,
            constraints,
            traits,
            division_threshold,
        } => {
            if !target.is_valid() {
                reject(agent, RejectionReason::InvalidValue, out_events);
                return;
            }
            let Err(index) = world.position(agent) else {
                reject(agent, RejectionReason::InvalidValue, out_events);
                return;
            };
            world.agents.insert(
                index,
                AgentRecord {
                    id: agent,
                    phenotype,
                    target,
                    constraints,
                    traits,
                    division_threshold,
                    necrosis_onset: None,
                    parent: None,
                    born: tick,
                    history: Vec::new(),
                },
            );
            out_events.push(Event::AgentRegistered { agent });
        }
        Command::ChangePhenotype {
            agent,
            phenotype,
            constraints,
        } => {
            if phenotype.is_necrotic() {
                reject(agent, RejectionReason::NecrosisRequiresFreeze, out_events);
                return;
            }
            let Some(record) = world.agent_mut(agent) else {
                reject(agent, RejectionReason::UnknownAgent, out_events);
                return;
            };
            if record.phenotype.is_necrotic() {
                reject(agent, RejectionReason::TerminalPhenotype, out_events);
                return;
            }
            if let Some(constraints) = constraints {
                record.constraints = constraints;
            }
            let from = record.phenotype;
            if from != phenotype {
                record.phenotype = phenotype;
                out_events.push(Event::PhenotypeChanged {
                    agent,
                    from,
                    to: phenotype,
                });
            }
        }
        Command::EnterNecrosis {
            agent,
            cause,
            constraints,
        } => {
            let measured = engine.geometry(agent);
            let Some(record) = world.agent_mut(agent) else {
                reject(agent, RejectionReason::UnknownAgent, out_events);
                return;
            };
            if record.phenotype.is_necrotic() {
                return;
            }
            let frozen = measured.map_or(record.target, |geometry| {
                TargetGeometry::new(geometry.volume, geometry.surface)
            });
            let from = record.phenotype;
            record.phenotype = Phenotype::Necrotic;
            record.target = frozen;
            record.constraints = constraints;
            record.necrosis_onset = Some(tick);
            out_events.push(Event::AgentNecrotic {
                agent,
                from,
                cause,
                frozen_volume: frozen.volume,
            });
        }
        Command::StampNecrosisOnset { agent } => {
            let Some(record) = world.agent_mut(agent) else {
                reject(agent, RejectionReason::UnknownAgent, out_events);
                return;
            };
            if record.phenotype.is_necrotic() && record.necrosis_onset.is_none() {
                record.necrosis_onset = Some(tick);
            }
        }
        Command::RearmNecrosisOnset { agent } => {
            let Some(record) = world.agent_mut(agent) else {
                reject(agent, RejectionReason::UnknownAgent, out_events);
                return;
            };
            if record.phenotype.is_necrotic() {
                record.necrosis_onset = Some(tick);
            }
        }
        Command::SetTargetGeometry { agent, target } => {
            if !target.is_valid() {
                reject(agent, RejectionReason::InvalidValue, out_events);
                return;
            }
            let Some(record) = world.agent_mut(agent) else {
                reject(agent, RejectionReason::UnknownAgent, out_events);
                return;
            };
            record.target = if record.phenotype.is_necrotic() {
                TargetGeometry::new(
                    target.volume.min(record.target.volume),
                    target.surface.min(record.target.surface),
                )
            } else {
                target
            };
        }
        Command::SetConstraints { agent, constraints } => {
            let Some(record) = world.agent_mut(agent) else {
                reject(agent, RejectionReason::UnknownAgent, out_events);
                return;
            };
            record.constraints = constraints;
        }
        Command::SpendGeneration { agent } => {
            let Some(record) = world.agent_mut(agent) else {
                reject(agent, RejectionReason::UnknownAgent, out_events);
                return;
            };
            record.traits.generations_left -= 1.0;
        }
        Command::TransferTrait {
            donor,
            recipient,
            kind,
            delta,
        } => transfer_trait(world, donor, recipient, kind, delta, out_events),
        Command::Divide { agent } => divide(world, engine, agent, out_events),
        Command::Remove { agent } => {
            let Ok(index) = world.position(agent) else {
                reject(agent, RejectionReason::UnknownAgent, out_events);
                return;
            };
            if engine.remove(agent) {
                let _ = world.agents.remove(index);
                out_events.push(Event::AgentRemoved { agent });
            } else {
                warn!(agent = agent.get(), "removal primitive failed, quarantining agent");
                let settings = world.settings;
                if let Some(record) = world.agents.get_mut(index) {
                    record.quarantine(&settings, tick);
                }
                out_events.push(Event::RemovalFailed { agent });
            }
        }
    }
}

fn transfer_trait(
    world: &mut World,
    donor: AgentId,
    recipient: AgentId,
    kind: TraitKind,
    delta: f64,
    out_events: &mut Vec<Event>,
) {
    if donor == recipient || !delta.is_finite() || delta < 0.0 {
        reject(donor, RejectionReason::InvalidValue, out_events);
        return;
    }
    let (Ok(donor_index), Ok(recipient_index)) = (world.position(donor), world.position(recipient))
    else {
        let missing = if world.position(donor).is_err() {
            donor
        } else {
            recipient
        };
        reject(missing, RejectionReason::UnknownAgent, out_events);
        return;
    };

    let (Some(donor_record), Some(recipient_record)) = (
        world.agents.get(donor_index),
        world.agents.get(recipient_index),
    ) else {
        return;
    };
    let donor_after = donor_record.traits.value(kind) - delta;
    let recipient_after = recipient_record.traits.value(kind) + delta;
    if donor_after < 0.0 || recipient_after > world.settings.trait_max(kind) {
        reject(donor, RejectionReason::InvalidValue, out_events);
        return;
    }

    let sequence = world.next_sequence();
    let record_history = world.settings.record_history;
    let tick = world.tick;
    for (index, signed_delta) in [(donor_index, -delta), (recipient_index, delta)] {
        if let Some(record) = world.agents.get_mut(index) {
            let updated = record.traits.value(kind) + signed_delta;
            record.traits.set(kind, updated);
            if record_history {
                record.history.push(MutationRecord {
                    sequence,
                    tick,
                    stemness: record.traits.stemness,
                    senescence: record.traits.senescence,
                });
            }
        }
    }
    out_events.push(Event::TraitTransferred {
        donor,
        recipient,
        kind,
        delta,
        sequence,
    });
}

fn divide(
    world: &mut World,
    engine: &mut dyn GeometryEngine,
    agent: AgentId,
    out_events: &mut Vec<Event>,
) {
    let Ok(index) = world.position(agent) else {
        reject(agent, RejectionReason::UnknownAgent, out_events);
        return;
    };
    let Some(parent) = world.agents.get(index).cloned() else {
        return;
    };
    if parent.phenotype.is_necrotic() {
        reject(agent, RejectionReason::TerminalPhenotype, out_events);
        return;
    }

    let child = match engine.divide(agent) {
        Ok(child) => child,
        Err(failure) => {
            warn!(%failure, "division primitive failed, retrying next tick");
            out_events.push(Event::DivisionFailed { agent });
            return;
        }
    };
    let Err(slot) = world.position(child) else {
        warn!(
            parent = agent.get(),
            child = child.get(),
            "engine reused a live identifier for a child"
        );
        out_events.push(Event::DivisionFailed { agent });
        return;
    };

    world.agents.insert(
        slot,
        AgentRecord {
            id: child,
            parent: Some(agent),
            born: world.tick,
            ..parent
        },
    );
    out_events.push(Event::AgentDivided {
        parent: agent,
        child,
    });
}

/// Publishes every agent's targets, constraints and phenotype to the engine.
pub fn export_targets(world: &World, engine: &mut dyn GeometryEngine) {
    for record in &world.agents {
        engine.assign(
            record.id,
            EngineTargets {
                phenotype: record.phenotype,
                target: record.target,
                constraints: record.constraints,
            },
        );
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use spheroid_core::{
        AgentId, AgentSnapshot, DVec3, Environment, Geometry, GeometryEngine, MutationRecord,
        PopulationView, Tick,
    };

    use super::{AgentRecord, World};

    /// Current tick.
    #[must_use]
    pub fn tick(world: &World) -> Tick {
        world.tick
    }

    /// Every agent record in identifier order.
    #[must_use]
    pub fn agents(world: &World) -> &[AgentRecord] {
        &world.agents
    }

    /// Looks up a single agent record.
    #[must_use]
    pub fn agent(world: &World, agent: AgentId) -> Option<&AgentRecord> {
        let index = world.position(agent).ok()?;
        world.agents.get(index)
    }

    /// Number of agents in the population, necrotic ones included.
    #[must_use]
    pub fn population_size(world: &World) -> usize {
        world.agents.len()
    }

    /// Lineage history of an agent; empty for unknown agents.
    #[must_use]
    pub fn mutation_history(world: &World, agent: AgentId) -> &[MutationRecord] {
        match self::agent(world, agent) {
            Some(record) => record.history(),
            None => &[],
        }
    }

    /// Captures a snapshot of every agent joined with its actual geometry and,
    /// when an environment is bound, the field value at its clamped position.
    ///
    /// Agents unknown to the engine report their target geometry at the origin.
    #[must_use]
    pub fn population(
        world: &World,
        engine: &dyn GeometryEngine,
        environment: Option<&Environment<'_>>,
    ) -> PopulationView {
        let snapshots = world
            .agents
            .iter()
            .map(|record| {
                let geometry = engine.geometry(record.id).unwrap_or(Geometry::new(
                    record.target.volume,
                    record.target.surface,
                    DVec3::ZERO,
                ));
                AgentSnapshot {
                    id: record.id,
                    phenotype: record.phenotype,
                    geometry,
                    target: record.target,
                    constraints: record.constraints,
                    traits: record.traits,
                    division_threshold: record.division_threshold,
                    necrosis_onset: record.necrosis_onset,
                    signal: environment.map(|environment| environment.sample(geometry.position)),
                }
            })
            .collect();
        PopulationView::from_snapshots(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use spheroid_core::{DivisionFailure, Geometry, LatticeDims, NecrosisCause, DVec3};

    use super::*;

    #[derive(Default)]
    struct StubEngine {
        geometries: BTreeMap<AgentId, Geometry>,
        next_id: u32,
        refuse_division: bool,
        refuse_removal: bool,
        assigned: Vec<(AgentId, EngineTargets)>,
    }

    impl StubEngine {
        fn spawn(&mut self, volume: f64) -> AgentId {
            self.next_id += 1;
            let id = AgentId::new(self.next_id);
            let _ = self
                .geometries
                .insert(id, Geometry::new(volume, 4.0 * volume, DVec3::ZERO));
            id
        }
    }

    impl GeometryEngine for StubEngine {
        fn dimensions(&self) -> LatticeDims {
            LatticeDims::new(10, 10, 10)
        }

        fn geometry(&self, agent: AgentId) -> Option<Geometry> {
            self.geometries.get(&agent).copied()
        }

        fn divide(&mut self, agent: AgentId) -> Result<AgentId, DivisionFailure> {
            if self.refuse_division {
                return Err(DivisionFailure {
                    agent,
                    reason: "no room".to_owned(),
                });
            }
            let volume = self.geometries.get(&agent).map_or(0.0, |g| g.volume);
            Ok(self.spawn(volume / 2.0))
        }

        fn remove(&mut self, agent: AgentId) -> bool {
            !self.refuse_removal && self.geometries.remove(&agent).is_some()
        }

        fn assign(&mut self, agent: AgentId, targets: EngineTargets) {
            self.assigned.push((agent, targets));
        }
    }

    fn register(
        world: &mut World,
        engine: &mut StubEngine,
        phenotype: Phenotype,
        volume: f64,
    ) -> AgentId {
        let agent = engine.spawn(volume);
        let mut events = Vec::new();
        apply(
            world,
            engine,
            Command::RegisterAgent {
                agent,
                phenotype,
                target: TargetGeometry::new(volume + 5.0, 40.0),
                constraints: ConstraintStrengths::new(5.0, 1.5),
                traits: HeritableTraits::new(0.5, 5.0),
                division_threshold: None,
            },
            &mut events,
        );
        assert_eq!(events, vec![Event::AgentRegistered { agent }]);
        agent
    }

    fn necrosis(agent: AgentId) -> Command {
        Command::EnterNecrosis {
            agent,
            cause: NecrosisCause::Hypoxia,
            constraints: ConstraintStrengths::new(50.0, 50.0),
        }
    }

    #[test]
    fn necrosis_freezes_targets_to_actual_geometry() {
        let mut world = World::new();
        let mut engine = StubEngine::default();
        let agent = register(&mut world, &mut engine, Phenotype::Normoxic, 30.0);
        let mut events = Vec::new();
        apply(&mut world, &mut engine, Command::Tick, &mut events);
        apply(&mut world, &mut engine, necrosis(agent), &mut events);

        let record = query::agent(&world, agent).expect("agent exists");
        assert_eq!(record.phenotype(), Phenotype::Necrotic);
        assert_eq!(record.target(), TargetGeometry::new(30.0, 120.0));
        assert_eq!(record.necrosis_onset(), Some(Tick::new(1)));

        apply(&mut world, &mut engine, Command::Tick, &mut events);
        apply(&mut world, &mut engine, necrosis(agent), &mut events);
        let record = query::agent(&world, agent).expect("agent exists");
        assert_eq!(record.necrosis_onset(), Some(Tick::new(1)));
    }

    #[test]
    fn necrotic_target_volume_never_increases() {
        let mut world = World::new();
        let mut engine = StubEngine::default();
        let agent = register(&mut world, &mut engine, Phenotype::Somatic, 30.0);
        let mut events = Vec::new();
        apply(&mut world, &mut engine, necrosis(agent), &mut events);
        apply(
            &mut world,
            &mut engine,
            Command::SetTargetGeometry {
                agent,
                target: TargetGeometry::new(80.0, 200.0),
            },
            &mut events,
        );

        let record = query::agent(&world, agent).expect("agent exists");
        assert_eq!(record.target().volume, 30.0);
    }

    #[test]
    fn necrosis_is_terminal() {
        let mut world = World::new();
        let mut engine = StubEngine::default();
        let agent = register(&mut world, &mut engine, Phenotype::Hypoxic, 20.0);
        let mut events = Vec::new();
        apply(&mut world, &mut engine, necrosis(agent), &mut events);
        events.clear();

        apply(
            &mut world,
            &mut engine,
            Command::ChangePhenotype {
                agent,
                phenotype: Phenotype::Normoxic,
                constraints: None,
            },
            &mut events,
        );
        assert_eq!(
            events,
            vec![Event::CommandRejected {
                agent,
                reason: RejectionReason::TerminalPhenotype
            }]
        );
    }

    #[test]
    fn division_clones_record_into_child() {
        let mut world = World::new();
        let mut engine = StubEngine::default();
        let parent = register(&mut world, &mut engine, Phenotype::Stem, 30.0);
        let mut events = Vec::new();
        apply(&mut world, &mut engine, Command::Divide { agent: parent }, &mut events);

        let Some(Event::AgentDivided { child, .. }) = events.last().cloned() else {
            panic!("expected a division event, got {events:?}");
        };
        let parent_record = query::agent(&world, parent).expect("parent exists");
        let child_record = query::agent(&world, child).expect("child exists");
        assert_eq!(child_record.traits(), parent_record.traits());
        assert_eq!(child_record.phenotype(), Phenotype::Stem);
        assert_eq!(child_record.parent(), Some(parent));
        assert_eq!(query::population_size(&world), 2);
    }

    #[test]
    fn division_failure_leaves_population_untouched() {
        let mut world = World::new();
        let mut engine = StubEngine {
            refuse_division: true,
            ..StubEngine::default()
        };
        let agent = register(&mut world, &mut engine, Phenotype::Normoxic, 30.0);
        let mut events = Vec::new();
        apply(&mut world, &mut engine, Command::Divide { agent }, &mut events);

        assert_eq!(events, vec![Event::DivisionFailed { agent }]);
        assert_eq!(query::population_size(&world), 1);
    }

    #[test]
    fn trait_transfer_conserves_sum_and_records_history() {
        let mut world = World::new();
        let mut engine = StubEngine::default();
        let donor = register(&mut world, &mut engine, Phenotype::Stem, 30.0);
        let recipient = register(&mut world, &mut engine, Phenotype::Stem, 30.0);
        let mut events = Vec::new();
        apply(
            &mut world,
            &mut engine,
            Command::TransferTrait {
                donor,
                recipient,
                kind: TraitKind::Senescence,
                delta: 1.5,
            },
            &mut events,
        );

        let donor_traits = query::agent(&world, donor).expect("donor").traits();
        let recipient_traits = query::agent(&world, recipient).expect("recipient").traits();
        assert_eq!(donor_traits.senescence + recipient_traits.senescence, 10.0);
        assert_eq!(donor_traits.generations_left, 3.5);
        assert_eq!(recipient_traits.generations_left, 6.5);
        assert_eq!(query::mutation_history(&world, donor).len(), 1);
        assert_eq!(query::mutation_history(&world, recipient)[0].senescence, 6.5);
    }

    #[test]
    fn out_of_bounds_transfers_are_rejected_whole() {
        let mut world = World::new();
        let mut engine = StubEngine::default();
        let donor = register(&mut world, &mut engine, Phenotype::Stem, 30.0);
        let recipient = register(&mut world, &mut engine, Phenotype::Stem, 30.0);

        for (kind, delta) in [(TraitKind::Stemness, 0.6), (TraitKind::Senescence, 5.5)] {
            let mut events = Vec::new();
            apply(
                &mut world,
                &mut engine,
                Command::TransferTrait {
                    donor,
                    recipient,
                    kind,
                    delta,
                },
                &mut events,
            );
            assert_eq!(
                events,
                vec![Event::CommandRejected {
                    agent: donor,
                    reason: RejectionReason::InvalidValue,
                }]
            );
        }

        let mut capped = World::with_settings(WorldSettings {
            senescence_max: 7.0,
            ..WorldSettings::default()
        });
        let donor = register(&mut capped, &mut engine, Phenotype::Stem, 30.0);
        let recipient = register(&mut capped, &mut engine, Phenotype::Stem, 30.0);
        let mut events = Vec::new();
        apply(
            &mut capped,
            &mut engine,
            Command::TransferTrait {
                donor,
                recipient,
                kind: TraitKind::Senescence,
                delta: 2.5,
            },
            &mut events,
        );
        assert!(matches!(events.as_slice(), [Event::CommandRejected { .. }]));

        for record in query::agents(&world).iter().chain(query::agents(&capped)) {
            assert_eq!(record.traits(), HeritableTraits::new(0.5, 5.0));
            assert!(record.history().is_empty());
        }
    }

    #[test]
    fn failed_removal_quarantines_and_rearms() {
        let mut world = World::new();
        let mut engine = StubEngine {
            refuse_removal: true,
            ..StubEngine::default()
        };
        let agent = register(&mut world, &mut engine, Phenotype::Normoxic, 30.0);
        let mut events = Vec::new();
        apply(&mut world, &mut engine, necrosis(agent), &mut events);
        for _ in 0..5 {
            apply(&mut world, &mut engine, Command::Tick, &mut events);
        }
        events.clear();
        apply(&mut world, &mut engine, Command::Remove { agent }, &mut events);

        assert_eq!(events, vec![Event::RemovalFailed { agent }]);
        let record = query::agent(&world, agent).expect("agent is still present");
        assert_eq!(record.target().volume, DEFAULT_QUARANTINE_VOLUME);
        assert_eq!(record.necrosis_onset(), Some(Tick::new(5)));
    }

    #[test]
    fn successful_removal_drops_record() {
        let mut world = World::new();
        let mut engine = StubEngine::default();
        let agent = register(&mut world, &mut engine, Phenotype::Necrotic, 10.0);
        let mut events = Vec::new();
        apply(&mut world, &mut engine, Command::Remove { agent }, &mut events);

        assert_eq!(events, vec![Event::AgentRemoved { agent }]);
        assert!(query::agent(&world, agent).is_none());
    }

    #[test]
    fn unknown_agents_are_rejected_individually() {
        let mut world = World::new();
        let mut engine = StubEngine::default();
        let ghost = AgentId::new(99);
        let mut events = Vec::new();
        apply(&mut world, &mut engine, Command::SpendGeneration { agent: ghost }, &mut events);

        assert_eq!(
            events,
            vec![Event::CommandRejected {
                agent: ghost,
                reason: RejectionReason::UnknownAgent
            }]
        );
    }

    #[test]
    fn export_publishes_every_agent() {
        let mut world = World::new();
        let mut engine = StubEngine::default();
        let first = register(&mut world, &mut engine, Phenotype::Stem, 20.0);
        let second = register(&mut world, &mut engine, Phenotype::Somatic, 20.0);
        export_targets(&world, &mut engine);

        let ids: Vec<AgentId> = engine.assigned.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![first, second]);
    }
}
