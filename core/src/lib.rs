#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the spheroid simulation.
//!
//! This crate defines the message surface that connects the tick scheduler,
//! the authoritative agent store, and the pure biological systems. Systems
//! read immutable [`PopulationView`] snapshots and respond exclusively with
//! [`Command`] batches; the world executes those commands via its `apply`
//! entry point and broadcasts [`Event`] values describing what happened.
//!
//! The external geometry solver and the field solver are reached only through
//! the [`GeometryEngine`] and [`FieldSource`] traits.

pub mod component;
pub mod config;
pub mod context;
pub mod draws;
pub mod engine;
pub mod environment;
pub mod report;

use std::fmt;

pub use component::Component;
pub use config::{
    lq_survival, ConfigError, ConstraintParams, DivisionBasis, DivisionParams, DivisionTable,
    GeometryParams, GrowthLaw, GrowthParams, LineageParams, LqSchedule, ModelKind,
    NecrosisParams, OxygenParams, ParamDef, ParamDefault, ParameterTable, Params,
    ProbabilityBin, PulseKind, Requirement, ShrinkLaw, SimulationConfig, SurfaceLaw,
    TargetSelection, TherapyParams, TraitMutation, TreatmentKind, TreatmentPlan, SCHEMA,
};
pub use context::{Counters, RadiationTally, SimulationContext};
pub use draws::{DrawService, DrawStream, Draws};
pub use engine::{DivisionFailure, EngineTargets, GeometryEngine};
pub use environment::{Environment, FieldId, FieldSource, LatticeCoord, LatticeDims};
pub use glam::DVec3;
pub use report::{PhenotypeCounts, TelemetryReport};

use serde::{Deserialize, Serialize};

/// Discrete simulation step counter.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Tick(u64);

impl Tick {
    /// Tick at which every simulation starts.
    pub const ZERO: Self = Self(0);

    /// Creates a tick from its raw counter value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the tick that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Number of ticks elapsed since `earlier`, saturating at zero.
    #[must_use]
    pub const fn since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Reports whether the tick is a multiple of `period`. A zero period never matches.
    #[must_use]
    pub const fn is_multiple_of(self, period: u64) -> bool {
        period != 0 && self.0 % period == 0
    }
}

/// Unique identifier assigned to an agent by the geometry engine.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AgentId(u32);

impl AgentId {
    /// Creates a new identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Discrete biological state of an agent.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Phenotype {
    /// Well-oxygenated proliferating agent.
    Normoxic,
    /// Oxygen-starved agent with reduced growth.
    Hypoxic,
    /// Self-renewing stem agent.
    Stem,
    /// Differentiated agent with a finite generation budget.
    Somatic,
    /// Dead agent awaiting removal. Terminal.
    Necrotic,
}

impl Phenotype {
    /// Every phenotype in declaration order.
    pub const ALL: [Phenotype; 5] = [
        Phenotype::Normoxic,
        Phenotype::Hypoxic,
        Phenotype::Stem,
        Phenotype::Somatic,
        Phenotype::Necrotic,
    ];

    /// Reports whether the phenotype is the absorbing necrotic state.
    #[must_use]
    pub const fn is_necrotic(self) -> bool {
        matches!(self, Phenotype::Necrotic)
    }

    /// Stable lowercase label used in telemetry series names and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Phenotype::Normoxic => "normoxic",
            Phenotype::Hypoxic => "hypoxic",
            Phenotype::Stem => "stem",
            Phenotype::Somatic => "somatic",
            Phenotype::Necrotic => "necrotic",
        }
    }
}

/// Actual geometry reported by the external engine. Read-only to the core.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Current volume in lattice voxels.
    pub volume: f64,
    /// Current surface area in lattice units.
    pub surface: f64,
    /// Center of mass in lattice coordinates.
    pub position: DVec3,
}

impl Geometry {
    /// Creates a geometry description.
    #[must_use]
    pub const fn new(volume: f64, surface: f64, position: DVec3) -> Self {
        Self {
            volume,
            surface,
            position,
        }
    }
}

/// Volume and surface the geometry solver steers an agent toward.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetGeometry {
    /// Target volume.
    pub volume: f64,
    /// Target surface.
    pub surface: f64,
}

impl TargetGeometry {
    /// Creates a target geometry.
    #[must_use]
    pub const fn new(volume: f64, surface: f64) -> Self {
        Self { volume, surface }
    }

    /// Reports whether both components are finite and non-negative.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.volume.is_finite()
            && self.surface.is_finite()
            && self.volume >= 0.0
            && self.surface >= 0.0
    }
}

/// Stiffness coefficients pulling actual geometry toward the targets. Never negative.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintStrengths {
    volume: f64,
    surface: f64,
}

impl ConstraintStrengths {
    /// Strengths that leave geometry unconstrained.
    pub const ZERO: Self = Self {
        volume: 0.0,
        surface: 0.0,
    };

    /// Creates constraint strengths, clamping negative or non-finite inputs to zero.
    #[must_use]
    pub fn new(volume: f64, surface: f64) -> Self {
        Self {
            volume: non_negative(volume),
            surface: non_negative(surface),
        }
    }

    /// Volume constraint strength.
    #[must_use]
    pub const fn volume(&self) -> f64 {
        self.volume
    }

    /// Surface constraint strength.
    #[must_use]
    pub const fn surface(&self) -> f64 {
        self.surface
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Continuous traits copied to offspring at division.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeritableTraits {
    /// Probability-like stemness `P` in `[0, 1]`.
    pub stemness: f64,
    /// Senescence budget `Rho`, never negative.
    pub senescence: f64,
    /// Remaining divisions before a somatic agent dies; reset to `Rho` on senescence mutation.
    pub generations_left: f64,
}

impl HeritableTraits {
    /// Creates traits with `generations_left` mirroring the senescence budget.
    #[must_use]
    pub fn new(stemness: f64, senescence: f64) -> Self {
        let senescence = non_negative(senescence);
        Self {
            stemness: stemness.clamp(0.0, 1.0),
            senescence,
            generations_left: senescence,
        }
    }

    /// Reads the value of a mutable trait.
    #[must_use]
    pub const fn value(&self, kind: TraitKind) -> f64 {
        match kind {
            TraitKind::Stemness => self.stemness,
            TraitKind::Senescence => self.senescence,
        }
    }

    /// Overwrites the value of a mutable trait. Senescence also resets the generation budget.
    pub fn set(&mut self, kind: TraitKind, value: f64) {
        match kind {
            TraitKind::Stemness => self.stemness = value,
            TraitKind::Senescence => {
                self.senescence = value;
                self.generations_left = value;
            }
        }
    }
}

/// Heritable trait subject to pairwise mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraitKind {
    /// Stemness probability `P`.
    Stemness,
    /// Senescence budget `Rho`.
    Senescence,
}

impl TraitKind {
    /// Mutable traits in the order they are mutated during a division.
    pub const ALL: [TraitKind; 2] = [TraitKind::Stemness, TraitKind::Senescence];
}

/// Lineage entry appended to an agent each time one of its traits mutates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    /// Global mutation sequence number.
    pub sequence: u64,
    /// Tick at which the mutation happened.
    pub tick: Tick,
    /// Stemness after the mutation.
    pub stemness: f64,
    /// Senescence budget after the mutation.
    pub senescence: f64,
}

/// Reason an agent entered the necrotic state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NecrosisCause {
    /// Environmental signal dropped below the necrotic threshold.
    Hypoxia,
    /// A somatic agent spent its generation budget.
    Exhaustion,
    /// Killed by a treatment.
    Treatment,
}

/// Reason the world refused a command for a single agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    /// The referenced agent is not in the population.
    UnknownAgent,
    /// The agent is necrotic and necrosis is terminal.
    TerminalPhenotype,
    /// Necrosis must be entered through [`Command::EnterNecrosis`].
    NecrosisRequiresFreeze,
    /// The supplied value was non-finite or negative.
    InvalidValue,
}

/// Commands that express all permissible population mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Advances the simulation clock by one tick.
    Tick,
    /// Registers an agent already created by the geometry engine, such as a seed.
    RegisterAgent {
        /// Identifier allocated by the engine.
        agent: AgentId,
        /// Initial phenotype.
        phenotype: Phenotype,
        /// Initial target geometry.
        target: TargetGeometry,
        /// Initial constraint strengths.
        constraints: ConstraintStrengths,
        /// Initial heritable traits.
        traits: HeritableTraits,
        /// Per-agent division threshold overriding the configured constant.
        division_threshold: Option<f64>,
    },
    /// Moves a living agent to another living phenotype.
    ChangePhenotype {
        /// Agent to relabel.
        agent: AgentId,
        /// Destination phenotype; must not be necrotic.
        phenotype: Phenotype,
        /// Constraint strengths for the destination, when they change.
        constraints: Option<ConstraintStrengths>,
    },
    /// Moves an agent into the terminal necrotic state, freezing its targets.
    EnterNecrosis {
        /// Agent that dies.
        agent: AgentId,
        /// Why the agent died.
        cause: NecrosisCause,
        /// Constraint strengths applied to the dead agent.
        constraints: ConstraintStrengths,
    },
    /// Records the current tick as onset for a necrotic agent that has none.
    StampNecrosisOnset {
        /// Necrotic agent lacking an onset tick.
        agent: AgentId,
    },
    /// Restarts the necrotic age of an agent whose removal was deferred.
    RearmNecrosisOnset {
        /// Necrotic agent to re-arm.
        agent: AgentId,
    },
    /// Overwrites an agent's target geometry.
    SetTargetGeometry {
        /// Agent to update.
        agent: AgentId,
        /// New targets.
        target: TargetGeometry,
    },
    /// Overwrites an agent's constraint strengths.
    SetConstraints {
        /// Agent to update.
        agent: AgentId,
        /// New strengths.
        constraints: ConstraintStrengths,
    },
    /// Consumes one generation from a dividing agent's budget.
    SpendGeneration {
        /// Dividing agent.
        agent: AgentId,
    },
    /// Moves `delta` of a trait from the donor to the recipient.
    TransferTrait {
        /// Agent giving up `delta`.
        donor: AgentId,
        /// Agent receiving `delta`.
        recipient: AgentId,
        /// Trait being exchanged.
        kind: TraitKind,
        /// Non-negative magnitude of the exchange.
        delta: f64,
    },
    /// Requests the external division primitive for an agent.
    Divide {
        /// Parent agent.
        agent: AgentId,
    },
    /// Requests the external removal primitive for a necrotic agent.
    Remove {
        /// Agent to remove.
        agent: AgentId,
    },
}

/// Events broadcast by the world after executing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that the simulation advanced by one tick.
    TimeAdvanced {
        /// Tick that just started.
        tick: Tick,
    },
    /// A new agent joined the population through registration.
    AgentRegistered {
        /// Registered agent.
        agent: AgentId,
    },
    /// A living agent switched phenotype.
    PhenotypeChanged {
        /// Agent that changed.
        agent: AgentId,
        /// Previous phenotype.
        from: Phenotype,
        /// New phenotype.
        to: Phenotype,
    },
    /// An agent entered the necrotic state.
    AgentNecrotic {
        /// Agent that died.
        agent: AgentId,
        /// Phenotype held before death.
        from: Phenotype,
        /// Why the agent died.
        cause: NecrosisCause,
        /// Target volume frozen at the actual volume observed at death.
        frozen_volume: f64,
    },
    /// The division primitive produced a child.
    AgentDivided {
        /// Dividing agent.
        parent: AgentId,
        /// Newly created agent.
        child: AgentId,
    },
    /// The division primitive failed; the agent stays eligible next tick.
    DivisionFailed {
        /// Agent whose division failed.
        agent: AgentId,
    },
    /// A pairwise trait exchange was applied.
    TraitTransferred {
        /// Agent that gave up `delta`.
        donor: AgentId,
        /// Agent that received `delta`.
        recipient: AgentId,
        /// Exchanged trait.
        kind: TraitKind,
        /// Magnitude exchanged.
        delta: f64,
        /// Global mutation sequence number.
        sequence: u64,
    },
    /// The removal primitive succeeded.
    AgentRemoved {
        /// Removed agent.
        agent: AgentId,
    },
    /// The removal primitive failed and the agent was quarantined.
    RemovalFailed {
        /// Quarantined agent.
        agent: AgentId,
    },
    /// A command was refused for a single agent without affecting the rest of the tick.
    CommandRejected {
        /// Agent named by the refused command.
        agent: AgentId,
        /// Why the command was refused.
        reason: RejectionReason,
    },
}

/// Read-only snapshot of a single agent captured at the start of a component pass.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentSnapshot {
    /// Agent identifier.
    pub id: AgentId,
    /// Current phenotype.
    pub phenotype: Phenotype,
    /// Actual geometry reported by the engine.
    pub geometry: Geometry,
    /// Core-owned target geometry.
    pub target: TargetGeometry,
    /// Core-owned constraint strengths.
    pub constraints: ConstraintStrengths,
    /// Heritable traits.
    pub traits: HeritableTraits,
    /// Per-agent division threshold, if persisted.
    pub division_threshold: Option<f64>,
    /// Tick at which the agent became necrotic.
    pub necrosis_onset: Option<Tick>,
    /// Environment value sampled at the agent's clamped position for this tick.
    pub signal: Option<f64>,
}

impl AgentSnapshot {
    /// Hydrostatic pressure `2·max(0, (targetVolume − volume)·λ_volume)`.
    #[must_use]
    pub fn pressure(&self) -> f64 {
        let deficit = (self.target.volume - self.geometry.volume) * self.constraints.volume();
        2.0 * deficit.max(0.0)
    }
}

/// Immutable view over the population, sorted by agent identifier.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PopulationView {
    snapshots: Vec<AgentSnapshot>,
}

impl PopulationView {
    /// Builds a view from snapshots, sorting them by identifier.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<AgentSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterates over every agent in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentSnapshot> {
        self.snapshots.iter()
    }

    /// Iterates over agents holding the provided phenotype.
    pub fn with_phenotype(&self, phenotype: Phenotype) -> impl Iterator<Item = &AgentSnapshot> {
        self.snapshots
            .iter()
            .filter(move |snapshot| snapshot.phenotype == phenotype)
    }

    /// Looks up a single agent.
    #[must_use]
    pub fn get(&self, agent: AgentId) -> Option<&AgentSnapshot> {
        self.snapshots
            .binary_search_by_key(&agent, |snapshot| snapshot.id)
            .ok()
            .and_then(|index| self.snapshots.get(index))
    }

    /// Number of agents in the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Reports whether the view holds no agents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Number of agents holding the provided phenotype.
    #[must_use]
    pub fn count(&self, phenotype: Phenotype) -> usize {
        self.with_phenotype(phenotype).count()
    }

    /// Number of agents that are not necrotic.
    #[must_use]
    pub fn living(&self) -> usize {
        self.snapshots
            .iter()
            .filter(|snapshot| !snapshot.phenotype.is_necrotic())
            .count()
    }

    /// Consumes the view, returning the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<AgentSnapshot> {
        self.snapshots
    }
}
