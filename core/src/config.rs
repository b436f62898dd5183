//! Parameter schema and resolution.
//!
//! Runs are described by a [`SimulationConfig`]: a handful of enumerated
//! selections plus a flat [`ParameterTable`] of named numeric values. The
//! table is validated against [`SCHEMA`] by [`Params::resolve`], which fails
//! fast when a parameter required by the selected model or treatment is
//! absent and falls back to the documented default otherwise.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ConstraintStrengths, Phenotype, TargetGeometry, Tick, TraitKind};

/// Errors raised while resolving configuration. Always fatal before the first tick.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A parameter required by the selected model or treatment is absent.
    #[error("required parameter `{name}` is missing")]
    MissingParameter {
        /// Schema name of the missing parameter.
        name: &'static str,
    },
    /// The table names a parameter that the schema does not define.
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    /// A parameter lies outside its documented range.
    #[error("parameter `{name}` = {value} is outside [{min}, {max}]")]
    OutOfRange {
        /// Schema name of the parameter.
        name: &'static str,
        /// Offending value.
        value: f64,
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
    /// A tick or count parameter carries a fractional part.
    #[error("parameter `{name}` = {value} must be a whole number")]
    NotAnInteger {
        /// Schema name of the parameter.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
    /// Individually valid parameters contradict one another.
    #[error("inconsistent parameters: {0}")]
    Inconsistent(String),
    /// The field source does not serve the configured environment field.
    #[error("environment field `{0}` is not provided by the field source")]
    MissingField(String),
}

/// Simulation variant. Selects the phenotype set and the transition rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Normoxic, hypoxic and necrotic agents driven by a sampled oxygen field.
    Oxygen,
    /// Stem and somatic agents with differentiation and generation budgets.
    Stemness,
    /// Stem agents only; offspring are clones and only traits drift.
    Neutral,
}

impl ModelKind {
    /// Phenotype assigned to seed agents.
    #[must_use]
    pub const fn seed_phenotype(self) -> Phenotype {
        match self {
            ModelKind::Oxygen => Phenotype::Normoxic,
            ModelKind::Stemness | ModelKind::Neutral => Phenotype::Stem,
        }
    }

    /// Reports whether the model samples the environment field.
    #[must_use]
    pub const fn uses_field(self) -> bool {
        matches!(self, ModelKind::Oxygen)
    }

    const fn default_growth_law(self) -> GrowthLaw {
        match self {
            ModelKind::Oxygen => GrowthLaw::Constant,
            ModelKind::Stemness | ModelKind::Neutral => GrowthLaw::PressureLimited,
        }
    }
}

/// How target volume advances each tick for growing phenotypes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthLaw {
    /// Fixed increment per tick.
    Constant,
    /// Fixed increment while pressure stays below the threshold, otherwise none.
    PressureLimited,
    /// Increment damped by `1 / (1 + pressure / threshold)`.
    ContactInhibited,
}

/// How target surface follows target volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceLaw {
    /// `S = k·V^(2/3)`.
    #[default]
    Spherical,
    /// `ΔS = (2/3)(S/V)ΔV`.
    Linearized,
}

/// How necrotic agents shrink each tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShrinkLaw {
    /// Subtract the shrink rate from the target volume.
    #[default]
    Absolute,
    /// Multiply the target volume by `1 − rate`.
    Proportional,
}

/// Which volume is compared against the division threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivisionBasis {
    /// Volume reported by the geometry engine.
    #[default]
    Actual,
    /// Core-owned target volume.
    Target,
}

/// Phenotype subset a treatment applies to. Empty means every living agent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetSelection(Vec<Phenotype>);

impl TargetSelection {
    /// Selection covering every living phenotype.
    #[must_use]
    pub const fn all_living() -> Self {
        Self(Vec::new())
    }

    /// Selection restricted to the provided phenotypes.
    #[must_use]
    pub fn only(phenotypes: Vec<Phenotype>) -> Self {
        Self(phenotypes)
    }

    /// Reports whether agents of the phenotype are eligible. Necrotic agents never are.
    #[must_use]
    pub fn includes(&self, phenotype: Phenotype) -> bool {
        !phenotype.is_necrotic() && (self.0.is_empty() || self.0.contains(&phenotype))
    }
}

/// Periodic pulse variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PulseKind {
    /// Every living agent is killed with the configured efficacy.
    Uniform,
    /// Stem agents are killed at efficacy scaled by the stem protection factor.
    StemProtected,
    /// Agents under pressure at or above the threshold are protected.
    QuiescentProtected,
    /// Every living agent on the low-x side of the domain is killed without a draw.
    Surgical,
}

/// Killing schedule. Modes are mutually exclusive.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TreatmentPlan {
    /// No killing.
    #[default]
    None,
    /// Independent per-tick killing.
    Constant {
        /// Eligible phenotypes.
        #[serde(default)]
        targets: TargetSelection,
    },
    /// Killing on ticks that are multiples of the pulse period.
    Pulse {
        /// Pulse variant.
        kind: PulseKind,
    },
    /// Fractionated linear-quadratic radiotherapy.
    LinearQuadratic {
        /// Eligible phenotypes.
        #[serde(default)]
        targets: TargetSelection,
    },
}

impl TreatmentPlan {
    /// Discriminant used for parameter requirements.
    #[must_use]
    pub const fn kind(&self) -> TreatmentKind {
        match self {
            TreatmentPlan::None => TreatmentKind::None,
            TreatmentPlan::Constant { .. } => TreatmentKind::Constant,
            TreatmentPlan::Pulse { .. } => TreatmentKind::Pulse,
            TreatmentPlan::LinearQuadratic { .. } => TreatmentKind::LinearQuadratic,
        }
    }
}

/// Fieldless discriminant of [`TreatmentPlan`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TreatmentKind {
    /// No killing.
    None,
    /// Constant killing.
    Constant,
    /// Periodic pulse.
    Pulse,
    /// Linear-quadratic radiotherapy.
    LinearQuadratic,
}

/// Flat table of named numeric parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterTable(BTreeMap<String, f64>);

impl ParameterTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    #[must_use]
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces a parameter.
    pub fn insert(&mut self, name: &str, value: f64) {
        let _ = self.0.insert(name.to_owned(), value);
    }

    /// Looks up a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Iterates over parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

impl FromIterator<(String, f64)> for ParameterTable {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn default_record_history() -> bool {
    true
}

fn default_field() -> String {
    "Oxygen".to_owned()
}

/// Unresolved run description as loaded by an adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Simulation variant.
    pub model: ModelKind,
    /// Killing schedule.
    #[serde(default)]
    pub treatment: TreatmentPlan,
    /// Growth law; defaults per model when absent.
    #[serde(default)]
    pub growth_law: Option<GrowthLaw>,
    /// Surface law.
    #[serde(default)]
    pub surface_law: SurfaceLaw,
    /// Necrotic shrink law.
    #[serde(default)]
    pub shrink_law: ShrinkLaw,
    /// Volume compared against the division threshold.
    #[serde(default)]
    pub division_basis: DivisionBasis,
    /// Seed of the random draw service.
    #[serde(default)]
    pub seed: u64,
    /// Whether mutation events are appended to agent lineage histories.
    #[serde(default = "default_record_history")]
    pub record_mutation_history: bool,
    /// Name of the environment field sampled by the oxygen model.
    #[serde(default = "default_field")]
    pub field: String,
    /// Named numeric parameters.
    #[serde(default)]
    pub parameters: ParameterTable,
}

impl SimulationConfig {
    /// Creates a configuration for the model with every selection at its default.
    #[must_use]
    pub fn new(model: ModelKind) -> Self {
        Self {
            model,
            treatment: TreatmentPlan::None,
            growth_law: None,
            surface_law: SurfaceLaw::default(),
            shrink_law: ShrinkLaw::default(),
            division_basis: DivisionBasis::default(),
            seed: 0,
            record_mutation_history: true,
            field: default_field(),
            parameters: ParameterTable::new(),
        }
    }

    /// Builder-style parameter insertion.
    #[must_use]
    pub fn with_parameter(mut self, name: &str, value: f64) -> Self {
        self.parameters.insert(name, value);
        self
    }

    /// Builder-style treatment selection.
    #[must_use]
    pub fn with_treatment(mut self, treatment: TreatmentPlan) -> Self {
        self.treatment = treatment;
        self
    }

    /// Builder-style seed selection.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// When a parameter must be present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    /// Never required.
    Optional,
    /// Required for every run.
    Always,
    /// Required when one of the listed models is selected.
    Models(&'static [ModelKind]),
    /// Required when one of the listed treatments is selected.
    Treatments(&'static [TreatmentKind]),
}

/// Value used when an optional parameter is absent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamDefault {
    /// A fixed value.
    Value(f64),
    /// The resolved value of another parameter.
    SameAs(&'static str),
}

/// Schema entry for one named parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamDef {
    /// Name used in the parameter table.
    pub name: &'static str,
    /// When the parameter must be present.
    pub requirement: Requirement,
    /// Value used when absent and not required.
    pub default: ParamDefault,
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
    /// Whether the value must be a whole number.
    pub integer: bool,
}

const fn param(
    name: &'static str,
    requirement: Requirement,
    default: ParamDefault,
    min: f64,
    max: f64,
) -> ParamDef {
    ParamDef {
        name,
        requirement,
        default,
        min,
        max,
        integer: false,
    }
}

const fn whole(name: &'static str, requirement: Requirement, default: f64, min: f64) -> ParamDef {
    ParamDef {
        name,
        requirement,
        default: ParamDefault::Value(default),
        min,
        max: f64::MAX,
        integer: true,
    }
}

const OPTIONAL: Requirement = Requirement::Optional;
const OXYGEN: Requirement = Requirement::Models(&[ModelKind::Oxygen]);
const LINEAGE: Requirement = Requirement::Models(&[ModelKind::Stemness, ModelKind::Neutral]);
const KILLING: Requirement =
    Requirement::Treatments(&[TreatmentKind::Constant, TreatmentKind::Pulse]);
const PULSE: Requirement = Requirement::Treatments(&[TreatmentKind::Pulse]);
const RADIOTHERAPY: Requirement = Requirement::Treatments(&[TreatmentKind::LinearQuadratic]);
const UNBOUNDED: f64 = f64::MAX;
const POSITIVE: f64 = f64::MIN_POSITIVE;

/// `(36π)^(1/3)`: surface of a unit-volume sphere.
const SPHERE_SURFACE_COEFFICIENT: f64 = 4.835_975_862_049_408;

const fn value(value: f64) -> ParamDefault {
    ParamDefault::Value(value)
}

/// Every parameter the core understands.
pub const SCHEMA: &[ParamDef] = &[
    param("TargetVolume_Min", OPTIONAL, value(15.0), 0.0, UNBOUNDED),
    param("TargetVolume_Max", OPTIONAL, value(80.0), POSITIVE, UNBOUNDED),
    param("Surface_Coefficient", OPTIONAL, value(SPHERE_SURFACE_COEFFICIENT), POSITIVE, UNBOUNDED),
    param("Seed_Target_Volume", OPTIONAL, value(40.0), POSITIVE, UNBOUNDED),
    param("Lambda_Volume", OPTIONAL, value(5.0), 0.0, UNBOUNDED),
    param("Lambda_Surface", OPTIONAL, value(1.5), 0.0, UNBOUNDED),
    param("Lambda_Necrotic", OPTIONAL, value(50.0), 0.0, UNBOUNDED),
    param("O2_Thresh_Hypoxic", OXYGEN, value(0.08), 0.0, UNBOUNDED),
    param("O2_Thresh_Necrotic", OXYGEN, value(0.03), 0.0, UNBOUNDED),
    param("O2_Thresh_Normoxic", OPTIONAL, ParamDefault::SameAs("O2_Thresh_Hypoxic"), 0.0, UNBOUNDED),
    param("Hypoxic_Volume_Factor", OPTIONAL, value(0.95), 0.0, 1.0),
    param("O2_Division_Min", OPTIONAL, ParamDefault::SameAs("O2_Thresh_Necrotic"), 0.0, UNBOUNDED),
    param("O2_Bin_High", OPTIONAL, value(0.3), 0.0, UNBOUNDED),
    param("O2_Bin_Med", OPTIONAL, value(0.15), 0.0, UNBOUNDED),
    param("DivProb_High_O2", OPTIONAL, value(0.99), 0.0, 1.0),
    param("DivProb_Med_O2", OPTIONAL, value(0.75), 0.0, 1.0),
    param("DivProb_Low_O2", OPTIONAL, value(0.02), 0.0, 1.0),
    param("Growth_Normoxic", OPTIONAL, value(1.0), 0.0, UNBOUNDED),
    param("Growth_Hypoxic", OPTIONAL, value(0.25), 0.0, UNBOUNDED),
    param("Growth_Stem", OPTIONAL, value(0.2), 0.0, UNBOUNDED),
    param("Growth_Somatic", OPTIONAL, value(0.2), 0.0, UNBOUNDED),
    param("Pressure_Threshold", OPTIONAL, value(30.0), POSITIVE, UNBOUNDED),
    param("Division_Volume", Requirement::Always, value(0.0), POSITIVE, UNBOUNDED),
    param("Division_Probability", OPTIONAL, value(1.0), 0.0, 1.0),
    whole("Division_Start_Tick", OPTIONAL, 0.0, 0.0),
    whole("Max_Cells", OPTIONAL, 5000.0, 1.0),
    param("P_Init", LINEAGE, value(0.5), 0.0, 1.0),
    param("Rho_Init", LINEAGE, value(5.0), 0.0, UNBOUNDED),
    param("Prob_P_Mutation", OPTIONAL, value(0.1), 0.0, 1.0),
    param("Prob_Rho_Mutation", OPTIONAL, value(0.1), 0.0, 1.0),
    param("P_Mutation_Amplitude", OPTIONAL, value(0.05), 0.0, UNBOUNDED),
    param("Rho_Mutation_Amplitude", OPTIONAL, value(1.0), 0.0, UNBOUNDED),
    param("Rho_Max", OPTIONAL, value(100.0), 0.0, UNBOUNDED),
    whole("Necrotic_Lifetime", OPTIONAL, 200.0, 0.0),
    param("Necrotic_Shrink_Rate", OPTIONAL, value(1.0), 0.0, UNBOUNDED),
    param("Necrotic_Min_Volume", OPTIONAL, value(1.0), POSITIVE, UNBOUNDED),
    param("Removal_Probability", OPTIONAL, value(1.0), 0.0, 1.0),
    param("Kill_Efficacy", KILLING, value(0.0), 0.0, 1.0),
    param("Kill_Reduction", OPTIONAL, value(1000.0), 1.0, UNBOUNDED),
    whole("Pulse_Period", PULSE, 1000.0, 1.0),
    param("Stem_Protection", OPTIONAL, value(0.5), 0.0, 1.0),
    param("Quiescent_Protection", OPTIONAL, value(0.5), 0.0, 1.0),
    param("Pulse_Region_Fraction", OPTIONAL, value(0.5), 0.0, 1.0),
    param("RT_Alpha", RADIOTHERAPY, value(0.0), 0.0, UNBOUNDED),
    param("RT_Beta", RADIOTHERAPY, value(0.0), 0.0, UNBOUNDED),
    param("RT_Dose", RADIOTHERAPY, value(0.0), 0.0, UNBOUNDED),
    whole("RT_Fractions", RADIOTHERAPY, 0.0, 1.0),
    whole("RT_StartMCS", RADIOTHERAPY, 0.0, 0.0),
    whole("RT_PeriodMCS", RADIOTHERAPY, 1.0, 1.0),
    whole("Telemetry_Interval", OPTIONAL, 10.0, 1.0),
];

/// Target geometry bounds and the surface relation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryParams {
    /// Lower bound for living target volumes.
    pub target_volume_min: f64,
    /// Upper bound for target volumes.
    pub target_volume_max: f64,
    /// Coefficient `k` of `S = k·V^(2/3)`.
    pub surface_coefficient: f64,
    /// Target volume assigned to seed agents.
    pub seed_target_volume: f64,
    /// How target surface follows target volume.
    pub surface_law: SurfaceLaw,
}

impl GeometryParams {
    /// Clamps a living target volume into `[min, max]`.
    #[must_use]
    pub fn clamp_volume(&self, volume: f64) -> f64 {
        volume.clamp(self.target_volume_min, self.target_volume_max)
    }

    /// Surface of a sphere-like agent with the provided volume.
    #[must_use]
    pub fn spherical_surface(&self, volume: f64) -> f64 {
        self.surface_coefficient * volume.max(0.0).powf(2.0 / 3.0)
    }

    /// Moves a target to a new volume, updating the surface by the surface law.
    #[must_use]
    pub fn resize(&self, target: TargetGeometry, volume: f64) -> TargetGeometry {
        let surface = match self.surface_law {
            SurfaceLaw::Linearized if target.volume > 0.0 => {
                let delta = volume - target.volume;
                (target.surface + (2.0 / 3.0) * (target.surface / target.volume) * delta).max(0.0)
            }
            SurfaceLaw::Spherical | SurfaceLaw::Linearized => self.spherical_surface(volume),
        };
        TargetGeometry::new(volume, surface)
    }
}

/// Constraint strengths assigned per phenotype.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstraintParams {
    /// Strengths for every living phenotype.
    pub living: ConstraintStrengths,
    /// Strengths reasserted on necrotic agents.
    pub necrotic: ConstraintStrengths,
}

impl ConstraintParams {
    /// Strengths for the destination phenotype.
    #[must_use]
    pub const fn for_phenotype(&self, phenotype: Phenotype) -> ConstraintStrengths {
        if phenotype.is_necrotic() {
            self.necrotic
        } else {
            self.living
        }
    }
}

/// Oxygen thresholds for the environment-driven model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OxygenParams {
    /// Below this value a normoxic agent becomes hypoxic.
    pub hypoxic_threshold: f64,
    /// Below this value a living agent becomes necrotic.
    pub necrotic_threshold: f64,
    /// Above this value a hypoxic agent recovers.
    pub recovery_threshold: f64,
    /// Factor applied to the target volume on entering hypoxia.
    pub hypoxic_volume_factor: f64,
    /// Minimum oxygen for any division.
    pub division_minimum: f64,
}

/// Growth rates per phenotype.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GrowthParams {
    /// Active growth law.
    pub law: GrowthLaw,
    /// Increment for normoxic agents.
    pub normoxic: f64,
    /// Increment for hypoxic agents.
    pub hypoxic: f64,
    /// Increment for stem agents.
    pub stem: f64,
    /// Increment for somatic agents.
    pub somatic: f64,
    /// Pressure at which growth is limited or halved.
    pub pressure_threshold: f64,
}

impl GrowthParams {
    /// Base increment for the phenotype. Necrotic agents never grow.
    #[must_use]
    pub const fn rate(&self, phenotype: Phenotype) -> f64 {
        match phenotype {
            Phenotype::Normoxic => self.normoxic,
            Phenotype::Hypoxic => self.hypoxic,
            Phenotype::Stem => self.stem,
            Phenotype::Somatic => self.somatic,
            Phenotype::Necrotic => 0.0,
        }
    }
}

/// Lower bound of an environment bin and the division probability above it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbabilityBin {
    /// Signal must exceed this value.
    pub floor: f64,
    /// Division probability for agents in the bin.
    pub probability: f64,
}

/// Division probability keyed by phenotype and environment bin.
#[derive(Clone, Debug, PartialEq)]
pub struct DivisionTable {
    normoxic: Vec<ProbabilityBin>,
    hypoxic: Vec<ProbabilityBin>,
    base: f64,
}

impl DivisionTable {
    /// Builds a table. Bins are sorted by descending floor and must not lose
    /// probability as the environment improves.
    pub fn new(
        mut normoxic: Vec<ProbabilityBin>,
        mut hypoxic: Vec<ProbabilityBin>,
        base: f64,
    ) -> Result<Self, ConfigError> {
        for bins in [&mut normoxic, &mut hypoxic] {
            bins.sort_by(|a, b| b.floor.total_cmp(&a.floor));
            let monotone = bins
                .windows(2)
                .all(|pair| matches!(pair, [upper, lower] if upper.probability >= lower.probability));
            if !monotone {
                return Err(ConfigError::Inconsistent(
                    "division probability must not decrease as oxygen increases".to_owned(),
                ));
            }
        }
        Ok(Self {
            normoxic,
            hypoxic,
            base,
        })
    }

    /// Table that ignores the environment and always yields `base`.
    #[must_use]
    pub const fn uniform(base: f64) -> Self {
        Self {
            normoxic: Vec::new(),
            hypoxic: Vec::new(),
            base,
        }
    }

    /// Division probability for an agent. Agents without a sampled signal,
    /// or of phenotypes without bins, use the base probability.
    #[must_use]
    pub fn probability(&self, phenotype: Phenotype, signal: Option<f64>) -> f64 {
        let bins = match phenotype {
            Phenotype::Normoxic => &self.normoxic,
            Phenotype::Hypoxic => &self.hypoxic,
            Phenotype::Necrotic => return 0.0,
            Phenotype::Stem | Phenotype::Somatic => return self.base,
        };
        match signal {
            Some(signal) if !bins.is_empty() => bins
                .iter()
                .find(|bin| signal > bin.floor)
                .map_or(0.0, |bin| bin.probability),
            _ => self.base,
        }
    }
}

/// Division eligibility and gating.
#[derive(Clone, Debug, PartialEq)]
pub struct DivisionParams {
    /// Volume that must be exceeded to divide.
    pub volume_threshold: f64,
    /// Volume compared against the threshold.
    pub basis: DivisionBasis,
    /// No division happens before this tick.
    pub start_tick: Tick,
    /// No division happens once this many living agents exist.
    pub max_population: usize,
    /// Probability lookup.
    pub table: DivisionTable,
}

/// Pairwise mutation settings for one trait.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraitMutation {
    /// Probability that a dividing agent attempts a mutation.
    pub probability: f64,
    /// Standard deviation of the half-normal magnitude.
    pub amplitude: f64,
    /// Upper bound a recipient may not exceed.
    pub upper: f64,
}

/// Initial heritable traits and their mutation settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineageParams {
    /// Stemness of seed agents.
    pub initial_stemness: f64,
    /// Senescence budget of seed agents.
    pub initial_senescence: f64,
    /// Stemness mutation.
    pub stemness: TraitMutation,
    /// Senescence mutation.
    pub senescence: TraitMutation,
    /// Whether lineage histories are recorded.
    pub record_history: bool,
}

impl LineageParams {
    /// Mutation settings for a trait.
    #[must_use]
    pub const fn mutation(&self, kind: TraitKind) -> TraitMutation {
        match kind {
            TraitKind::Stemness => self.stemness,
            TraitKind::Senescence => self.senescence,
        }
    }
}

/// Necrotic aging, shrinkage and removal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NecrosisParams {
    /// Age in ticks at which removal is requested.
    pub lifetime: u64,
    /// Shrink law.
    pub shrink_law: ShrinkLaw,
    /// Absolute or proportional shrink per tick.
    pub shrink_rate: f64,
    /// Smallest target volume assigned to a shrinking or quarantined agent.
    pub min_volume: f64,
    /// Probability that a due removal is attempted this tick.
    pub removal_probability: f64,
}

/// Fractionated radiotherapy schedule.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LqSchedule {
    /// Linear coefficient `α`.
    pub alpha: f64,
    /// Quadratic coefficient `β`.
    pub beta: f64,
    /// Dose per fraction `D`.
    pub dose: f64,
    /// Number of fractions.
    pub fractions: u32,
    /// Earliest delivery tick.
    pub start: Tick,
    /// Ticks between fractions.
    pub period: u64,
}

impl LqSchedule {
    /// Survival fraction per delivered fraction.
    #[must_use]
    pub fn survival(&self) -> f64 {
        lq_survival(self.alpha, self.beta, self.dose)
    }

    /// Index of the fraction delivered at `tick`, if one is.
    #[must_use]
    pub fn fraction_at(&self, tick: Tick) -> Option<u32> {
        if tick < self.start || self.period == 0 {
            return None;
        }
        let elapsed = tick.since(self.start);
        if elapsed % self.period != 0 {
            return None;
        }
        let index = u32::try_from(elapsed / self.period).ok()?;
        (index < self.fractions).then_some(index)
    }
}

/// Linear-quadratic survival `S = exp(−(α·D + β·D²))`.
#[must_use]
pub fn lq_survival(alpha: f64, beta: f64, dose: f64) -> f64 {
    (-(alpha * dose + beta * dose * dose)).exp()
}

/// Treatment strengths.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TherapyParams {
    /// One-shot efficacy input.
    pub efficacy: f64,
    /// Divisor turning efficacy into a per-tick constant kill probability.
    pub kill_reduction: f64,
    /// Ticks between pulses.
    pub pulse_period: u64,
    /// Multiplier on stem kill probability for stem-protected pulses.
    pub stem_protection: f64,
    /// Multiplier on kill probability for quiescent agents.
    pub quiescent_protection: f64,
    /// Fraction of the domain width removed by surgical pulses.
    pub region_fraction: f64,
    /// Pressure at or above which an agent counts as quiescent.
    pub pressure_threshold: f64,
    /// Radiotherapy schedule when selected.
    pub radiotherapy: Option<LqSchedule>,
}

impl TherapyParams {
    /// Per-tick kill probability for constant treatment.
    #[must_use]
    pub fn constant_probability(&self) -> f64 {
        self.efficacy / self.kill_reduction
    }
}

/// Fully resolved, validated run parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Params {
    /// Simulation variant.
    pub model: ModelKind,
    /// Seed of the random draw service.
    pub seed: u64,
    /// Name of the sampled environment field.
    pub field: String,
    /// Killing schedule.
    pub treatment: TreatmentPlan,
    /// Geometry bounds.
    pub geometry: GeometryParams,
    /// Constraint strengths.
    pub constraints: ConstraintParams,
    /// Oxygen thresholds.
    pub oxygen: OxygenParams,
    /// Growth rates.
    pub growth: GrowthParams,
    /// Division gating.
    pub division: DivisionParams,
    /// Initial traits and mutation.
    pub lineage: LineageParams,
    /// Necrotic lifecycle.
    pub necrosis: NecrosisParams,
    /// Treatment strengths.
    pub therapy: TherapyParams,
    /// Ticks between telemetry reports.
    pub telemetry_interval: u64,
}

impl Params {
    /// Validates a configuration against [`SCHEMA`] and resolves every parameter.
    pub fn resolve(config: &SimulationConfig) -> Result<Self, ConfigError> {
        let lookup = Lookup::new(config)?;

        let geometry = GeometryParams {
            target_volume_min: lookup.value("TargetVolume_Min")?,
            target_volume_max: lookup.value("TargetVolume_Max")?,
            surface_coefficient: lookup.value("Surface_Coefficient")?,
            seed_target_volume: lookup.value("Seed_Target_Volume")?,
            surface_law: config.surface_law,
        };
        if geometry.target_volume_min >= geometry.target_volume_max {
            return Err(ConfigError::Inconsistent(
                "TargetVolume_Min must be below TargetVolume_Max".to_owned(),
            ));
        }

        let constraints = ConstraintParams {
            living: ConstraintStrengths::new(
                lookup.value("Lambda_Volume")?,
                lookup.value("Lambda_Surface")?,
            ),
            necrotic: {
                let lambda = lookup.value("Lambda_Necrotic")?;
                ConstraintStrengths::new(lambda, lambda)
            },
        };

        let oxygen = OxygenParams {
            hypoxic_threshold: lookup.value("O2_Thresh_Hypoxic")?,
            necrotic_threshold: lookup.value("O2_Thresh_Necrotic")?,
            recovery_threshold: lookup.value("O2_Thresh_Normoxic")?,
            hypoxic_volume_factor: lookup.value("Hypoxic_Volume_Factor")?,
            division_minimum: lookup.value("O2_Division_Min")?,
        };
        if config.model.uses_field() {
            if oxygen.hypoxic_threshold <= oxygen.necrotic_threshold {
                return Err(ConfigError::Inconsistent(
                    "O2_Thresh_Hypoxic must exceed O2_Thresh_Necrotic".to_owned(),
                ));
            }
            if oxygen.recovery_threshold < oxygen.hypoxic_threshold {
                return Err(ConfigError::Inconsistent(
                    "O2_Thresh_Normoxic must not be below O2_Thresh_Hypoxic".to_owned(),
                ));
            }
        }

        let growth = GrowthParams {
            law: config
                .growth_law
                .unwrap_or_else(|| config.model.default_growth_law()),
            normoxic: lookup.value("Growth_Normoxic")?,
            hypoxic: lookup.value("Growth_Hypoxic")?,
            stem: lookup.value("Growth_Stem")?,
            somatic: lookup.value("Growth_Somatic")?,
            pressure_threshold: lookup.value("Pressure_Threshold")?,
        };

        let base_probability = lookup.value("Division_Probability")?;
        let table = if config.model.uses_field() {
            oxygen_division_table(&lookup, &oxygen, base_probability)?
        } else {
            DivisionTable::uniform(base_probability)
        };
        let division = DivisionParams {
            volume_threshold: lookup.value("Division_Volume")?,
            basis: config.division_basis,
            start_tick: Tick::new(lookup.whole("Division_Start_Tick")?),
            max_population: usize::try_from(lookup.whole("Max_Cells")?).unwrap_or(usize::MAX),
            table,
        };

        let lineage = LineageParams {
            initial_stemness: lookup.value("P_Init")?,
            initial_senescence: lookup.value("Rho_Init")?,
            stemness: TraitMutation {
                probability: lookup.value("Prob_P_Mutation")?,
                amplitude: lookup.value("P_Mutation_Amplitude")?,
                upper: 1.0,
            },
            senescence: TraitMutation {
                probability: lookup.value("Prob_Rho_Mutation")?,
                amplitude: lookup.value("Rho_Mutation_Amplitude")?,
                upper: lookup.value("Rho_Max")?,
            },
            record_history: config.record_mutation_history,
        };

        let necrosis = NecrosisParams {
            lifetime: lookup.whole("Necrotic_Lifetime")?,
            shrink_law: config.shrink_law,
            shrink_rate: lookup.value("Necrotic_Shrink_Rate")?,
            min_volume: lookup.value("Necrotic_Min_Volume")?,
            removal_probability: lookup.value("Removal_Probability")?,
        };
        if matches!(necrosis.shrink_law, ShrinkLaw::Proportional) && necrosis.shrink_rate > 1.0 {
            return Err(ConfigError::Inconsistent(
                "proportional Necrotic_Shrink_Rate must not exceed 1".to_owned(),
            ));
        }

        let radiotherapy = match config.treatment.kind() {
            TreatmentKind::LinearQuadratic => Some(LqSchedule {
                alpha: lookup.value("RT_Alpha")?,
                beta: lookup.value("RT_Beta")?,
                dose: lookup.value("RT_Dose")?,
                fractions: u32::try_from(lookup.whole("RT_Fractions")?).unwrap_or(u32::MAX),
                start: Tick::new(lookup.whole("RT_StartMCS")?),
                period: lookup.whole("RT_PeriodMCS")?,
            }),
            _ => None,
        };
        let therapy = TherapyParams {
            efficacy: lookup.value("Kill_Efficacy")?,
            kill_reduction: lookup.value("Kill_Reduction")?,
            pulse_period: lookup.whole("Pulse_Period")?,
            stem_protection: lookup.value("Stem_Protection")?,
            quiescent_protection: lookup.value("Quiescent_Protection")?,
            region_fraction: lookup.value("Pulse_Region_Fraction")?,
            pressure_threshold: growth.pressure_threshold,
            radiotherapy,
        };

        Ok(Self {
            model: config.model,
            seed: config.seed,
            field: config.field.clone(),
            treatment: config.treatment.clone(),
            geometry,
            constraints,
            oxygen,
            growth,
            division,
            lineage,
            necrosis,
            therapy,
            telemetry_interval: lookup.whole("Telemetry_Interval")?,
        })
    }
}

fn oxygen_division_table(
    lookup: &Lookup<'_>,
    oxygen: &OxygenParams,
    base: f64,
) -> Result<DivisionTable, ConfigError> {
    let high = lookup.value("O2_Bin_High")?;
    let medium = lookup.value("O2_Bin_Med")?;
    if !(high >= medium && medium >= oxygen.hypoxic_threshold) {
        return Err(ConfigError::Inconsistent(
            "oxygen bins must satisfy O2_Bin_High >= O2_Bin_Med >= O2_Thresh_Hypoxic".to_owned(),
        ));
    }
    let medium_probability = lookup.value("DivProb_Med_O2")?;
    DivisionTable::new(
        vec![
            ProbabilityBin {
                floor: high,
                probability: lookup.value("DivProb_High_O2")?,
            },
            ProbabilityBin {
                floor: medium,
                probability: medium_probability,
            },
            ProbabilityBin {
                floor: oxygen.hypoxic_threshold,
                probability: 0.8 * medium_probability,
            },
        ],
        vec![ProbabilityBin {
            floor: oxygen.division_minimum,
            probability: lookup.value("DivProb_Low_O2")?,
        }],
        base,
    )
}

struct Lookup<'a> {
    table: &'a ParameterTable,
    model: ModelKind,
    treatment: TreatmentKind,
}

impl<'a> Lookup<'a> {
    fn new(config: &'a SimulationConfig) -> Result<Self, ConfigError> {
        if let Some((unknown, _)) = config
            .parameters
            .iter()
            .find(|(name, _)| find_def(name).is_none())
        {
            return Err(ConfigError::UnknownParameter(unknown.to_owned()));
        }
        Ok(Self {
            table: &config.parameters,
            model: config.model,
            treatment: config.treatment.kind(),
        })
    }

    fn is_required(&self, requirement: Requirement) -> bool {
        match requirement {
            Requirement::Optional => false,
            Requirement::Always => true,
            Requirement::Models(models) => models.contains(&self.model),
            Requirement::Treatments(treatments) => treatments.contains(&self.treatment),
        }
    }

    fn value(&self, name: &str) -> Result<f64, ConfigError> {
        let def = find_def(name).ok_or_else(|| ConfigError::UnknownParameter(name.to_owned()))?;
        match self.table.get(def.name) {
            Some(value) => {
                if !(def.min..=def.max).contains(&value) {
                    return Err(ConfigError::OutOfRange {
                        name: def.name,
                        value,
                        min: def.min,
                        max: def.max,
                    });
                }
                if def.integer && value.fract() != 0.0 {
                    return Err(ConfigError::NotAnInteger {
                        name: def.name,
                        value,
                    });
                }
                Ok(value)
            }
            None if self.is_required(def.requirement) => {
                Err(ConfigError::MissingParameter { name: def.name })
            }
            None => match def.default {
                ParamDefault::Value(value) => Ok(value),
                ParamDefault::SameAs(other) => self.value(other),
            },
        }
    }

    fn whole(&self, name: &str) -> Result<u64, ConfigError> {
        // Range and integrality are checked by `value`; the cast cannot truncate.
        self.value(name).map(|value| value as u64)
    }
}

fn find_def(name: &str) -> Option<&'static ParamDef> {
    SCHEMA.iter().find(|def| def.name == name)
}
