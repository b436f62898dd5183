#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Tick scheduler that advances the biological components in a fixed order.
//!
//! Each tick advances the world clock, then lets every component evaluate a
//! fresh population view, applies its commands and feeds the resulting events
//! back to it until it has nothing more to say. The environment field is bound
//! once per tick so every agent reads the same field state. After the last
//! component, telemetry is published and the targets are exported to the
//! geometry engine.

use spheroid_core::{
    AgentId, Command, Component, ConfigError, Counters, Environment, Event, FieldId, FieldSource,
    GeometryEngine, HeritableTraits, Params, Phenotype, SimulationConfig, SimulationContext,
    TargetGeometry, TelemetryReport,
};
use spheroid_system_division::DivisionScheduler;
use spheroid_system_growth::GrowthController;
use spheroid_system_necrosis::NecroticLifecycleManager;
use spheroid_system_phenotype::PhenotypeController;
use spheroid_system_telemetry::Telemetry;
use spheroid_system_treatment::TreatmentModule;
use spheroid_world::{self as world, query, World, WorldSettings};
use tracing::{debug, info_span};

/// Failures surfaced by the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The model reads an environment field but none has been bound.
    #[error("model requires environment field `{0}` but none is bound")]
    UnboundField(String),
}

/// One simulation run: world state, context and the ordered component list.
pub struct Simulation {
    world: World,
    context: SimulationContext,
    components: Vec<Box<dyn Component>>,
    telemetry: Telemetry,
    field: Option<FieldId>,
    tick_events: Vec<Event>,
}

impl Simulation {
    /// Creates a run with the standard component order: phenotype, growth,
    /// division, necrosis and treatment.
    #[must_use]
    pub fn new(params: Params) -> Self {
        let components: Vec<Box<dyn Component>> = vec![
            Box::new(PhenotypeController::new(&params)),
            Box::new(GrowthController::new(&params)),
            Box::new(DivisionScheduler::new(&params)),
            Box::new(NecroticLifecycleManager::new(&params)),
            Box::new(TreatmentModule::new(&params)),
        ];
        Self::with_components(params, components)
    }

    /// Resolves the configuration and creates a run.
    pub fn from_config(config: &SimulationConfig) -> Result<Self, SimulationError> {
        Ok(Self::new(Params::resolve(config)?))
    }

    /// Creates a run with an explicit component order.
    #[must_use]
    pub fn with_components(params: Params, components: Vec<Box<dyn Component>>) -> Self {
        Self {
            world: World::with_settings(WorldSettings::from_params(&params)),
            telemetry: Telemetry::new(params.telemetry_interval),
            context: SimulationContext::new(params),
            components,
            field: None,
            tick_events: Vec::new(),
        }
    }

    /// Resolves the configured environment field on the source.
    pub fn bind_field(&mut self, source: &dyn FieldSource) -> Result<FieldId, SimulationError> {
        let name = &self.context.params().field;
        let field = source
            .resolve(name)
            .ok_or_else(|| ConfigError::MissingField(name.clone()))?;
        self.field = Some(field);
        Ok(field)
    }

    /// Registers an agent created by the engine outside of division.
    ///
    /// The agent receives the seed target volume with a spherical surface, the
    /// constraint strengths of its phenotype and the initial heritable traits.
    pub fn seed_agent(
        &mut self,
        engine: &mut dyn GeometryEngine,
        agent: AgentId,
        phenotype: Phenotype,
    ) -> Vec<Event> {
        let params = self.context.params();
        let volume = params.geometry.clamp_volume(params.geometry.seed_target_volume);
        let command = Command::RegisterAgent {
            agent,
            phenotype,
            target: TargetGeometry::new(volume, params.geometry.spherical_surface(volume)),
            constraints: params.constraints.for_phenotype(phenotype),
            traits: HeritableTraits::new(
                params.lineage.initial_stemness,
                params.lineage.initial_senescence,
            ),
            division_threshold: None,
        };
        let mut events = Vec::new();
        world::apply(&mut self.world, engine, command, &mut events);
        world::export_targets(&self.world, engine);
        events
    }

    /// Advances the simulation by one tick.
    ///
    /// Returns the telemetry report when the tick falls on the publishing
    /// interval.
    pub fn step(
        &mut self,
        engine: &mut dyn GeometryEngine,
        fields: Option<&dyn FieldSource>,
    ) -> Result<Option<TelemetryReport>, SimulationError> {
        let environment = self.environment(fields)?;
        self.tick_events.clear();

        world::apply(&mut self.world, engine, Command::Tick, &mut self.tick_events);
        let tick = query::tick(&self.world);
        self.context.begin_tick(tick);
        self.context.set_domain(engine.dimensions());
        let _span = info_span!("tick", tick = tick.get()).entered();

        for component in &mut self.components {
            let population = query::population(&self.world, engine, environment.as_ref());
            let mut commands = Vec::new();
            component.advance(&mut self.context, &population, &mut commands);

            while !commands.is_empty() {
                debug!(
                    component = component.name(),
                    commands = commands.len(),
                    "applying commands"
                );
                let events = apply_batch(
                    &mut self.world,
                    engine,
                    std::mem::take(&mut commands),
                    self.context.counters_mut(),
                );
                let population = query::population(&self.world, engine, environment.as_ref());
                component.react(&mut self.context, &events, &population, &mut commands);
                self.tick_events.extend(events);
            }
        }

        let population = query::population(&self.world, engine, environment.as_ref());
        let report = self
            .telemetry
            .handle(tick, &population, self.context.counters());
        world::export_targets(&self.world, engine);
        Ok(report)
    }

    fn environment<'a>(
        &self,
        fields: Option<&'a dyn FieldSource>,
    ) -> Result<Option<Environment<'a>>, SimulationError> {
        if !self.context.params().model.uses_field() {
            return Ok(None);
        }
        match (fields, self.field) {
            (Some(source), Some(field)) => Ok(Some(Environment::new(source, field))),
            _ => Err(SimulationError::UnboundField(
                self.context.params().field.clone(),
            )),
        }
    }

    /// World state.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Context holding configuration, counters and draw streams.
    #[must_use]
    pub fn context(&self) -> &SimulationContext {
        &self.context
    }

    /// Telemetry sink with the recorded series.
    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Events produced during the most recent tick, in application order.
    #[must_use]
    pub fn tick_events(&self) -> &[Event] {
        &self.tick_events
    }

    /// Names of the scheduled components in execution order.
    pub fn component_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.components.iter().map(|component| component.name())
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &query::tick(&self.world))
            .field("agents", &query::population_size(&self.world))
            .field("components", &self.component_names().collect::<Vec<_>>())
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

fn apply_batch(
    world: &mut World,
    engine: &mut dyn GeometryEngine,
    commands: Vec<Command>,
    counters: &mut Counters,
) -> Vec<Event> {
    let mut events = Vec::new();
    for command in commands {
        world::apply(world, engine, command, &mut events);
    }
    let rejected = events
        .iter()
        .filter(|event| matches!(event, Event::CommandRejected { .. }))
        .count();
    counters.rejected_commands = counters.rejected_commands.saturating_add(rejected as u64);
    events
}

#[cfg(test)]
mod tests {
    use spheroid_core::{ModelKind, Tick};
    use spheroid_lattice::{OxygenField, RelaxationEngine};

    use super::*;

    fn stemness_config() -> SimulationConfig {
        SimulationConfig::new(ModelKind::Stemness)
            .with_parameter("P_Init", 0.5)
            .with_parameter("Rho_Init", 5.0)
            .with_parameter("Division_Volume", 60.0)
            .with_seed(3)
    }

    #[test]
    fn components_run_in_biological_order() {
        let simulation = Simulation::from_config(&stemness_config()).expect("simulation");
        assert_eq!(
            simulation.component_names().collect::<Vec<_>>(),
            vec!["phenotype", "growth", "division", "necrosis", "treatment"]
        );
    }

    #[test]
    fn missing_required_parameter_fails_before_any_tick() {
        let config = SimulationConfig::new(ModelKind::Oxygen).with_parameter("Division_Volume", 60.0);
        assert!(matches!(
            Simulation::from_config(&config),
            Err(SimulationError::Config(ConfigError::MissingParameter { .. }))
        ));
    }

    #[test]
    fn oxygen_model_requires_a_bound_field() {
        let config = SimulationConfig::new(ModelKind::Oxygen)
            .with_parameter("O2_Thresh_Hypoxic", 0.08)
            .with_parameter("O2_Thresh_Necrotic", 0.03)
            .with_parameter("Division_Volume", 60.0);
        let mut simulation = Simulation::from_config(&config).expect("simulation");
        let mut engine = RelaxationEngine::new(spheroid_core::LatticeDims::new(20, 20, 1));
        assert!(matches!(
            simulation.step(&mut engine, None),
            Err(SimulationError::UnboundField(_))
        ));

        let field = OxygenField::uniform(engine.dimensions(), 0.5);
        let _ = simulation.bind_field(&field).expect("oxygen field");
        assert!(simulation.step(&mut engine, Some(&field)).is_ok());
    }

    #[test]
    fn seeded_agent_grows_and_divides() {
        let mut simulation = Simulation::from_config(&stemness_config()).expect("simulation");
        let mut engine = RelaxationEngine::new(spheroid_core::LatticeDims::new(40, 40, 1));
        let seed = engine.spawn_seed(spheroid_core::DVec3::new(20.0, 20.0, 0.0), 40.0);
        let events = simulation.seed_agent(&mut engine, seed, Phenotype::Stem);
        assert_eq!(events, vec![Event::AgentRegistered { agent: seed }]);

        for _ in 0..200 {
            let _ = simulation.step(&mut engine, None).expect("step");
            engine.relax();
        }
        assert_eq!(query::tick(simulation.world()), Tick::new(200));
        assert!(simulation.context().counters().divisions_total > 0);
        assert!(query::population_size(simulation.world()) > 1);
    }
}
