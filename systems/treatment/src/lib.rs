#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Exogenous killing: constant, periodic pulse and linear-quadratic radiotherapy.
//!
//! Killed agents are sent into the necrotic state rather than removed, so the
//! freezing rules of the world apply to them like to any other necrosis.

use spheroid_core::{
    AgentSnapshot, Command, Component, ConstraintStrengths, DrawStream, Event, NecrosisCause,
    Params, Phenotype, PopulationView, PulseKind, SimulationContext, TargetSelection,
    TherapyParams, TreatmentPlan,
};
use tracing::{debug, info};

/// Applies the configured killing schedule.
#[derive(Debug)]
pub struct TreatmentModule {
    plan: TreatmentPlan,
    therapy: TherapyParams,
    necrotic: ConstraintStrengths,
}

impl TreatmentModule {
    /// Creates the module from resolved parameters.
    #[must_use]
    pub fn new(params: &Params) -> Self {
        Self {
            plan: params.treatment.clone(),
            therapy: params.therapy,
            necrotic: params.constraints.necrotic,
        }
    }

    /// Kill probability of a pulse for one agent. Surgical pulses do not draw.
    #[must_use]
    pub fn pulse_probability(&self, kind: PulseKind, agent: &AgentSnapshot) -> f64 {
        let efficacy = self.therapy.efficacy;
        match kind {
            PulseKind::Uniform | PulseKind::Surgical => efficacy,
            PulseKind::StemProtected if agent.phenotype == Phenotype::Stem => {
                efficacy * self.therapy.stem_protection
            }
            PulseKind::QuiescentProtected
                if agent.pressure() >= self.therapy.pressure_threshold =>
            {
                efficacy * self.therapy.quiescent_protection
            }
            PulseKind::StemProtected | PulseKind::QuiescentProtected => efficacy,
        }
    }

    fn kill(&self, agent: &AgentSnapshot, out: &mut Vec<Command>) {
        out.push(Command::EnterNecrosis {
            agent: agent.id,
            cause: NecrosisCause::Treatment,
            constraints: self.necrotic,
        });
    }

    fn constant(
        &self,
        targets: &TargetSelection,
        context: &mut SimulationContext,
        population: &PopulationView,
        out: &mut Vec<Command>,
    ) {
        let probability = self.therapy.constant_probability();
        let draws = context.draws(DrawStream::Treatment);
        for agent in population.iter().filter(|agent| targets.includes(agent.phenotype)) {
            if draws.chance(probability) {
                self.kill(agent, out);
            }
        }
    }

    fn pulse(
        &self,
        kind: PulseKind,
        context: &mut SimulationContext,
        population: &PopulationView,
        out: &mut Vec<Command>,
    ) {
        let tick = context.tick();
        if tick.get() == 0 || !tick.is_multiple_of(self.therapy.pulse_period) {
            return;
        }
        let living = population.iter().filter(|agent| !agent.phenotype.is_necrotic());
        let before = out.len();
        if kind == PulseKind::Surgical {
            let boundary = self.therapy.region_fraction * f64::from(context.domain().x());
            for agent in living.filter(|agent| agent.geometry.position.x < boundary) {
                self.kill(agent, out);
            }
        } else {
            let draws = context.draws(DrawStream::Treatment);
            for agent in living {
                if draws.chance(self.pulse_probability(kind, agent)) {
                    self.kill(agent, out);
                }
            }
        }
        info!(
            tick = tick.get(),
            kind = ?kind,
            killed = out.len() - before,
            "treatment pulse delivered"
        );
    }

    fn radiotherapy(
        &self,
        targets: &TargetSelection,
        context: &mut SimulationContext,
        population: &PopulationView,
        out: &mut Vec<Command>,
    ) {
        let Some(schedule) = self.therapy.radiotherapy else {
            return;
        };
        let Some(fraction) = schedule.fraction_at(context.tick()) else {
            return;
        };
        let kill_probability = 1.0 - schedule.survival();
        let (draws, counters) = context.draws_and_counters(DrawStream::Treatment);
        let mut exposed = 0_u64;
        let mut killed = 0_u64;
        for agent in population.iter().filter(|agent| targets.includes(agent.phenotype)) {
            exposed += 1;
            if draws.chance(kill_probability) {
                killed += 1;
                self.kill(agent, out);
            }
        }
        let tally = &mut counters.radiation;
        tally.exposed = tally.exposed.saturating_add(exposed);
        tally.killed = tally.killed.saturating_add(killed);
        tally.fractions_delivered = tally.fractions_delivered.saturating_add(1);
        info!(
            fraction = fraction + 1,
            of = schedule.fractions,
            exposed,
            killed,
            observed_survival = ?tally.observed_survival(),
            expected_survival = schedule.survival(),
            "radiotherapy fraction delivered"
        );
    }
}

impl Component for TreatmentModule {
    fn name(&self) -> &'static str {
        "treatment"
    }

    fn advance(
        &mut self,
        context: &mut SimulationContext,
        population: &PopulationView,
        out: &mut Vec<Command>,
    ) {
        match &self.plan {
            TreatmentPlan::None => {}
            TreatmentPlan::Constant { targets } => {
                self.constant(targets, context, population, out);
            }
            TreatmentPlan::Pulse { kind } => self.pulse(*kind, context, population, out),
            TreatmentPlan::LinearQuadratic { targets } => {
                self.radiotherapy(targets, context, population, out);
            }
        }
    }

    fn react(
        &mut self,
        context: &mut SimulationContext,
        events: &[Event],
        _population: &PopulationView,
        _out: &mut Vec<Command>,
    ) {
        for event in events {
            if let Event::AgentNecrotic {
                agent,
                cause: NecrosisCause::Treatment,
                ..
            } = event
            {
                debug!(agent = agent.get(), "agent killed by treatment");
                context.counters_mut().record_kill();
            }
        }
    }
}
