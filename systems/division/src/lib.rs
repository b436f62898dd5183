#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Division scheduling and post-division partition.
//!
//! Each tick the scheduler selects eligible agents, gates them with a draw
//! against the phenotype/environment probability table and requests the
//! division primitive. Nothing else changes until the engine reports the new
//! child: then the parent's target geometry is split exactly in half between
//! the pair, the offspring phenotypes are decided, somatic pairs spend a
//! generation and the agents that actually divided are mutated. A failed
//! division leaves the agent untouched for the retry on the next tick.

use std::collections::BTreeSet;

use spheroid_core::{
    AgentId, AgentSnapshot, Command, Component, DivisionBasis, DivisionParams, DrawStream, Event,
    GeometryParams, ModelKind, Params, Phenotype, PopulationView, SimulationContext,
};
use spheroid_system_mutation::MutationEngine;
use spheroid_system_phenotype::differentiate;
use tracing::debug;

/// Selects, gates and partitions divisions.
#[derive(Debug)]
pub struct DivisionScheduler {
    model: ModelKind,
    division: DivisionParams,
    geometry: GeometryParams,
    oxygen_gate: Option<f64>,
    mutation: MutationEngine,
}

impl DivisionScheduler {
    /// Creates a scheduler from resolved parameters.
    #[must_use]
    pub fn new(params: &Params) -> Self {
        Self {
            model: params.model,
            division: params.division.clone(),
            geometry: params.geometry,
            oxygen_gate: params
                .model
                .uses_field()
                .then_some(params.oxygen.division_minimum),
            mutation: MutationEngine::new(params),
        }
    }

    /// Reports whether an agent may be considered for division this tick.
    #[must_use]
    pub fn is_eligible(&self, agent: &AgentSnapshot) -> bool {
        if agent.phenotype.is_necrotic() {
            return false;
        }
        let volume = match self.division.basis {
            DivisionBasis::Actual => agent.geometry.volume,
            DivisionBasis::Target => agent.target.volume,
        };
        let threshold = agent
            .division_threshold
            .unwrap_or(self.division.volume_threshold);
        if volume <= threshold {
            return false;
        }
        match (self.oxygen_gate, agent.signal) {
            (Some(gate), Some(signal)) => signal >= gate,
            _ => true,
        }
    }

    fn partition(
        &self,
        context: &mut SimulationContext,
        parent: AgentId,
        child: AgentId,
        population: &PopulationView,
        out: &mut Vec<Command>,
    ) {
        let Some(snapshot) = population.get(parent) else {
            return;
        };
        let half = self
            .geometry
            .resize(snapshot.target, snapshot.target.volume / 2.0);
        for agent in [parent, child] {
            out.push(Command::SetTargetGeometry { agent, target: half });
        }

        let outcome = differentiate(
            self.model,
            snapshot.phenotype,
            snapshot.traits.stemness,
            context.draws(DrawStream::Phenotype),
        );
        for (agent, phenotype) in [(parent, outcome.parent), (child, outcome.child)] {
            if phenotype != snapshot.phenotype {
                out.push(Command::ChangePhenotype {
                    agent,
                    phenotype,
                    constraints: None,
                });
            }
        }

        // The child cloned the parent's budget, so both sides spend it.
        if snapshot.phenotype == Phenotype::Somatic {
            out.extend([parent, child].map(|agent| Command::SpendGeneration { agent }));
        }
    }

    /// Mutates the parents of this batch's divisions.
    ///
    /// Children are left out of the partner pool: a lone divider has no
    /// partner even though its clone now exists.
    fn mutate_divided(
        &self,
        context: &mut SimulationContext,
        divided: &[(AgentId, AgentId)],
        population: &PopulationView,
        out: &mut Vec<Command>,
    ) {
        let children: BTreeSet<AgentId> = divided.iter().map(|(_, child)| *child).collect();
        let founders = PopulationView::from_snapshots(
            population
                .iter()
                .filter(|agent| !children.contains(&agent.id))
                .cloned()
                .collect(),
        );
        let parents: Vec<AgentId> = divided.iter().map(|(parent, _)| *parent).collect();

        let (draws, counters) = context.draws_and_counters(DrawStream::Mutation);
        let summary = self
            .mutation
            .mutate(&parents, &founders, draws, counters, out);
        debug!(
            divided = parents.len(),
            applied = summary.applied,
            vetoed = summary.vetoed,
            unpaired = summary.unpaired,
            "division cohort mutated"
        );
    }
}

impl Component for DivisionScheduler {
    fn name(&self) -> &'static str {
        "division"
    }

    fn advance(
        &mut self,
        context: &mut SimulationContext,
        population: &PopulationView,
        out: &mut Vec<Command>,
    ) {
        if context.tick() < self.division.start_tick {
            return;
        }
        let capacity = self
            .division
            .max_population
            .saturating_sub(population.living());
        if capacity == 0 {
            return;
        }

        let mut dividing: Vec<AgentId> = Vec::new();
        let draws = context.draws(DrawStream::Division);
        for agent in population.iter().filter(|agent| self.is_eligible(agent)) {
            let probability = self
                .division
                .table
                .probability(agent.phenotype, agent.signal);
            if draws.chance(probability) {
                dividing.push(agent.id);
                if dividing.len() == capacity {
                    break;
                }
            }
        }
        if !dividing.is_empty() {
            debug!(requested = dividing.len(), "division cohort selected");
        }
        out.extend(dividing.into_iter().map(|agent| Command::Divide { agent }));
    }

    fn react(
        &mut self,
        context: &mut SimulationContext,
        events: &[Event],
        population: &PopulationView,
        out: &mut Vec<Command>,
    ) {
        let mut divided = Vec::new();
        for event in events {
            match event {
                Event::AgentDivided { parent, child } => {
                    context.counters_mut().record_division();
                    self.partition(context, *parent, *child, population, out);
                    divided.push((*parent, *child));
                }
                Event::DivisionFailed { .. } => {
                    let counters = context.counters_mut();
                    counters.division_failures = counters.division_failures.saturating_add(1);
                }
                _ => {}
            }
        }
        if !divided.is_empty() {
            self.mutate_divided(context, &divided, population, out);
        }
    }
}
