#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Necrotic lifecycle: shrinkage, lifetime expiry and removal.
//!
//! An agent is due for removal once its necrotic age reaches the lifetime or
//! its actual volume has collapsed to the minimum, whichever comes first.

use spheroid_core::{
    AgentSnapshot, Command, Component, ConstraintStrengths, DrawStream, Event, GeometryParams,
    NecrosisParams, Params, Phenotype, PopulationView, ShrinkLaw, SimulationContext, Tick,
};
use tracing::trace;

/// Drives necrotic agents from onset to removal.
#[derive(Debug)]
pub struct NecroticLifecycleManager {
    necrosis: NecrosisParams,
    geometry: GeometryParams,
    constraints: ConstraintStrengths,
}

impl NecroticLifecycleManager {
    /// Creates a manager from resolved parameters.
    #[must_use]
    pub fn new(params: &Params) -> Self {
        Self {
            necrosis: params.necrosis,
            geometry: params.geometry,
            constraints: params.constraints.necrotic,
        }
    }

    /// Target volume after one tick of shrinkage, floored at the minimum.
    #[must_use]
    pub fn shrunk_volume(&self, volume: f64) -> f64 {
        let shrunk = match self.necrosis.shrink_law {
            ShrinkLaw::Absolute => volume - self.necrosis.shrink_rate,
            ShrinkLaw::Proportional => volume * (1.0 - self.necrosis.shrink_rate),
        };
        shrunk.max(self.necrosis.min_volume).min(volume)
    }

    /// Whether a necrotic agent has reached its lifetime or collapsed to the minimum volume.
    #[must_use]
    pub fn is_due(&self, agent: &AgentSnapshot, now: Tick) -> bool {
        let Some(onset) = agent.necrosis_onset else {
            return false;
        };
        now.since(onset) >= self.necrosis.lifetime
            || agent.geometry.volume <= self.necrosis.min_volume
    }

    fn shrink(&self, agent: &AgentSnapshot, out: &mut Vec<Command>) {
        let volume = self.shrunk_volume(agent.target.volume);
        if volume < agent.target.volume {
            out.push(Command::SetTargetGeometry {
                agent: agent.id,
                target: self.geometry.resize(agent.target, volume),
            });
        }
        if agent.constraints != self.constraints {
            out.push(Command::SetConstraints {
                agent: agent.id,
                constraints: self.constraints,
            });
        }
    }
}

impl Component for NecroticLifecycleManager {
    fn name(&self) -> &'static str {
        "necrosis"
    }

    fn advance(
        &mut self,
        context: &mut SimulationContext,
        population: &PopulationView,
        out: &mut Vec<Command>,
    ) {
        let now = context.tick();
        let draws = context.draws(DrawStream::Necrosis);
        for agent in population.with_phenotype(Phenotype::Necrotic) {
            if agent.necrosis_onset.is_none() {
                out.push(Command::StampNecrosisOnset { agent: agent.id });
            } else if self.is_due(agent, now) {
                if draws.chance(self.necrosis.removal_probability) {
                    out.push(Command::Remove { agent: agent.id });
                } else {
                    trace!(agent = agent.id.get(), "removal deferred, lifetime re-armed");
                    out.push(Command::RearmNecrosisOnset { agent: agent.id });
                }
                continue;
            }
            self.shrink(agent, out);
        }
    }

    fn react(
        &mut self,
        context: &mut SimulationContext,
        events: &[Event],
        _population: &PopulationView,
        _out: &mut Vec<Command>,
    ) {
        let counters = context.counters_mut();
        for event in events {
            match event {
                Event::AgentRemoved { .. } => {
                    counters.removals_total = counters.removals_total.saturating_add(1);
                }
                Event::RemovalFailed { .. } => {
                    counters.removal_failures = counters.removal_failures.saturating_add(1);
                }
                _ => {}
            }
        }
    }
}
