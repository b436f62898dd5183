//! Simulation context threaded through every component call.

use crate::{DrawService, DrawStream, Draws, LatticeDims, Params, Tick};

/// Cumulative radiotherapy exposure used to validate the LQ model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RadiationTally {
    /// Agent exposures summed over every delivered fraction.
    pub exposed: u64,
    /// Agents killed summed over every delivered fraction.
    pub killed: u64,
    /// Fractions delivered so far.
    pub fractions_delivered: u32,
}

impl RadiationTally {
    /// `(exposed − killed) / exposed`, or `None` before any exposure.
    #[must_use]
    pub fn observed_survival(&self) -> Option<f64> {
        if self.exposed == 0 {
            return None;
        }
        let survivors = self.exposed.saturating_sub(self.killed);
        Some(survivors as f64 / self.exposed as f64)
    }
}

/// Run-wide and per-tick counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    /// Mutations applied since the start of the run.
    pub mutations_total: u64,
    /// Mutations applied during the current tick.
    pub mutations_this_tick: u64,
    /// Mutation attempts vetoed by the legality check.
    pub mutations_vetoed: u64,
    /// Mutation attempts that found no partner.
    pub mutations_unpaired: u64,
    /// Divisions completed since the start of the run.
    pub divisions_total: u64,
    /// Divisions completed during the current tick.
    pub divisions_this_tick: u64,
    /// Division primitive failures.
    pub division_failures: u64,
    /// Treatment kills since the start of the run.
    pub kills_total: u64,
    /// Treatment kills during the current tick.
    pub kills_this_tick: u64,
    /// Agents removed by the removal primitive.
    pub removals_total: u64,
    /// Removal primitive failures.
    pub removal_failures: u64,
    /// Commands refused by the world.
    pub rejected_commands: u64,
    /// Radiotherapy exposure.
    pub radiation: RadiationTally,
}

impl Counters {
    /// Resets the per-tick counters.
    pub fn begin_tick(&mut self) {
        self.mutations_this_tick = 0;
        self.divisions_this_tick = 0;
        self.kills_this_tick = 0;
    }

    /// Records an applied mutation.
    pub fn record_mutation(&mut self) {
        self.mutations_total = self.mutations_total.saturating_add(1);
        self.mutations_this_tick = self.mutations_this_tick.saturating_add(1);
    }

    /// Records a completed division.
    pub fn record_division(&mut self) {
        self.divisions_total = self.divisions_total.saturating_add(1);
        self.divisions_this_tick = self.divisions_this_tick.saturating_add(1);
    }

    /// Records a treatment kill.
    pub fn record_kill(&mut self) {
        self.kills_total = self.kills_total.saturating_add(1);
        self.kills_this_tick = self.kills_this_tick.saturating_add(1);
    }
}

/// Explicit owner of configuration, counters and randomness for one run.
#[derive(Clone, Debug)]
pub struct SimulationContext {
    tick: Tick,
    domain: LatticeDims,
    params: Params,
    draws: DrawService,
    counters: Counters,
}

impl SimulationContext {
    /// Creates a context whose draw streams are seeded from `params.seed`.
    #[must_use]
    pub fn new(params: Params) -> Self {
        Self {
            tick: Tick::ZERO,
            domain: LatticeDims::new(1, 1, 1),
            draws: DrawService::new(params.seed),
            params,
            counters: Counters::default(),
        }
    }

    /// Starts a tick: records the tick number and clears per-tick counters.
    pub fn begin_tick(&mut self, tick: Tick) {
        self.tick = tick;
        self.counters.begin_tick();
    }

    /// Current tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Lattice the population lives on.
    #[must_use]
    pub const fn domain(&self) -> LatticeDims {
        self.domain
    }

    /// Records the lattice the population lives on.
    pub fn set_domain(&mut self, domain: LatticeDims) {
        self.domain = domain;
    }

    /// Resolved parameters.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Read-only counters.
    #[must_use]
    pub const fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Mutable counters.
    pub fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    /// A component's draw stream.
    pub fn draws(&mut self, stream: DrawStream) -> &mut Draws {
        self.draws.stream(stream)
    }

    /// A component's draw stream together with the counters it updates.
    pub fn draws_and_counters(&mut self, stream: DrawStream) -> (&mut Draws, &mut Counters) {
        (self.draws.stream(stream), &mut self.counters)
    }
}
