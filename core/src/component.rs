//! The common contract every scheduled biological component implements.

use crate::{Command, Event, PopulationView, SimulationContext};

/// A biological component advanced once per tick by the scheduler.
///
/// The context carries the tick, configuration, counters and draw streams.
/// The population view carries each agent's state and its environment sample
/// for the tick. Components never mutate agents directly; every change is a
/// [`Command`] applied by the world after the component returns.
pub trait Component {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Evaluates the population for the current tick.
    fn advance(
        &mut self,
        context: &mut SimulationContext,
        population: &PopulationView,
        out: &mut Vec<Command>,
    );

    /// Reacts to the events produced by this component's own commands.
    ///
    /// Called with a fresh view after each batch is applied, until the
    /// component emits no further commands.
    fn react(
        &mut self,
        _context: &mut SimulationContext,
        _events: &[Event],
        _population: &PopulationView,
        _out: &mut Vec<Command>,
    ) {
    }
}
