//! Contract of the external geometry solver.

use crate::{AgentId, ConstraintStrengths, Geometry, LatticeDims, Phenotype, TargetGeometry};

/// Failure reported by the division primitive. The agent is retried on a later tick.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("division of agent {agent} failed: {reason}")]
pub struct DivisionFailure {
    /// Agent whose division failed.
    pub agent: AgentId,
    /// Engine-provided explanation.
    pub reason: String,
}

/// Per-agent values the geometry solver consumes in its energy function.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineTargets {
    /// Phenotype label.
    pub phenotype: Phenotype,
    /// Target volume and surface.
    pub target: TargetGeometry,
    /// Constraint strengths.
    pub constraints: ConstraintStrengths,
}

/// Services the core requires from the geometry solver.
pub trait GeometryEngine {
    /// Lattice the agents live on.
    fn dimensions(&self) -> LatticeDims;

    /// Current actual geometry of an agent, if the engine knows it.
    fn geometry(&self, agent: AgentId) -> Option<Geometry>;

    /// Splits an agent, returning the identifier allocated to the child.
    fn divide(&mut self, agent: AgentId) -> Result<AgentId, DivisionFailure>;

    /// Removes an agent. `false` means the engine could not remove it this tick.
    fn remove(&mut self, agent: AgentId) -> bool;

    /// Publishes the core-owned targets for an agent.
    fn assign(&mut self, agent: AgentId, targets: EngineTargets);
}
