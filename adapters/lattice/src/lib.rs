#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Reference collaborators for running the core without an external solver.
//!
//! [`RelaxationEngine`] relaxes each agent's actual geometry toward its
//! published targets at a rate set by the constraint strengths, and
//! [`OxygenField`] serves a radially depleted oxygen field recomputed from the
//! current spheroid extent.

mod field;

use std::collections::{BTreeMap, BTreeSet};

use glam::DVec3;
use spheroid_core::{
    AgentId, DivisionFailure, EngineTargets, Geometry, GeometryEngine, LatticeDims,
};
use tracing::trace;

pub use field::OxygenField;

/// Fraction of the remaining gap closed per unit constraint strength and tick.
const RELAXATION_GAIN: f64 = 0.1;

/// `(36π)^(1/3)`, the surface of a unit-volume sphere.
const SPHERE_COEFFICIENT: f64 = 4.835_975_862_049_408;

#[derive(Clone, Copy, Debug)]
struct Cell {
    geometry: Geometry,
    targets: Option<EngineTargets>,
}

/// Deterministic stand-in for a lattice energy minimiser.
#[derive(Clone, Debug)]
pub struct RelaxationEngine {
    dimensions: LatticeDims,
    cells: BTreeMap<AgentId, Cell>,
    next_id: u32,
    pending_division_failures: u32,
    sticky: BTreeSet<AgentId>,
}

impl RelaxationEngine {
    /// Creates an empty engine on the lattice.
    #[must_use]
    pub fn new(dimensions: LatticeDims) -> Self {
        Self {
            dimensions,
            cells: BTreeMap::new(),
            next_id: 0,
            pending_division_failures: 0,
            sticky: BTreeSet::new(),
        }
    }

    /// Places a spherical agent and returns its identifier.
    pub fn spawn_seed(&mut self, position: DVec3, volume: f64) -> AgentId {
        let agent = self.allocate();
        let geometry = Geometry::new(volume, sphere_surface(volume), self.confine(position));
        let _ = self.cells.insert(
            agent,
            Cell {
                geometry,
                targets: None,
            },
        );
        agent
    }

    /// Moves every agent's actual geometry toward its targets by one step.
    pub fn relax(&mut self) {
        for cell in self.cells.values_mut() {
            let Some(targets) = cell.targets else {
                continue;
            };
            let volume_gain = (targets.constraints.volume() * RELAXATION_GAIN).min(1.0);
            let surface_gain = (targets.constraints.surface() * RELAXATION_GAIN).min(1.0);
            let geometry = &mut cell.geometry;
            geometry.volume += (targets.target.volume - geometry.volume) * volume_gain;
            geometry.surface += (targets.target.surface - geometry.surface) * surface_gain;
        }
    }

    /// Overrides an agent's actual geometry.
    pub fn set_geometry(&mut self, agent: AgentId, geometry: Geometry) {
        if let Some(cell) = self.cells.get_mut(&agent) {
            cell.geometry = geometry;
        }
    }

    /// Makes the next division request fail.
    pub fn fail_next_division(&mut self) {
        self.pending_division_failures = self.pending_division_failures.saturating_add(1);
    }

    /// Makes removal of the agent fail until [`Self::release`] is called.
    pub fn fail_removal(&mut self, agent: AgentId) {
        let _ = self.sticky.insert(agent);
    }

    /// Allows the agent to be removed again.
    pub fn release(&mut self, agent: AgentId) {
        let _ = self.sticky.remove(&agent);
    }

    /// Targets last published for the agent.
    #[must_use]
    pub fn targets(&self, agent: AgentId) -> Option<EngineTargets> {
        self.cells.get(&agent).and_then(|cell| cell.targets)
    }

    /// Agents currently held by the engine with their geometry.
    pub fn agents(&self) -> impl Iterator<Item = (AgentId, Geometry)> + '_ {
        self.cells.iter().map(|(id, cell)| (*id, cell.geometry))
    }

    /// Number of agents held by the engine.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Reports whether the engine holds no agents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn allocate(&mut self) -> AgentId {
        self.next_id = self.next_id.saturating_add(1);
        AgentId::new(self.next_id)
    }

    fn confine(&self, position: DVec3) -> DVec3 {
        let upper = DVec3::new(
            f64::from(self.dimensions.x().saturating_sub(1)),
            f64::from(self.dimensions.y().saturating_sub(1)),
            f64::from(self.dimensions.z().saturating_sub(1)),
        );
        position.clamp(DVec3::ZERO, upper)
    }
}

impl GeometryEngine for RelaxationEngine {
    fn dimensions(&self) -> LatticeDims {
        self.dimensions
    }

    fn geometry(&self, agent: AgentId) -> Option<Geometry> {
        self.cells.get(&agent).map(|cell| cell.geometry)
    }

    fn divide(&mut self, agent: AgentId) -> Result<AgentId, DivisionFailure> {
        if self.pending_division_failures > 0 {
            self.pending_division_failures -= 1;
            return Err(DivisionFailure {
                agent,
                reason: "scripted failure".to_owned(),
            });
        }
        let Some(parent) = self.cells.get(&agent).copied() else {
            return Err(DivisionFailure {
                agent,
                reason: "unknown agent".to_owned(),
            });
        };

        let child = self.allocate();
        let volume = parent.geometry.volume / 2.0;
        let surface = sphere_surface(volume);
        let radius = (3.0 * volume / (4.0 * std::f64::consts::PI)).cbrt();
        let offset = split_axis(child, self.dimensions) * radius;
        let position = parent.geometry.position;

        let parent_geometry = Geometry::new(volume, surface, self.confine(position - offset));
        let child_geometry = Geometry::new(volume, surface, self.confine(position + offset));
        if let Some(cell) = self.cells.get_mut(&agent) {
            cell.geometry = parent_geometry;
        }
        let _ = self.cells.insert(
            child,
            Cell {
                geometry: child_geometry,
                targets: parent.targets,
            },
        );
        trace!(parent = agent.get(), child = child.get(), "agent split");
        Ok(child)
    }

    fn remove(&mut self, agent: AgentId) -> bool {
        if self.sticky.contains(&agent) {
            return false;
        }
        self.cells.remove(&agent).is_some()
    }

    fn assign(&mut self, agent: AgentId, targets: EngineTargets) {
        if let Some(cell) = self.cells.get_mut(&agent) {
            cell.targets = Some(targets);
        }
    }
}

fn sphere_surface(volume: f64) -> f64 {
    SPHERE_COEFFICIENT * volume.max(0.0).powf(2.0 / 3.0)
}

/// Unit split direction derived from the child identifier with the golden angle.
fn split_axis(child: AgentId, dimensions: LatticeDims) -> DVec3 {
    let angle = f64::from(child.get()) * 2.399_963_229_728_653;
    if dimensions.z() > 1 {
        let z = 1.0 - 2.0 * ((f64::from(child.get()) * 0.618_033_988_749_895) % 1.0);
        let ring = (1.0 - z * z).max(0.0).sqrt();
        DVec3::new(ring * angle.cos(), ring * angle.sin(), z)
    } else {
        DVec3::new(angle.cos(), angle.sin(), 0.0)
    }
}

#[cfg(test)]
mod tests {
    use spheroid_core::{ConstraintStrengths, Phenotype, TargetGeometry};

    use super::*;

    fn engine() -> RelaxationEngine {
        RelaxationEngine::new(LatticeDims::new(50, 50, 1))
    }

    #[test]
    fn relaxation_converges_to_targets() {
        let mut engine = engine();
        let agent = engine.spawn_seed(DVec3::new(25.0, 25.0, 0.0), 20.0);
        engine.assign(
            agent,
            EngineTargets {
                phenotype: Phenotype::Normoxic,
                target: TargetGeometry::new(40.0, 56.0),
                constraints: ConstraintStrengths::new(5.0, 1.5),
            },
        );
        for _ in 0..40 {
            engine.relax();
        }
        let geometry = engine.geometry(agent).expect("agent");
        assert!((geometry.volume - 40.0).abs() < 1e-6);
        assert!((geometry.surface - 56.0).abs() < 0.1);
    }

    #[test]
    fn division_splits_volume_and_separates_positions() {
        let mut engine = engine();
        let parent = engine.spawn_seed(DVec3::new(25.0, 25.0, 0.0), 60.0);
        let child = engine.divide(parent).expect("division");

        let a = engine.geometry(parent).expect("parent");
        let b = engine.geometry(child).expect("child");
        assert_eq!(a.volume + b.volume, 60.0);
        assert!(a.position.distance(b.position) > 0.0);
        assert_eq!(a.position.z, 0.0);
    }

    #[test]
    fn scripted_failures_are_reported() {
        let mut engine = engine();
        let agent = engine.spawn_seed(DVec3::ZERO, 30.0);

        engine.fail_next_division();
        assert!(engine.divide(agent).is_err());
        assert!(engine.divide(agent).is_ok());

        engine.fail_removal(agent);
        assert!(!engine.remove(agent));
        engine.release(agent);
        assert!(engine.remove(agent));
        assert!(engine.geometry(agent).is_none());
    }

    #[test]
    fn positions_stay_on_the_lattice() {
        let mut engine = engine();
        let agent = engine.spawn_seed(DVec3::new(-4.0, 80.0, 3.0), 30.0);
        let position = engine.geometry(agent).expect("agent").position;
        assert_eq!(position, DVec3::new(0.0, 49.0, 0.0));
    }
}
