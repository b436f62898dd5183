#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Target geometry growth for living agents.

use spheroid_core::{
    Command, Component, GeometryParams, GrowthLaw, GrowthParams, Params, PopulationView,
    SimulationContext,
};

/// Volume increment for one tick under the growth law.
#[must_use]
pub fn increment(law: GrowthLaw, rate: f64, pressure: f64, threshold: f64) -> f64 {
    match law {
        GrowthLaw::Constant => rate,
        GrowthLaw::PressureLimited if pressure < threshold => rate,
        GrowthLaw::PressureLimited => 0.0,
        GrowthLaw::ContactInhibited => rate / (1.0 + pressure.max(0.0) / threshold),
    }
}

/// Advances target volume and surface for every growing agent.
#[derive(Debug)]
pub struct GrowthController {
    growth: GrowthParams,
    geometry: GeometryParams,
}

impl GrowthController {
    /// Creates a controller from resolved parameters.
    #[must_use]
    pub fn new(params: &Params) -> Self {
        Self {
            growth: params.growth,
            geometry: params.geometry,
        }
    }
}

impl Component for GrowthController {
    fn name(&self) -> &'static str {
        "growth"
    }

    fn advance(
        &mut self,
        _context: &mut SimulationContext,
        population: &PopulationView,
        out: &mut Vec<Command>,
    ) {
        for agent in population.iter() {
            if agent.phenotype.is_necrotic() {
                continue;
            }
            let delta = increment(
                self.growth.law,
                self.growth.rate(agent.phenotype),
                agent.pressure(),
                self.growth.pressure_threshold,
            );
            let grown = (agent.target.volume + delta).min(self.geometry.target_volume_max);
            if grown <= agent.target.volume {
                continue;
            }
            out.push(Command::SetTargetGeometry {
                agent: agent.id,
                target: self.geometry.resize(agent.target, grown),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use spheroid_core::{
        AgentId, AgentSnapshot, ConstraintStrengths, DVec3, Geometry, HeritableTraits, ModelKind,
        Phenotype, SimulationConfig, SurfaceLaw, TargetGeometry,
    };

    use super::*;

    fn params(model: ModelKind, law: Option<GrowthLaw>) -> Params {
        let mut config = SimulationConfig::new(model)
            .with_parameter("O2_Thresh_Hypoxic", 0.08)
            .with_parameter("O2_Thresh_Necrotic", 0.03)
            .with_parameter("P_Init", 0.5)
            .with_parameter("Rho_Init", 5.0)
            .with_parameter("Division_Volume", 55.0)
            .with_parameter("Growth_Normoxic", 2.0)
            .with_parameter("Growth_Hypoxic", 0.0)
            .with_parameter("TargetVolume_Max", 80.0);
        config.growth_law = law;
        Params::resolve(&config).expect("params resolve")
    }

    fn agent(id: u32, phenotype: Phenotype, volume: f64, target: f64) -> AgentSnapshot {
        AgentSnapshot {
            id: AgentId::new(id),
            phenotype,
            geometry: Geometry::new(volume, 40.0, DVec3::ZERO),
            target: TargetGeometry::new(target, 50.0),
            constraints: ConstraintStrengths::new(5.0, 1.5),
            traits: HeritableTraits::new(0.5, 5.0),
            division_threshold: None,
            necrosis_onset: None,
            signal: Some(0.5),
        }
    }

    fn grow(params: &Params, agents: Vec<AgentSnapshot>) -> Vec<Command> {
        let mut controller = GrowthController::new(params);
        let mut context = SimulationContext::new(params.clone());
        let mut out = Vec::new();
        controller.advance(&mut context, &PopulationView::from_snapshots(agents), &mut out);
        out
    }

    #[test]
    fn normoxic_agents_grow_by_rate_with_spherical_surface() {
        let params = params(ModelKind::Oxygen, None);
        let commands = grow(&params, vec![agent(1, Phenotype::Normoxic, 40.0, 40.0)]);
        let expected = params.geometry.spherical_surface(42.0);
        assert_eq!(
            commands,
            vec![Command::SetTargetGeometry {
                agent: AgentId::new(1),
                target: TargetGeometry::new(42.0, expected),
            }]
        );
    }

    #[test]
    fn growth_is_capped_at_maximum() {
        let params = params(ModelKind::Oxygen, None);
        let commands = grow(
            &params,
            vec![
                agent(1, Phenotype::Normoxic, 79.0, 79.0),
                agent(2, Phenotype::Normoxic, 80.0, 80.0),
            ],
        );
        assert_eq!(commands.len(), 1);
        let Command::SetTargetGeometry { target, .. } = commands[0] else {
            panic!("expected a target update");
        };
        assert_eq!(target.volume, 80.0);
    }

    #[test]
    fn necrotic_and_zero_rate_agents_do_not_grow() {
        let params = params(ModelKind::Oxygen, None);
        let commands = grow(
            &params,
            vec![
                agent(1, Phenotype::Necrotic, 30.0, 30.0),
                agent(2, Phenotype::Hypoxic, 30.0, 30.0),
            ],
        );
        assert!(commands.is_empty());
    }

    #[test]
    fn pressure_limited_growth_stops_under_compression() {
        let params = params(ModelKind::Stemness, None);
        // pressure = 2 * (40 - 30) * 5 = 100, above the default threshold of 30.
        let compressed = agent(1, Phenotype::Stem, 30.0, 40.0);
        let relaxed = agent(2, Phenotype::Stem, 40.0, 40.0);
        let commands = grow(&params, vec![compressed, relaxed]);
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            commands[0],
            Command::SetTargetGeometry { agent, .. } if agent == AgentId::new(2)
        ));
    }

    #[test]
    fn contact_inhibition_damps_growth() {
        assert_eq!(increment(GrowthLaw::ContactInhibited, 2.0, 0.0, 30.0), 2.0);
        assert_eq!(increment(GrowthLaw::ContactInhibited, 2.0, 30.0, 30.0), 1.0);
        assert_eq!(increment(GrowthLaw::PressureLimited, 2.0, 30.0, 30.0), 0.0);
        assert_eq!(increment(GrowthLaw::Constant, 2.0, 300.0, 30.0), 2.0);
    }

    #[test]
    fn linearized_surface_follows_volume() {
        let mut params = params(ModelKind::Oxygen, Some(GrowthLaw::Constant));
        params.geometry.surface_law = SurfaceLaw::Linearized;
        let commands = grow(&params, vec![agent(1, Phenotype::Normoxic, 40.0, 40.0)]);
        let Command::SetTargetGeometry { target, .. } = commands[0] else {
            panic!("expected a target update");
        };
        let expected = 50.0 + (2.0 / 3.0) * (50.0 / 40.0) * 2.0;
        assert!((target.surface - expected).abs() < 1e-12);
    }
}
