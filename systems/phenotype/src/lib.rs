#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Phenotype state machine.
//!
//! The oxygen model walks agents between `Normoxic` and `Hypoxic` and into
//! the terminal `Necrotic` state using the field value sampled for the tick.
//! The stemness models retire somatic agents whose generation budget is spent
//! and decide, at division, which side of a stem division keeps stem identity.

use spheroid_core::{
    Command, Component, ConstraintParams, Draws, GeometryParams, ModelKind, NecrosisCause,
    OxygenParams, Params, Phenotype, PopulationView, SimulationContext,
};
use tracing::debug;

/// Transition rule for the oxygen model.
///
/// Thresholds are compared against the sampled value; `Necrotic` wins over
/// `Hypoxic`, so a normoxic agent in a lethal environment dies in one step.
#[must_use]
pub fn oxygen_transition(
    current: Phenotype,
    signal: f64,
    thresholds: &OxygenParams,
) -> Option<Phenotype> {
    match current {
        Phenotype::Normoxic if signal < thresholds.necrotic_threshold => Some(Phenotype::Necrotic),
        Phenotype::Normoxic if signal < thresholds.hypoxic_threshold => Some(Phenotype::Hypoxic),
        Phenotype::Hypoxic if signal < thresholds.necrotic_threshold => Some(Phenotype::Necrotic),
        Phenotype::Hypoxic if signal >= thresholds.recovery_threshold => Some(Phenotype::Normoxic),
        _ => None,
    }
}

/// Phenotypes assigned to both sides of a division.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Differentiation {
    /// Phenotype of the parent after division.
    pub parent: Phenotype,
    /// Phenotype of the child.
    pub child: Phenotype,
}

/// Decides the phenotypes of a dividing agent and its child.
///
/// A stem parent in the stemness model produces a somatic child, unless
/// `P > 0.5` and a draw under `P − 0.5` keeps the child stem. With `P < 0.5`
/// a draw under `0.5 − P` differentiates the parent instead. Exactly one draw
/// is consumed per stem division of that model; no other case draws.
pub fn differentiate(
    model: ModelKind,
    parent: Phenotype,
    stemness: f64,
    draws: &mut Draws,
) -> Differentiation {
    if model != ModelKind::Stemness || parent != Phenotype::Stem {
        return Differentiation {
            parent,
            child: parent,
        };
    }

    let draw = draws.unit();
    let bias = stemness - 0.5;
    if bias > 0.0 && draw < bias {
        Differentiation {
            parent: Phenotype::Stem,
            child: Phenotype::Stem,
        }
    } else if bias < 0.0 && draw < -bias {
        Differentiation {
            parent: Phenotype::Somatic,
            child: Phenotype::Somatic,
        }
    } else {
        Differentiation {
            parent: Phenotype::Stem,
            child: Phenotype::Somatic,
        }
    }
}

/// Environment- and budget-driven phenotype transitions.
#[derive(Debug)]
pub struct PhenotypeController {
    model: ModelKind,
    oxygen: OxygenParams,
    constraints: ConstraintParams,
    geometry: GeometryParams,
}

impl PhenotypeController {
    /// Creates a controller for the configured model.
    #[must_use]
    pub fn new(params: &Params) -> Self {
        Self {
            model: params.model,
            oxygen: params.oxygen,
            constraints: params.constraints,
            geometry: params.geometry,
        }
    }

    fn advance_oxygen(&self, population: &PopulationView, out: &mut Vec<Command>) {
        for agent in population.iter() {
            let Some(signal) = agent.signal else {
                continue;
            };
            let Some(next) = oxygen_transition(agent.phenotype, signal, &self.oxygen) else {
                continue;
            };
            debug!(
                agent = agent.id.get(),
                from = agent.phenotype.label(),
                to = next.label(),
                signal,
                "oxygen transition"
            );
            match next {
                Phenotype::Necrotic => out.push(Command::EnterNecrosis {
                    agent: agent.id,
                    cause: NecrosisCause::Hypoxia,
                    constraints: self.constraints.necrotic,
                }),
                Phenotype::Hypoxic => {
                    out.push(Command::ChangePhenotype {
                        agent: agent.id,
                        phenotype: next,
                        constraints: Some(self.constraints.for_phenotype(next)),
                    });
                    let shrunk = (agent.target.volume * self.oxygen.hypoxic_volume_factor)
                        .max(self.geometry.target_volume_min);
                    if shrunk < agent.target.volume {
                        out.push(Command::SetTargetGeometry {
                            agent: agent.id,
                            target: self.geometry.resize(agent.target, shrunk),
                        });
                    }
                }
                _ => out.push(Command::ChangePhenotype {
                    agent: agent.id,
                    phenotype: next,
                    constraints: Some(self.constraints.for_phenotype(next)),
                }),
            }
        }
    }

    fn advance_lineage(&self, population: &PopulationView, out: &mut Vec<Command>) {
        for agent in population.with_phenotype(Phenotype::Somatic) {
            if agent.traits.generations_left < 0.0 {
                debug!(agent = agent.id.get(), "somatic generation budget exhausted");
                out.push(Command::EnterNecrosis {
                    agent: agent.id,
                    cause: NecrosisCause::Exhaustion,
                    constraints: self.constraints.necrotic,
                });
            }
        }
    }
}

impl Component for PhenotypeController {
    fn name(&self) -> &'static str {
        "phenotype"
    }

    fn advance(
        &mut self,
        _context: &mut SimulationContext,
        population: &PopulationView,
        out: &mut Vec<Command>,
    ) {
        match self.model {
            ModelKind::Oxygen => self.advance_oxygen(population, out),
            ModelKind::Stemness | ModelKind::Neutral => self.advance_lineage(population, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use spheroid_core::{
        AgentId, AgentSnapshot, ConstraintStrengths, DVec3, Geometry, HeritableTraits,
        SimulationConfig, TargetGeometry,
    };

    use super::*;

    fn oxygen_params() -> Params {
        Params::resolve(
            &SimulationConfig::new(ModelKind::Oxygen)
                .with_parameter("O2_Thresh_Hypoxic", 0.08)
                .with_parameter("O2_Thresh_Necrotic", 0.03)
                .with_parameter("Division_Volume", 55.0),
        )
        .expect("oxygen params")
    }

    fn stemness_params() -> Params {
        Params::resolve(
            &SimulationConfig::new(ModelKind::Stemness)
                .with_parameter("P_Init", 0.5)
                .with_parameter("Rho_Init", 3.0)
                .with_parameter("Division_Volume", 25.0),
        )
        .expect("stemness params")
    }

    fn agent(id: u32, phenotype: Phenotype, signal: Option<f64>) -> AgentSnapshot {
        AgentSnapshot {
            id: AgentId::new(id),
            phenotype,
            geometry: Geometry::new(30.0, 45.0, DVec3::new(5.0, 5.0, 5.0)),
            target: TargetGeometry::new(40.0, 56.0),
            constraints: ConstraintStrengths::new(5.0, 1.5),
            traits: HeritableTraits::new(0.5, 3.0),
            division_threshold: None,
            necrosis_onset: None,
            signal,
        }
    }

    fn run(params: &Params, agents: Vec<AgentSnapshot>) -> Vec<Command> {
        let mut controller = PhenotypeController::new(params);
        let mut context = SimulationContext::new(params.clone());
        let mut out = Vec::new();
        controller.advance(&mut context, &PopulationView::from_snapshots(agents), &mut out);
        out
    }

    #[test]
    fn lethal_oxygen_skips_hypoxia() {
        let params = oxygen_params();
        let commands = run(&params, vec![agent(1, Phenotype::Normoxic, Some(0.02))]);
        assert_eq!(
            commands,
            vec![Command::EnterNecrosis {
                agent: AgentId::new(1),
                cause: NecrosisCause::Hypoxia,
                constraints: params.constraints.necrotic,
            }]
        );
    }

    #[test]
    fn low_oxygen_enters_hypoxia_and_shrinks_target() {
        let params = oxygen_params();
        let commands = run(&params, vec![agent(1, Phenotype::Normoxic, Some(0.05))]);
        assert_eq!(commands.len(), 2);
        assert!(matches!(
            commands[0],
            Command::ChangePhenotype {
                phenotype: Phenotype::Hypoxic,
                ..
            }
        ));
        let Command::SetTargetGeometry { target, .. } = commands[1] else {
            panic!("expected a target update, got {:?}", commands[1]);
        };
        assert!((target.volume - 38.0).abs() < 1e-9);
    }

    #[test]
    fn hypoxic_agents_recover_at_threshold() {
        let params = oxygen_params();
        assert_eq!(
            oxygen_transition(Phenotype::Hypoxic, 0.08, &params.oxygen),
            Some(Phenotype::Normoxic)
        );
        assert_eq!(
            oxygen_transition(Phenotype::Hypoxic, 0.05, &params.oxygen),
            None
        );
        assert_eq!(
            oxygen_transition(Phenotype::Normoxic, 0.08, &params.oxygen),
            None
        );
        assert_eq!(
            oxygen_transition(Phenotype::Necrotic, 0.9, &params.oxygen),
            None
        );
    }

    #[test]
    fn agents_without_samples_are_left_alone() {
        let commands = run(&oxygen_params(), vec![agent(1, Phenotype::Normoxic, None)]);
        assert!(commands.is_empty());
    }

    #[test]
    fn exhausted_somatic_agents_die() {
        let params = stemness_params();
        let mut spent = agent(1, Phenotype::Somatic, None);
        spent.traits.generations_left = -1.0;
        let mut last_generation = agent(2, Phenotype::Somatic, None);
        last_generation.traits.generations_left = 0.0;
        let mut stem = agent(3, Phenotype::Stem, None);
        stem.traits.generations_left = -4.0;

        let commands = run(&params, vec![spent, last_generation, stem]);
        assert_eq!(
            commands,
            vec![Command::EnterNecrosis {
                agent: AgentId::new(1),
                cause: NecrosisCause::Exhaustion,
                constraints: params.constraints.necrotic,
            }]
        );
    }

    #[test]
    fn balanced_stemness_always_splits_asymmetrically() {
        let mut draws = Draws::from_seed(5);
        for _ in 0..100 {
            assert_eq!(
                differentiate(ModelKind::Stemness, Phenotype::Stem, 0.5, &mut draws),
                Differentiation {
                    parent: Phenotype::Stem,
                    child: Phenotype::Somatic,
                }
            );
        }
    }

    #[test]
    fn high_stemness_keeps_children_stem_at_expected_rate() {
        let mut draws = Draws::from_seed(11);
        let trials = 20_000;
        let stem_children = (0..trials)
            .filter(|_| {
                differentiate(ModelKind::Stemness, Phenotype::Stem, 0.9, &mut draws).child
                    == Phenotype::Stem
            })
            .count();
        let rate = stem_children as f64 / f64::from(trials);
        assert!((rate - 0.4).abs() < 0.02, "observed stem child rate {rate}");
    }

    #[test]
    fn low_stemness_differentiates_parents() {
        let mut draws = Draws::from_seed(13);
        let trials = 20_000;
        let somatic_parents = (0..trials)
            .filter(|_| {
                differentiate(ModelKind::Stemness, Phenotype::Stem, 0.1, &mut draws).parent
                    == Phenotype::Somatic
            })
            .count();
        let rate = somatic_parents as f64 / f64::from(trials);
        assert!((rate - 0.4).abs() < 0.02, "observed parent loss rate {rate}");
    }

    #[test]
    fn neutral_and_oxygen_offspring_are_clones() {
        let mut draws = Draws::from_seed(1);
        let neutral = differentiate(ModelKind::Neutral, Phenotype::Stem, 0.1, &mut draws);
        assert_eq!(neutral.child, Phenotype::Stem);
        assert_eq!(neutral.parent, Phenotype::Stem);

        let hypoxic = differentiate(ModelKind::Oxygen, Phenotype::Hypoxic, 0.5, &mut draws);
        assert_eq!(hypoxic.child, Phenotype::Hypoxic);
        assert_eq!(draws.consumed(), 0);
    }
}
