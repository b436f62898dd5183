#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Conservation-law pairwise mutation of heritable traits.
//!
//! A mutation moves `delta = |N(0, amplitude)|` of a trait from one agent to
//! another, so the pair's sum is unchanged. Partners come from the dividing
//! cohort, or from every live agent of the mutating phenotype when the cohort
//! holds a single agent. Transfers that would push either side out of bounds
//! are vetoed outright and never repicked.

use std::collections::BTreeMap;

use spheroid_core::{
    AgentId, Command, Counters, Draws, HeritableTraits, LineageParams, Params, Phenotype,
    PopulationView, TraitKind,
};
use tracing::debug;

/// Tally of one cohort's mutation attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MutationSummary {
    /// Transfers emitted.
    pub applied: u32,
    /// Attempts rejected by the legality check.
    pub vetoed: u32,
    /// Attempts without an eligible partner.
    pub unpaired: u32,
}

/// Pairwise mutation engine invoked by the division scheduler.
#[derive(Debug)]
pub struct MutationEngine {
    lineage: LineageParams,
    phenotype: Phenotype,
}

impl MutationEngine {
    /// Creates an engine mutating stem agents with the configured settings.
    #[must_use]
    pub fn new(params: &Params) -> Self {
        Self {
            lineage: params.lineage,
            phenotype: Phenotype::Stem,
        }
    }

    /// Attempts one mutation per trait for every dividing agent of the mutating phenotype.
    ///
    /// Later attempts in the same cohort observe the effect of earlier transfers.
    pub fn mutate(
        &self,
        dividing: &[AgentId],
        population: &PopulationView,
        draws: &mut Draws,
        counters: &mut Counters,
        out: &mut Vec<Command>,
    ) -> MutationSummary {
        let cohort: Vec<AgentId> = dividing
            .iter()
            .copied()
            .filter(|agent| {
                population
                    .get(*agent)
                    .is_some_and(|snapshot| snapshot.phenotype == self.phenotype)
            })
            .collect();
        let pool: Vec<AgentId> = population
            .with_phenotype(self.phenotype)
            .map(|snapshot| snapshot.id)
            .collect();
        let mut working: BTreeMap<AgentId, HeritableTraits> = population
            .with_phenotype(self.phenotype)
            .map(|snapshot| (snapshot.id, snapshot.traits))
            .collect();

        let mut summary = MutationSummary::default();
        for (position, focal) in cohort.iter().copied().enumerate() {
            for kind in TraitKind::ALL {
                let settings = self.lineage.mutation(kind);
                if !draws.chance(settings.probability) {
                    continue;
                }
                let delta = draws.half_normal(settings.amplitude);
                let Some(partner) = pick_partner(focal, position, &cohort, &pool, draws) else {
                    debug!(agent = focal.get(), ?kind, "no mutation partner available");
                    counters.mutations_unpaired = counters.mutations_unpaired.saturating_add(1);
                    summary.unpaired += 1;
                    continue;
                };
                let (donor, recipient) = if draws.chance(0.5) {
                    (focal, partner)
                } else {
                    (partner, focal)
                };

                let (Some(donor_traits), Some(recipient_traits)) =
                    (working.get(&donor).copied(), working.get(&recipient).copied())
                else {
                    continue;
                };
                let donor_value = donor_traits.value(kind) - delta;
                let recipient_value = recipient_traits.value(kind) + delta;
                if donor_value < 0.0 || recipient_value > settings.upper {
                    debug!(
                        donor = donor.get(),
                        recipient = recipient.get(),
                        ?kind,
                        delta,
                        "mutation vetoed"
                    );
                    counters.mutations_vetoed = counters.mutations_vetoed.saturating_add(1);
                    summary.vetoed += 1;
                    continue;
                }

                for (agent, value) in [(donor, donor_value), (recipient, recipient_value)] {
                    if let Some(traits) = working.get_mut(&agent) {
                        traits.set(kind, value);
                    }
                }
                out.push(Command::TransferTrait {
                    donor,
                    recipient,
                    kind,
                    delta,
                });
                counters.record_mutation();
                summary.applied += 1;
            }
        }
        summary
    }
}

fn pick_partner(
    focal: AgentId,
    position: usize,
    cohort: &[AgentId],
    pool: &[AgentId],
    draws: &mut Draws,
) -> Option<AgentId> {
    if cohort.len() > 1 {
        let index = draws.index_excluding(cohort.len(), position)?;
        return cohort.get(index).copied();
    }
    let excluded = pool.iter().position(|agent| *agent == focal)?;
    let index = draws.index_excluding(pool.len(), excluded)?;
    pool.get(index).copied()
}
