//! Aggregate telemetry published at the configured interval.

use serde::{Deserialize, Serialize};

use crate::{Phenotype, Tick};

/// Number of agents per phenotype.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhenotypeCounts {
    /// Normoxic agents.
    pub normoxic: u32,
    /// Hypoxic agents.
    pub hypoxic: u32,
    /// Stem agents.
    pub stem: u32,
    /// Somatic agents.
    pub somatic: u32,
    /// Necrotic agents.
    pub necrotic: u32,
}

impl PhenotypeCounts {
    /// Counts agents of the phenotype.
    #[must_use]
    pub const fn get(&self, phenotype: Phenotype) -> u32 {
        match phenotype {
            Phenotype::Normoxic => self.normoxic,
            Phenotype::Hypoxic => self.hypoxic,
            Phenotype::Stem => self.stem,
            Phenotype::Somatic => self.somatic,
            Phenotype::Necrotic => self.necrotic,
        }
    }

    /// Adds one agent of the phenotype.
    pub fn increment(&mut self, phenotype: Phenotype) {
        let slot = match phenotype {
            Phenotype::Normoxic => &mut self.normoxic,
            Phenotype::Hypoxic => &mut self.hypoxic,
            Phenotype::Stem => &mut self.stem,
            Phenotype::Somatic => &mut self.somatic,
            Phenotype::Necrotic => &mut self.necrotic,
        };
        *slot = slot.saturating_add(1);
    }

    /// Total agents.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.living().saturating_add(self.necrotic)
    }

    /// Agents that are not necrotic.
    #[must_use]
    pub const fn living(&self) -> u32 {
        self.normoxic
            .saturating_add(self.hypoxic)
            .saturating_add(self.stem)
            .saturating_add(self.somatic)
    }
}

/// Snapshot of aggregate population statistics for one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    /// Tick the report describes.
    pub tick: Tick,
    /// Agents per phenotype.
    pub counts: PhenotypeCounts,
    /// Sum of actual volumes.
    pub total_volume: f64,
    /// Sum of target volumes.
    pub total_target_volume: f64,
    /// Mutations since the start of the run.
    pub mutations_total: u64,
    /// Mutations during this tick.
    pub mutations_this_tick: u64,
    /// Divisions since the start of the run.
    pub divisions_total: u64,
    /// Divisions during this tick.
    pub divisions_this_tick: u64,
    /// Treatment kills since the start of the run.
    pub kills_total: u64,
    /// Treatment kills during this tick.
    pub kills_this_tick: u64,
    /// Mean stemness of stem agents.
    pub mean_stemness: Option<f64>,
    /// Mean senescence budget of stem agents.
    pub mean_senescence: Option<f64>,
    /// Cumulative observed radiotherapy survival.
    pub observed_survival: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_total_living_and_necrotic() {
        let mut counts = PhenotypeCounts::default();
        counts.increment(Phenotype::Stem);
        counts.increment(Phenotype::Stem);
        counts.increment(Phenotype::Necrotic);

        assert_eq!(counts.get(Phenotype::Stem), 2);
        assert_eq!(counts.living(), 2);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn telemetry_report_round_trips_through_bincode() {
        let report = TelemetryReport {
            tick: Tick::new(40),
            counts: PhenotypeCounts {
                normoxic: 12,
                hypoxic: 3,
                stem: 0,
                somatic: 0,
                necrotic: 1,
            },
            total_volume: 812.5,
            total_target_volume: 830.0,
            mutations_total: 0,
            mutations_this_tick: 0,
            divisions_total: 15,
            divisions_this_tick: 2,
            kills_total: 0,
            kills_this_tick: 0,
            mean_stemness: None,
            mean_senescence: None,
            observed_survival: Some(0.5),
        };
        let bytes = bincode::serialize(&report).expect("serialize");
        let restored: TelemetryReport = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(restored, report);
    }
}
