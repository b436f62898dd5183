#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic telemetry that publishes aggregate reports at a fixed interval.

mod metrics;

use std::collections::BTreeMap;

use spheroid_core::{Counters, Phenotype, PopulationView, Tick, TelemetryReport};
use tracing::info;

pub use metrics::summarize;

/// Series names that do not correspond to a phenotype.
pub const AGGREGATE_SERIES: [&str; 5] = [
    "total_volume",
    "total_target_volume",
    "mutations",
    "divisions",
    "kills",
];

/// Publishes reports every `interval` ticks and keeps them as named series.
#[derive(Debug)]
pub struct Telemetry {
    interval: u64,
    series: TelemetrySeries,
    last_report: Option<TelemetryReport>,
}

impl Telemetry {
    /// Creates a telemetry sink publishing every `interval` ticks.
    #[must_use]
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            series: TelemetrySeries::default(),
            last_report: None,
        }
    }

    /// Returns the last report published, if any.
    #[must_use]
    pub fn last_report(&self) -> Option<&TelemetryReport> {
        self.last_report.as_ref()
    }

    /// Recorded series.
    #[must_use]
    pub fn series(&self) -> &TelemetrySeries {
        &self.series
    }

    /// Publishes a report when `tick` falls on the interval.
    pub fn handle(
        &mut self,
        tick: Tick,
        population: &PopulationView,
        counters: &Counters,
    ) -> Option<TelemetryReport> {
        if !tick.is_multiple_of(self.interval) {
            return None;
        }
        let report = summarize(tick, population, counters);
        info!(
            tick = tick.get(),
            living = report.counts.living(),
            necrotic = report.counts.necrotic,
            total_volume = report.total_volume,
            mutations = report.mutations_total,
            divisions = report.divisions_total,
            kills = report.kills_total,
            "telemetry"
        );
        self.series.record(&report);
        self.last_report = Some(report.clone());
        Some(report)
    }
}

/// Named numeric series, one sample per published report.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TelemetrySeries {
    ticks: Vec<Tick>,
    columns: BTreeMap<&'static str, Vec<f64>>,
}

impl TelemetrySeries {
    /// Appends one sample to every series.
    pub fn record(&mut self, report: &TelemetryReport) {
        self.ticks.push(report.tick);
        for phenotype in Phenotype::ALL {
            self.push(phenotype.label(), f64::from(report.counts.get(phenotype)));
        }
        self.push("total_volume", report.total_volume);
        self.push("total_target_volume", report.total_target_volume);
        self.push("mutations", report.mutations_total as f64);
        self.push("divisions", report.divisions_total as f64);
        self.push("kills", report.kills_total as f64);
    }

    fn push(&mut self, name: &'static str, value: f64) {
        self.columns.entry(name).or_default().push(value);
    }

    /// Ticks at which samples were recorded.
    #[must_use]
    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    /// Samples of the named series.
    #[must_use]
    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Names of every recorded series.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.keys().copied()
    }

    /// Number of samples per series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    /// Reports whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}
