use std::{fs, path::Path};

use anyhow::{Context, Result};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use spheroid_core::{LatticeDims, SimulationConfig};

/// Run file: tick count, reference lattice and the simulation configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct RunConfig {
    /// Ticks to simulate when the command line does not override it.
    #[serde(default = "default_ticks")]
    pub ticks: u64,
    /// Reference lattice and oxygen supply.
    #[serde(default)]
    pub lattice: LatticeSection,
    /// Model, treatment and named parameters.
    pub simulation: SimulationConfig,
}

impl RunConfig {
    /// Reads and parses a TOML run file.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read run file {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("failed to parse run file {}", path.display()))
    }

    /// Parses TOML run file contents.
    pub(crate) fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("invalid run file contents")
    }
}

/// Lattice extent, seed placement and the analytic oxygen supply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct LatticeSection {
    /// Voxels along x.
    pub x: u32,
    /// Voxels along y.
    pub y: u32,
    /// Voxels along z.
    pub z: u32,
    /// Oxygen level outside the spheroid.
    pub boundary_oxygen: f64,
    /// Oxygen consumption coefficient inside the spheroid.
    pub consumption: f64,
    /// Actual volume of each seed agent.
    pub seed_volume: f64,
    /// Seed positions; a single centred seed when empty.
    pub seeds: Vec<[f64; 3]>,
}

impl Default for LatticeSection {
    fn default() -> Self {
        Self {
            x: 100,
            y: 100,
            z: 1,
            boundary_oxygen: 0.4,
            consumption: 0.0005,
            seed_volume: 40.0,
            seeds: Vec::new(),
        }
    }
}

impl LatticeSection {
    pub(crate) fn dimensions(&self) -> LatticeDims {
        LatticeDims::new(self.x, self.y, self.z)
    }

    pub(crate) fn seed_positions(&self) -> Vec<DVec3> {
        if self.seeds.is_empty() {
            let centre = |extent: u32| f64::from(extent.saturating_sub(1)) / 2.0;
            return vec![DVec3::new(centre(self.x), centre(self.y), centre(self.z))];
        }
        self.seeds.iter().map(|seed| DVec3::from_array(*seed)).collect()
    }
}

fn default_ticks() -> u64 {
    1000
}
