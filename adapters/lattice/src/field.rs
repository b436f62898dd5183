use spheroid_core::{FieldId, FieldSource, GeometryEngine, LatticeCoord, LatticeDims};

use crate::RelaxationEngine;

const OXYGEN: FieldId = FieldId::new(0);

/// Radially depleted oxygen field around the spheroid.
///
/// Inside the spheroid the concentration follows the steady state of uniform
/// consumption, `c(r) = c₀ − k·(R² − r²)`, floored at zero. Outside it holds the
/// boundary level. The grid is only recomputed by [`OxygenField::refresh`], so
/// reads between refreshes always see the same values.
#[derive(Clone, Debug)]
pub struct OxygenField {
    name: String,
    dimensions: LatticeDims,
    boundary: f64,
    consumption: f64,
    values: Vec<f64>,
}

impl OxygenField {
    /// Creates a field named `Oxygen` at the boundary level everywhere.
    #[must_use]
    pub fn new(dimensions: LatticeDims, boundary: f64, consumption: f64) -> Self {
        let voxels = usize::try_from(dimensions.voxel_count()).unwrap_or(usize::MAX);
        Self {
            name: "Oxygen".to_owned(),
            dimensions,
            boundary,
            consumption: consumption.max(0.0),
            values: vec![boundary; voxels],
        }
    }

    /// Field with a constant value and no consumption.
    #[must_use]
    pub fn uniform(dimensions: LatticeDims, value: f64) -> Self {
        Self::new(dimensions, value, 0.0)
    }

    /// Serves the field under a different name.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    /// Recomputes the grid from the engine's current agent positions and volumes.
    pub fn refresh(&mut self, engine: &RelaxationEngine) {
        let count = engine.len();
        if count == 0 || self.consumption == 0.0 {
            self.values.fill(self.boundary);
            return;
        }
        let (sum, volume) = engine
            .agents()
            .fold((glam::DVec3::ZERO, 0.0), |(sum, volume), (_, geometry)| {
                (sum + geometry.position, volume + geometry.volume)
            });
        let centroid = sum / count as f64;
        let radius = if engine.dimensions().z() > 1 {
            (3.0 * volume / (4.0 * std::f64::consts::PI)).cbrt()
        } else {
            (volume / std::f64::consts::PI).sqrt()
        };

        let (nx, ny) = (self.dimensions.x(), self.dimensions.y());
        for (index, value) in self.values.iter_mut().enumerate() {
            let index = index as u64;
            let x = index % u64::from(nx);
            let y = (index / u64::from(nx)) % u64::from(ny);
            let z = index / (u64::from(nx) * u64::from(ny));
            let point = glam::DVec3::new(x as f64, y as f64, z as f64);
            let r = point.distance(centroid);
            *value = if r >= radius {
                self.boundary
            } else {
                (self.boundary - self.consumption * (radius * radius - r * r)).max(0.0)
            };
        }
    }

    fn index(&self, coord: LatticeCoord) -> usize {
        let nx = self.dimensions.x() as usize;
        let ny = self.dimensions.y() as usize;
        coord.x as usize + nx * (coord.y as usize + ny * coord.z as usize)
    }
}

impl FieldSource for OxygenField {
    fn dimensions(&self) -> LatticeDims {
        self.dimensions
    }

    fn resolve(&self, name: &str) -> Option<FieldId> {
        (name == self.name).then_some(OXYGEN)
    }

    fn value(&self, field: FieldId, coord: LatticeCoord) -> f64 {
        if field != OXYGEN {
            return 0.0;
        }
        self.values.get(self.index(coord)).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;
    use spheroid_core::Environment;

    use super::*;

    #[test]
    fn resolves_only_its_own_name() {
        let field = OxygenField::uniform(LatticeDims::new(4, 4, 1), 0.3).with_name("O2");
        assert_eq!(field.resolve("O2"), Some(OXYGEN));
        assert!(field.resolve("Oxygen").is_none());
        assert!(Environment::bind(&field, "Glucose").is_err());
    }

    #[test]
    fn core_is_depleted_and_rim_is_not() {
        let dims = LatticeDims::new(41, 41, 1);
        let mut engine = RelaxationEngine::new(dims);
        for x in 15..=25 {
            for y in 15..=25 {
                let _ = engine.spawn_seed(DVec3::new(f64::from(x), f64::from(y), 0.0), 10.0);
            }
        }
        let mut field = OxygenField::new(dims, 0.4, 0.01);
        field.refresh(&engine);

        let environment = Environment::bind(&field, "Oxygen").expect("oxygen");
        let centre = environment.sample(DVec3::new(20.0, 20.0, 0.0));
        let outside = environment.sample(DVec3::new(2.0, 2.0, 0.0));
        assert!(centre < 0.1, "centre {centre}");
        assert_eq!(outside, 0.4);
        assert_eq!(environment.sample(DVec3::new(-10.0, 500.0, 0.0)), 0.4);
    }
}
