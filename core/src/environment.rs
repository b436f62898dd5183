//! Environment field access.
//!
//! Positions are rounded and clamped onto the lattice before any field read,
//! so an out-of-range position samples the nearest boundary voxel instead of
//! failing.

use glam::DVec3;

use crate::ConfigError;

/// Extent of the simulation lattice in voxels. Every axis holds at least one voxel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LatticeDims {
    x: u32,
    y: u32,
    z: u32,
}

impl LatticeDims {
    /// Creates lattice dimensions, raising empty axes to one voxel.
    #[must_use]
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self {
            x: x.max(1),
            y: y.max(1),
            z: z.max(1),
        }
    }

    /// Extent along x.
    #[must_use]
    pub const fn x(&self) -> u32 {
        self.x
    }

    /// Extent along y.
    #[must_use]
    pub const fn y(&self) -> u32 {
        self.y
    }

    /// Extent along z.
    #[must_use]
    pub const fn z(&self) -> u32 {
        self.z
    }

    /// Number of voxels in the lattice.
    #[must_use]
    pub const fn voxel_count(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// Rounds a position to the nearest voxel inside the lattice.
    #[must_use]
    pub fn clamp(&self, position: DVec3) -> LatticeCoord {
        LatticeCoord {
            x: clamp_axis(position.x, self.x),
            y: clamp_axis(position.y, self.y),
            z: clamp_axis(position.z, self.z),
        }
    }
}

fn clamp_axis(value: f64, extent: u32) -> u32 {
    let last = extent.saturating_sub(1);
    let rounded = value.round();
    if rounded.is_nan() || rounded <= 0.0 {
        0
    } else if rounded >= f64::from(last) {
        last
    } else {
        rounded as u32
    }
}

/// Integer voxel coordinate inside the lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LatticeCoord {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
    /// Layer.
    pub z: u32,
}

impl LatticeCoord {
    /// Creates a coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

/// Handle of a field resolved by name on a [`FieldSource`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldId(u16);

impl FieldId {
    /// Creates a handle.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Raw handle value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

/// Read access to the scalar fields produced by the external field solver.
pub trait FieldSource {
    /// Lattice the fields are defined on.
    fn dimensions(&self) -> LatticeDims;

    /// Resolves a field name to a handle.
    fn resolve(&self, name: &str) -> Option<FieldId>;

    /// Reads a field at an in-bounds coordinate.
    fn value(&self, field: FieldId, coord: LatticeCoord) -> f64;
}

/// A single field bound for the duration of one tick.
///
/// Holding a shared borrow of the source for the whole tick guarantees every
/// agent reads the same field state.
#[derive(Clone, Copy)]
pub struct Environment<'a> {
    source: &'a dyn FieldSource,
    field: FieldId,
}

impl<'a> Environment<'a> {
    /// Binds a field by name, failing when the source does not serve it.
    pub fn bind(source: &'a dyn FieldSource, name: &str) -> Result<Self, ConfigError> {
        let field = source
            .resolve(name)
            .ok_or_else(|| ConfigError::MissingField(name.to_owned()))?;
        Ok(Self::new(source, field))
    }

    /// Binds an already resolved field.
    #[must_use]
    pub fn new(source: &'a dyn FieldSource, field: FieldId) -> Self {
        Self { source, field }
    }

    /// Samples the field at the clamped, rounded position.
    #[must_use]
    pub fn sample(&self, position: DVec3) -> f64 {
        let coord = self.source.dimensions().clamp(position);
        self.source.value(self.field, coord)
    }
}

impl std::fmt::Debug for Environment<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("field", &self.field)
            .field("dimensions", &self.source.dimensions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Gradient {
        dims: LatticeDims,
    }

    impl FieldSource for Gradient {
        fn dimensions(&self) -> LatticeDims {
            self.dims
        }

        fn resolve(&self, name: &str) -> Option<FieldId> {
            (name == "Oxygen").then_some(FieldId::new(0))
        }

        fn value(&self, _field: FieldId, coord: LatticeCoord) -> f64 {
            assert!(coord.x < self.dims.x() && coord.y < self.dims.y() && coord.z < self.dims.z());
            f64::from(coord.x) / 10.0
        }
    }

    #[test]
    fn positions_are_rounded_and_clamped() {
        let dims = LatticeDims::new(10, 10, 1);
        assert_eq!(
            dims.clamp(DVec3::new(-4.0, 3.6, 7.0)),
            LatticeCoord::new(0, 4, 0)
        );
        assert_eq!(
            dims.clamp(DVec3::new(12.2, f64::NAN, f64::INFINITY)),
            LatticeCoord::new(9, 0, 0)
        );
    }

    #[test]
    fn out_of_range_samples_read_the_boundary() {
        let source = Gradient {
            dims: LatticeDims::new(10, 4, 4),
        };
        let environment = Environment::bind(&source, "Oxygen").expect("field exists");
        assert_eq!(environment.sample(DVec3::new(100.0, 0.0, 0.0)), 0.9);
        assert_eq!(environment.sample(DVec3::new(-5.0, 50.0, -1.0)), 0.0);
    }

    #[test]
    fn unknown_field_is_a_configuration_error() {
        let source = Gradient {
            dims: LatticeDims::new(1, 1, 1),
        };
        assert_eq!(
            Environment::bind(&source, "Glucose").map(|_| ()),
            Err(ConfigError::MissingField("Glucose".to_owned()))
        );
    }
}
