//! Shared types used throughout the library.

mod transform;

pub use transform::{compose_matrix, Transform};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a registered model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelId(pub u64);

/// Opaque identifier of a registered decal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DecalId(pub u64);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model#{}", self.0)
    }
}

impl fmt::Display for DecalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decal#{}", self.0)
    }
}

/// Monotonic id source. Ids are never reused within one generator.
#[derive(Debug, Clone, Default)]
pub(crate) struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub(crate) fn next(&mut self) -> u64 {
        self.next += 1;
        self.next
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl Iterator<Item = [f32; 3]>) -> Option<Self> {
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        let mut has_points = false;

        for p in points {
            has_points = true;
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }

        if has_points {
            Some(Self { min, max })
        } else {
            None
        }
    }

    pub fn dimensions(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    /// Largest edge length of the box.
    pub fn max_dimension(&self) -> f32 {
        let [x, y, z] = self.dimensions();
        x.max(y).max(z)
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut out = *self;
        for i in 0..3 {
            out.min[i] = out.min[i].min(other.min[i]);
            out.max[i] = out.max[i].max(other.max[i]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_from_points() {
        let points = vec![[0.0, 0.0, 0.0], [2.0, -1.0, 0.5], [1.0, 3.0, -2.0]];
        let bounds = BoundingBox::from_points(points.into_iter()).unwrap();
        assert_eq!(bounds.min, [0.0, -1.0, -2.0]);
        assert_eq!(bounds.max, [2.0, 3.0, 0.5]);
        assert_eq!(bounds.dimensions(), [2.0, 4.0, 2.5]);
        assert_eq!(bounds.max_dimension(), 4.0);
    }

    #[test]
    fn test_bounding_box_empty() {
        assert!(BoundingBox::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_id_generator_is_monotonic() {
        let mut ids = IdGenerator::default();
        let a = ids.next();
        let b = ids.next();
        assert!(b > a);
        assert_eq!(ModelId(a).to_string(), "model#1");
    }
}
