//! Additive 3D coordinates in millimetres.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Neg, Sub};

/// A point or offset in deck space (mm).
///
/// Resource locations are always stored relative to the parent; absolute
/// positions are the sum of locations along the path to the root.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Left to right
    pub x: f64,
    /// Front to back
    pub y: f64,
    /// Bottom to top
    pub z: f64,
}

impl Coordinate {
    /// Origin.
    pub const ZERO: Coordinate = Coordinate {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Coordinate from its components.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl Add for Coordinate {
    type Output = Coordinate;

    fn add(self, rhs: Coordinate) -> Coordinate {
        Coordinate::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Coordinate {
    fn add_assign(&mut self, rhs: Coordinate) {
        *self = *self + rhs;
    }
}

impl Sub for Coordinate {
    type Output = Coordinate;

    fn sub(self, rhs: Coordinate) -> Coordinate {
        Coordinate::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for Coordinate {
    type Output = Coordinate;

    fn neg(self) -> Coordinate {
        Coordinate::new(-self.x, -self.y, -self.z)
    }
}

impl std::iter::Sum for Coordinate {
    fn sum<I: Iterator<Item = Coordinate>>(iter: I) -> Coordinate {
        iter.fold(Coordinate::ZERO, |acc, c| acc + c)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let a = Coordinate::new(1.0, 2.0, 3.0);
        let b = Coordinate::new(0.5, -2.0, 10.0);
        assert_eq!(a + b, Coordinate::new(1.5, 0.0, 13.0));
        assert_eq!(a + b - b, a);
        assert_eq!(-a + a, Coordinate::ZERO);
        assert_eq!([a, b].into_iter().sum::<Coordinate>(), a + b);
    }
}
