//! Facility-frame coordinates.
//!
//! Positions are in facility units (metres by convention) on a flat floor
//! plan.  Robots move in the x/y plane only; `z` records the shelf height of
//! a location and is carried through unchanged by the motion simulator.

/// A point in the facility frame.
#[derive(Copy, Clone, Debug, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Planar point with `z = 0`.
    #[inline]
    pub fn planar(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Euclidean distance in the x/y plane (z ignored).
    #[inline]
    pub fn distance_2d(self, other: Position) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Same point with x/y replaced; z preserved.
    #[inline]
    pub fn with_xy(self, x: f64, y: f64) -> Self {
        Self { x, y, z: self.z }
    }

    /// `true` if every coordinate is finite.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}
