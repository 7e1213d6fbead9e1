//! Fixed-point math for deterministic troop movement.
//!
//! Positions, speeds and ranges are all fixed-point so that a battle
//! replayed on any machine lands on exactly the same coordinates.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// 32 integer bits and 32 fractional bits; the battle grid is tiny
/// (80 x 40), so squared distances stay far from overflow.
pub type Fixed = I32F32;

/// Fixed-point 2D vector in tile units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Raw-bits serde for [`Fixed`] fields, so snapshots and replays keep
/// every fractional bit.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bits.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bits.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

impl Vec2Fixed {
    /// Vector from raw fixed-point coordinates.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Vector from integer tile coordinates.
    #[must_use]
    pub fn from_tile(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Squared distance; enough for nearest-target comparisons.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Move from `self` toward `target` by at most `max_step`.
    ///
    /// Never passes `target`: when the remaining distance is shorter
    /// than the step, the result is `target` itself.
    #[must_use]
    pub fn step_towards(self, target: Self, max_step: Fixed) -> Self {
        if max_step <= Fixed::ZERO {
            return self;
        }
        let dist = self.distance(target);
        if dist <= max_step {
            return target;
        }
        let t = max_step / dist;
        Self {
            x: self.x + (target.x - self.x) * t,
            y: self.y + (target.y - self.y) * t,
        }
    }
}

/// Square root of a fixed-point number by binary search.
///
/// Pure integer arithmetic, so results are identical on every platform.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let one = Fixed::from_num(1);
    let mut low = Fixed::ZERO;
    let mut high = if value > one { value } else { one };

    for _ in 0..48 {
        let mid = (low + high) / Fixed::from_num(2);
        if mid.saturating_mul(mid) <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_squared() {
        let a = Vec2Fixed::from_tile(3, 0);
        let b = Vec2Fixed::from_tile(0, 4);
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));
    }

    #[test]
    fn test_sqrt_of_perfect_square() {
        let root = fixed_sqrt(Fixed::from_num(25));
        let epsilon = Fixed::from_num(1) / Fixed::from_num(10_000);
        assert!((root - Fixed::from_num(5)).abs() < epsilon, "got {root:?}");
    }

    #[test]
    fn test_step_towards_does_not_overshoot() {
        let from = Vec2Fixed::from_tile(0, 0);
        let to = Vec2Fixed::from_tile(2, 0);
        assert_eq!(from.step_towards(to, Fixed::from_num(5)), to);
    }

    #[test]
    fn test_step_towards_partial() {
        let from = Vec2Fixed::from_tile(0, 0);
        let to = Vec2Fixed::from_tile(10, 0);
        let moved = from.step_towards(to, Fixed::from_num(2));
        let epsilon = Fixed::from_num(1) / Fixed::from_num(1000);
        assert!((moved.x - Fixed::from_num(2)).abs() < epsilon);
        assert_eq!(moved.y, Fixed::ZERO);
    }

    #[test]
    fn test_step_towards_zero_step_stays() {
        let from = Vec2Fixed::from_tile(1, 1);
        let to = Vec2Fixed::from_tile(5, 5);
        assert_eq!(from.step_towards(to, Fixed::ZERO), from);
    }
}
