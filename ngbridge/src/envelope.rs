//! Axis-aligned bounding box in map coordinates.

use std::fmt;

/// Rectangular extent of a feature or a dirty map region.
///
/// Coordinates are in the map's spatial reference; this side never
/// reprojects them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    /// Create an envelope, normalizing swapped corners.
    ///
    /// Non-finite corners are kept as given so that [`is_valid`](Self::is_valid)
    /// rejects the result.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Self {
                min_x: x1,
                min_y: y1,
                max_x: x2,
                max_y: y2,
            };
        }
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    /// Degenerate envelope around a single point.
    pub fn from_point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// Grow this envelope to cover `other`.
    pub fn merge(&mut self, other: &Envelope) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    /// Returns true if the corners are finite and ordered.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.3}, {:.3} - {:.3}, {:.3}]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}
