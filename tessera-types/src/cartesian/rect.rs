use nalgebra::{Point2, Scalar};
use num_traits::{FromPrimitive, Num};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rect<N = f64> {
    /// Left bound.
    pub x_min: N,
    /// Bottom bound.
    pub y_min: N,
    /// Right bound.
    pub x_max: N,
    /// Top bound.
    pub y_max: N,
}

impl<N: Num + Copy + PartialOrd + Scalar + FromPrimitive> Rect<N> {
    /// Creates a new rectangle from its bounds.
    pub fn new(x_min: N, y_min: N, x_max: N, y_max: N) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Left bound.
    pub fn x_min(&self) -> N {
        self.x_min
    }

    /// Right bound.
    pub fn x_max(&self) -> N {
        self.x_max
    }

    /// Bottom bound.
    pub fn y_min(&self) -> N {
        self.y_min
    }

    /// Top bound.
    pub fn y_max(&self) -> N {
        self.y_max
    }

    /// Horizontal extent.
    pub fn width(&self) -> N {
        self.x_max - self.x_min
    }

    /// Vertical extent.
    pub fn height(&self) -> N {
        self.y_max - self.y_min
    }

    /// Returns true if the rectangle has no interior on at least one axis.
    pub fn is_degenerate(&self) -> bool {
        !(self.x_min < self.x_max) || !(self.y_min < self.y_max)
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn merge(&self, other: Self) -> Self {
        Self {
            x_min: if self.x_min < other.x_min {
                self.x_min
            } else {
                other.x_min
            },
            y_min: if self.y_min < other.y_min {
                self.y_min
            } else {
                other.y_min
            },
            x_max: if self.x_max > other.x_max {
                self.x_max
            } else {
                other.x_max
            },
            y_max: if self.y_max > other.y_max {
                self.y_max
            } else {
                other.y_max
            },
        }
    }

    /// Clamps `self` to the bounds of `other`.
    ///
    /// When the rectangles are disjoint the result is inverted (min above
    /// max); use [`Rect::intersection`] for a checked variant.
    pub fn limit(&self, other: Self) -> Self {
        Self {
            x_min: if self.x_min > other.x_min {
                self.x_min
            } else {
                other.x_min
            },
            y_min: if self.y_min > other.y_min {
                self.y_min
            } else {
                other.y_min
            },
            x_max: if self.x_max < other.x_max {
                self.x_max
            } else {
                other.x_max
            },
            y_max: if self.y_max < other.y_max {
                self.y_max
            } else {
                other.y_max
            },
        }
    }

    /// Returns the common part of the two rectangles, if any.
    ///
    /// Rectangles that only touch at an edge are considered intersecting.
    pub fn intersection(&self, other: Self) -> Option<Self> {
        if self.intersects(other) {
            Some(self.limit(other))
        } else {
            None
        }
    }

    /// Returns true if the two rectangles have at least one common point.
    pub fn intersects(&self, other: Self) -> bool {
        self.x_min <= other.x_max
            && self.x_max >= other.x_min
            && self.y_min <= other.y_max
            && self.y_max >= other.y_min
    }

    /// Returns true if the point lies inside or on the boundary.
    pub fn contains(&self, point: &Point2<N>) -> bool {
        self.x_min <= point.x
            && self.x_max >= point.x
            && self.y_min <= point.y
            && self.y_max >= point.y
    }

    /// Center point of the rectangle.
    pub fn center(&self) -> Point2<N> {
        let two = N::from_f64(2.0).unwrap_or_else(|| N::one() + N::one());
        Point2::new(
            (self.x_min + self.x_max) / two,
            (self.y_min + self.y_max) / two,
        )
    }
}
