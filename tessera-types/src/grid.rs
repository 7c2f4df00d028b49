//! Affine mapping between grid cells and CRS positions.

use serde::{Deserialize, Serialize};

/// Per-axis scale and offset translating grid coordinates (column, row) into
/// CRS positions.
///
/// `y_scale` is usually negative: row indices grow downwards while most
/// projected CRS axes grow upwards.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridToCrs {
    /// CRS units per grid cell along X.
    pub x_scale: f64,
    /// CRS units per grid cell along Y.
    pub y_scale: f64,
    /// CRS position of the grid origin along X.
    pub x_origin: f64,
    /// CRS position of the grid origin along Y.
    pub y_origin: f64,
}

impl GridToCrs {
    /// Creates a new mapping.
    pub fn new(x_scale: f64, y_scale: f64, x_origin: f64, y_origin: f64) -> Self {
        Self {
            x_scale,
            y_scale,
            x_origin,
            y_origin,
        }
    }

    /// CRS position of the given grid coordinates.
    pub fn apply(&self, column: f64, row: f64) -> (f64, f64) {
        (
            self.x_origin + column * self.x_scale,
            self.y_origin + row * self.y_scale,
        )
    }

    /// Returns true if both scales are finite and non-zero.
    pub fn is_valid(&self) -> bool {
        self.x_scale.is_finite()
            && self.y_scale.is_finite()
            && self.x_scale != 0.0
            && self.y_scale != 0.0
    }
}
