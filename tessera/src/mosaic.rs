//! Uniform-scale tile grids.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tessera_types::cartesian::Size;
use tessera_types::{AxisRange, Envelope};

use crate::error::TesseraError;
use crate::pyramid::Pyramid;
use crate::tile::Tile;

/// Upper-left corner of a mosaic in its pyramid's CRS.
///
/// The first two coordinates are spatial; `extra` carries the coordinates on
/// the CRS's non-spatial axes (time, elevation), in axis order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerPosition {
    /// Spatial X coordinate.
    pub x: f64,
    /// Spatial Y coordinate.
    pub y: f64,
    /// Coordinates on the non-spatial axes, in axis order.
    pub extra: Vec<f64>,
}

impl CornerPosition {
    /// Creates a purely spatial corner position.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            extra: Vec::new(),
        }
    }

    /// Adds non-spatial axis coordinates.
    pub fn with_extra(mut self, extra: Vec<f64>) -> Self {
        self.extra = extra;
        self
    }
}

/// Everything needed to build one [`Mosaic`].
///
/// Definitions come from two producers: the mosaic builder when tiling a
/// source image, and the pyramid set when rehydrating from backing rows (in
/// which case the tile list is usually empty and tiles are addressed by grid
/// arithmetic alone).
#[derive(Debug, Clone)]
pub struct MosaicDefinition {
    /// Pixel size in CRS units per source pixel at this level.
    pub scale: f64,
    /// Upper-left corner in the pyramid's CRS.
    pub corner: CornerPosition,
    /// Columns and rows of tiles.
    pub grid_size: Size<u32>,
    /// Pixel width and height of one tile.
    pub tile_size: Size<u32>,
    /// Tiles keyed by (column, row). May be empty for store-backed mosaics.
    pub tiles: Vec<((u32, u32), Tile)>,
}

impl MosaicDefinition {
    pub(crate) fn validate(&self) -> Result<(), TesseraError> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(TesseraError::Corrupt(format!(
                "mosaic scale {} is not a positive finite number",
                self.scale
            )));
        }
        if self.grid_size.is_zero() || self.tile_size.is_zero() {
            return Err(TesseraError::Corrupt(format!(
                "mosaic grid {}x{} of {}x{} tiles is empty",
                self.grid_size.width(),
                self.grid_size.height(),
                self.tile_size.width(),
                self.tile_size.height()
            )));
        }
        Ok(())
    }
}

/// A regular grid of tiles sharing one scale, covering a bounding region.
pub struct Mosaic {
    pyramid: Weak<Pyramid>,
    scale: f64,
    corner: CornerPosition,
    grid_size: Size<u32>,
    tile_size: Size<u32>,
    tiles: HashMap<(u32, u32), Tile, ahash::RandomState>,
}

impl Mosaic {
    pub(crate) fn new(pyramid: Weak<Pyramid>, definition: MosaicDefinition) -> Self {
        Self {
            pyramid,
            scale: definition.scale,
            corner: definition.corner,
            grid_size: definition.grid_size,
            tile_size: definition.tile_size,
            tiles: definition.tiles.into_iter().collect(),
        }
    }

    /// The owning pyramid, unless it was dropped.
    pub fn pyramid(&self) -> Option<Arc<Pyramid>> {
        self.pyramid.upgrade()
    }

    /// Pixel size in CRS units per source pixel.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Upper-left corner in the pyramid's CRS.
    pub fn corner(&self) -> &CornerPosition {
        &self.corner
    }

    /// Columns and rows of tiles.
    pub fn grid_size(&self) -> Size<u32> {
        self.grid_size
    }

    /// Pixel width and height of one tile.
    pub fn tile_size(&self) -> Size<u32> {
        self.tile_size
    }

    /// CRS-space extent covered by the grid.
    ///
    /// The corner is the upper-left one, so the spatial Y axis extends
    /// downwards from it. Non-spatial corner coordinates become degenerate
    /// axes.
    pub fn envelope(&self) -> Envelope {
        let width = self.grid_size.width() as f64 * self.tile_size.width() as f64 * self.scale;
        let height = self.grid_size.height() as f64 * self.tile_size.height() as f64 * self.scale;

        let mut axes = Vec::with_capacity(2 + self.corner.extra.len());
        axes.push(AxisRange::new(self.corner.x, self.corner.x + width));
        axes.push(AxisRange::new(self.corner.y - height, self.corner.y));
        axes.extend(self.corner.extra.iter().map(|v| AxisRange::degenerate(*v)));
        Envelope::new(axes)
    }

    /// The tile at the given grid cell, if one was registered.
    pub fn tile(&self, column: u32, row: u32) -> Option<&Tile> {
        self.tiles.get(&(column, row))
    }

    /// All registered tiles with their grid cells, in no particular order.
    pub fn tiles(&self) -> impl Iterator<Item = (&(u32, u32), &Tile)> {
        self.tiles.iter()
    }

    /// Number of registered tiles.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Number of grid cells this mosaic would have to enumerate to cover the
    /// query envelope, whether or not tiles are registered for them.
    ///
    /// Zero when the envelopes do not intersect.
    pub fn tile_count_over(&self, query: &Envelope) -> u64 {
        let own = self.envelope();
        if !own.intersects(query) {
            return 0;
        }

        let (Some(own_rect), Some(query_rect)) = (own.spatial(), query.spatial()) else {
            return 0;
        };
        let Some(common) = own_rect.intersection(query_rect) else {
            return 0;
        };

        let span_x = self.tile_size.width() as f64 * self.scale;
        let span_y = self.tile_size.height() as f64 * self.scale;

        let count = |min: f64, max: f64, span: f64, cells: u32| -> u64 {
            let first = ((min / span).floor() as i64).max(0);
            let last = ((max / span).ceil() as i64).max(first + 1).min(cells as i64);
            (last - first).max(1) as u64
        };

        let columns = count(
            common.x_min - own_rect.x_min,
            common.x_max - own_rect.x_min,
            span_x,
            self.grid_size.width(),
        );
        let rows = count(
            own_rect.y_max - common.y_max,
            own_rect.y_max - common.y_min,
            span_y,
            self.grid_size.height(),
        );

        columns * rows
    }

    /// Ordering used inside a pyramid: scale first; equal scales are ordered
    /// by the non-spatial corner coordinates pairwise, in axis order.
    pub fn cmp_order(&self, other: &Mosaic) -> Ordering {
        self.scale
            .total_cmp(&other.scale)
            .then_with(|| cmp_coords(&self.corner.extra, &other.corner.extra))
    }
}

pub(crate) fn cmp_coords(left: &[f64], right: &[f64]) -> Ordering {
    for (a, b) in left.iter().zip(right.iter()) {
        let ord = a.total_cmp(b);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len())
}

impl std::fmt::Debug for Mosaic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mosaic")
            .field("scale", &self.scale)
            .field("corner", &self.corner)
            .field("grid_size", &self.grid_size)
            .field("tile_size", &self.tile_size)
            .field("tiles", &self.tiles.len())
            .finish()
    }
}
