//! Backing-store contract for database- or file-backed pyramid sets.
//!
//! The store itself (SQL driver, file scanner) is an external collaborator;
//! this module only fixes the row shapes and the bounded read pattern: one
//! query for a dataset's pyramids, then per pyramid one query for discrete
//! axis values and one for mosaics.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tessera_types::cartesian::Size;

use crate::error::TesseraError;
use crate::mosaic::{CornerPosition, MosaicDefinition};

/// One pyramid row: identifier plus CRS authority code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PyramidRecord {
    /// Pyramid identifier, unique within the dataset.
    pub id: String,
    /// CRS authority code, e.g. `EPSG:3857`.
    pub crs_code: String,
}

/// One observed coordinate value on a non-spatial axis of a pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisValueRecord {
    /// Zero-based index of the non-spatial axis.
    pub axis: usize,
    /// Observed coordinate value.
    pub value: f64,
}

/// One mosaic row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicRecord {
    /// Upper-left corner X in the pyramid's CRS.
    pub corner_x: f64,
    /// Upper-left corner Y in the pyramid's CRS.
    pub corner_y: f64,
    /// Coordinates on the non-spatial axes, in axis order.
    pub extra_coords: Vec<f64>,
    /// Tiles per row.
    pub grid_width: u32,
    /// Tiles per column.
    pub grid_height: u32,
    /// Pixel size in CRS units per source pixel.
    pub scale: f64,
    /// Tile width in pixels.
    pub tile_width: u32,
    /// Tile height in pixels.
    pub tile_height: u32,
}

impl From<MosaicRecord> for MosaicDefinition {
    fn from(record: MosaicRecord) -> Self {
        MosaicDefinition {
            scale: record.scale,
            corner: CornerPosition::new(record.corner_x, record.corner_y)
                .with_extra(record.extra_coords),
            grid_size: Size::new(record.grid_width, record.grid_height),
            tile_size: Size::new(record.tile_width, record.tile_height),
            tiles: Vec::new(),
        }
    }
}

/// Read access to the rows a pyramid set is rebuilt from.
pub trait PyramidStore: Send + Sync {
    /// The pyramids belonging to a dataset.
    fn pyramids(&self, dataset: &str) -> Result<Vec<PyramidRecord>, TesseraError>;

    /// The coordinate values observed on a pyramid's non-spatial axes,
    /// across all of its mosaics.
    fn axis_values(&self, dataset: &str, pyramid_id: &str)
        -> Result<Vec<AxisValueRecord>, TesseraError>;

    /// The mosaics of a pyramid.
    fn mosaics(&self, dataset: &str, pyramid_id: &str) -> Result<Vec<MosaicRecord>, TesseraError>;
}

/// In-memory [`PyramidStore`], mainly useful as a test double and for small
/// synthetic datasets.
#[derive(Default)]
pub struct MemoryPyramidStore {
    rows: Mutex<MemoryRows>,
}

#[derive(Default)]
struct MemoryRows {
    pyramids: HashMap<String, Vec<PyramidRecord>>,
    axis_values: HashMap<String, Vec<AxisValueRecord>>,
    mosaics: HashMap<String, Vec<MosaicRecord>>,
}

impl MemoryPyramidStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pyramid row to a dataset.
    pub fn insert_pyramid(&self, dataset: &str, record: PyramidRecord) {
        self.rows
            .lock()
            .pyramids
            .entry(dataset.to_string())
            .or_default()
            .push(record);
    }

    /// Adds an axis-value row to a pyramid.
    pub fn insert_axis_value(&self, pyramid_id: &str, record: AxisValueRecord) {
        self.rows
            .lock()
            .axis_values
            .entry(pyramid_id.to_string())
            .or_default()
            .push(record);
    }

    /// Adds a mosaic row to a pyramid.
    pub fn insert_mosaic(&self, pyramid_id: &str, record: MosaicRecord) {
        self.rows
            .lock()
            .mosaics
            .entry(pyramid_id.to_string())
            .or_default()
            .push(record);
    }
}

impl PyramidStore for MemoryPyramidStore {
    fn pyramids(&self, dataset: &str) -> Result<Vec<PyramidRecord>, TesseraError> {
        Ok(self
            .rows
            .lock()
            .pyramids
            .get(dataset)
            .cloned()
            .unwrap_or_default())
    }

    fn axis_values(
        &self,
        _dataset: &str,
        pyramid_id: &str,
    ) -> Result<Vec<AxisValueRecord>, TesseraError> {
        Ok(self
            .rows
            .lock()
            .axis_values
            .get(pyramid_id)
            .cloned()
            .unwrap_or_default())
    }

    fn mosaics(&self, _dataset: &str, pyramid_id: &str) -> Result<Vec<MosaicRecord>, TesseraError> {
        Ok(self
            .rows
            .lock()
            .mosaics
            .get(pyramid_id)
            .cloned()
            .unwrap_or_default())
    }
}
