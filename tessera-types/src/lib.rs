//! Geometric and referencing primitives used by the `tessera` tile store.
//!
//! The crate deliberately knows nothing about tiles or pyramids. It provides
//! the small vocabulary the store speaks in:
//!
//! * [`cartesian::Rect`] and [`cartesian::Size`] for pixel- and CRS-space
//!   rectangles and grid dimensions;
//! * [`Envelope`] for N-dimensional bounding boxes treated as opaque
//!   per-axis intervals (no projection math happens here);
//! * [`geo::Crs`] for code-identified coordinate reference systems, possibly
//!   extended with discretized non-spatial axes;
//! * [`GridToCrs`] for the affine mapping between grid cells and CRS
//!   positions.

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod cartesian;
pub mod geo;

mod envelope;
mod error;
mod grid;

pub use envelope::{AxisRange, Envelope};
pub use error::TesseraTypesError;
pub use grid::GridToCrs;
