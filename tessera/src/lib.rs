//! Tessera is a pyramidal tile store: it represents a raster dataset as
//! precomputed multi-resolution tile grids and picks the right ones for a
//! requested viewport and resolution.
//!
//! # Main components
//!
//! Everything revolves around a handful of value objects and two services:
//!
//! * [`Tile`] describes one addressable raster fragment: a region in source
//!   pixel space, a decimation factor, and an opaque reference to the input
//!   it is decoded from. Tiles are grouped into a
//! * [`Mosaic`], a regular grid of tiles sharing one scale, and mosaics at
//!   different scales stack into a
//! * [`Pyramid`], anchored to one coordinate reference system. The pyramids
//!   of one dataset live in a
//! * [`PyramidSet`], which lazily rebuilds itself from a backing
//!   [store](store::PyramidStore) and caches the result until invalidated.
//!
//! [`MosaicBuilder`] computes tile sizes and subsampling sequences when
//! tiling raw imagery; [`CoverageFinder`] selects the mosaics matching a
//! requested resolution and envelope. Independently of the pyramid model,
//! the [`index`] module maintains file-backed R-trees over large envelope
//! collections, shared between owners with a reference-counted lifecycle.
//!
//! Decoding pixels, reprojecting envelopes and talking to actual databases
//! are external collaborators' jobs; see [`reader`] and [`store`] for the
//! contracts they plug into.

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

mod cancel;
mod coverage_finder;
pub mod error;
pub mod index;
mod mosaic;
mod mosaic_builder;
mod pyramid;
mod pyramid_set;
pub mod reader;
pub mod store;
mod tile;

pub use cancel::CancellationToken;
pub use coverage_finder::{CoverageFinder, DEFAULT_RESOLUTION_TOLERANCE};
pub use error::TesseraError;
pub use mosaic::{CornerPosition, Mosaic, MosaicDefinition};
pub use mosaic_builder::{BuilderConfig, MosaicBuilder};
pub use pyramid::Pyramid;
pub use pyramid_set::{PyramidModel, PyramidSet};
pub use tile::{PackedSize, ProviderId, Subsampling, Tile, TileInput, TileRegion, MAX_PACKED_DIMENSION};

// Reexport tessera_types
pub use tessera_types;
