//! Pluggable tile readers.
//!
//! Decoding a tile's pixels is an external collaborator's job. The store
//! only resolves a tile's provider identifier to a registered reader and
//! hands the opaque sample grid back to the caller; sample values are never
//! interpreted here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::TesseraError;
use crate::tile::{ProviderId, Tile};

/// Raw decoded samples of one tile region.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGrid {
    width: u32,
    height: u32,
    samples: Vec<f64>,
}

impl SampleGrid {
    /// Creates a grid, checking that the sample count matches the
    /// dimensions.
    pub fn new(width: u32, height: u32, samples: Vec<f64>) -> Result<SampleGrid, TesseraError> {
        if samples.len() != width as usize * height as usize {
            return Err(TesseraError::InvalidRegion(format!(
                "{} samples cannot fill a {width}x{height} grid",
                samples.len()
            )));
        }
        Ok(SampleGrid {
            width,
            height,
            samples,
        })
    }

    /// Grid width in samples.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in samples.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major sample values.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

/// Decodes the pixels a [`Tile`] points at.
pub trait TileReader: Send + Sync {
    /// Reads the tile's region from its input, at its subsampling.
    fn read(&self, tile: &Tile) -> Result<SampleGrid, TesseraError>;
}

/// Resolves provider identifiers to registered readers.
#[derive(Default)]
pub struct ReaderRegistry {
    readers: HashMap<ProviderId, Arc<dyn TileReader>, ahash::RandomState>,
}

impl ReaderRegistry {
    /// Creates an empty registry.
    pub fn new() -> ReaderRegistry {
        Self::default()
    }

    /// Registers a reader under a provider identifier, replacing any
    /// previous registration.
    pub fn register(&mut self, provider: ProviderId, reader: Arc<dyn TileReader>) {
        self.readers.insert(provider, reader);
    }

    /// The reader registered under a provider identifier.
    pub fn resolve(&self, provider: &ProviderId) -> Result<Arc<dyn TileReader>, TesseraError> {
        self.readers
            .get(provider)
            .cloned()
            .ok_or_else(|| TesseraError::UnknownProvider(provider.as_str().to_string()))
    }

    /// Resolves the tile's provider and reads its samples.
    pub fn read_tile(&self, tile: &Tile) -> Result<SampleGrid, TesseraError> {
        self.resolve(tile.provider())?.read(tile)
    }
}

impl std::fmt::Debug for ReaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderRegistry")
            .field("providers", &self.readers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::tile::{Subsampling, TileInput, TileRegion};

    struct FlatReader(f64);

    impl TileReader for FlatReader {
        fn read(&self, tile: &Tile) -> Result<SampleGrid, TesseraError> {
            let region = tile.region();
            let count = (region.width * region.height) as usize;
            SampleGrid::new(region.width as u32, region.height as u32, vec![self.0; count])
        }
    }

    fn tile(provider: &str) -> Tile {
        Tile::new(
            ProviderId::new(provider),
            TileInput::Uri("scene.tif".to_string()),
            0,
            TileRegion::new(0, 0, 4, 4),
            Subsampling::NONE,
        )
        .unwrap()
    }

    #[test]
    fn resolves_registered_providers() {
        let mut registry = ReaderRegistry::new();
        registry.register(ProviderId::new("flat"), Arc::new(FlatReader(7.0)));

        let grid = registry.read_tile(&tile("flat")).unwrap();
        assert_eq!(grid.width(), 4);
        assert_eq!(grid.samples(), &[7.0; 16][..]);
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let registry = ReaderRegistry::new();
        assert_matches!(
            registry.read_tile(&tile("missing")),
            Err(TesseraError::UnknownProvider(name)) if name == "missing"
        );
    }

    #[test]
    fn sample_grid_checks_its_dimensions() {
        assert!(SampleGrid::new(2, 2, vec![0.0; 4]).is_ok());
        assert_matches!(
            SampleGrid::new(2, 2, vec![0.0; 5]),
            Err(TesseraError::InvalidRegion(_))
        );
    }
}
