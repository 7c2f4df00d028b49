//! Deterministic construction of pyramids from untiled source imagery.

use std::sync::Arc;

use tessera_types::cartesian::Size;
use tessera_types::geo::Crs;
use tessera_types::GridToCrs;

use crate::cancel::CancellationToken;
use crate::error::TesseraError;
use crate::mosaic::{CornerPosition, MosaicDefinition};
use crate::pyramid::Pyramid;
use crate::tile::{ProviderId, Subsampling, Tile, TileInput, TileRegion};

/// Constraints for the suggested tile size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Largest acceptable tile dimension, per axis.
    pub max_tile_dimension: u32,
    /// Smallest tile dimension worth producing, per axis.
    pub min_tile_dimension: u32,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_tile_dimension: 512,
            min_tile_dimension: 64,
        }
    }
}

/// Computes the tile size and subsampling sequence for tiling an untiled
/// source image, and materializes the resulting pyramid.
///
/// Pure computation: no I/O happens here, and identical inputs always
/// produce identical outputs. The subsampling sequence is cached and
/// recomputed lazily whenever the tile size changes.
#[derive(Debug, Clone)]
pub struct MosaicBuilder {
    source_region: TileRegion,
    config: BuilderConfig,
    tile_size: Option<Size<u32>>,
    subsamplings: Option<Vec<u32>>,
}

impl MosaicBuilder {
    /// Creates a builder for the given source pixel bounds.
    pub fn new(source_region: TileRegion) -> Result<MosaicBuilder, TesseraError> {
        if source_region.width <= 0 || source_region.height <= 0 {
            return Err(TesseraError::InvalidRegion(format!(
                "source bounds {}x{} are empty",
                source_region.width, source_region.height
            )));
        }
        Ok(MosaicBuilder {
            source_region,
            config: BuilderConfig::default(),
            tile_size: None,
            subsamplings: None,
        })
    }

    /// Replaces the tile-size constraints.
    pub fn with_config(mut self, config: BuilderConfig) -> MosaicBuilder {
        self.config = config;
        self.subsamplings = None;
        self
    }

    /// The source pixel bounds being tiled.
    pub fn source_region(&self) -> TileRegion {
        self.source_region
    }

    /// The tile size in use: the explicitly set one, or a suggested default.
    ///
    /// The default targets the configured maximum footprint and prefers the
    /// largest dimension within bounds that tiles the source evenly.
    pub fn tile_size(&self) -> Size<u32> {
        match self.tile_size {
            Some(size) => size,
            None => Size::new(
                suggest_dimension(self.source_region.width as u64, &self.config),
                suggest_dimension(self.source_region.height as u64, &self.config),
            ),
        }
    }

    /// Fixes the tile size, or restores the suggested default with `None`.
    ///
    /// Any previously computed subsampling sequence is discarded and
    /// recomputed lazily on next access.
    pub fn set_tile_size(&mut self, tile_size: Option<Size<u32>>) -> Result<(), TesseraError> {
        if let Some(size) = tile_size {
            if size.is_zero() {
                return Err(TesseraError::InvalidRegion(format!(
                    "tile size {}x{} is empty",
                    size.width(),
                    size.height()
                )));
            }
        }
        self.tile_size = tile_size;
        self.subsamplings = None;
        Ok(())
    }

    /// The subsampling sequence: powers of two, finest first, refined until
    /// one tile per axis covers the source.
    pub fn subsamplings(&mut self) -> &[u32] {
        if self.subsamplings.is_none() {
            self.subsamplings = Some(compute_subsamplings(
                self.source_region.width as u64,
                self.source_region.height as u64,
                self.tile_size(),
            ));
        }
        self.subsamplings.as_deref().unwrap_or_default()
    }

    /// Materializes the pyramid: one mosaic per subsampling level, tiles
    /// laid out on the grid with edge tiles clipped to the source bounds.
    ///
    /// `grid_to_crs` maps finest-level source pixels to CRS positions; its
    /// origin becomes every mosaic's upper-left corner.
    pub fn build(
        &mut self,
        provider: ProviderId,
        input: TileInput,
        image_index: u32,
        grid_to_crs: &GridToCrs,
        crs: Crs,
        pyramid_id: impl Into<String>,
    ) -> Result<Arc<Pyramid>, TesseraError> {
        self.build_with_cancel(
            provider,
            input,
            image_index,
            grid_to_crs,
            crs,
            pyramid_id,
            &CancellationToken::new(),
        )
    }

    /// Like [`MosaicBuilder::build`], checking for cancellation between
    /// per-mosaic iterations.
    #[allow(clippy::too_many_arguments)]
    pub fn build_with_cancel(
        &mut self,
        provider: ProviderId,
        input: TileInput,
        image_index: u32,
        grid_to_crs: &GridToCrs,
        crs: Crs,
        pyramid_id: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<Arc<Pyramid>, TesseraError> {
        if !grid_to_crs.is_valid() {
            return Err(TesseraError::InvalidRegion(format!(
                "grid-to-CRS scales {}x{} cannot anchor a pyramid",
                grid_to_crs.x_scale, grid_to_crs.y_scale
            )));
        }

        let tile_size = self.tile_size();
        let base_scale = grid_to_crs.x_scale.abs();
        let source = self.source_region;
        let width = source.width as u64;
        let height = source.height as u64;

        let mut definitions = Vec::new();
        for &subsampling in self.subsamplings() {
            cancel.check()?;

            let span_x = tile_size.width() as u64 * subsampling as u64;
            let span_y = tile_size.height() as u64 * subsampling as u64;
            let columns = ceil_div(width, span_x);
            let rows = ceil_div(height, span_y);

            let mut tiles = Vec::with_capacity((columns * rows) as usize);
            for row in 0..rows {
                for column in 0..columns {
                    let x = source.x + (column * span_x) as i64;
                    let y = source.y + (row * span_y) as i64;
                    let tile_width = (span_x as i64).min(source.x + source.width - x);
                    let tile_height = (span_y as i64).min(source.y + source.height - y);
                    let tile = Tile::new(
                        provider.clone(),
                        input.clone(),
                        image_index,
                        TileRegion::new(x, y, tile_width, tile_height),
                        Subsampling::new(subsampling, subsampling).ok_or_else(|| {
                            TesseraError::InvalidSubsampling(subsampling.to_string())
                        })?,
                    )?;
                    tiles.push(((column as u32, row as u32), tile));
                }
            }

            definitions.push(MosaicDefinition {
                scale: base_scale * subsampling as f64,
                corner: CornerPosition::new(grid_to_crs.x_origin, grid_to_crs.y_origin),
                grid_size: Size::new(columns as u32, rows as u32),
                tile_size,
                tiles,
            });
        }

        Pyramid::new(pyramid_id, crs, definitions)
    }
}

/// Largest dimension within the configured bounds that divides the source
/// evenly; the source itself when it already fits one tile; the maximum
/// when no divisor exists.
fn suggest_dimension(source: u64, config: &BuilderConfig) -> u32 {
    let max = config.max_tile_dimension.max(1);
    let min = config.min_tile_dimension.clamp(1, max);

    if source <= max as u64 {
        return source as u32;
    }
    for candidate in (min..=max).rev() {
        if source % candidate as u64 == 0 {
            return candidate;
        }
    }
    max
}

/// Powers of two, starting at one, refined while the previous level still
/// needs at least two tiles on some axis.
fn compute_subsamplings(width: u64, height: u64, tile_size: Size<u32>) -> Vec<u32> {
    let mut subsamplings = vec![1u32];
    loop {
        let last = match subsamplings.last() {
            Some(last) => *last,
            None => break,
        };
        let tiles_x = ceil_div(width, tile_size.width() as u64 * last as u64);
        let tiles_y = ceil_div(height, tile_size.height() as u64 * last as u64);
        if tiles_x <= 1 && tiles_y <= 1 {
            break;
        }
        match last.checked_mul(2) {
            Some(next) => subsamplings.push(next),
            None => break,
        }
    }
    subsamplings
}

fn ceil_div(value: u64, divisor: u64) -> u64 {
    value.div_ceil(divisor.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(width: i64, height: i64) -> MosaicBuilder {
        MosaicBuilder::new(TileRegion::new(0, 0, width, height)).unwrap()
    }

    #[test]
    fn level_count_law_for_even_tilings() {
        // For D evenly divided by T the sequence has ceil(log2(D / T)) + 1
        // levels, each double the previous.
        for (dimension, tile, expected) in [
            (1024i64, 256u32, 3usize),
            (2048, 256, 4),
            (2048, 512, 3),
            (256, 256, 1),
            (65536, 256, 9),
        ] {
            let mut builder = builder(dimension, dimension);
            builder
                .set_tile_size(Some(Size::new(tile, tile)))
                .unwrap();
            let subsamplings = builder.subsamplings().to_vec();
            assert_eq!(subsamplings.len(), expected, "D={dimension} T={tile}");
            for pair in subsamplings.windows(2) {
                assert_eq!(pair[1], pair[0] * 2);
            }
        }
    }

    #[test]
    fn sequence_stops_at_one_tile_per_axis() {
        let mut builder = builder(1024, 1024);
        builder
            .set_tile_size(Some(Size::new(256, 256)))
            .unwrap();
        let coarsest = *builder.subsamplings().last().unwrap();
        // At the coarsest level one tile covers the whole source.
        assert_eq!(coarsest, 4);
        assert_eq!(ceil_div(1024, 256 * coarsest as u64), 1);
    }

    #[test]
    fn suggested_tile_size_prefers_divisors() {
        let builder = builder(1000, 4096);
        let size = builder.tile_size();
        assert_eq!(size.width(), 500);
        assert_eq!(size.height(), 512);

        // A source smaller than the maximum footprint fits a single tile.
        assert_eq!(self::builder(300, 300).tile_size(), Size::new(300, 300));
    }

    #[test]
    fn prime_dimension_falls_back_to_the_maximum() {
        let builder = builder(10007, 10007);
        assert_eq!(builder.tile_size(), Size::new(512, 512));
    }

    #[test]
    fn changing_tile_size_invalidates_the_sequence() {
        let mut builder = builder(1024, 1024);
        builder
            .set_tile_size(Some(Size::new(256, 256)))
            .unwrap();
        assert_eq!(builder.subsamplings().len(), 3);

        builder
            .set_tile_size(Some(Size::new(512, 512)))
            .unwrap();
        assert_eq!(builder.subsamplings().len(), 2);
    }

    #[test]
    fn rejects_empty_bounds_and_tile_sizes() {
        assert!(MosaicBuilder::new(TileRegion::new(0, 0, 0, 100)).is_err());
        assert!(MosaicBuilder::new(TileRegion::new(0, 0, 100, -1)).is_err());

        let mut builder = builder(100, 100);
        assert!(builder.set_tile_size(Some(Size::new(0, 256))).is_err());
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let mut a = builder(3000, 2000);
        let mut b = builder(3000, 2000);
        assert_eq!(a.tile_size(), b.tile_size());
        assert_eq!(a.subsamplings(), b.subsamplings());
    }

    #[test]
    fn build_materializes_every_level() {
        let mut builder = builder(1024, 512);
        builder
            .set_tile_size(Some(Size::new(256, 256)))
            .unwrap();

        let pyramid = builder
            .build(
                ProviderId::new("geotiff"),
                TileInput::Uri("scene.tif".to_string()),
                0,
                &GridToCrs::new(10.0, -10.0, 500_000.0, 4_100_000.0),
                Crs::EPSG3857,
                "scene",
            )
            .unwrap();

        // 1024x512 with 256px tiles: 4x2, then 2x1, then 1x1.
        assert_eq!(pyramid.mosaics().len(), 3);
        assert_eq!(pyramid.scales(), vec![10.0, 20.0, 40.0]);

        let finest = &pyramid.mosaics()[0];
        assert_eq!(finest.grid_size(), Size::new(4, 2));
        assert_eq!(finest.tile_count(), 8);

        let coarsest = &pyramid.mosaics()[2];
        assert_eq!(coarsest.grid_size(), Size::new(1, 1));
        let tile = coarsest.tile(0, 0).unwrap();
        // The single coarse tile is clipped to the source bounds.
        assert_eq!(tile.region(), TileRegion::new(0, 0, 1024, 512));
        assert_eq!(tile.subsampling(), Subsampling::new(4, 4).unwrap());
    }

    #[test]
    fn cancelled_build_bails_out() {
        let mut builder = builder(1024, 1024);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = builder.build_with_cancel(
            ProviderId::new("geotiff"),
            TileInput::Uri("scene.tif".to_string()),
            0,
            &GridToCrs::new(1.0, -1.0, 0.0, 0.0),
            Crs::EPSG3857,
            "scene",
            &cancel,
        );
        assert!(matches!(result, Err(TesseraError::Cancelled)));
    }
}
