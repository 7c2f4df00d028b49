//! Resolution matching: picking the right mosaics for a viewport.

use std::sync::Arc;

use tessera_types::geo::Crs;
use tessera_types::Envelope;

use crate::error::TesseraError;
use crate::mosaic::Mosaic;
use crate::pyramid::Pyramid;
use crate::pyramid_set::PyramidSet;

/// Tolerance that treats sub-percent resolution mismatches as exact.
pub const DEFAULT_RESOLUTION_TOLERANCE: f64 = 0.01;

/// Selects mosaics from a pyramid for a requested resolution and envelope.
///
/// One selection rule is used everywhere: *nearest coarser-or-equal*. The
/// best scale is the smallest one at least as coarse as the request (within
/// tolerance); only when the request is coarser than every available scale
/// does the nearest - the coarsest - scale stand in. Envelope intersection
/// is tested in the mosaic's own CRS axes; reprojecting the query envelope
/// into a compatible CRS is the caller's job.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoverageFinder;

impl CoverageFinder {
    /// Creates a finder.
    pub fn new() -> Self {
        Self
    }

    /// All mosaics at the best matching scale whose envelope intersects the
    /// query envelope.
    ///
    /// Mosaics sharing the best scale but anchored at different non-spatial
    /// coordinates are all returned, in their pyramid order.
    pub fn find_mosaics(
        &self,
        pyramid: &Pyramid,
        resolution: f64,
        tolerance: f64,
        envelope: &Envelope,
    ) -> Vec<Arc<Mosaic>> {
        let Some(best) = self.best_scale(pyramid, resolution, tolerance) else {
            return Vec::new();
        };

        pyramid
            .mosaics()
            .iter()
            .filter(|mosaic| mosaic.scale() == best)
            .filter(|mosaic| mosaic.envelope().intersects(envelope))
            .cloned()
            .collect()
    }

    /// One mosaic for the request, honoring `max_tile_count` as a hard cap
    /// on the tile fan-out over the query envelope.
    ///
    /// When every mosaic at the best scale would need more tiles than the
    /// cap allows, the next coarser scale is tried, and so on; `None` when
    /// even the coarsest candidate exceeds the cap or nothing intersects.
    pub fn find_mosaic(
        &self,
        pyramid: &Pyramid,
        resolution: f64,
        tolerance: f64,
        envelope: &Envelope,
        max_tile_count: u64,
    ) -> Option<Arc<Mosaic>> {
        let best = self.best_scale(pyramid, resolution, tolerance)?;
        let scales = pyramid.scales();
        let start = scales.iter().position(|scale| *scale == best)?;

        for scale in &scales[start..] {
            let candidate = pyramid
                .mosaics()
                .iter()
                .filter(|mosaic| mosaic.scale() == *scale)
                .filter(|mosaic| mosaic.envelope().intersects(envelope))
                .find(|mosaic| mosaic.tile_count_over(envelope) <= max_tile_count);
            if let Some(mosaic) = candidate {
                return Some(mosaic.clone());
            }
        }
        None
    }

    /// The pyramid of a set whose native CRS best matches the requested one.
    ///
    /// An exact authority-code match wins; otherwise any pyramid is
    /// acceptable, since reprojection is the caller's responsibility. `None`
    /// only for an empty set.
    pub fn find_pyramid(
        &self,
        set: &PyramidSet,
        crs: &Crs,
    ) -> Result<Option<Arc<Pyramid>>, TesseraError> {
        let pyramids = set.pyramids()?;
        if let Some(exact) = pyramids.iter().find(|p| p.crs().code() == crs.code()) {
            return Ok(Some(exact.clone()));
        }
        Ok(pyramids.first().cloned())
    }

    /// The best scale for a request: the smallest scale still at least as
    /// coarse as the requested resolution (within tolerance), or the
    /// coarsest available when the request is coarser than all of them.
    fn best_scale(&self, pyramid: &Pyramid, resolution: f64, tolerance: f64) -> Option<f64> {
        if !resolution.is_finite() {
            return None;
        }

        let scales = pyramid.scales();
        let floor = resolution * (1.0 - tolerance);
        scales
            .iter()
            .copied()
            .find(|scale| *scale >= floor)
            .or_else(|| scales.last().copied())
    }
}
