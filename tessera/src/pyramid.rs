//! Ordered collections of mosaics anchored to one CRS.

use std::sync::{Arc, Weak};

use tessera_types::geo::Crs;
use tessera_types::Envelope;

use crate::error::TesseraError;
use crate::mosaic::{cmp_coords, Mosaic, MosaicDefinition};
use crate::pyramid_set::PyramidSet;

/// Mosaics of one dataset at different scales, anchored to one CRS.
///
/// Mosaics are kept ordered finest first (ascending scale). Mosaics sharing
/// a scale but differing in their non-spatial corner coordinates are
/// distinct entries, ordered by those coordinates.
pub struct Pyramid {
    id: String,
    set: Weak<PyramidSet>,
    crs: Crs,
    mosaics: Vec<Arc<Mosaic>>,
}

impl Pyramid {
    /// Builds a pyramid from mosaic definitions.
    ///
    /// Fails if any definition is invalid (non-positive scale, empty grid).
    pub fn new(
        id: impl Into<String>,
        crs: Crs,
        definitions: Vec<MosaicDefinition>,
    ) -> Result<Arc<Pyramid>, TesseraError> {
        Self::with_set(id, crs, definitions, Weak::new())
    }

    pub(crate) fn with_set(
        id: impl Into<String>,
        crs: Crs,
        mut definitions: Vec<MosaicDefinition>,
        set: Weak<PyramidSet>,
    ) -> Result<Arc<Pyramid>, TesseraError> {
        for definition in &definitions {
            definition.validate()?;
        }
        definitions.sort_by(|a, b| {
            a.scale
                .total_cmp(&b.scale)
                .then_with(|| cmp_coords(&a.corner.extra, &b.corner.extra))
        });

        let id = id.into();
        Ok(Arc::new_cyclic(|weak: &Weak<Pyramid>| Pyramid {
            id,
            set,
            crs,
            mosaics: definitions
                .into_iter()
                .map(|definition| Arc::new(Mosaic::new(weak.clone(), definition)))
                .collect(),
        }))
    }

    /// Pyramid identifier, unique within its set.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The CRS all mosaics of this pyramid are expressed in.
    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    /// The owning pyramid set, unless it was dropped or the pyramid is
    /// free-standing.
    pub fn set(&self) -> Option<Arc<PyramidSet>> {
        self.set.upgrade()
    }

    /// All mosaics, finest first.
    pub fn mosaics(&self) -> &[Arc<Mosaic>] {
        &self.mosaics
    }

    /// The distinct scales present, finest first.
    pub fn scales(&self) -> Vec<f64> {
        let mut scales: Vec<f64> = self.mosaics.iter().map(|m| m.scale()).collect();
        scales.dedup();
        scales
    }

    /// Mosaics at exactly the requested scale.
    ///
    /// There is no nearest-match here: an inexact scale fails with
    /// [`TesseraError::NoSuchScale`]. Resolution matching under tolerance is
    /// the coverage finder's job.
    pub fn mosaics_at_scale(&self, scale: f64) -> Result<Vec<Arc<Mosaic>>, TesseraError> {
        let matching: Vec<Arc<Mosaic>> = self
            .mosaics
            .iter()
            .filter(|m| m.scale() == scale)
            .cloned()
            .collect();
        if matching.is_empty() {
            Err(TesseraError::NoSuchScale(scale))
        } else {
            Ok(matching)
        }
    }

    /// Union of the mosaic envelopes, or `None` for an empty pyramid.
    pub fn envelope(&self) -> Option<Envelope> {
        let mut mosaics = self.mosaics.iter();
        let first = mosaics.next()?.envelope();
        Some(mosaics.fold(first, |acc, mosaic| acc.merge(&mosaic.envelope())))
    }
}

impl std::fmt::Debug for Pyramid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pyramid")
            .field("id", &self.id)
            .field("crs", &self.crs.to_string())
            .field("mosaics", &self.mosaics.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tessera_types::cartesian::Size;

    use super::*;
    use crate::mosaic::CornerPosition;

    fn definition(scale: f64, extra: Vec<f64>) -> MosaicDefinition {
        MosaicDefinition {
            scale,
            corner: CornerPosition::new(0.0, 1024.0).with_extra(extra),
            grid_size: Size::new(2, 2),
            tile_size: Size::new(256, 256),
            tiles: Vec::new(),
        }
    }

    fn pyramid(scales: &[f64]) -> Arc<Pyramid> {
        Pyramid::new(
            "scene",
            Crs::EPSG3857,
            scales.iter().map(|s| definition(*s, vec![])).collect(),
        )
        .unwrap()
    }

    #[test]
    fn mosaics_are_ordered_finest_first() {
        let pyramid = pyramid(&[8.0, 1.0, 4.0, 2.0]);
        let scales: Vec<f64> = pyramid.mosaics().iter().map(|m| m.scale()).collect();
        assert_eq!(scales, vec![1.0, 2.0, 4.0, 8.0]);
        assert_eq!(pyramid.scales(), vec![1.0, 2.0, 4.0, 8.0]);
    }

    #[test]
    fn exact_scale_lookup_does_not_approximate() {
        let pyramid = pyramid(&[1.0, 2.0, 4.0]);
        assert_eq!(pyramid.mosaics_at_scale(2.0).unwrap().len(), 1);
        assert_matches!(
            pyramid.mosaics_at_scale(2.0001),
            Err(TesseraError::NoSuchScale(_))
        );
    }

    #[test]
    fn duplicate_scales_with_distinct_extra_axes_are_kept() {
        let pyramid = Pyramid::new(
            "scene",
            Crs::EPSG3857,
            vec![
                definition(2.0, vec![2021.0]),
                definition(2.0, vec![2020.0]),
                definition(1.0, vec![2020.0]),
            ],
        )
        .unwrap();

        let at_two = pyramid.mosaics_at_scale(2.0).unwrap();
        assert_eq!(at_two.len(), 2);
        assert_eq!(at_two[0].corner().extra, vec![2020.0]);
        assert_eq!(at_two[1].corner().extra, vec![2021.0]);
    }

    #[test]
    fn mosaics_hold_a_back_reference() {
        let pyramid = pyramid(&[1.0]);
        let mosaic = pyramid.mosaics()[0].clone();
        let owner = mosaic.pyramid().expect("pyramid is alive");
        assert_eq!(owner.id(), "scene");

        drop(pyramid);
        drop(owner);
        assert!(mosaic.pyramid().is_none());
    }

    #[test]
    fn invalid_definition_fails_construction() {
        let result = Pyramid::new("scene", Crs::EPSG3857, vec![definition(-1.0, vec![])]);
        assert_matches!(result, Err(TesseraError::Corrupt(_)));
    }

    #[test]
    fn envelope_merges_all_levels() {
        let pyramid = pyramid(&[1.0, 2.0]);
        let envelope = pyramid.envelope().unwrap();
        let rect = envelope.spatial().unwrap();
        // The coarser level covers twice the extent of the finer one.
        assert_eq!(rect.x_max, 1024.0);
        assert_eq!(rect.y_min, 0.0);
    }
}
