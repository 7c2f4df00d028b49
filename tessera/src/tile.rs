//! Immutable tile descriptors.
//!
//! A [`Tile`] addresses one raster fragment of a source image: its region in
//! source pixel space, the decimation applied to it, and where the pixels
//! come from (an input reference plus a reader-provider identifier). Tiles
//! are created once at mosaic-build time and never mutated; pixel decoding
//! is the job of the pluggable [reader](crate::reader).

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tessera_types::GridToCrs;

use crate::error::TesseraError;

/// Largest width or height storable in the packed on-disk form.
pub const MAX_PACKED_DIMENSION: i64 = u16::MAX as i64;

/// Identifier of the reader provider able to decode a tile's input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(String);

impl ProviderId {
    /// Creates a provider identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to the source input a tile's pixels are decoded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileInput {
    /// A file on the local file system.
    Path(PathBuf),
    /// A remote or otherwise scheme-qualified resource.
    Uri(String),
}

impl fmt::Display for TileInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileInput::Path(path) => write!(f, "{}", path.display()),
            TileInput::Uri(uri) => write!(f, "{uri}"),
        }
    }
}

/// Tile region in source-image pixel space.
///
/// Dimensions are signed so that invalid (negative) input can be rejected at
/// construction instead of wrapping silently.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRegion {
    /// Left pixel column.
    pub x: i64,
    /// Top pixel row.
    pub y: i64,
    /// Width in pixels.
    pub width: i64,
    /// Height in pixels.
    pub height: i64,
}

impl TileRegion {
    /// Creates a region.
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Integer decimation factors relating a tile's resolution to the finest
/// available resolution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subsampling {
    dx: u32,
    dy: u32,
}

impl Subsampling {
    /// No decimation.
    pub const NONE: Subsampling = Subsampling { dx: 1, dy: 1 };

    /// Creates a subsampling. Factors below one are not representable.
    pub fn new(dx: u32, dy: u32) -> Option<Subsampling> {
        if dx >= 1 && dy >= 1 {
            Some(Self { dx, dy })
        } else {
            None
        }
    }

    /// Decimation along X.
    pub fn dx(&self) -> u32 {
        self.dx
    }

    /// Decimation along Y.
    pub fn dy(&self) -> u32 {
        self.dy
    }
}

impl fmt::Display for Subsampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.dx, self.dy)
    }
}

/// Size of a tile as stored on disk.
///
/// The packed form keeps one unsigned 16-bit field per axis; regions larger
/// than that take the `Large` form, which stores the real size out-of-band.
/// The store picks the representation transparently - an oversized region is
/// never a construction error.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackedSize {
    /// Both dimensions fit the 16-bit fields.
    Packed {
        /// Width in pixels.
        width: u16,
        /// Height in pixels.
        height: u16,
    },
    /// At least one dimension exceeds the 16-bit range; the packed fields
    /// are clamped and the real size is kept here.
    Large {
        /// Width in pixels.
        width: i64,
        /// Height in pixels.
        height: i64,
    },
}

/// A single addressable raster fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tile {
    provider: ProviderId,
    input: TileInput,
    image_index: u32,
    region: TileRegion,
    subsampling: Subsampling,
}

impl Tile {
    /// Creates a tile.
    ///
    /// Fails with [`TesseraError::InvalidRegion`] for negative dimensions.
    /// Regions beyond the packed 16-bit range are valid; they transparently
    /// use the large on-disk representation.
    pub fn new(
        provider: ProviderId,
        input: TileInput,
        image_index: u32,
        region: TileRegion,
        subsampling: Subsampling,
    ) -> Result<Tile, TesseraError> {
        if region.width < 0 || region.height < 0 {
            return Err(TesseraError::InvalidRegion(format!(
                "negative dimensions {}x{}",
                region.width, region.height
            )));
        }

        Ok(Tile {
            provider,
            input,
            image_index,
            region,
            subsampling,
        })
    }

    /// Creates a tile deriving its subsampling from a grid-to-CRS mapping
    /// expressed relative to the pyramid's finest level, so that the scale
    /// factors are the decimation applied to this tile.
    ///
    /// Fails for non-positive or sub-unit scales.
    pub fn from_grid_to_crs(
        provider: ProviderId,
        input: TileInput,
        image_index: u32,
        region: TileRegion,
        grid_to_crs: &GridToCrs,
    ) -> Result<Tile, TesseraError> {
        if !grid_to_crs.is_valid() {
            return Err(TesseraError::InvalidSubsampling(format!(
                "grid-to-CRS scales {}x{} are not usable as decimation factors",
                grid_to_crs.x_scale, grid_to_crs.y_scale
            )));
        }

        let dx = grid_to_crs.x_scale.abs().round();
        let dy = grid_to_crs.y_scale.abs().round();
        let subsampling = if dx >= 1.0 && dy >= 1.0 && dx <= u32::MAX as f64 && dy <= u32::MAX as f64
        {
            Subsampling::new(dx as u32, dy as u32)
        } else {
            None
        };

        let subsampling = subsampling.ok_or_else(|| {
            TesseraError::InvalidSubsampling(format!(
                "grid-to-CRS scales {}x{} round to factors below one",
                grid_to_crs.x_scale, grid_to_crs.y_scale
            ))
        })?;

        Tile::new(provider, input, image_index, region, subsampling)
    }

    /// The reader-provider identifier.
    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    /// The source input reference.
    pub fn input(&self) -> &TileInput {
        &self.input
    }

    /// Index of the image inside the input, for multi-image containers.
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// The exact stored region, at full precision regardless of the packed
    /// on-disk representation.
    pub fn region(&self) -> TileRegion {
        self.region
    }

    /// The decimation factors.
    pub fn subsampling(&self) -> Subsampling {
        self.subsampling
    }

    /// The on-disk representation this tile's size takes.
    pub fn packed_size(&self) -> PackedSize {
        if self.region.width <= MAX_PACKED_DIMENSION && self.region.height <= MAX_PACKED_DIMENSION
        {
            PackedSize::Packed {
                width: self.region.width as u16,
                height: self.region.height as u16,
            }
        } else {
            PackedSize::Large {
                width: self.region.width,
                height: self.region.height,
            }
        }
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tile[{} {} #{} region=({}, {}, {}x{}) subsampling={}]",
            self.provider,
            self.input,
            self.image_index,
            self.region.x,
            self.region.y,
            self.region.width,
            self.region.height,
            self.subsampling
        )
    }
}

/// Wire form of a tile: position at full precision, size in the packed
/// encoding.
#[derive(Serialize, Deserialize)]
struct TileWire {
    provider: ProviderId,
    input: TileInput,
    image_index: u32,
    x: i64,
    y: i64,
    size: PackedSize,
    dx: u32,
    dy: u32,
}

impl From<&Tile> for TileWire {
    fn from(tile: &Tile) -> Self {
        TileWire {
            provider: tile.provider.clone(),
            input: tile.input.clone(),
            image_index: tile.image_index,
            x: tile.region.x,
            y: tile.region.y,
            size: tile.packed_size(),
            dx: tile.subsampling.dx,
            dy: tile.subsampling.dy,
        }
    }
}

impl TryFrom<TileWire> for Tile {
    type Error = TesseraError;

    fn try_from(wire: TileWire) -> Result<Self, Self::Error> {
        let (width, height) = match wire.size {
            PackedSize::Packed { width, height } => (width as i64, height as i64),
            PackedSize::Large { width, height } => (width, height),
        };
        let subsampling = Subsampling::new(wire.dx, wire.dy).ok_or_else(|| {
            TesseraError::InvalidSubsampling(format!("{}x{}", wire.dx, wire.dy))
        })?;

        Tile::new(
            wire.provider,
            wire.input,
            wire.image_index,
            TileRegion::new(wire.x, wire.y, width, height),
            subsampling,
        )
    }
}

impl Serialize for Tile {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TileWire::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tile {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = TileWire::deserialize(deserializer)?;
        Tile::try_from(wire).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn tile(region: TileRegion) -> Result<Tile, TesseraError> {
        Tile::new(
            ProviderId::new("geotiff"),
            TileInput::Path(PathBuf::from("imagery/scene_07.tif")),
            0,
            region,
            Subsampling::NONE,
        )
    }

    #[test]
    fn rejects_negative_dimensions() {
        assert_matches!(
            tile(TileRegion::new(0, 0, -1, 256)),
            Err(TesseraError::InvalidRegion(_))
        );
        assert_matches!(
            tile(TileRegion::new(0, 0, 256, -256)),
            Err(TesseraError::InvalidRegion(_))
        );
    }

    #[test]
    fn boundary_size_stays_packed() {
        let tile = tile(TileRegion::new(0, 0, 65535, 65535)).unwrap();
        assert_matches!(
            tile.packed_size(),
            PackedSize::Packed {
                width: 65535,
                height: 65535
            }
        );
    }

    #[test]
    fn oversized_region_uses_large_form() {
        let tile = tile(TileRegion::new(0, 0, 65536, 128)).unwrap();
        assert_matches!(
            tile.packed_size(),
            PackedSize::Large {
                width: 65536,
                height: 128
            }
        );
        // Full precision is preserved on the region itself.
        assert_eq!(tile.region().width, 65536);
    }

    #[test]
    fn round_trip_at_packed_boundary() {
        for width in [1, 255, 65535, 65536, 1 << 40] {
            let original = tile(TileRegion::new(-12, 34, width, 65535)).unwrap();
            let bytes = bincode::serialize(&original).unwrap();
            let decoded: Tile = bincode::deserialize(&bytes).unwrap();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn round_trip_preserves_provider_identity() {
        let original = Tile::new(
            ProviderId::new("netcdf"),
            TileInput::Uri("s3://bucket/scene.nc".to_string()),
            3,
            TileRegion::new(0, 0, 512, 512),
            Subsampling::new(4, 2).unwrap(),
        )
        .unwrap();

        let bytes = bincode::serialize(&original).unwrap();
        let decoded: Tile = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.provider(), &ProviderId::new("netcdf"));
        assert_eq!(decoded.subsampling(), Subsampling::new(4, 2).unwrap());
        assert_eq!(decoded, original);
    }

    #[test]
    fn corrupt_subsampling_fails_to_decode() {
        let wire = TileWire {
            provider: ProviderId::new("geotiff"),
            input: TileInput::Uri("file.tif".to_string()),
            image_index: 0,
            x: 0,
            y: 0,
            size: PackedSize::Packed {
                width: 16,
                height: 16,
            },
            dx: 0,
            dy: 1,
        };
        let bytes = bincode::serialize(&wire).unwrap();
        assert!(bincode::deserialize::<Tile>(&bytes).is_err());
    }

    #[test]
    fn display_is_deterministic() {
        let tile = tile(TileRegion::new(128, 256, 512, 512)).unwrap();
        assert_eq!(
            tile.to_string(),
            "Tile[geotiff imagery/scene_07.tif #0 region=(128, 256, 512x512) subsampling=1x1]"
        );
    }

    #[test]
    fn grid_to_crs_constructor_derives_subsampling() {
        let tile = Tile::from_grid_to_crs(
            ProviderId::new("geotiff"),
            TileInput::Uri("scene.tif".to_string()),
            0,
            TileRegion::new(0, 0, 256, 256),
            &GridToCrs::new(4.0, -4.0, 0.0, 0.0),
        )
        .unwrap();
        assert_eq!(tile.subsampling(), Subsampling::new(4, 4).unwrap());

        let err = Tile::from_grid_to_crs(
            ProviderId::new("geotiff"),
            TileInput::Uri("scene.tif".to_string()),
            0,
            TileRegion::new(0, 0, 256, 256),
            &GridToCrs::new(0.25, -0.25, 0.0, 0.0),
        );
        assert_matches!(err, Err(TesseraError::InvalidSubsampling(_)));
    }
}
