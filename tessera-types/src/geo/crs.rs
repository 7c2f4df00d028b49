use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TesseraTypesError;

/// Authority code identifying a coordinate reference system.
///
/// The store never performs projection math; a CRS is an identity to match
/// on plus, possibly, a set of discretized extra axes. Reprojection is an
/// external collaborator's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CrsCode {
    /// An EPSG authority code, e.g. `EPSG:3857`.
    Epsg(u32),
    /// A non-EPSG identifier, kept verbatim.
    Other(String),
    /// No known identity.
    Unknown,
}

impl CrsCode {
    /// Parses an authority code of the form `EPSG:nnnn`.
    ///
    /// Codes with a different authority prefix are preserved as
    /// [`CrsCode::Other`]; an empty code is an error.
    pub fn parse(code: &str) -> Result<CrsCode, TesseraTypesError> {
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(TesseraTypesError::InvalidCrsCode(code.to_string()));
        }

        match trimmed.split_once(':') {
            Some((authority, number)) if authority.eq_ignore_ascii_case("epsg") => number
                .trim()
                .parse::<u32>()
                .map(CrsCode::Epsg)
                .map_err(|_| TesseraTypesError::InvalidCrsCode(code.to_string())),
            _ => Ok(CrsCode::Other(trimmed.to_string())),
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrsCode::Epsg(code) => write!(f, "EPSG:{code}"),
            CrsCode::Other(code) => write!(f, "{code}"),
            CrsCode::Unknown => write!(f, "unknown"),
        }
    }
}

/// A non-spatial CRS axis restricted to a discrete set of coordinate values.
///
/// Built from the coordinate values actually observed in a dataset (e.g. the
/// time stamps of its mosaics). The values are sorted and deduplicated on
/// construction; non-finite inputs are discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteAxis {
    name: String,
    values: Vec<f64>,
}

impl DiscreteAxis {
    /// Creates an axis from observed coordinate values.
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        let mut values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        values.sort_by(f64::total_cmp);
        values.dedup();
        Self {
            name: name.into(),
            values,
        }
    }

    /// Axis name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered, duplicate-free coordinate values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Coordinate reference system identity, possibly extended with discretized
/// non-spatial axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crs {
    code: CrsCode,
    extra_axes: Vec<DiscreteAxis>,
}

impl Crs {
    /// Web Mercator.
    pub const EPSG3857: Crs = Crs {
        code: CrsCode::Epsg(3857),
        extra_axes: Vec::new(),
    };

    /// WGS 84 geographic coordinates.
    pub const EPSG4326: Crs = Crs {
        code: CrsCode::Epsg(4326),
        extra_axes: Vec::new(),
    };

    /// Creates a two-dimensional CRS with the given identity.
    pub fn new(code: CrsCode) -> Self {
        Self {
            code,
            extra_axes: Vec::new(),
        }
    }

    /// Extends the CRS with discretized non-spatial axes.
    pub fn with_discrete_axes(mut self, axes: Vec<DiscreteAxis>) -> Self {
        self.extra_axes = axes;
        self
    }

    /// The authority code.
    pub fn code(&self) -> &CrsCode {
        &self.code
    }

    /// The discretized non-spatial axes, in axis order.
    pub fn extra_axes(&self) -> &[DiscreteAxis] {
        &self.extra_axes
    }

    /// Total number of axes: two spatial plus the extras.
    pub fn dimension(&self) -> usize {
        2 + self.extra_axes.len()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if !self.extra_axes.is_empty() {
            write!(f, " (+{} axes)", self.extra_axes.len())?;
        }
        Ok(())
    }
}
