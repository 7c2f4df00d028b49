//! Coordinate reference system identities.

mod crs;

pub use crs::{Crs, CrsCode, DiscreteAxis};
