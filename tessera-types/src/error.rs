//! Error type used by the crate.

use thiserror::Error;

/// Error enum.
#[derive(Debug, Error)]
pub enum TesseraTypesError {
    /// A CRS authority code could not be parsed.
    #[error("invalid CRS authority code: {0}")]
    InvalidCrsCode(String),
}
