//! Error types used by the crate.

use std::path::PathBuf;

use tessera_types::TesseraTypesError;
use thiserror::Error;

/// Tessera error type.
#[derive(Debug, Error)]
pub enum TesseraError {
    /// A tile region with negative or otherwise unrepresentable dimensions.
    #[error("invalid tile region: {0}")]
    InvalidRegion(String),
    /// A subsampling factor below one.
    #[error("invalid subsampling: {0}")]
    InvalidSubsampling(String),
    /// Exact-scale lookup missed; nearest-match selection is the coverage
    /// finder's job, not the pyramid's.
    #[error("no mosaic at scale {0}")]
    NoSuchScale(f64),
    /// No tile reader registered under the requested provider identifier.
    #[error("no tile reader registered for provider {0:?}")]
    UnknownProvider(String),
    /// An index was used after being physically closed.
    #[error("spatial index at {0:?} is closed")]
    IndexClosed(PathBuf),
    /// On-disk index data that cannot be decoded, or backing rows that
    /// cannot be interpreted.
    #[error("corrupt store data: {0}")]
    Corrupt(String),
    /// The operation was cancelled between iteration boundaries.
    #[error("operation cancelled")]
    Cancelled,
    /// Error reading or writing the on-disk artifacts.
    #[error("failed to read or write index files")]
    Io(#[from] std::io::Error),
    /// Error from the primitives crate.
    #[error(transparent)]
    Types(#[from] TesseraTypesError),
}
