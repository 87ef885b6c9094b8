//! Error types for the geometry/raster bridge.

use thiserror::Error;

/// Result type alias for bridge operations.
pub type RasterResult<T> = Result<T, RasterError>;

/// Errors that can occur while moving between vector and raster space.
#[derive(Debug, Error)]
pub enum RasterError {
    /// Coordinate transform failure (non-finite or untransformable
    /// coordinates). Fatal to the single pairing being processed.
    #[error("coordinate transform failed: {0}")]
    Transform(String),

    /// The two grids being combined do not share dimensions.
    #[error("grid dimension mismatch: {0}")]
    DimensionMismatch(String),
}
