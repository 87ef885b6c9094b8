//! Error taxonomy for the reconciliation engine.
//!
//! Failures are contained at the smallest unit of work: one discrete key
//! × one time range, or one hazard event. A lookup that finds nothing is
//! `Option::None` at the call site, never an error variant.

use thiserror::Error;

use hazgrid_raster::RasterError;
use hazgrid_state::StateError;

/// Result type alias for reconciliation operations.
pub type ReconResult<T> = Result<T, ReconError>;

/// Errors that can occur while reconciling hazards and grids.
#[derive(Debug, Error)]
pub enum ReconError {
    /// Missing or invalid grid parm info for a site. Fatal to that
    /// site's processing; logged, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Coordinate/geometry conversion failure. Fatal to the single
    /// event/grid pairing; sibling units proceed.
    #[error("transform error: {0}")]
    Transform(#[from] RasterError),

    /// An InteropRecord or grid replacement was in a different state
    /// than probed. A programming-invariant violation; the unit aborts.
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// Record store failure other than a conflict.
    #[error("record store error: {0}")]
    State(StateError),

    /// Hazard event registry failure.
    #[error("event store error: {0}")]
    Event(String),

    /// Grid storage failure.
    #[error("grid store error: {0}")]
    Grid(String),
}

impl From<StateError> for ReconError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Conflict(key) => ReconError::Conflict(key),
            StateError::NotFound(key) => {
                ReconError::Conflict(format!("update of missing record {key}"))
            }
            other => ReconError::State(other),
        }
    }
}
