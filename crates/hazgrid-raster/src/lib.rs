//! hazgrid-raster — the geometry/raster bridge.
//!
//! Converts vector hazard geometries to bit grids aligned to a forecast
//! grid's spatial reference and back. The conversion is cell-exact in
//! grid space: set-difference and union operations on hazard areas are
//! performed on [`BitGrid`]s, never on floating-point polygons, so
//! residual regions are stable under repeated reconciliation.

pub mod bridge;
pub mod error;
pub mod grid;
pub mod location;

pub use bridge::{RasterOutcome, is_closed, quantized_range, rasterize, to_geometry};
pub use error::{RasterError, RasterResult};
pub use grid::BitGrid;
pub use location::{GridLocation, GridParmInfo};
