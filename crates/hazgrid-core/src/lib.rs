//! hazgrid-core — shared domain types for the HazGrid reconciliation engine.
//!
//! Hazard events, discrete keys, time ranges, grid slices, and the
//! `hazgrid.toml` configuration schema. No persistence or algorithmic
//! logic lives here; that belongs to the raster, state, and recon crates.

pub mod config;
pub mod key;
pub mod time;
pub mod types;

pub use config::{HazGridConfig, InteropConfig, SiteGridConfig};
pub use key::{DiscreteKey, KeyError, NONE_KEY};
pub use time::{TimeConstraints, TimeRange};
pub use types::*;
