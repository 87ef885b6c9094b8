//! hazgrid-recon — the hazard↔grid reconciliation engine.
//!
//! Keeps vector hazard events and raster discrete forecast grids
//! mutually consistent. Grid edits produce/refresh events through
//! [`Reconciler::handle_grid_update`]; event edits flow back into the
//! grid through the `handle_event_*` entry points. The engine owns no
//! data of its own beyond the interoperability join records.

pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod slicer;
pub mod stores;
pub mod validator;

pub use error::{ReconError, ReconResult};
pub use orchestrator::{ReconcileSummary, Reconciler};
pub use stores::{GridStore, GridUpdateNotification, HazardEventStore, StoreError, StoreResult};
pub use validator::GridValidator;
