//! External collaborator boundaries.
//!
//! The engine never owns hazard events or grids; it reads and writes
//! them through these traits. Calls are synchronous-with-timeout on the
//! collaborator's side; a failure here is terminal for the unit of work
//! being processed and is never retried by the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hazgrid_core::{DiscreteGridSlice, EventId, GridRecord, HazardEvent, ParmId, TimeRange};
use hazgrid_raster::GridParmInfo;

/// Opaque collaborator failure.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Result type alias for collaborator calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// The hazard event registry.
pub trait HazardEventStore: Send + Sync {
    /// Allocate a fresh event skeleton for a site. The registry assigns
    /// the event id; the caller fills in the rest and stores it.
    fn create_event(&self, site: &str) -> StoreResult<HazardEvent>;

    /// Persist new events.
    fn store_events(&self, events: Vec<HazardEvent>) -> StoreResult<()>;

    /// Persist changes to existing events.
    fn update_events(&self, events: Vec<HazardEvent>) -> StoreResult<()>;

    /// Delete events by id. Returns the number actually removed.
    fn remove_events(&self, site: &str, event_ids: &[EventId]) -> StoreResult<u32>;

    /// Events for a site and hazard type whose time range intersects the
    /// given range.
    fn query_by_interop_key(
        &self,
        site: &str,
        phenomenon: &str,
        significance: &str,
        time_range: TimeRange,
    ) -> StoreResult<Vec<HazardEvent>>;
}

/// The grid storage subsystem.
pub trait GridStore: Send + Sync {
    /// Grid records for a parm intersecting a range, ordered by start.
    fn find_intersecting(
        &self,
        parm_id: &ParmId,
        time_range: TimeRange,
    ) -> StoreResult<Vec<GridRecord>>;

    /// Time ranges of records immediately adjacent (touching) the range.
    fn find_adjacent_ranges(
        &self,
        parm_id: &ParmId,
        time_range: TimeRange,
    ) -> StoreResult<Vec<TimeRange>>;

    /// The slice stored exactly over `time_range`, if any.
    fn fetch_slice(
        &self,
        parm_id: &ParmId,
        time_range: TimeRange,
    ) -> StoreResult<Option<DiscreteGridSlice>>;

    /// Replace the contents of `replacement` with `records`.
    ///
    /// Stored grids partially overlapping `replacement` are truncated at
    /// its boundary (their outside portions survive unchanged); grids
    /// fully inside are dropped. An empty `records` list clears the
    /// range.
    fn store(
        &self,
        records: Vec<GridRecord>,
        parm_id: &ParmId,
        replacement: TimeRange,
    ) -> StoreResult<()>;

    /// Grid parm info for a site, for the given database mode
    /// ("Fcst"/"Prac"). None when the site has no hazard grid.
    fn request_grid_parm_info(&self, mode: &str, site: &str) -> StoreResult<Option<GridParmInfo>>;
}

impl<T: HazardEventStore + ?Sized> HazardEventStore for std::sync::Arc<T> {
    fn create_event(&self, site: &str) -> StoreResult<HazardEvent> {
        (**self).create_event(site)
    }

    fn store_events(&self, events: Vec<HazardEvent>) -> StoreResult<()> {
        (**self).store_events(events)
    }

    fn update_events(&self, events: Vec<HazardEvent>) -> StoreResult<()> {
        (**self).update_events(events)
    }

    fn remove_events(&self, site: &str, event_ids: &[EventId]) -> StoreResult<u32> {
        (**self).remove_events(site, event_ids)
    }

    fn query_by_interop_key(
        &self,
        site: &str,
        phenomenon: &str,
        significance: &str,
        time_range: TimeRange,
    ) -> StoreResult<Vec<HazardEvent>> {
        (**self).query_by_interop_key(site, phenomenon, significance, time_range)
    }
}

impl<T: GridStore + ?Sized> GridStore for std::sync::Arc<T> {
    fn find_intersecting(
        &self,
        parm_id: &ParmId,
        time_range: TimeRange,
    ) -> StoreResult<Vec<GridRecord>> {
        (**self).find_intersecting(parm_id, time_range)
    }

    fn find_adjacent_ranges(
        &self,
        parm_id: &ParmId,
        time_range: TimeRange,
    ) -> StoreResult<Vec<TimeRange>> {
        (**self).find_adjacent_ranges(parm_id, time_range)
    }

    fn fetch_slice(
        &self,
        parm_id: &ParmId,
        time_range: TimeRange,
    ) -> StoreResult<Option<DiscreteGridSlice>> {
        (**self).fetch_slice(parm_id, time_range)
    }

    fn store(
        &self,
        records: Vec<GridRecord>,
        parm_id: &ParmId,
        replacement: TimeRange,
    ) -> StoreResult<()> {
        (**self).store(records, parm_id, replacement)
    }

    fn request_grid_parm_info(&self, mode: &str, site: &str) -> StoreResult<Option<GridParmInfo>> {
        (**self).request_grid_parm_info(mode, site)
    }
}

/// An inbound grid-change notification: one or more slices for a parm.
///
/// A slice with an empty history signals a purge of its time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridUpdateNotification {
    pub parm_id: ParmId,
    pub slices: Vec<DiscreteGridSlice>,
}

impl GridUpdateNotification {
    pub fn site(&self) -> &str {
        &self.parm_id.site
    }
}
