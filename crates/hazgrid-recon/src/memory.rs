//! In-memory collaborator implementations.
//!
//! Reference adapters for the [`HazardEventStore`] and [`GridStore`]
//! traits, used by the integration tests and the CLI replay command.
//! They implement the same replacement/truncation semantics the real
//! grid subsystem provides.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use geo::{Geometry, Point};

use hazgrid_core::{
    DiscreteGridSlice, EventId, GridRecord, HazardEvent, HazardStatus, ParmId, SiteId, TimeRange,
};
use hazgrid_raster::GridParmInfo;

use crate::stores::{GridStore, HazardEventStore, StoreError, StoreResult};

fn lock<'a, T>(m: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Events ────────────────────────────────────────────────────────

/// In-memory hazard event registry.
#[derive(Default)]
pub struct MemoryEventStore {
    events: Mutex<BTreeMap<(SiteId, EventId), HazardEvent>>,
    next_id: AtomicU64,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an event directly (test/replay setup).
    pub fn insert(&self, event: HazardEvent) {
        lock(&self.events).insert((event.site.clone(), event.event_id.clone()), event);
    }

    pub fn get(&self, site: &str, event_id: &str) -> Option<HazardEvent> {
        lock(&self.events)
            .get(&(site.to_string(), event_id.to_string()))
            .cloned()
    }

    pub fn all(&self) -> Vec<HazardEvent> {
        lock(&self.events).values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }
}

impl HazardEventStore for MemoryEventStore {
    fn create_event(&self, site: &str) -> StoreResult<HazardEvent> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(HazardEvent {
            site: site.to_string(),
            event_id: format!("ev-{n}"),
            phenomenon: String::new(),
            significance: String::new(),
            subtype: None,
            status: HazardStatus::Pending,
            time_range: TimeRange::new(0, 0),
            geometry: Geometry::Point(Point::new(0.0, 0.0)),
            attributes: Default::default(),
            created_at: 0,
            issued_at: None,
        })
    }

    fn store_events(&self, events: Vec<HazardEvent>) -> StoreResult<()> {
        let mut map = lock(&self.events);
        for event in events {
            map.insert((event.site.clone(), event.event_id.clone()), event);
        }
        Ok(())
    }

    fn update_events(&self, events: Vec<HazardEvent>) -> StoreResult<()> {
        let mut map = lock(&self.events);
        for event in events {
            let key = (event.site.clone(), event.event_id.clone());
            if !map.contains_key(&key) {
                return Err(StoreError::new(format!(
                    "update of unknown event {}/{}",
                    key.0, key.1
                )));
            }
            map.insert(key, event);
        }
        Ok(())
    }

    fn remove_events(&self, site: &str, event_ids: &[EventId]) -> StoreResult<u32> {
        let mut map = lock(&self.events);
        let mut removed = 0;
        for id in event_ids {
            if map.remove(&(site.to_string(), id.clone())).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn query_by_interop_key(
        &self,
        site: &str,
        phenomenon: &str,
        significance: &str,
        time_range: TimeRange,
    ) -> StoreResult<Vec<HazardEvent>> {
        Ok(lock(&self.events)
            .values()
            .filter(|e| {
                e.site == site
                    && e.phenomenon == phenomenon
                    && e.significance == significance
                    && e.time_range.intersects(&time_range)
            })
            .cloned()
            .collect())
    }
}

// ── Grids ─────────────────────────────────────────────────────────

/// In-memory grid storage with boundary-truncating replacement.
#[derive(Default)]
pub struct MemoryGridStore {
    records: Mutex<Vec<GridRecord>>,
    parm_info: Mutex<BTreeMap<SiteId, GridParmInfo>>,
}

impl MemoryGridStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a grid record directly (test/replay setup).
    pub fn insert(&self, record: GridRecord) {
        let mut records = lock(&self.records);
        records.push(record);
        records.sort_by_key(|r| (r.parm_id.to_string(), r.time_range().start));
    }

    /// Register parm info answered by `request_grid_parm_info`.
    pub fn set_parm_info(&self, site: &str, info: GridParmInfo) {
        lock(&self.parm_info).insert(site.to_string(), info);
    }

    pub fn all(&self) -> Vec<GridRecord> {
        lock(&self.records).clone()
    }

    /// Records for one parm ordered by start time.
    pub fn records_for(&self, parm_id: &ParmId) -> Vec<GridRecord> {
        let mut out: Vec<GridRecord> = lock(&self.records)
            .iter()
            .filter(|r| &r.parm_id == parm_id)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.time_range().start);
        out
    }
}

impl GridStore for MemoryGridStore {
    fn find_intersecting(
        &self,
        parm_id: &ParmId,
        time_range: TimeRange,
    ) -> StoreResult<Vec<GridRecord>> {
        Ok(self
            .records_for(parm_id)
            .into_iter()
            .filter(|r| r.time_range().intersects(&time_range))
            .collect())
    }

    fn find_adjacent_ranges(
        &self,
        parm_id: &ParmId,
        time_range: TimeRange,
    ) -> StoreResult<Vec<TimeRange>> {
        Ok(self
            .records_for(parm_id)
            .into_iter()
            .map(|r| r.time_range())
            .filter(|tr| tr.is_adjacent(&time_range))
            .collect())
    }

    fn fetch_slice(
        &self,
        parm_id: &ParmId,
        time_range: TimeRange,
    ) -> StoreResult<Option<DiscreteGridSlice>> {
        Ok(self
            .records_for(parm_id)
            .into_iter()
            .find(|r| r.time_range() == time_range)
            .map(|r| r.slice))
    }

    fn store(
        &self,
        records: Vec<GridRecord>,
        parm_id: &ParmId,
        replacement: TimeRange,
    ) -> StoreResult<()> {
        let mut all = lock(&self.records);
        let mut kept = Vec::new();
        for existing in all.drain(..) {
            if &existing.parm_id != parm_id || !existing.time_range().intersects(&replacement) {
                kept.push(existing);
                continue;
            }
            // Truncate at the replacement boundary; outside parts survive.
            let tr = existing.time_range();
            if tr.start < replacement.start {
                kept.push(GridRecord::new(
                    existing.parm_id.clone(),
                    existing.slice.clip(TimeRange::new(tr.start, replacement.start)),
                ));
            }
            if tr.end > replacement.end {
                kept.push(GridRecord::new(
                    existing.parm_id.clone(),
                    existing.slice.clip(TimeRange::new(replacement.end, tr.end)),
                ));
            }
        }
        for record in records {
            if !replacement.contains(&record.time_range()) {
                return Err(StoreError::new(format!(
                    "record {:?} outside replacement range {:?}",
                    record.time_range(),
                    replacement
                )));
            }
            kept.push(record);
        }
        kept.sort_by_key(|r| (r.parm_id.to_string(), r.time_range().start));
        *all = kept;
        Ok(())
    }

    fn request_grid_parm_info(&self, _mode: &str, site: &str) -> StoreResult<Option<GridParmInfo>> {
        Ok(lock(&self.parm_info).get(site).cloned())
    }
}
