//! InteropRecordStore — redb-backed persistence for hazard↔grid join
//! records.
//!
//! The store is deliberately strict: `store` fails on an existing
//! identity and `update` fails on a missing one. The orchestrator always
//! probes with a find before choosing between the two; a violation means
//! the join table has drifted, which is exactly the condition that
//! produces duplicate-hazard bugs, so it surfaces loudly instead of
//! being papered over.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use hazgrid_core::TimeRange;

use crate::error::{StateError, StateResult};
use crate::tables::RECORDS;
use crate::types::InteropRecord;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe record store backed by redb.
#[derive(Clone)]
pub struct InteropRecordStore {
    db: Arc<Database>,
}

impl InteropRecordStore {
    /// Open (or create) a persistent record store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "interop record store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory record store (for testing and replay).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory interop record store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RECORDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Lookups ────────────────────────────────────────────────────

    /// Find a record by its full time-keyed identity.
    pub fn find_by_primary_key(
        &self,
        site: &str,
        phenomenon: &str,
        significance: &str,
        event_id: &str,
        time_range: TimeRange,
    ) -> StateResult<Option<InteropRecord>> {
        let key = format!(
            "{}{event_id}/{}",
            InteropRecord::key_prefix(site, phenomenon, significance),
            time_range.key_fragment()
        );
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// ETN-keyed fallback lookup: all records for this hazard type
    /// carrying the given ETN, regardless of event id or time range.
    /// This is how a hazard re-sited under a different parm is found.
    pub fn find_by_etn(
        &self,
        site: &str,
        phenomenon: &str,
        significance: &str,
        etn: u32,
    ) -> StateResult<Vec<InteropRecord>> {
        let prefix = InteropRecord::key_prefix(site, phenomenon, significance);
        self.scan(&prefix, |r| r.etn == Some(etn))
    }

    /// All time-keyed records for a hazard type intersecting a range.
    pub fn find_for_key_and_range(
        &self,
        site: &str,
        phenomenon: &str,
        significance: &str,
        time_range: TimeRange,
    ) -> StateResult<Vec<InteropRecord>> {
        let prefix = InteropRecord::key_prefix(site, phenomenon, significance);
        self.scan(&prefix, |r| {
            r.etn.is_none() && r.time_range.intersects(&time_range)
        })
    }

    /// All records for a site intersecting a range, any phen/sig and any
    /// key form. This is the purge lookup.
    pub fn find_for_site_and_range(
        &self,
        site: &str,
        time_range: TimeRange,
    ) -> StateResult<Vec<InteropRecord>> {
        self.scan(&format!("{site}/"), |r| r.time_range.intersects(&time_range))
    }

    /// Every record (time-keyed and ETN-keyed) belonging to one event.
    pub fn find_for_event(&self, site: &str, event_id: &str) -> StateResult<Vec<InteropRecord>> {
        self.scan(&format!("{site}/"), |r| r.event_id == event_id)
    }

    fn scan(
        &self,
        prefix: &str,
        mut keep: impl FnMut(&InteropRecord) -> bool,
    ) -> StateResult<Vec<InteropRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(prefix) {
                continue;
            }
            let record = decode(value.value())?;
            if keep(&record) {
                results.push(record);
            }
        }
        Ok(results)
    }

    // ── Mutations ──────────────────────────────────────────────────

    /// Insert a new record. Fails with [`StateError::Conflict`] if a
    /// record with the same identity already exists.
    pub fn store(&self, record: &InteropRecord) -> StateResult<()> {
        let key = record.table_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Conflict(key));
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "interop record stored");
        Ok(())
    }

    /// Replace the payload of an existing record. Fails with
    /// [`StateError::NotFound`] if the identity is not present.
    pub fn update(&self, record: &InteropRecord) -> StateResult<()> {
        let key = record.table_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_none() {
                return Err(StateError::NotFound(key));
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "interop record updated");
        Ok(())
    }

    /// Remove a batch of records. Returns the number actually deleted.
    pub fn remove(&self, records: &[InteropRecord]) -> StateResult<u32> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut removed = 0;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            for record in records {
                let key = record.table_key();
                if table.remove(key.as_str()).map_err(map_err!(Write))?.is_some() {
                    removed += 1;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(removed, "interop records removed");
        Ok(removed)
    }

    /// List every record in the store (operator tooling).
    pub fn list_all(&self) -> StateResult<Vec<InteropRecord>> {
        self.scan("", |_| true)
    }
}

fn decode(bytes: &[u8]) -> StateResult<InteropRecord> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hazgrid_core::ParmId;

    fn record(event_id: &str, start: i64, end: i64) -> InteropRecord {
        InteropRecord {
            site: "OAX".to_string(),
            phenomenon: "FL".to_string(),
            significance: "W".to_string(),
            event_id: event_id.to_string(),
            etn: None,
            time_range: TimeRange::new(start, end),
            parm_id: ParmId::new("Hazards", "OAX", "Fcst"),
            geometry: geo::Geometry::Point(geo::Point::new(-96.0, 41.0)),
        }
    }

    fn etn_record(event_id: &str, etn: u32) -> InteropRecord {
        InteropRecord {
            etn: Some(etn),
            ..record(event_id, 0, 3600)
        }
    }

    // ── Store/find ─────────────────────────────────────────────────

    #[test]
    fn store_and_find_by_primary_key() {
        let store = InteropRecordStore::open_in_memory().unwrap();
        let rec = record("ev-1", 0, 3600);
        store.store(&rec).unwrap();

        let found = store
            .find_by_primary_key("OAX", "FL", "W", "ev-1", TimeRange::new(0, 3600))
            .unwrap();
        assert_eq!(found, Some(rec));
    }

    #[test]
    fn find_missing_returns_none() {
        let store = InteropRecordStore::open_in_memory().unwrap();
        let found = store
            .find_by_primary_key("OAX", "FL", "W", "nope", TimeRange::new(0, 3600))
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn duplicate_store_is_a_conflict() {
        let store = InteropRecordStore::open_in_memory().unwrap();
        let rec = record("ev-1", 0, 3600);
        store.store(&rec).unwrap();
        assert!(matches!(store.store(&rec), Err(StateError::Conflict(_))));
    }

    #[test]
    fn update_requires_existing_record() {
        let store = InteropRecordStore::open_in_memory().unwrap();
        let rec = record("ev-1", 0, 3600);
        assert!(matches!(store.update(&rec), Err(StateError::NotFound(_))));

        store.store(&rec).unwrap();
        let mut updated = rec.clone();
        updated.geometry = geo::Geometry::Point(geo::Point::new(-95.0, 40.0));
        store.update(&updated).unwrap();

        let found = store
            .find_by_primary_key("OAX", "FL", "W", "ev-1", TimeRange::new(0, 3600))
            .unwrap()
            .unwrap();
        assert_eq!(found.geometry, updated.geometry);
    }

    // ── Scans ──────────────────────────────────────────────────────

    #[test]
    fn key_and_range_scan_filters_time() {
        let store = InteropRecordStore::open_in_memory().unwrap();
        store.store(&record("ev-1", 0, 3600)).unwrap();
        store.store(&record("ev-2", 3600, 7200)).unwrap();
        store.store(&record("ev-3", 10800, 14400)).unwrap();

        let hits = store
            .find_for_key_and_range("OAX", "FL", "W", TimeRange::new(0, 7200))
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn etn_fallback_scan() {
        let store = InteropRecordStore::open_in_memory().unwrap();
        store.store(&etn_record("ev-1", 17)).unwrap();
        store.store(&etn_record("ev-2", 18)).unwrap();

        let hits = store.find_by_etn("OAX", "FL", "W", 17).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].event_id, "ev-1");

        // ETN-keyed records do not satisfy the time-keyed scan.
        let direct = store
            .find_for_key_and_range("OAX", "FL", "W", TimeRange::new(0, 3600))
            .unwrap();
        assert!(direct.is_empty());
    }

    #[test]
    fn site_and_range_scan_crosses_phen_sig() {
        let store = InteropRecordStore::open_in_memory().unwrap();
        store.store(&record("ev-1", 0, 3600)).unwrap();
        let mut ws = record("ev-2", 0, 3600);
        ws.phenomenon = "WS".to_string();
        store.store(&ws).unwrap();
        let mut other_site = record("ev-3", 0, 3600);
        other_site.site = "LBF".to_string();
        store.store(&other_site).unwrap();

        let hits = store
            .find_for_site_and_range("OAX", TimeRange::new(0, 3600))
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn event_scan_returns_both_key_forms() {
        let store = InteropRecordStore::open_in_memory().unwrap();
        store.store(&record("ev-1", 0, 3600)).unwrap();
        store.store(&etn_record("ev-1", 42)).unwrap();
        store.store(&record("ev-2", 0, 3600)).unwrap();

        let hits = store.find_for_event("OAX", "ev-1").unwrap();
        assert_eq!(hits.len(), 2);
    }

    // ── Removal & persistence ──────────────────────────────────────

    #[test]
    fn remove_batch_counts_deletions() {
        let store = InteropRecordStore::open_in_memory().unwrap();
        let a = record("ev-1", 0, 3600);
        let b = record("ev-2", 0, 3600);
        store.store(&a).unwrap();

        let removed = store.remove(&[a, b]).unwrap();
        assert_eq!(removed, 1);
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("interop.redb");

        {
            let store = InteropRecordStore::open(&db_path).unwrap();
            store.store(&record("ev-1", 0, 3600)).unwrap();
        }

        let store = InteropRecordStore::open(&db_path).unwrap();
        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].event_id, "ev-1");
    }
}
