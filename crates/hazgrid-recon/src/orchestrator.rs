//! The reconciliation orchestrator.
//!
//! Owns both directions of synchronization: grid edits flowing into the
//! hazard event registry, and event edits flowing into the grids. Work is
//! serialized per site; units of work (one key × one time range, or one
//! event) fail independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use geo::Geometry;
use tracing::{debug, info, warn};

use hazgrid_core::{
    DiscreteGridSlice, GridHistoryEntry, HazGridConfig, HazardEvent, HazardStatus, SiteId,
    TimeRange,
};
use hazgrid_raster::{self as raster, BitGrid, GridParmInfo, RasterOutcome};
use hazgrid_state::{InteropRecord, InteropRecordStore};

use crate::error::{ReconError, ReconResult};
use crate::slicer::{self, KeySlice, SeparatedRecords};
use crate::stores::{GridStore, GridUpdateNotification, HazardEventStore, StoreError};
use crate::validator::GridValidator;

/// Counts of what one reconciliation pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Hazard events created from grid content.
    pub created: u32,
    /// Events or join records refreshed.
    pub updated: u32,
    /// Events removed by purge or deletion.
    pub removed: u32,
    /// Units of work that failed and were skipped.
    pub failed: u32,
}

impl ReconcileSummary {
    pub fn absorb(&mut self, other: ReconcileSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.removed += other.removed;
        self.failed += other.failed;
    }
}

/// The engine. Generic over its collaborators so tests and the CLI can
/// run it against in-memory stores.
pub struct Reconciler<E, G> {
    events: E,
    grids: G,
    records: InteropRecordStore,
    validator: GridValidator,
    mode: String,
    parm_info: Mutex<HashMap<SiteId, GridParmInfo>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<E: HazardEventStore, G: GridStore> Reconciler<E, G> {
    pub fn new(
        events: E,
        grids: G,
        records: InteropRecordStore,
        config: &HazGridConfig,
    ) -> Self {
        let mode = config.interop.mode.clone();
        let parm_info = config
            .sites
            .iter()
            .map(|site| (site.id.clone(), GridParmInfo::from_site_config(site, &mode)))
            .collect();
        Self {
            events,
            grids,
            records,
            validator: GridValidator::from_config(&config.interop),
            mode,
            parm_info: Mutex::new(parm_info),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_store(&self) -> &InteropRecordStore {
        &self.records
    }

    /// Parm info for a site: configuration first, then the grid
    /// subsystem. A site with neither cannot be reconciled at all.
    fn parm_info_for(&self, site: &str) -> ReconResult<GridParmInfo> {
        if let Some(info) = lock(&self.parm_info).get(site) {
            return Ok(info.clone());
        }
        let fetched = self
            .grids
            .request_grid_parm_info(&self.mode, site)
            .map_err(grid_err)?;
        match fetched {
            Some(info) => {
                lock(&self.parm_info).insert(site.to_string(), info.clone());
                Ok(info)
            }
            None => Err(ReconError::Configuration(format!(
                "no hazard grid parm info for site {site}"
            ))),
        }
    }

    /// Serialize all work touching one site's hazard grid. Purges span
    /// every hazard type, so the lock is per site rather than per
    /// site/key; a purge and a concurrent reconciliation of the same
    /// window can never interleave their probe-then-write sequences.
    async fn lock_for(&self, site: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let entry = lock(&self.locks)
            .entry(site.to_string())
            .or_default()
            .clone();
        entry.lock_owned().await
    }

    // ── Grid → events ──────────────────────────────────────────────

    /// Process a grid-change notification. Slices with an empty history
    /// are purge signals; the rest are decomposed per key and reconciled
    /// independently, a failure in one unit never blocking the others.
    pub async fn handle_grid_update(
        &self,
        notification: &GridUpdateNotification,
    ) -> ReconResult<ReconcileSummary> {
        let site = notification.site().to_string();
        let info = self.parm_info_for(&site)?;
        let mut summary = ReconcileSummary::default();

        for slice in &notification.slices {
            if slice.history.is_empty() {
                summary.absorb(self.purge_window(&info, slice.valid_time).await?);
                continue;
            }
            for unit in slicer::separate_keys(slice) {
                if !self.validator.needs_grid_conversion(&unit.key) {
                    debug!(site = %site, key = %unit.key, "hazard type not grid-interoperable, skipped");
                    continue;
                }
                let _guard = self.lock_for(&site).await;
                match self.reconcile_grid_key(&info, slice, &unit) {
                    Ok(s) => summary.absorb(s),
                    Err(err) => {
                        warn!(
                            site = %site,
                            key = %unit.key,
                            range = %unit.valid_time.key_fragment(),
                            %err,
                            "grid key reconciliation failed, unit skipped"
                        );
                        summary.failed += 1;
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Reconcile one key's raster footprint over one time range against
    /// the event registry.
    fn reconcile_grid_key(
        &self,
        info: &GridParmInfo,
        slice: &DiscreteGridSlice,
        unit: &KeySlice,
    ) -> ReconResult<ReconcileSummary> {
        let site = &info.parm_id.site;
        let key = &unit.key;
        let mut summary = ReconcileSummary::default();

        let mut matched = self.records.find_for_key_and_range(
            site,
            &key.phenomenon,
            &key.significance,
            unit.valid_time,
        )?;
        if matched.is_empty() {
            if let Some(etn) = key.etn {
                matched =
                    self.records
                        .find_by_etn(site, &key.phenomenon, &key.significance, etn)?;
            }
        }

        if matched.is_empty() {
            let event = self.create_event_from_grid(info, slice, unit)?;
            info!(
                site = %site,
                event = %event.event_id,
                key = %key,
                "hazard event created from grid content"
            );
            summary.created += 1;
            return Ok(summary);
        }

        // Known hazard. Union the footprints already accounted for and
        // re-issue anything the grid carries beyond them as exactly one
        // new event.
        let mut accounted = BitGrid::new(info.location.nx, info.location.ny);
        let known: Vec<HazardEvent> = self
            .events
            .query_by_interop_key(
                site,
                &key.phenomenon,
                &key.significance,
                unit.valid_time,
            )
            .map_err(event_err)?
            .into_iter()
            .filter(|e| matched.iter().any(|r| r.event_id == e.event_id))
            .collect();

        let mut promoted = Vec::new();
        for event in known {
            let footprint = raster::rasterize(&info.location, &event.geometry)?
                .bit_grid()
                .map(Ok)
                .unwrap_or_else(|| {
                    // Grid-born geometry: its join record carries the
                    // rasterizable form from the last synchronization.
                    let rec = matched
                        .iter()
                        .find(|r| r.event_id == event.event_id)
                        .map(|r| r.geometry.clone());
                    match rec {
                        Some(g) => raster::rasterize(&info.location, &g)
                            .map(|o| o.bit_grid().unwrap_or_else(|| {
                                BitGrid::new(info.location.nx, info.location.ny)
                            })),
                        None => Ok(BitGrid::new(info.location.nx, info.location.ny)),
                    }
                })?;
            accounted.or_assign(&footprint);

            // Refresh join records whose synchronized geometry has
            // drifted from the event's current one.
            for rec in matched.iter_mut().filter(|r| r.event_id == event.event_id) {
                if rec.geometry != event.geometry {
                    rec.geometry = event.geometry.clone();
                    self.records.update(rec)?;
                    summary.updated += 1;
                }
            }

            if event.status == HazardStatus::Pending && slice.last_publish_time().is_some() {
                let mut event = event;
                event.status = HazardStatus::Proposed;
                promoted.push(event);
            }
        }
        if !promoted.is_empty() {
            let count = promoted.len() as u32;
            self.events.update_events(promoted).map_err(event_err)?;
            summary.updated += count;
        }

        let residual = unit.bits.subtract(&accounted);
        if residual.any() {
            let residual_unit = KeySlice {
                key: key.clone(),
                bits: residual,
                valid_time: unit.valid_time,
            };
            let event = self.create_event_from_grid(info, slice, &residual_unit)?;
            info!(
                site = %site,
                event = %event.event_id,
                key = %key,
                "residual hazard event created from grid extension"
            );
            summary.created += 1;
        }
        Ok(summary)
    }

    /// Create a registry event covering a raster footprint, plus its
    /// join record(s).
    fn create_event_from_grid(
        &self,
        info: &GridParmInfo,
        slice: &DiscreteGridSlice,
        unit: &KeySlice,
    ) -> ReconResult<HazardEvent> {
        let site = &info.parm_id.site;
        let key = &unit.key;
        let now = epoch_secs();

        let mut event = self.events.create_event(site).map_err(event_err)?;
        event.phenomenon = key.phenomenon.clone();
        event.significance = key.significance.clone();
        event.subtype = key.subtype.clone();
        event.time_range = unit.valid_time;
        event.geometry = Geometry::MultiPolygon(raster::to_geometry(&info.location, &unit.bits));
        // Published grid content is already public; the new event starts
        // one step further along.
        event.status = if slice.last_publish_time().is_some() {
            HazardStatus::Proposed
        } else {
            HazardStatus::Pending
        };
        event.created_at = now;
        if let Some(etn) = key.etn {
            event
                .attributes
                .insert(hazgrid_core::ETN_ATTRIBUTE.to_string(), etn.into());
        }
        self.events
            .store_events(vec![event.clone()])
            .map_err(event_err)?;

        self.records.store(&InteropRecord {
            site: site.clone(),
            phenomenon: key.phenomenon.clone(),
            significance: key.significance.clone(),
            event_id: event.event_id.clone(),
            etn: None,
            time_range: unit.valid_time,
            parm_id: info.parm_id.clone(),
            geometry: event.geometry.clone(),
        })?;
        if let Some(etn) = key.etn {
            self.records.store(&InteropRecord {
                site: site.clone(),
                phenomenon: key.phenomenon.clone(),
                significance: key.significance.clone(),
                event_id: event.event_id.clone(),
                etn: Some(etn),
                time_range: unit.valid_time,
                parm_id: info.parm_id.clone(),
                geometry: event.geometry.clone(),
            })?;
        }
        Ok(event)
    }

    /// Explicit purge entry point: drop every event and join record for
    /// a site whose range intersects the window, regardless of hazard
    /// type. Equivalent to delivering an empty-history slice.
    pub async fn handle_grid_purge(
        &self,
        site: &str,
        window: TimeRange,
    ) -> ReconResult<ReconcileSummary> {
        let info = self.parm_info_for(site)?;
        self.purge_window(&info, window).await
    }

    /// Purge signal: remove every event and join record whose range
    /// intersects the purged window.
    async fn purge_window(
        &self,
        info: &GridParmInfo,
        window: TimeRange,
    ) -> ReconResult<ReconcileSummary> {
        let site = &info.parm_id.site;
        let _guard = self.lock_for(site).await;
        let recs = self.records.find_for_site_and_range(site, window)?;
        if recs.is_empty() {
            return Ok(ReconcileSummary::default());
        }

        let mut event_ids: Vec<String> = recs.iter().map(|r| r.event_id.clone()).collect();
        event_ids.sort();
        event_ids.dedup();
        let removed = self
            .events
            .remove_events(site, &event_ids)
            .map_err(event_err)?;
        self.records.remove(&recs)?;
        info!(
            site = %site,
            window = %window.key_fragment(),
            removed,
            "purged hazard events for cleared grid window"
        );
        Ok(ReconcileSummary {
            removed,
            ..Default::default()
        })
    }

    // ── Events → grid ──────────────────────────────────────────────

    pub async fn handle_event_stored(&self, event: &HazardEvent) -> ReconResult<ReconcileSummary> {
        self.sync_event_to_grid(event).await
    }

    pub async fn handle_event_updated(&self, event: &HazardEvent) -> ReconResult<ReconcileSummary> {
        self.sync_event_to_grid(event).await
    }

    /// Merge one event into its site's hazard grid.
    async fn sync_event_to_grid(&self, event: &HazardEvent) -> ReconResult<ReconcileSummary> {
        let key = event.discrete_key();
        let mut summary = ReconcileSummary::default();
        if !self.validator.needs_grid_conversion(&key) {
            debug!(event = %event.event_id, key = %key, "hazard type not grid-interoperable, skipped");
            return Ok(summary);
        }
        if event.status.is_terminal() {
            debug!(event = %event.event_id, "terminal event, no grid sync");
            return Ok(summary);
        }

        let info = self.parm_info_for(&event.site)?;
        let target = event.time_range.quantize(&info.time_constraints);
        let _guard = self.lock_for(&event.site).await;

        let bits = match raster::rasterize(&info.location, &event.geometry)? {
            RasterOutcome::Raster(bits) => bits,
            RasterOutcome::AlreadyRasterized(_) => {
                // Grid-born event: the grid already holds this content.
                debug!(event = %event.event_id, "grid-derived geometry, grid already current");
                return Ok(summary);
            }
        };

        // The join records carry the footprint of the last
        // synchronization. Strip whatever that footprint covered beyond
        // the new one, so a shrunk or moved geometry leaves no stale
        // cells behind; a record whose time range no longer matches is
        // retired entirely.
        let all_prior = self.records.find_for_event(&event.site, &event.event_id)?;
        let prior: Vec<&InteropRecord> =
            all_prior.iter().filter(|r| r.etn.is_none()).collect();
        for &old in &prior {
            if let Some(old_bits) = raster::rasterize(&info.location, &old.geometry)?.bit_grid() {
                let stale = if old.time_range == target {
                    old_bits.subtract(&bits)
                } else {
                    old_bits
                };
                if stale.any() {
                    let old_records = self
                        .grids
                        .find_intersecting(&info.parm_id, old.time_range)
                        .map_err(grid_err)?;
                    let sep = slicer::remove_event(
                        &info.parm_id,
                        &key,
                        Some(&stale),
                        &old_records,
                        &[],
                        old.time_range,
                    );
                    self.apply_separated(&info, sep, old.time_range)?;
                }
            }
            if old.time_range != target {
                self.records.remove(std::slice::from_ref(old))?;
            }
        }

        // Probe-then-write keeps the join table strict: a record either
        // exists for this exact identity or it does not.
        let record = InteropRecord {
            site: event.site.clone(),
            phenomenon: key.phenomenon.clone(),
            significance: key.significance.clone(),
            event_id: event.event_id.clone(),
            etn: None,
            time_range: target,
            parm_id: info.parm_id.clone(),
            geometry: event.geometry.clone(),
        };
        if prior.iter().any(|r| r.time_range == target) {
            self.records.update(&record)?;
            summary.updated += 1;
        } else {
            self.records.store(&record)?;
            summary.created += 1;
        }
        if let Some(etn) = key.etn {
            let etn_record = InteropRecord {
                etn: Some(etn),
                ..record
            };
            if all_prior.iter().any(|r| r.etn == Some(etn)) {
                self.records.update(&etn_record)?;
            } else {
                self.records.store(&etn_record)?;
            }
        }

        let nx = info.location.nx;
        let mut event_slice = DiscreteGridSlice::empty(nx, info.location.ny, target);
        event_slice
            .history
            .push(GridHistoryEntry::calculated(epoch_secs()));
        for (x, y) in bits.iter_set() {
            event_slice.add_key_at(y * nx + x, &key);
        }

        let existing = self
            .grids
            .find_intersecting(&info.parm_id, target)
            .map_err(grid_err)?;
        let sep = slicer::merge_event(&info.parm_id, &event_slice, &existing, target);
        self.apply_separated(&info, sep, target)?;
        info!(
            site = %event.site,
            event = %event.event_id,
            key = %key,
            range = %target.key_fragment(),
            "event merged into hazard grid"
        );
        Ok(summary)
    }

    /// Remove a deleted event's contribution from the grid and drop its
    /// join records.
    pub async fn handle_event_deleted(&self, event: &HazardEvent) -> ReconResult<ReconcileSummary> {
        let key = event.discrete_key();
        let mut summary = ReconcileSummary::default();
        if !self.validator.needs_grid_conversion(&key) {
            return Ok(summary);
        }

        let info = self.parm_info_for(&event.site)?;
        let target = event.time_range.quantize(&info.time_constraints);
        let _guard = self.lock_for(&event.site).await;

        // A grid-born event has no rasterizable geometry; its key is
        // stripped wherever it appears instead.
        let bits = raster::rasterize(&info.location, &event.geometry)?.bit_grid();

        let existing = self
            .grids
            .find_intersecting(&info.parm_id, target)
            .map_err(grid_err)?;
        let mut neighbors = Vec::new();
        if !existing.is_empty() {
            for range in self
                .grids
                .find_adjacent_ranges(&info.parm_id, target)
                .map_err(grid_err)?
            {
                if let Some(slice) = self
                    .grids
                    .fetch_slice(&info.parm_id, range)
                    .map_err(grid_err)?
                {
                    neighbors.push(slice);
                }
            }
        }
        let sep = slicer::remove_event(
            &info.parm_id,
            &key,
            bits.as_ref(),
            &existing,
            &neighbors,
            target,
        );
        self.apply_separated(&info, sep, target)?;

        let recs = self.records.find_for_event(&event.site, &event.event_id)?;
        if !recs.is_empty() {
            summary.removed = self.records.remove(&recs)?;
        }
        info!(
            site = %event.site,
            event = %event.event_id,
            key = %key,
            "event removed from hazard grid"
        );
        Ok(summary)
    }

    /// Apply a slicer result as one grid replacement: merge groups are
    /// combined, adjacent identical results coalesced, and the whole
    /// window written in a single store call.
    fn apply_separated(
        &self,
        info: &GridParmInfo,
        sep: SeparatedRecords,
        base: TimeRange,
    ) -> ReconResult<()> {
        if sep.is_noop() {
            return Ok(());
        }
        let replacement = sep.replacement_range(base);
        let mut records = sep.new_records;
        for (range, slices) in &sep.merge {
            records.push(hazgrid_core::GridRecord::new(
                info.parm_id.clone(),
                slicer::combine(slices, *range),
            ));
        }
        let records = slicer::coalesce(records);
        self.grids
            .store(records, &info.parm_id, replacement)
            .map_err(grid_err)
    }
}

fn event_err(err: StoreError) -> ReconError {
    ReconError::Event(err.to_string())
}

fn grid_err(err: StoreError) -> ReconError {
    ReconError::Grid(err.to_string())
}

fn lock<'a, T>(m: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Current wall-clock time in epoch seconds.
pub fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_absorb_accumulates() {
        let mut total = ReconcileSummary::default();
        total.absorb(ReconcileSummary {
            created: 1,
            updated: 2,
            removed: 0,
            failed: 1,
        });
        total.absorb(ReconcileSummary {
            created: 1,
            ..Default::default()
        });
        assert_eq!(total.created, 2);
        assert_eq!(total.updated, 2);
        assert_eq!(total.failed, 1);
    }
}
