//! End-to-end reconciliation scenarios over in-memory collaborators.

use std::sync::Arc;

use geo::{Geometry, polygon};

use hazgrid_core::{
    DiscreteGridSlice, DiscreteKey, GridHistoryEntry, GridRecord, HazGridConfig, HazardEvent,
    HazardStatus, ParmId, TimeRange,
};
use hazgrid_recon::memory::{MemoryEventStore, MemoryGridStore};
use hazgrid_recon::stores::GridUpdateNotification;
use hazgrid_recon::Reconciler;
use hazgrid_state::InteropRecordStore;

const CONFIG: &str = r#"
[interop]
allowed = ["FL.W", "WS.W"]

[[site]]
id = "OAX"
nx = 20
ny = 20
origin_lon = 0.0
origin_lat = 0.0
extent_lon = 20.0
extent_lat = 20.0
"#;

struct Harness {
    recon: Reconciler<Arc<MemoryEventStore>, Arc<MemoryGridStore>>,
    events: Arc<MemoryEventStore>,
    grids: Arc<MemoryGridStore>,
}

fn harness() -> Harness {
    let config = HazGridConfig::from_toml_str(CONFIG).unwrap();
    let events = Arc::new(MemoryEventStore::new());
    let grids = Arc::new(MemoryGridStore::new());
    let records = InteropRecordStore::open_in_memory().unwrap();
    let recon = Reconciler::new(events.clone(), grids.clone(), records, &config);
    Harness {
        recon,
        events,
        grids,
    }
}

fn parm() -> ParmId {
    ParmId::new("Hazards", "OAX", "Fcst")
}

fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
    Geometry::Polygon(polygon![
        (x: x0, y: y0),
        (x: x1, y: y0),
        (x: x1, y: y1),
        (x: x0, y: y1),
        (x: x0, y: y0),
    ])
}

/// A scratch (unpublished) slice with `key` over a rectangle of cells.
fn slice_with_rect(
    tr: TimeRange,
    key: &DiscreteKey,
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
) -> DiscreteGridSlice {
    let mut slice = DiscreteGridSlice::empty(20, 20, tr);
    slice.history.push(GridHistoryEntry::scratch(100));
    for y in y0..y1 {
        for x in x0..x1 {
            slice.add_key_at(y * 20 + x, key);
        }
    }
    slice
}

fn notification(slices: Vec<DiscreteGridSlice>) -> GridUpdateNotification {
    GridUpdateNotification {
        parm_id: parm(),
        slices,
    }
}

fn fl_w() -> DiscreteKey {
    DiscreteKey::new("FL", "W")
}

// ── Grid → events ─────────────────────────────────────────────────

#[tokio::test]
async fn grid_edit_creates_pending_event() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    let note = notification(vec![slice_with_rect(tr, &fl_w(), 0, 0, 10, 10)]);

    let summary = h.recon.handle_grid_update(&note).await.unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.failed, 0);

    let events = h.events.all();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.phen_sig(), "FL.W");
    assert_eq!(event.status, HazardStatus::Pending);
    assert_eq!(event.time_range, tr);

    let records = h.recon.record_store().list_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event_id, event.event_id);
    assert_eq!(records[0].time_range, tr);
}

#[tokio::test]
async fn redelivered_grid_edit_is_a_noop() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    let note = notification(vec![slice_with_rect(tr, &fl_w(), 0, 0, 10, 10)]);

    h.recon.handle_grid_update(&note).await.unwrap();
    let again = h.recon.handle_grid_update(&note).await.unwrap();

    assert_eq!(again.created, 0);
    assert_eq!(again.updated, 0);
    assert_eq!(again.failed, 0);
    assert_eq!(h.events.len(), 1);
    assert_eq!(h.recon.record_store().list_all().unwrap().len(), 1);
}

#[tokio::test]
async fn grid_extension_creates_one_residual_event() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    h.recon
        .handle_grid_update(&notification(vec![slice_with_rect(
            tr,
            &fl_w(),
            0,
            0,
            10,
            10,
        )]))
        .await
        .unwrap();
    let original = h.events.all().remove(0);

    // The forecaster extends the same hazard to cover the full grid.
    let summary = h
        .recon
        .handle_grid_update(&notification(vec![slice_with_rect(
            tr,
            &fl_w(),
            0,
            0,
            20,
            20,
        )]))
        .await
        .unwrap();

    assert_eq!(summary.created, 1);
    let events = h.events.all();
    assert_eq!(events.len(), 2);
    // The original event is untouched; the residual is a new one.
    let kept = events.iter().find(|e| e.event_id == original.event_id).unwrap();
    assert_eq!(kept.geometry, original.geometry);
    let residual = events.iter().find(|e| e.event_id != original.event_id).unwrap();
    // 400 cells total minus the 100 already covered.
    use geo::Area;
    let Geometry::MultiPolygon(mp) = &residual.geometry else {
        panic!("residual geometry should be a multipolygon");
    };
    assert_eq!(mp.unsigned_area(), 300.0);
}

#[tokio::test]
async fn combined_keys_reconcile_independently() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    let mut slice = slice_with_rect(tr, &fl_w(), 0, 0, 5, 5);
    let ws = DiscreteKey::new("WS", "W");
    for y in 2..8 {
        for x in 2..8 {
            slice.add_key_at(y * 20 + x, &ws);
        }
    }

    let summary = h
        .recon
        .handle_grid_update(&notification(vec![slice]))
        .await
        .unwrap();

    assert_eq!(summary.created, 2);
    let events = h.events.all();
    assert_eq!(events.len(), 2);
    let mut phen_sigs: Vec<String> = events.iter().map(|e| e.phen_sig()).collect();
    phen_sigs.sort();
    assert_eq!(phen_sigs, vec!["FL.W", "WS.W"]);
}

#[tokio::test]
async fn disallowed_hazard_type_is_skipped() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    let slice = slice_with_rect(tr, &DiscreteKey::new("TO", "W"), 0, 0, 5, 5);

    let summary = h
        .recon
        .handle_grid_update(&notification(vec![slice]))
        .await
        .unwrap();
    assert_eq!(summary, Default::default());
    assert!(h.events.is_empty());
}

#[tokio::test]
async fn publish_promotes_pending_event() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    h.recon
        .handle_grid_update(&notification(vec![slice_with_rect(
            tr,
            &fl_w(),
            0,
            0,
            10,
            10,
        )]))
        .await
        .unwrap();
    assert_eq!(h.events.all()[0].status, HazardStatus::Pending);

    // The same content arrives again, now published.
    let mut published = slice_with_rect(tr, &fl_w(), 0, 0, 10, 10);
    published.history = vec![GridHistoryEntry::scratch(100).published(150)];
    let summary = h
        .recon
        .handle_grid_update(&notification(vec![published]))
        .await
        .unwrap();

    assert_eq!(summary.created, 0);
    assert_eq!(summary.updated, 1);
    assert_eq!(h.events.all()[0].status, HazardStatus::Proposed);
}

#[tokio::test]
async fn published_grid_content_creates_proposed_event() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    let mut slice = slice_with_rect(tr, &fl_w(), 0, 0, 10, 10);
    slice.history = vec![GridHistoryEntry::scratch(100).published(150)];

    h.recon
        .handle_grid_update(&notification(vec![slice]))
        .await
        .unwrap();
    assert_eq!(h.events.all()[0].status, HazardStatus::Proposed);
}

#[tokio::test]
async fn purge_removes_events_and_records() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    h.recon
        .handle_grid_update(&notification(vec![slice_with_rect(
            tr,
            &fl_w(),
            0,
            0,
            10,
            10,
        )]))
        .await
        .unwrap();
    assert_eq!(h.events.len(), 1);

    // An empty history marks the slice as a purge signal.
    let purge = DiscreteGridSlice::empty(20, 20, tr);
    let summary = h
        .recon
        .handle_grid_update(&notification(vec![purge]))
        .await
        .unwrap();

    assert_eq!(summary.removed, 1);
    assert!(h.events.is_empty());
    assert!(h.recon.record_store().list_all().unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_purge_and_update_leave_consistent_state() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    h.recon
        .handle_grid_update(&notification(vec![slice_with_rect(
            tr,
            &fl_w(),
            0,
            0,
            10,
            10,
        )]))
        .await
        .unwrap();

    // A purge races an extension of the same window. The site lock
    // serializes them; either order is fine, but the registry and the
    // join table must never disagree.
    let purge = notification(vec![DiscreteGridSlice::empty(20, 20, tr)]);
    let extend = notification(vec![slice_with_rect(tr, &fl_w(), 0, 0, 20, 20)]);
    let (a, b) = tokio::join!(
        h.recon.handle_grid_update(&purge),
        h.recon.handle_grid_update(&extend)
    );
    a.unwrap();
    b.unwrap();

    let events = h.events.len();
    let joins = h.recon.record_store().list_all().unwrap().len();
    assert_eq!(events, joins);
}

// ── Events → grid ─────────────────────────────────────────────────

fn event(id: &str, geometry: Geometry<f64>, tr: TimeRange) -> HazardEvent {
    HazardEvent {
        site: "OAX".to_string(),
        event_id: id.to_string(),
        phenomenon: "FL".to_string(),
        significance: "W".to_string(),
        subtype: None,
        status: HazardStatus::Issued,
        time_range: tr,
        geometry,
        attributes: Default::default(),
        created_at: 0,
        issued_at: Some(0),
    }
}

#[tokio::test]
async fn stored_event_lands_in_grid() {
    let h = harness();
    let ev = event("ev-a", square(2.0, 2.0, 5.0, 5.0), TimeRange::new(0, 3600));
    h.events.insert(ev.clone());

    let summary = h.recon.handle_event_stored(&ev).await.unwrap();
    assert_eq!(summary.created, 1);

    let records = h.grids.records_for(&parm());
    assert_eq!(records.len(), 1);
    let slice = &records[0].slice;
    assert_eq!(records[0].time_range(), TimeRange::new(0, 3600));
    // The 3x3 square of cells carries the key; the rest is empty.
    assert_eq!(slice.cell_key(2 * 20 + 2), "FL.W");
    assert_eq!(slice.cell_key(4 * 20 + 4), "FL.W");
    assert_eq!(slice.cell_key(0), hazgrid_core::NONE_KEY);

    assert_eq!(h.recon.record_store().list_all().unwrap().len(), 1);
}

#[tokio::test]
async fn event_time_range_is_quantized_outward() {
    let h = harness();
    let ev = event("ev-a", square(2.0, 2.0, 5.0, 5.0), TimeRange::new(100, 4000));
    h.events.insert(ev.clone());

    h.recon.handle_event_stored(&ev).await.unwrap();
    let records = h.grids.records_for(&parm());
    assert_eq!(records[0].time_range(), TimeRange::new(0, 7200));
}

#[tokio::test]
async fn overlapping_events_share_cells() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    let a = event("ev-a", square(0.0, 0.0, 4.0, 4.0), tr);
    let mut b = event("ev-b", square(2.0, 2.0, 6.0, 6.0), tr);
    b.phenomenon = "WS".to_string();
    h.events.insert(a.clone());
    h.events.insert(b.clone());

    h.recon.handle_event_stored(&a).await.unwrap();
    h.recon.handle_event_stored(&b).await.unwrap();

    let records = h.grids.records_for(&parm());
    assert_eq!(records.len(), 1);
    let slice = &records[0].slice;
    assert_eq!(slice.cell_key(0), "FL.W");
    assert_eq!(slice.cell_key(3 * 20 + 3), "FL.W^WS.W");
    assert_eq!(slice.cell_key(5 * 20 + 5), "WS.W");
}

#[tokio::test]
async fn deleted_event_clears_its_footprint() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    let ev = event("ev-a", square(2.0, 2.0, 5.0, 5.0), tr);
    h.events.insert(ev.clone());
    h.recon.handle_event_stored(&ev).await.unwrap();
    assert_eq!(h.grids.records_for(&parm()).len(), 1);

    let summary = h.recon.handle_event_deleted(&ev).await.unwrap();
    assert_eq!(summary.removed, 1);
    assert!(h.grids.records_for(&parm()).is_empty());
    assert!(h.recon.record_store().list_all().unwrap().is_empty());
}

#[tokio::test]
async fn deleting_one_of_two_events_keeps_the_other() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    let a = event("ev-a", square(0.0, 0.0, 4.0, 4.0), tr);
    let mut b = event("ev-b", square(10.0, 10.0, 14.0, 14.0), tr);
    b.phenomenon = "WS".to_string();
    h.events.insert(a.clone());
    h.events.insert(b.clone());
    h.recon.handle_event_stored(&a).await.unwrap();
    h.recon.handle_event_stored(&b).await.unwrap();

    h.recon.handle_event_deleted(&a).await.unwrap();

    let records = h.grids.records_for(&parm());
    assert_eq!(records.len(), 1);
    let slice = &records[0].slice;
    assert_eq!(slice.cell_key(0), hazgrid_core::NONE_KEY);
    assert_eq!(slice.cell_key(11 * 20 + 11), "WS.W");
}

#[tokio::test]
async fn shrinking_event_update_clears_stale_cells() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    let mut ev = event("ev-a", square(0.0, 0.0, 4.0, 4.0), tr);
    h.events.insert(ev.clone());
    h.recon.handle_event_stored(&ev).await.unwrap();

    ev.geometry = square(0.0, 0.0, 2.0, 2.0);
    h.events.insert(ev.clone());
    h.recon.handle_event_updated(&ev).await.unwrap();

    let records = h.grids.records_for(&parm());
    assert_eq!(records.len(), 1);
    let slice = &records[0].slice;
    assert_eq!(slice.cell_key(20 + 1), "FL.W");
    // Cells of the old footprint outside the new geometry are cleared.
    assert_eq!(slice.cell_key(3 * 20 + 3), hazgrid_core::NONE_KEY);
}

#[tokio::test]
async fn moved_event_update_relocates_footprint() {
    let h = harness();
    let mut ev = event("ev-a", square(0.0, 0.0, 3.0, 3.0), TimeRange::new(0, 3600));
    h.events.insert(ev.clone());
    h.recon.handle_event_stored(&ev).await.unwrap();

    ev.time_range = TimeRange::new(3600, 7200);
    h.events.insert(ev.clone());
    h.recon.handle_event_updated(&ev).await.unwrap();

    // The old window is cleared and its join record retired; only the
    // new window carries the event.
    let records = h.grids.records_for(&parm());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].time_range(), TimeRange::new(3600, 7200));

    let joins = h.recon.record_store().list_all().unwrap();
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].time_range, TimeRange::new(3600, 7200));
}

#[tokio::test]
async fn deletion_merges_newly_identical_records_in_storage() {
    let h = harness();
    let ws = DiscreteKey::new("WS", "W");
    // [0,3600) carries WS only; [3600,7200) carries WS plus an FL event.
    let mut early = DiscreteGridSlice::empty(20, 20, TimeRange::new(0, 3600));
    let mut late = DiscreteGridSlice::empty(20, 20, TimeRange::new(3600, 7200));
    for y in 10..12 {
        for x in 10..12 {
            early.add_key_at(y * 20 + x, &ws);
            late.add_key_at(y * 20 + x, &ws);
        }
    }
    for y in 0..4 {
        for x in 0..4 {
            late.add_key_at(y * 20 + x, &fl_w());
        }
    }
    h.grids.insert(GridRecord::new(parm(), early));
    h.grids.insert(GridRecord::new(parm(), late));

    let ev = event("ev-a", square(0.0, 0.0, 4.0, 4.0), TimeRange::new(3600, 7200));
    h.recon.handle_event_deleted(&ev).await.unwrap();

    // Stripping FL leaves the two windows key-identical; storage holds
    // one merged record instead of an artificial boundary.
    let records = h.grids.records_for(&parm());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].time_range(), TimeRange::new(0, 7200));
    assert_eq!(records[0].slice.cell_key(11 * 20 + 11), "WS.W");
    assert_eq!(records[0].slice.cell_key(0), hazgrid_core::NONE_KEY);
}

#[tokio::test]
async fn event_resync_updates_join_record() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    let mut ev = event("ev-a", square(2.0, 2.0, 5.0, 5.0), tr);
    h.events.insert(ev.clone());
    h.recon.handle_event_stored(&ev).await.unwrap();

    ev.geometry = square(2.0, 2.0, 8.0, 8.0);
    h.events.insert(ev.clone());
    let summary = h.recon.handle_event_updated(&ev).await.unwrap();

    assert_eq!(summary.created, 0);
    assert_eq!(summary.updated, 1);
    let records = h.recon.record_store().list_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].geometry, ev.geometry);
}

#[tokio::test]
async fn round_trip_grid_event_grid_is_stable() {
    let h = harness();
    let tr = TimeRange::new(0, 3600);
    h.recon
        .handle_grid_update(&notification(vec![slice_with_rect(
            tr,
            &fl_w(),
            3,
            3,
            9,
            9,
        )]))
        .await
        .unwrap();
    let created = h.events.all().remove(0);

    // Re-syncing the grid-created event back into the grid must not
    // create anything new or disturb the join record.
    let summary = h.recon.handle_event_updated(&created).await.unwrap();
    assert_eq!(summary.created, 0);
    assert_eq!(h.events.len(), 1);
    assert_eq!(h.recon.record_store().list_all().unwrap().len(), 1);

    let again = h
        .recon
        .handle_grid_update(&notification(vec![slice_with_rect(
            tr,
            &fl_w(),
            3,
            3,
            9,
            9,
        )]))
        .await
        .unwrap();
    assert_eq!(again.created, 0);
}
