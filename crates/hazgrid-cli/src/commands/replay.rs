//! `hazgrid replay` — run a recorded snapshot through the engine.
//!
//! Replays are hermetic: events and grids are loaded into in-memory
//! stores, the record store is ephemeral, and nothing outside the
//! process is touched. This is the tool for reproducing a reconciliation
//! bug from captured state.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use hazgrid_core::{GridRecord, HazGridConfig, HazardEvent};
use hazgrid_recon::memory::{MemoryEventStore, MemoryGridStore};
use hazgrid_recon::stores::GridUpdateNotification;
use hazgrid_recon::{ReconcileSummary, Reconciler};
use hazgrid_state::InteropRecordStore;

/// Captured input state plus the notifications to replay, in order.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    events: Vec<HazardEvent>,
    #[serde(default)]
    grids: Vec<GridRecord>,
    #[serde(default)]
    notifications: Vec<GridUpdateNotification>,
}

/// Final state after a replay, printed with `--format json`.
#[derive(Debug, Serialize)]
struct ReplayReport {
    created: u32,
    updated: u32,
    removed: u32,
    failed: u32,
    events: Vec<HazardEvent>,
    grids: Vec<GridRecord>,
}

pub fn replay(config: &str, snapshot: &str, format: &str) -> anyhow::Result<()> {
    let config = HazGridConfig::from_file(Path::new(config))?;
    let raw = std::fs::read_to_string(snapshot)
        .with_context(|| format!("reading snapshot {snapshot}"))?;
    let snapshot: Snapshot =
        serde_json::from_str(&raw).with_context(|| "parsing snapshot JSON")?;

    let events = Arc::new(MemoryEventStore::new());
    for event in snapshot.events {
        events.insert(event);
    }
    let grids = Arc::new(MemoryGridStore::new());
    for record in snapshot.grids {
        grids.insert(record);
    }
    let records = InteropRecordStore::open_in_memory()?;
    let recon = Reconciler::new(events.clone(), grids.clone(), records, &config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut summary = ReconcileSummary::default();
    runtime.block_on(async {
        for notification in &snapshot.notifications {
            summary.absorb(recon.handle_grid_update(notification).await?);
        }
        Ok::<_, hazgrid_recon::ReconError>(())
    })?;

    match format {
        "json" => {
            let report = ReplayReport {
                created: summary.created,
                updated: summary.updated,
                removed: summary.removed,
                failed: summary.failed,
                events: events.all(),
                grids: grids.all(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!(
                "replay complete: {} created, {} updated, {} removed, {} failed",
                summary.created, summary.updated, summary.removed, summary.failed
            );
            println!("{} event(s), {} grid record(s) in final state", events.len(), grids.all().len());
        }
    }

    Ok(())
}
