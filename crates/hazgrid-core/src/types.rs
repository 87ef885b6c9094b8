//! Domain types shared across HazGrid crates.
//!
//! These are the storage-facing representations of hazard events and
//! discrete forecast grids. All types are serializable to/from JSON so
//! they can be persisted, snapshotted, and replayed.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::{self, DiscreteKey, NONE_KEY};
use crate::time::TimeRange;

/// Site identifier (WFO id, e.g. `"OAX"`).
pub type SiteId = String;

/// Registry-assigned hazard event identifier.
pub type EventId = String;

// ── Hazard events ─────────────────────────────────────────────────

/// Lifecycle status of a hazard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardStatus {
    Pending,
    Proposed,
    Issued,
    Ended,
    Elapsed,
    Expired,
}

impl HazardStatus {
    /// Terminal statuses are set externally and never revisited here.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HazardStatus::Ended | HazardStatus::Elapsed | HazardStatus::Expired
        )
    }
}

/// Attribute key under which an event's ETN is carried, when it has one.
pub const ETN_ATTRIBUTE: &str = "etn";

/// A vector hazard event owned by the registry.
///
/// Identity is `(site, event_id)`. Geometry is in geographic coordinates
/// (lon/lat degrees); open-ring geometries mark events that originated
/// from a grid and must not be re-rasterized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardEvent {
    pub site: SiteId,
    pub event_id: EventId,
    pub phenomenon: String,
    pub significance: String,
    pub subtype: Option<String>,
    pub status: HazardStatus,
    pub time_range: TimeRange,
    pub geometry: geo::Geometry<f64>,
    /// Free-form attributes (string key → JSON value).
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    /// Epoch seconds when the event was created.
    pub created_at: i64,
    /// Epoch seconds when the event was issued, if it has been.
    pub issued_at: Option<i64>,
}

impl HazardEvent {
    /// The `phen.sig` pair for validator/allow-list checks.
    pub fn phen_sig(&self) -> String {
        format!("{}.{}", self.phenomenon, self.significance)
    }

    /// The discrete key this event contributes to a grid, including its
    /// ETN when the attribute map carries one.
    pub fn discrete_key(&self) -> DiscreteKey {
        let mut key = DiscreteKey::new(&self.phenomenon, &self.significance);
        key.subtype = self.subtype.clone();
        key.etn = self
            .attributes
            .get(ETN_ATTRIBUTE)
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok());
        key
    }
}

// ── Grid parameters ───────────────────────────────────────────────

/// Identifier of a forecast grid parameter time-series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParmId {
    /// Parameter name, e.g. `"Hazards"`.
    pub parm_name: String,
    /// Owning site.
    pub site: SiteId,
    /// Database type, e.g. `"Fcst"` or `"Prac"`.
    pub db_type: String,
}

impl ParmId {
    pub fn new(parm_name: &str, site: &str, db_type: &str) -> Self {
        Self {
            parm_name: parm_name.to_string(),
            site: site.to_string(),
            db_type: db_type.to_string(),
        }
    }
}

impl fmt::Display for ParmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.parm_name, self.site, self.db_type)
    }
}

// ── Grid history ──────────────────────────────────────────────────

/// Provenance of a grid edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOrigin {
    /// Drawn or edited by a forecaster.
    Scratch,
    /// Written by the reconciliation engine.
    Calculated,
    /// Produced by shifting an existing grid in time.
    TimeShifted,
}

/// One entry in a grid's edit history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridHistoryEntry {
    pub origin: HistoryOrigin,
    /// Epoch seconds of the edit.
    pub update_time: i64,
    /// Epoch seconds when the grid was published, if it has been.
    pub publish_time: Option<i64>,
}

impl GridHistoryEntry {
    pub fn scratch(update_time: i64) -> Self {
        Self {
            origin: HistoryOrigin::Scratch,
            update_time,
            publish_time: None,
        }
    }

    pub fn calculated(update_time: i64) -> Self {
        Self {
            origin: HistoryOrigin::Calculated,
            update_time,
            publish_time: None,
        }
    }

    pub fn published(mut self, publish_time: i64) -> Self {
        self.publish_time = Some(publish_time);
        self
    }
}

// ── Discrete grid slices ──────────────────────────────────────────

/// A time-ranged discrete grid: each cell holds an index into a table of
/// combined key strings. `keys[0]` is always the `<None>` sentinel.
///
/// Cells are stored row-major, `width * height` entries, index
/// `y * width + x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteGridSlice {
    pub valid_time: TimeRange,
    pub width: usize,
    pub height: usize,
    /// Combined key table; cell values index into it.
    pub keys: Vec<String>,
    pub cells: Vec<u16>,
    pub history: Vec<GridHistoryEntry>,
}

impl DiscreteGridSlice {
    /// An all-`<None>` slice of the given dimensions.
    pub fn empty(width: usize, height: usize, valid_time: TimeRange) -> Self {
        Self {
            valid_time,
            width,
            height,
            keys: vec![NONE_KEY.to_string()],
            cells: vec![0; width * height],
            history: Vec::new(),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    /// The combined key string at a cell index.
    pub fn cell_key(&self, idx: usize) -> &str {
        self.keys
            .get(self.cells[idx] as usize)
            .map(String::as_str)
            .unwrap_or(NONE_KEY)
    }

    /// Canonical (sorted, deduplicated) form of a cell's combined key.
    /// Falls back to the raw string if the stored value does not parse.
    pub fn canonical_cell(&self, idx: usize) -> String {
        let raw = self.cell_key(idx);
        key::canonical_combined(raw).unwrap_or_else(|_| raw.to_string())
    }

    /// Intern a combined key string, returning its cell value.
    pub fn key_index(&mut self, combined: &str) -> u16 {
        if let Some(pos) = self.keys.iter().position(|k| k == combined) {
            return pos as u16;
        }
        self.keys.push(combined.to_string());
        (self.keys.len() - 1) as u16
    }

    /// Add `key` into the cell at `idx`, keeping the cell canonical.
    pub fn add_key_at(&mut self, idx: usize, key: &DiscreteKey) {
        let mut keys = key::parse_combined(self.cell_key(idx)).unwrap_or_default();
        if !keys.contains(key) {
            keys.push(key.clone());
        }
        let combined = key::format_combined(&keys);
        let value = self.key_index(&combined);
        self.cells[idx] = value;
    }

    /// Remove `key` from the cell at `idx`, keeping the cell canonical.
    pub fn remove_key_at(&mut self, idx: usize, key: &DiscreteKey) {
        let mut keys = key::parse_combined(self.cell_key(idx)).unwrap_or_default();
        keys.retain(|k| k != key);
        let combined = key::format_combined(&keys);
        let value = self.key_index(&combined);
        self.cells[idx] = value;
    }

    /// All distinct single keys appearing anywhere in the slice, sorted.
    pub fn distinct_single_keys(&self) -> Vec<DiscreteKey> {
        let mut out = Vec::new();
        for idx in self.used_key_indices() {
            if let Ok(parsed) = key::parse_combined(&self.keys[idx]) {
                out.extend(parsed);
            }
        }
        out.sort();
        out.dedup();
        out
    }

    /// Per-cell mask of where `key` is present.
    pub fn mask_for_key(&self, key: &DiscreteKey) -> Vec<bool> {
        let matching: Vec<bool> = self
            .keys
            .iter()
            .map(|cell| {
                key::parse_combined(cell)
                    .map(|ks| ks.contains(key))
                    .unwrap_or(false)
            })
            .collect();
        self.cells
            .iter()
            .map(|&v| matching.get(v as usize).copied().unwrap_or(false))
            .collect()
    }

    /// True if every cell is the `<None>` sentinel.
    pub fn is_empty_content(&self) -> bool {
        self.cells
            .iter()
            .all(|&v| key::is_none_key(self.keys.get(v as usize).map(String::as_str).unwrap_or("")))
    }

    /// Same grid content over a different time range.
    pub fn clip(&self, valid_time: TimeRange) -> Self {
        let mut out = self.clone();
        out.valid_time = valid_time;
        out
    }

    /// True if both slices resolve to identical per-cell combined keys.
    /// Time ranges and histories are not compared.
    pub fn content_equals(&self, other: &DiscreteGridSlice) -> bool {
        if self.width != other.width || self.height != other.height {
            return false;
        }
        (0..self.cell_count()).all(|i| self.canonical_cell(i) == other.canonical_cell(i))
    }

    /// Publish timestamp of the most recent history entry, if any.
    ///
    /// Promotion reads only the last entry; an unpublished edit after a
    /// published one suppresses promotion for the slice.
    pub fn last_publish_time(&self) -> Option<i64> {
        self.history.last().and_then(|h| h.publish_time)
    }

    fn used_key_indices(&self) -> Vec<usize> {
        let mut used: Vec<usize> = self
            .cells
            .iter()
            .map(|&v| v as usize)
            .filter(|&v| v < self.keys.len())
            .collect();
        used.sort_unstable();
        used.dedup();
        used
    }
}

// ── Grid records ──────────────────────────────────────────────────

/// A stored grid: identity `(parm_id, time range)`, payload one slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRecord {
    pub parm_id: ParmId,
    pub slice: DiscreteGridSlice,
}

impl GridRecord {
    pub fn new(parm_id: ParmId, slice: DiscreteGridSlice) -> Self {
        Self { parm_id, slice }
    }

    pub fn time_range(&self) -> TimeRange {
        self.slice.valid_time
    }
}
