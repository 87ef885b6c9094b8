//! Time-range slicing and merging of grid history.
//!
//! Pure functions that compute, for an edit touching a time window, the
//! minimal set of grid records whose content actually changes. Each
//! phase returns a [`SeparatedRecords`] value that the orchestrator
//! applies in a single storage pass; nothing here touches a store.

use std::collections::BTreeMap;

use hazgrid_core::{DiscreteGridSlice, DiscreteKey, GridRecord, ParmId, TimeRange};
use hazgrid_raster::BitGrid;

/// One single-key raster extracted from a multi-key slice.
#[derive(Debug, Clone)]
pub struct KeySlice {
    pub key: DiscreteKey,
    pub bits: BitGrid,
    pub valid_time: TimeRange,
}

/// Decompose a slice into one raster per distinct single key.
///
/// A cell carrying a combined key (`FL.W^WS.W`) contributes to the
/// raster of every key it names; overlapping hazards of different types
/// are processed independently and never merged into one raster key.
pub fn separate_keys(slice: &DiscreteGridSlice) -> Vec<KeySlice> {
    slice
        .distinct_single_keys()
        .into_iter()
        .map(|key| {
            let mask = slice.mask_for_key(&key);
            KeySlice {
                bits: BitGrid::from_mask(slice.width, slice.height, mask),
                valid_time: slice.valid_time,
                key,
            }
        })
        .collect()
}

/// The storage operations computed for one edit, applied atomically by
/// the orchestrator: records to store as-is, groups of slices to merge
/// into one record per time range, and ranges to clear entirely.
#[derive(Debug, Default)]
pub struct SeparatedRecords {
    pub new_records: Vec<GridRecord>,
    pub merge: BTreeMap<TimeRange, Vec<DiscreteGridSlice>>,
    pub remove: Vec<TimeRange>,
}

impl SeparatedRecords {
    pub fn is_noop(&self) -> bool {
        self.new_records.is_empty() && self.merge.is_empty() && self.remove.is_empty()
    }

    /// The smallest range covering `base` and every emitted operation.
    /// This is the replacement window handed to grid storage.
    pub fn replacement_range(&self, base: TimeRange) -> TimeRange {
        let mut span = base;
        for record in &self.new_records {
            span = span.span(&record.time_range());
        }
        for range in self.merge.keys().chain(self.remove.iter()) {
            span = span.span(range);
        }
        span
    }
}

/// Merge an event's single-key slice into the grids intersecting the
/// target range.
///
/// Existing records are clipped at the target boundary; sub-ranges not
/// covered by any record become new records carrying only the event's
/// key. Each covered sub-range yields a merge group of the clipped
/// existing content plus the clipped event slice.
pub fn merge_event(
    parm_id: &ParmId,
    event_slice: &DiscreteGridSlice,
    existing: &[GridRecord],
    target: TimeRange,
) -> SeparatedRecords {
    let mut sep = SeparatedRecords::default();
    let mut overlapping: Vec<&GridRecord> = existing
        .iter()
        .filter(|r| r.time_range().intersects(&target))
        .collect();
    overlapping.sort_by_key(|r| r.time_range().start);

    let mut cursor = target.start;
    for record in overlapping {
        let Some(overlap) = record.time_range().intersection(&target) else {
            continue;
        };
        if overlap.start > cursor {
            let gap = TimeRange::new(cursor, overlap.start);
            sep.new_records
                .push(GridRecord::new(parm_id.clone(), event_slice.clip(gap)));
        }
        sep.merge
            .entry(overlap)
            .or_default()
            .extend([record.slice.clip(overlap), event_slice.clip(overlap)]);
        cursor = overlap.end;
    }
    if cursor < target.end {
        let gap = TimeRange::new(cursor, target.end);
        sep.new_records
            .push(GridRecord::new(parm_id.clone(), event_slice.clip(gap)));
    }
    sep
}

/// Remove one key's contribution from the grids intersecting the target
/// range.
///
/// When `bits` is given, the key is only stripped from cells inside the
/// event's raster footprint; without it (a grid-born event whose
/// geometry cannot be rasterized) the key is stripped wherever it
/// appears. Ranges whose slice empties out are marked for removal, and a
/// result that becomes content-identical to a time-adjacent neighbor is
/// merged with it instead of leaving an artificial boundary.
pub fn remove_event(
    parm_id: &ParmId,
    key: &DiscreteKey,
    bits: Option<&BitGrid>,
    existing: &[GridRecord],
    neighbors: &[DiscreteGridSlice],
    target: TimeRange,
) -> SeparatedRecords {
    let mut sep = SeparatedRecords::default();
    for record in existing {
        let Some(overlap) = record.time_range().intersection(&target) else {
            continue;
        };
        let mut stripped = record.slice.clip(overlap);
        let width = stripped.width;
        for idx in 0..stripped.cell_count() {
            let in_footprint = bits
                .map(|b| b.get(idx % width, idx / width))
                .unwrap_or(true);
            if in_footprint {
                stripped.remove_key_at(idx, key);
            }
        }
        if stripped.is_empty_content() {
            sep.remove.push(overlap);
        } else {
            sep.new_records
                .push(GridRecord::new(parm_id.clone(), stripped));
        }
    }

    for neighbor in neighbors {
        let merged = sep.new_records.iter().position(|r| {
            r.time_range().is_adjacent(&neighbor.valid_time) && r.slice.content_equals(neighbor)
        });
        if let Some(pos) = merged {
            let record = sep.new_records.remove(pos);
            let span = record.time_range().span(&neighbor.valid_time);
            sep.merge
                .entry(span)
                .or_default()
                .extend([record.slice, neighbor.clone()]);
            continue;
        }
        // A result already absorbed into a merge group keeps growing
        // when the neighbor on its other side matches too.
        let grown = sep.merge.iter().find_map(|(range, slices)| {
            (range.is_adjacent(&neighbor.valid_time)
                && slices.first().is_some_and(|s| s.content_equals(neighbor)))
            .then_some(*range)
        });
        if let Some(range) = grown {
            if let Some(mut slices) = sep.merge.remove(&range) {
                slices.push(neighbor.clone());
                sep.merge.insert(range.span(&neighbor.valid_time), slices);
            }
        }
    }
    sep
}

/// Merge a group of slices over one time range: the union of all keys,
/// cell by cell. Histories are concatenated in input order.
pub fn combine(slices: &[DiscreteGridSlice], valid_time: TimeRange) -> DiscreteGridSlice {
    let (width, height) = slices
        .first()
        .map(|s| (s.width, s.height))
        .unwrap_or((0, 0));
    let mut out = DiscreteGridSlice::empty(width, height, valid_time);
    for slice in slices {
        debug_assert_eq!((slice.width, slice.height), (width, height));
        for idx in 0..slice.cell_count().min(out.cell_count()) {
            if let Ok(keys) = hazgrid_core::key::parse_combined(slice.cell_key(idx)) {
                for key in keys {
                    out.add_key_at(idx, &key);
                }
            }
        }
        out.history.extend(slice.history.iter().copied());
    }
    out
}

/// Collapse adjacent records with identical content into single records,
/// minimizing record count after automated edits.
pub fn coalesce(mut records: Vec<GridRecord>) -> Vec<GridRecord> {
    records.sort_by_key(|r| r.time_range().start);
    let mut out: Vec<GridRecord> = Vec::with_capacity(records.len());
    for record in records {
        if let Some(last) = out.last_mut() {
            if last.parm_id == record.parm_id
                && last.time_range().end == record.time_range().start
                && last.slice.content_equals(&record.slice)
            {
                last.slice.valid_time = last.time_range().span(&record.time_range());
                continue;
            }
        }
        out.push(record);
    }
    out
}
