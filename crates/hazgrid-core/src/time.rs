//! Time ranges and grid time constraints.
//!
//! All timestamps are unix epoch seconds. Ranges are half-open
//! `[start, end)`, matching how grid storage keys its records.

use serde::{Deserialize, Serialize};

/// A half-open time range `[start, end)` in epoch seconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Duration in seconds. Zero or negative means the range is empty.
    pub fn duration(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True if `instant` falls inside the range.
    pub fn contains_instant(&self, instant: i64) -> bool {
        instant >= self.start && instant < self.end
    }

    /// True if the two ranges share at least one instant.
    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True if `other` lies entirely within this range.
    pub fn contains(&self, other: &TimeRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// The overlapping sub-range, if any.
    pub fn intersection(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(TimeRange { start, end })
    }

    /// True if the ranges touch end-to-start without overlapping.
    pub fn is_adjacent(&self, other: &TimeRange) -> bool {
        self.end == other.start || other.end == self.start
    }

    /// Smallest range covering both.
    pub fn span(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Snap to quantum boundaries: floor the start, ceil the end.
    ///
    /// A zero-duration input still yields one full quantum, since a grid
    /// record can never be narrower than the storage quantum.
    pub fn quantize(&self, tc: &TimeConstraints) -> TimeRange {
        let q = tc.repeat.max(1);
        let start = floor_to(self.start, q, tc.start_offset);
        let mut end = ceil_to(self.end, q, tc.start_offset);
        if end <= start {
            end = start + q;
        }
        TimeRange { start, end }
    }

    /// Composite-key fragment for persistence (`{start}:{end}`).
    pub fn key_fragment(&self) -> String {
        format!("{}:{}", self.start, self.end)
    }
}

fn floor_to(v: i64, quantum: i64, offset: i64) -> i64 {
    offset + (v - offset).div_euclid(quantum) * quantum
}

fn ceil_to(v: i64, quantum: i64, offset: i64) -> i64 {
    let floored = floor_to(v, quantum, offset);
    if floored == v { v } else { floored + quantum }
}

/// Time quantization parameters of a grid parameter.
///
/// Grid storage only accepts ranges aligned to `repeat`-second boundaries
/// (shifted by `start_offset`); each stored grid is `duration` seconds long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeConstraints {
    /// Length of a single grid in seconds.
    pub duration: i64,
    /// Spacing between grid starts in seconds.
    pub repeat: i64,
    /// Offset of the first boundary from midnight UTC, in seconds.
    pub start_offset: i64,
}

impl TimeConstraints {
    /// One-hour grids on hour boundaries, the common hazard configuration.
    pub fn hourly() -> Self {
        Self {
            duration: 3600,
            repeat: 3600,
            start_offset: 0,
        }
    }
}

impl Default for TimeConstraints {
    fn default() -> Self {
        Self::hourly()
    }
}
