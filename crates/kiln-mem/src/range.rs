//! # Valid-Range Set
//!
//! Byte intervals of a buffer known to hold defined contents.
//!
//! Transfer and readback paths consult this before deciding whether a mapped
//! range needs synchronization or may be treated as uninitialized.

use alloc::vec::Vec;
use core::ops::Range;

/// Sorted set of disjoint, non-adjacent half-open byte intervals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidRangeSet {
    ranges: Vec<Range<u64>>,
}

impl ValidRangeSet {
    /// Create an empty set
    pub const fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Add `range`, merging with any overlapping or touching interval.
    ///
    /// Empty ranges are ignored, and re-adding covered bytes changes nothing.
    pub fn add(&mut self, range: Range<u64>) {
        if range.start >= range.end {
            return;
        }

        let mut start = range.start;
        let mut end = range.end;

        // First interval that ends at or after the new start can merge
        let first = self.ranges.partition_point(|r| r.end < start);
        let mut last = first;

        while last < self.ranges.len() && self.ranges[last].start <= end {
            start = start.min(self.ranges[last].start);
            end = end.max(self.ranges[last].end);
            last += 1;
        }

        self.ranges.splice(first..last, core::iter::once(start..end));
    }

    /// Whether every byte of `range` is valid
    pub fn contains(&self, range: Range<u64>) -> bool {
        if range.start >= range.end {
            return true;
        }

        let idx = self.ranges.partition_point(|r| r.end <= range.start);
        self.ranges
            .get(idx)
            .map_or(false, |r| r.start <= range.start && range.end <= r.end)
    }

    /// Whether any byte of `range` is valid
    pub fn intersects(&self, range: Range<u64>) -> bool {
        if range.start >= range.end {
            return false;
        }

        let idx = self.ranges.partition_point(|r| r.end <= range.start);
        self.ranges.get(idx).map_or(false, |r| r.start < range.end)
    }

    /// Smallest single interval covering every valid byte
    pub fn extent(&self) -> Option<Range<u64>> {
        match (self.ranges.first(), self.ranges.last()) {
            (Some(first), Some(last)) => Some(first.start..last.end),
            _ => None,
        }
    }

    /// Total number of valid bytes
    pub fn covered_bytes(&self) -> u64 {
        self.ranges.iter().map(|r| r.end - r.start).sum()
    }

    /// Number of disjoint intervals
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether nothing is valid
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Iterate over the intervals in ascending order
    pub fn iter(&self) -> impl Iterator<Item = &Range<u64>> {
        self.ranges.iter()
    }

    /// Forget everything (the backing storage was replaced)
    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}
