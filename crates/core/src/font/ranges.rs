//! Code ranges used by CMaps.
//!
//! A [`Range`] is a closed interval of character codes. A [`MapRange`]
//! additionally maps each code linearly onto a destination. Collections
//! keep their members in insertion order; for mapped lookups the first
//! containing range wins, even when a later one is narrower.

use crate::error::{PdfError, Result};
use std::collections::BTreeMap;

/// Big-endian integer value of a hex string operand, e.g. `<01FF>` -> 511.
/// Operands longer than eight bytes do not fit and give `None`.
pub fn code_from_bytes(bytes: &[u8]) -> Option<i64> {
    if bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0i64, |acc, &b| (acc << 8) | i64::from(b)))
}

/// Closed interval `[begin, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub begin: i64,
    pub end: i64,
}

impl Range {
    pub const fn new(begin: i64, end: i64) -> Self {
        Self { begin, end }
    }

    pub const fn contains(&self, code: i64) -> bool {
        self.begin <= code && code <= self.end
    }

    /// Number of codes covered: `end - begin + 1`, saturating at
    /// `usize::MAX`.
    pub const fn len(&self) -> usize {
        if self.end < self.begin {
            return 0;
        }
        // Non-negative and at most 2^64 - 1 once taken as unsigned.
        let span = self.end.abs_diff(self.begin);
        match span.checked_add(1) {
            Some(n) if n <= usize::MAX as u64 => n as usize,
            _ => usize::MAX,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A range whose codes map onto `map_to_start + (code - begin)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapRange {
    pub range: Range,
    pub map_to_start: i64,
}

impl MapRange {
    pub const fn new(begin: i64, end: i64, map_to_start: i64) -> Self {
        Self {
            range: Range::new(begin, end),
            map_to_start,
        }
    }

    pub const fn contains(&self, code: i64) -> bool {
        self.range.contains(code)
    }

    pub const fn len(&self) -> usize {
        self.range.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Mapped value of `code`, or `KeyError` outside the range.
    pub fn lookup(&self, code: i64) -> Result<i64> {
        self.get(code)
            .ok_or_else(|| PdfError::KeyError(code.to_string()))
    }

    /// Non-failing [`lookup`](Self::lookup).
    pub const fn get(&self, code: i64) -> Option<i64> {
        if !self.contains(code) {
            return None;
        }
        match code.checked_sub(self.range.begin) {
            Some(delta) => self.map_to_start.checked_add(delta),
            None => None,
        }
    }
}

/// Ordered collection of ranges answering membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodespaceRanges {
    ranges: Vec<Range>,
}

impl CodespaceRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, begin: i64, end: i64) {
        self.ranges.push(Range::new(begin, end));
    }

    pub fn contains(&self, code: i64) -> bool {
        self.ranges.iter().any(|r| r.contains(code))
    }

    /// Append another collection's ranges, keeping duplicates.
    pub fn merge(&mut self, other: &Self) {
        self.ranges.extend_from_slice(&other.ranges);
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// Every covered code, sorted and without duplicates.
    pub fn as_list(&self) -> Vec<i64> {
        sorted_codes(self.ranges.iter().copied())
    }

    /// Number of distinct covered codes.
    pub fn len(&self) -> usize {
        self.as_list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.iter().all(Range::is_empty)
    }
}

/// Ordered collection of mapped ranges. Lookups scan in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedCodespaceRanges {
    ranges: Vec<MapRange>,
}

impl MappedCodespaceRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, begin: i64, end: i64, map_to_start: i64) {
        self.ranges.push(MapRange::new(begin, end, map_to_start));
    }

    pub fn contains(&self, code: i64) -> bool {
        self.ranges.iter().any(|r| r.contains(code))
    }

    pub fn merge(&mut self, other: &Self) {
        self.ranges.extend_from_slice(&other.ranges);
    }

    pub fn ranges(&self) -> &[MapRange] {
        &self.ranges
    }

    /// Value from the first range containing `code`, or `KeyError`.
    pub fn lookup(&self, code: i64) -> Result<i64> {
        self.get(code)
            .ok_or_else(|| PdfError::KeyError(code.to_string()))
    }

    pub fn get(&self, code: i64) -> Option<i64> {
        self.ranges.iter().find_map(|r| r.get(code))
    }

    pub fn get_or(&self, code: i64, default: i64) -> i64 {
        self.get(code).unwrap_or(default)
    }

    pub fn as_list(&self) -> Vec<i64> {
        sorted_codes(self.ranges.iter().map(|r| r.range))
    }

    /// Every covered code with the value a lookup would return.
    pub fn as_map(&self) -> BTreeMap<i64, i64> {
        let mut map = BTreeMap::new();
        for r in &self.ranges {
            for code in r.range.begin..=r.range.end {
                if let Some(value) = r.get(code) {
                    map.entry(code).or_insert(value);
                }
            }
        }
        map
    }

    pub fn len(&self) -> usize {
        self.as_list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.iter().all(MapRange::is_empty)
    }
}

fn sorted_codes(ranges: impl Iterator<Item = Range>) -> Vec<i64> {
    let mut codes: Vec<i64> = ranges.flat_map(|r| r.begin..=r.end).collect();
    codes.sort_unstable();
    codes.dedup();
    codes
}
