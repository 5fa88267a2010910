// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Half-open key ranges and the absent-range set.
//!
//! A scan that finds a stretch of keyspace empty records that stretch as a
//! negative predicate: "no key in `[a, b)` was visible at my snapshot".
//! Commit re-checks every such range against the live index. The set is
//! kept canonical (sorted by lower bound, pairwise disjoint, non-touching,
//! non-empty) so both insertion and containment are binary searches.

use crate::storage::Key;

/// A half-open key interval `[start, end)`.
///
/// `end = None` means the range extends to the end of the keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Inclusive lower bound.
    pub start: Key,
    /// Exclusive upper bound; `None` is +∞.
    pub end: Option<Key>,
}

impl KeyRange {
    /// Creates the range `[start, end)`.
    pub fn new(start: Key, end: Option<Key>) -> Self {
        Self { start, end }
    }

    /// Creates the bounded range `[start, end)`.
    pub fn bounded(start: impl Into<Key>, end: impl Into<Key>) -> Self {
        Self::new(start.into(), Some(end.into()))
    }

    /// Creates the unbounded range `[start, +∞)`.
    pub fn unbounded(start: impl Into<Key>) -> Self {
        Self::new(start.into(), None)
    }

    /// Returns true if the range contains no keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        match &self.end {
            Some(end) => *end <= self.start,
            None => false,
        }
    }

    /// Returns true if `key` falls within the range.
    #[inline]
    pub fn contains(&self, key: &Key) -> bool {
        self.start <= *key
            && match &self.end {
                Some(end) => *key < *end,
                None => true,
            }
    }
}

/// The set of key ranges a transaction has observed to be empty at its
/// snapshot.
///
/// Maintained in canonical form after every mutation: ranges sorted by
/// lower bound, no two overlapping or touching, none empty.
#[derive(Debug, Default)]
pub struct AbsentRangeSet {
    ranges: Vec<KeyRange>,
}

impl AbsentRangeSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Returns the number of stored ranges.
    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Returns true if no absent range has been recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Iterates the ranges in ascending order of lower bound.
    pub fn iter(&self) -> impl Iterator<Item = &KeyRange> {
        self.ranges.iter()
    }

    /// Merges `range` into the set, coalescing with any stored ranges it
    /// overlaps or touches. Empty ranges are discarded.
    pub fn add(&mut self, range: KeyRange) {
        if range.is_empty() {
            return;
        }

        // Stored ranges are disjoint and non-touching, so they are sorted
        // by upper bound as well as lower bound; both probes are binary
        // searches. A range whose end equals our start (or vice versa)
        // touches us and must coalesce.
        let lo = self.ranges.partition_point(|r| match &r.end {
            Some(end) => *end < range.start,
            None => false,
        });
        let hi = match &range.end {
            Some(end) => self.ranges.partition_point(|r| r.start <= *end),
            None => self.ranges.len(),
        };

        if lo == hi {
            self.ranges.insert(lo, range);
        } else {
            let start = std::cmp::min(&range.start, &self.ranges[lo].start).clone();
            let end = match (&range.end, &self.ranges[hi - 1].end) {
                (Some(a), Some(b)) => Some(std::cmp::max(a, b).clone()),
                _ => None,
            };
            self.ranges[lo] = KeyRange::new(start, end);
            self.ranges.drain(lo + 1..hi);
        }

        self.assert_canonical();
    }

    /// Returns true iff some stored range contains `key`.
    pub fn contains(&self, key: &Key) -> bool {
        // First range whose upper bound strictly exceeds the probe; an
        // unbounded range exceeds every key.
        let i = self.ranges.partition_point(|r| match &r.end {
            Some(end) => *end <= *key,
            None => false,
        });
        i < self.ranges.len() && self.ranges[i].start <= *key
    }

    #[cfg(debug_assertions)]
    fn assert_canonical(&self) {
        for (i, range) in self.ranges.iter().enumerate() {
            assert!(!range.is_empty(), "canonical set holds no empty ranges");
            if i > 0 {
                match &self.ranges[i - 1].end {
                    Some(prev_end) => assert!(
                        *prev_end < range.start,
                        "ranges must be sorted, disjoint, and non-touching"
                    ),
                    None => panic!("an unbounded range must be last"),
                }
            }
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn assert_canonical(&self) {}
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_key() -> impl Strategy<Value = Key> {
        prop::collection::vec(b'a'..=b'f', 1..4).prop_map(Key::new)
    }

    fn arb_range() -> impl Strategy<Value = KeyRange> {
        (arb_key(), prop::option::of(arb_key()))
            .prop_map(|(start, end)| KeyRange::new(start, end))
    }

    proptest! {
        #[test]
        fn canonical_after_arbitrary_adds(ranges in prop::collection::vec(arb_range(), 0..20)) {
            let mut set = AbsentRangeSet::new();
            let mut kept = Vec::new();
            for range in ranges {
                if !range.is_empty() {
                    kept.push(range.clone());
                }
                set.add(range);
            }

            // Sorted, disjoint, non-touching, non-empty.
            let stored: Vec<_> = set.iter().cloned().collect();
            for (i, range) in stored.iter().enumerate() {
                prop_assert!(!range.is_empty());
                if i > 0 {
                    let prev_end = stored[i - 1].end.as_ref();
                    prop_assert!(prev_end.is_some(), "unbounded range must be last");
                    prop_assert!(*prev_end.unwrap() < range.start);
                }
            }

            prop_assert_eq!(set.is_empty(), kept.is_empty());
        }

        #[test]
        fn containment_matches_added_ranges(
            ranges in prop::collection::vec(arb_range(), 0..20),
            probe in arb_key(),
        ) {
            let mut set = AbsentRangeSet::new();
            for range in &ranges {
                set.add(range.clone());
            }

            let naive = ranges.iter().any(|r| r.contains(&probe));
            prop_assert_eq!(set.contains(&probe), naive);
        }
    }
}
