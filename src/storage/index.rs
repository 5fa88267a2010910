// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The underlying ordered-index contract and an in-memory reference
//! implementation.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use super::cell::VersionedCell;
use super::types::Key;

/// The ordered key/value index the transaction layer runs on top of.
///
/// The index maps keys to [`VersionedCell`]s and owns them. It is not
/// transactional and provides no isolation; the transaction layer imposes
/// all ordering through the cells themselves.
pub trait OrderedIndex: Send + Sync {
    /// Returns the cell for `key`, if one exists.
    fn lookup(&self, key: &Key) -> Option<Arc<VersionedCell>>;

    /// Returns the cell for `key`, creating one if none existed.
    ///
    /// When two actors race, both receive the cell the index now contains.
    fn insert_if_absent(&self, key: &Key) -> Arc<VersionedCell>;

    /// Enumerates `(key, cell)` pairs in key order within `[lo, hi)`.
    ///
    /// `hi = None` scans to the end of the keyspace. The visitor returns
    /// false to stop the enumeration early.
    fn range_scan(
        &self,
        lo: &Key,
        hi: Option<&Key>,
        visitor: &mut dyn FnMut(&Key, &Arc<VersionedCell>) -> bool,
    );
}

/// In-memory ordered index backed by a `BTreeMap` behind a reader/writer
/// lock.
///
/// Suitable as the manager default and for tests; any structure satisfying
/// [`OrderedIndex`] (a lock-free B-tree, a skiplist) can replace it.
pub struct BTreeIndex {
    cells: RwLock<BTreeMap<Key, Arc<VersionedCell>>>,
}

impl BTreeIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            cells: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the number of keys present, including keys whose current
    /// version is a deletion.
    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    /// Returns true if no key has ever been materialized.
    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }
}

impl Default for BTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderedIndex for BTreeIndex {
    fn lookup(&self, key: &Key) -> Option<Arc<VersionedCell>> {
        self.cells.read().get(key).cloned()
    }

    fn insert_if_absent(&self, key: &Key) -> Arc<VersionedCell> {
        let mut cells = self.cells.write();
        Arc::clone(
            cells
                .entry(key.clone())
                .or_insert_with(|| Arc::new(VersionedCell::new())),
        )
    }

    fn range_scan(
        &self,
        lo: &Key,
        hi: Option<&Key>,
        visitor: &mut dyn FnMut(&Key, &Arc<VersionedCell>) -> bool,
    ) {
        let cells = self.cells.read();
        let upper = match hi {
            Some(hi) => Bound::Excluded(hi),
            None => Bound::Unbounded,
        };
        for (key, cell) in cells.range::<Key, _>((Bound::Included(lo), upper)) {
            if !visitor(key, cell) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_missing() {
        let index = BTreeIndex::new();
        assert!(index.lookup(&Key::from("a")).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_if_absent_returns_same_cell() {
        let index = BTreeIndex::new();
        let a = index.insert_if_absent(&Key::from("a"));
        let b = index.insert_if_absent(&Key::from("a"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(index.len(), 1);

        let found = index.lookup(&Key::from("a")).unwrap();
        assert!(Arc::ptr_eq(&a, &found));
    }

    #[test]
    fn test_racing_insert_if_absent() {
        let index = Arc::new(BTreeIndex::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || index.insert_if_absent(&Key::from("k")))
            })
            .collect();

        let cells: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for cell in &cells[1..] {
            assert!(Arc::ptr_eq(&cells[0], cell));
        }
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_range_scan_in_key_order() {
        let index = BTreeIndex::new();
        for key in ["d", "a", "c", "b", "e"] {
            index.insert_if_absent(&Key::from(key));
        }

        let mut seen = Vec::new();
        index.range_scan(&Key::from("b"), Some(&Key::from("e")), &mut |key, _| {
            seen.push(key.clone());
            true
        });
        assert_eq!(seen, vec![Key::from("b"), Key::from("c"), Key::from("d")]);
    }

    #[test]
    fn test_range_scan_unbounded() {
        let index = BTreeIndex::new();
        for key in ["a", "b", "c"] {
            index.insert_if_absent(&Key::from(key));
        }

        let mut seen = Vec::new();
        index.range_scan(&Key::from("b"), None, &mut |key, _| {
            seen.push(key.clone());
            true
        });
        assert_eq!(seen, vec![Key::from("b"), Key::from("c")]);
    }

    #[test]
    fn test_range_scan_visitor_stops_early() {
        let index = BTreeIndex::new();
        for key in ["a", "b", "c"] {
            index.insert_if_absent(&Key::from(key));
        }

        let mut seen = Vec::new();
        index.range_scan(&Key::from("a"), None, &mut |key, _| {
            seen.push(key.clone());
            false
        });
        assert_eq!(seen, vec![Key::from("a")]);
    }
}
