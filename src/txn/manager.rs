// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The transaction manager: owns the clock and the index handle.

use std::sync::Arc;

use crate::storage::{BTreeIndex, OrderedIndex};
use crate::time::{GlobalClock, Tid};

use super::transaction::Transaction;

/// Optimistic transaction manager over an ordered index.
///
/// The manager owns the [`GlobalClock`] that serializes commits and a
/// handle to the [`OrderedIndex`] holding the versioned cells. It hands
/// out [`Transaction`]s that carry their own handles, so transactions may
/// outlive borrows of the manager and run on any thread.
pub struct OccTxnManager {
    index: Arc<dyn OrderedIndex>,
    clock: Arc<GlobalClock>,
}

impl OccTxnManager {
    /// Creates a manager over a fresh in-memory [`BTreeIndex`].
    pub fn new() -> Self {
        Self::with_index(Arc::new(BTreeIndex::new()))
    }

    /// Creates a manager over a caller-provided index.
    ///
    /// The index may already hold cells; the manager imposes transactional
    /// ordering from its first transaction onward.
    pub fn with_index(index: Arc<dyn OrderedIndex>) -> Self {
        Self {
            index,
            clock: Arc::new(GlobalClock::new()),
        }
    }

    /// Begins a transaction whose snapshot is the clock's current value.
    pub fn begin(&self) -> Transaction {
        Transaction::new(Arc::clone(&self.index), Arc::clone(&self.clock))
    }

    /// Returns the most recently issued commit timestamp, for diagnostics.
    pub fn current_tid(&self) -> Tid {
        self.clock.peek()
    }
}

impl Default for OccTxnManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Key, Value};
    use crate::time::MIN_TID;

    #[test]
    fn test_begin_samples_clock() {
        let mgr = OccTxnManager::new();
        assert_eq!(mgr.current_tid(), MIN_TID);

        let txn = mgr.begin();
        assert_eq!(txn.snapshot_tid(), MIN_TID);
        assert!(txn.is_active());
    }

    #[test]
    fn test_snapshot_advances_with_commits() {
        let mgr = OccTxnManager::new();

        let mut writer = mgr.begin();
        writer.put(Key::from("k"), Value::from("v")).unwrap();
        let commit_tid = writer.commit().unwrap();

        let txn = mgr.begin();
        assert_eq!(txn.snapshot_tid(), commit_tid);
        assert_eq!(mgr.current_tid(), commit_tid);
    }

    #[test]
    fn test_with_index_shares_cells() {
        let index = Arc::new(BTreeIndex::new());
        let mgr = OccTxnManager::with_index(Arc::clone(&index) as Arc<dyn OrderedIndex>);

        let mut txn = mgr.begin();
        txn.put(Key::from("k"), Value::from("v")).unwrap();
        txn.commit().unwrap();

        assert!(index.lookup(&Key::from("k")).is_some());
    }

    #[test]
    fn test_dropped_active_transaction_aborts() {
        let mgr = OccTxnManager::new();

        {
            let mut txn = mgr.begin();
            txn.put(Key::from("k"), Value::from("v")).unwrap();
            // Dropped without commit.
        }

        let mut reader = mgr.begin();
        assert_eq!(reader.get(&Key::from("k")).unwrap(), None);
        assert_eq!(mgr.current_tid(), MIN_TID);
    }
}
