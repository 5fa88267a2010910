// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction state and the read/write/scan paths.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use crate::storage::{Key, OrderedIndex, Value, VersionedCell};
use crate::time::{GlobalClock, Tid, MIN_TID};

use super::error::TxnError;
use super::range::{AbsentRangeSet, KeyRange};

/// Transaction state.
///
/// `Committed` and `Aborted` are terminal; there are no transitions out of
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committed,
    Aborted,
}

/// One observation in the read set: the version a read returned and the
/// cell it came from.
pub(crate) struct ReadRecord {
    /// Start timestamp of the observed version.
    pub(crate) start_tid: Tid,
    /// The observed payload; `None` means the key read as deleted.
    pub(crate) record: Option<Value>,
    /// The cell the observation must revalidate against at commit.
    pub(crate) cell: Arc<VersionedCell>,
}

/// A snapshot-isolated read/write transaction.
///
/// Reads come from the snapshot fixed at begin; writes are buffered and
/// touch no cell until [`commit`](Transaction::commit), which validates
/// every read and every scanned-empty range against the serialization
/// order before installing. Dropping an unresolved transaction aborts it.
pub struct Transaction {
    /// Global clock value sampled at begin; fixes the visible snapshot.
    pub(crate) snapshot_tid: Tid,
    pub(crate) state: TxnState,
    pub(crate) index: Arc<dyn OrderedIndex>,
    pub(crate) clock: Arc<GlobalClock>,
    /// Keys read from cells; first observation wins.
    pub(crate) read_set: HashMap<Key, ReadRecord>,
    /// Buffered mutations; `None` is a deletion.
    pub(crate) write_set: HashMap<Key, Option<Value>>,
    /// Ranges observed to contain no visible keys at the snapshot.
    pub(crate) absent_ranges: AbsentRangeSet,
}

impl Transaction {
    pub(crate) fn new(index: Arc<dyn OrderedIndex>, clock: Arc<GlobalClock>) -> Self {
        Self {
            snapshot_tid: clock.peek(),
            state: TxnState::Active,
            index,
            clock,
            read_set: HashMap::new(),
            write_set: HashMap::new(),
            absent_ranges: AbsentRangeSet::new(),
        }
    }

    /// Returns the snapshot timestamp.
    #[inline]
    pub fn snapshot_tid(&self) -> Tid {
        self.snapshot_tid
    }

    /// Returns the current state.
    #[inline]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Returns true if the transaction is active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    /// Returns true if the transaction is committed.
    #[inline]
    pub fn is_committed(&self) -> bool {
        self.state == TxnState::Committed
    }

    /// Returns true if the transaction is aborted.
    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.state == TxnState::Aborted
    }

    /// Returns the number of writes buffered.
    #[inline]
    pub fn write_count(&self) -> usize {
        self.write_set.len()
    }

    /// Returns the number of reads tracked.
    #[inline]
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    pub(crate) fn check_active(&self) -> Result<(), TxnError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(TxnError::AlreadyResolved)
        }
    }

    /// Reads `key`, returning the payload visible at the snapshot.
    ///
    /// A buffered write takes precedence (read-your-writes); otherwise a
    /// prior observation is returned unchanged, and only a first read goes
    /// to the index. A key absent from the index is materialized so the
    /// observed absence revalidates at commit like any other read.
    pub fn get(&mut self, key: &Key) -> Result<Option<Value>, TxnError> {
        self.check_active()?;

        if let Some(buffered) = self.write_set.get(key) {
            return Ok(buffered.clone());
        }
        if let Some(read) = self.read_set.get(key) {
            return Ok(read.record.clone());
        }
        // A range this transaction already observed empty answers the read;
        // commit revalidates the whole range.
        if self.absent_ranges.contains(key) {
            return Ok(None);
        }

        let cell = self.index.insert_if_absent(key);
        match cell.stable_read(self.snapshot_tid) {
            Some((start_tid, record)) => {
                let result = record.clone();
                self.read_set.insert(
                    key.clone(),
                    ReadRecord {
                        start_tid,
                        record,
                        cell,
                    },
                );
                Ok(result)
            }
            None => {
                // History truncated past the snapshot. The read surfaces as
                // not-found, and the recorded entry cannot pass validation,
                // so commit will abort.
                self.read_set.insert(
                    key.clone(),
                    ReadRecord {
                        start_tid: MIN_TID,
                        record: None,
                        cell,
                    },
                );
                Ok(None)
            }
        }
    }

    /// Buffers a write of `value` to `key`, replacing any prior buffered
    /// write. No cell is touched until commit.
    pub fn put(&mut self, key: Key, value: Value) -> Result<(), TxnError> {
        self.check_active()?;
        self.write_set.insert(key, Some(value));
        Ok(())
    }

    /// Buffers a deletion of `key`.
    pub fn delete(&mut self, key: Key) -> Result<(), TxnError> {
        self.check_active()?;
        self.write_set.insert(key, None);
        Ok(())
    }

    /// Scans `[lo, hi)` (`hi = None` scans to the end of the keyspace) in
    /// key order, feeding every visible key to `visitor`.
    ///
    /// Every visible key joins the read set; the gaps between them, plus
    /// the outer boundaries, are recorded as absent ranges so commit can
    /// detect phantoms. The visitor returns false to stop the scan early.
    /// Buffered writes are not overlaid; the scan observes the snapshot.
    pub fn scan<F>(&mut self, lo: &Key, hi: Option<&Key>, mut visitor: F) -> Result<(), TxnError>
    where
        F: FnMut(&Key, &Value) -> bool,
    {
        self.check_active()?;

        let snapshot_tid = self.snapshot_tid;
        let index = Arc::clone(&self.index);
        let read_set = &mut self.read_set;
        let absent_ranges = &mut self.absent_ranges;
        let mut gap_start = lo.clone();
        let mut stopped = false;

        index.range_scan(lo, hi, &mut |key, cell| {
            let record = match read_set.entry(key.clone()) {
                // First observation wins: repeated scans and gets agree.
                Entry::Occupied(entry) => entry.into_mut().record.clone(),
                Entry::Vacant(vacant) => match cell.stable_read(snapshot_tid) {
                    Some((start_tid, Some(record))) => {
                        vacant.insert(ReadRecord {
                            start_tid,
                            record: Some(record.clone()),
                            cell: Arc::clone(cell),
                        });
                        Some(record)
                    }
                    // Deleted at the snapshot, or truncated history: the
                    // key stays inside the running gap, and commit-time
                    // range validation judges the cell.
                    _ => None,
                },
            };

            match record {
                Some(value) => {
                    let gap = std::mem::replace(&mut gap_start, key.successor());
                    absent_ranges.add(KeyRange::new(gap, Some(key.clone())));
                    if visitor(key, &value) {
                        true
                    } else {
                        stopped = true;
                        false
                    }
                }
                None => true,
            }
        });

        if !stopped {
            absent_ranges.add(KeyRange::new(gap_start, hi.cloned()));
        }

        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_active() {
            self.abort();
        }
    }
}
