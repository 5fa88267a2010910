// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The commit protocol: lock, validate, install, unlock.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::storage::{Key, Value, VersionedCell};
use crate::time::Tid;

use super::error::TxnError;
use super::range::AbsentRangeSet;
use super::transaction::{Transaction, TxnState};

/// The write set sorted for locking, paired with the locked cells.
type LockedWriteSet = Vec<(Key, Option<Value>, Arc<VersionedCell>)>;

impl Transaction {
    /// Commits the transaction.
    ///
    /// Four phases:
    ///
    /// 1. Lock every write-set cell in ascending key order, creating cells
    ///    for keys the index has never seen. Ascending order is the sole
    ///    deadlock-avoidance rule.
    /// 2. Draw the commit timestamp from the global clock.
    /// 3. Revalidate every read and every absent range against the
    ///    serialization order; any inconsistency aborts.
    /// 4. Install the buffered writes at the commit timestamp and unlock.
    ///
    /// On success returns the commit timestamp; any transaction with a
    /// later snapshot sees the writes. On conflict the transaction is
    /// aborted, every lock released, and the conflict returned; the caller
    /// may retry by re-running against a fresh snapshot.
    pub fn commit(&mut self) -> Result<Tid, TxnError> {
        self.check_active()?;

        // Phase 1: hashed write set is sorted once, then locked in order.
        let write_set: BTreeMap<Key, Option<Value>> = self.write_set.drain().collect();
        let mut locked: LockedWriteSet = Vec::with_capacity(write_set.len());
        for (key, record) in write_set {
            let cell = self.index.insert_if_absent(&key);
            cell.lock();
            locked.push((key, record, cell));
        }

        // Phase 2: the commit timestamp exceeds every previously issued
        // commit timestamp and every live snapshot taken before this point.
        let commit_tid = self.clock.increment_and_fetch();

        // Phase 3: read-set validation. Nothing here may wait on a foreign
        // lock: we hold our own write-set locks, and a commit validating in
        // the opposite direction may be spinning on one of them, so any
        // wait can close a cycle. A cell mid-install by another commit
        // fails validation and we abort conservatively, leaving
        // ascending-key locking as the only ordering the protocol needs.
        let mut conflict = None;
        for (key, read) in &self.read_set {
            // For keys we also write, the cell lock is already ours and the
            // check runs directly on the version array.
            let own_locked = locked.binary_search_by(|(k, _, _)| k.cmp(key)).is_ok();
            let consistent = if own_locked {
                read.cell
                    .is_snapshot_consistent(self.snapshot_tid, commit_tid)
            } else {
                read.cell
                    .try_snapshot_consistent(self.snapshot_tid, commit_tid)
            };
            if !consistent {
                debug!(
                    snapshot_tid = self.snapshot_tid,
                    commit_tid,
                    key = ?key,
                    "commit aborted: stale read"
                );
                conflict = Some(TxnError::StaleRead { key: key.clone() });
                break;
            }
        }

        // Phase 3: absent-range validation against the live index.
        if conflict.is_none() {
            let snapshot_tid = self.snapshot_tid;
            for range in self.absent_ranges.iter() {
                let mut phantom = None;
                self.index
                    .range_scan(&range.start, range.end.as_ref(), &mut |key, cell| {
                        // Our own insertion is not a phantom against itself.
                        if locked.binary_search_by(|(k, _, _)| k.cmp(key)).is_ok() {
                            return true;
                        }
                        // Non-blocking for the same reason as the read set:
                        // the cell may be locked by another commit.
                        if !cell.try_snapshot_consistent(snapshot_tid, commit_tid) {
                            phantom = Some(key.clone());
                            return false;
                        }
                        true
                    });
                if let Some(key) = phantom {
                    debug!(
                        snapshot_tid,
                        commit_tid,
                        key = ?key,
                        "commit aborted: phantom in scanned range"
                    );
                    conflict = Some(TxnError::Phantom { key });
                    break;
                }
            }
        }

        if let Some(err) = conflict {
            unlock_all(&locked);
            self.read_set.clear();
            self.absent_ranges = AbsentRangeSet::new();
            self.state = TxnState::Aborted;
            return Err(err);
        }

        // Phase 4: install and unlock, ascending key order.
        let writes = locked.len();
        for (_, record, cell) in locked {
            cell.write_record_at(commit_tid, record);
            cell.unlock();
        }

        self.read_set.clear();
        self.absent_ranges = AbsentRangeSet::new();
        self.state = TxnState::Committed;
        trace!(commit_tid, writes, "transaction committed");
        Ok(commit_tid)
    }

    /// Aborts the transaction, discarding all buffered writes.
    ///
    /// Idempotent, never fails, callable from any state; aborting a
    /// resolved transaction is a no-op. No cell retains any trace of the
    /// transaction afterwards.
    pub fn abort(&mut self) {
        if !self.is_active() {
            return;
        }
        self.write_set.clear();
        self.read_set.clear();
        self.absent_ranges = AbsentRangeSet::new();
        self.state = TxnState::Aborted;
    }
}

fn unlock_all(locked: &LockedWriteSet) {
    for (_, _, cell) in locked {
        cell.unlock();
    }
}
