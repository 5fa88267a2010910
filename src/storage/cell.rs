// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The versioned cell: per-key container of historical record versions.
//!
//! A cell packs its entire synchronization state into one 64-bit control
//! word (`[ locked | size | version-counter ]`) so that an optimistic
//! reader can sample a consistent snapshot with a single load, read the
//! version array, and re-check the word to detect concurrent mutation.
//! Only the lock holder may mutate the version arrays; readers never
//! acquire the lock.
//!
//! Record payloads are epoch-managed: an evicted record may still be held
//! by an in-flight stable reader, so its destruction is deferred until all
//! pinned readers have moved on.

use std::fmt;
use std::sync::atomic::{fence, AtomicU64, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::Backoff;

use crate::time::Tid;

use super::types::Value;

const HDR_LOCKED_MASK: u64 = 0x1;

const HDR_SIZE_SHIFT: u64 = 1;
const HDR_SIZE_MASK: u64 = 0xf << HDR_SIZE_SHIFT;

const HDR_VERSION_SHIFT: u64 = 5;
const HDR_VERSION_MASK: u64 = u64::MAX << HDR_VERSION_SHIFT;

/// Maximum number of historical versions a cell retains.
pub const NVERSIONS: usize = 15;

#[inline]
fn word_is_locked(v: u64) -> bool {
    v & HDR_LOCKED_MASK != 0
}

#[inline]
fn word_size(v: u64) -> usize {
    ((v & HDR_SIZE_MASK) >> HDR_SIZE_SHIFT) as usize
}

#[inline]
fn word_counter(v: u64) -> u64 {
    (v & HDR_VERSION_MASK) >> HDR_VERSION_SHIFT
}

/// The complete observable history for one key.
///
/// The latest version always lives at index `size - 1`. A freshly
/// allocated cell holds one deleted entry at [`MIN_TID`](crate::time::MIN_TID),
/// so a key that has never been committed reads as absent at any snapshot.
///
/// The layout is fixed: control word at offset 0, timestamps at offset 8,
/// record slots at offset 128, padded to four cache lines.
#[repr(C, align(64))]
pub struct VersionedCell {
    // [ locked | size | version-counter ]
    // [  0..1  | 1..5 |      5..64      ]
    hdr: AtomicU64,
    versions: [AtomicU64; NVERSIONS],
    records: [Atomic<Value>; NVERSIONS],
}

const _: () = assert!(std::mem::size_of::<VersionedCell>() == 256);
const _: () = assert!(std::mem::align_of::<VersionedCell>() == 64);

impl VersionedCell {
    /// Creates a cell holding the single sentinel entry `(MIN_TID, deleted)`.
    pub fn new() -> Self {
        Self {
            hdr: AtomicU64::new(1 << HDR_SIZE_SHIFT),
            versions: Default::default(),
            records: Default::default(),
        }
    }

    /// Returns true if the cell lock is currently held.
    #[inline]
    pub fn is_locked(&self) -> bool {
        word_is_locked(self.hdr.load(Ordering::Relaxed))
    }

    /// Returns the number of versions currently stored.
    #[inline]
    pub fn size(&self) -> usize {
        word_size(self.hdr.load(Ordering::Relaxed))
    }

    /// Acquires the cell lock, spinning on contention.
    ///
    /// Hold times are expected to be a single version install or one
    /// validation pass, so a spin is cheaper than parking.
    pub fn lock(&self) {
        let backoff = Backoff::new();
        loop {
            let v = self.hdr.load(Ordering::Relaxed);
            if word_is_locked(v) {
                backoff.snooze();
                continue;
            }
            if self
                .hdr
                .compare_exchange_weak(v, v | HDR_LOCKED_MASK, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            backoff.spin();
        }
    }

    /// Releases the cell lock, bumping the version counter.
    ///
    /// The counter changes on every lock/unlock cycle so optimistic readers
    /// can detect that a writer intervened.
    pub fn unlock(&self) {
        let v = self.hdr.load(Ordering::Relaxed);
        debug_assert!(word_is_locked(v));
        let n = word_counter(v);
        let mut next = v & !HDR_VERSION_MASK;
        next |= ((n + 1) << HDR_VERSION_SHIFT) & HDR_VERSION_MASK;
        next &= !HDR_LOCKED_MASK;
        debug_assert!(!word_is_locked(next));
        self.hdr.store(next, Ordering::Release);
    }

    /// Samples the control word, waiting out any in-progress writer.
    #[inline]
    pub fn stable_version(&self) -> u64 {
        let backoff = Backoff::new();
        loop {
            let v = self.hdr.load(Ordering::Acquire);
            if !word_is_locked(v) {
                return v;
            }
            backoff.snooze();
        }
    }

    /// Returns true iff the control word still equals `v`.
    #[inline]
    pub fn check_version(&self, v: u64) -> bool {
        fence(Ordering::Acquire);
        self.hdr.load(Ordering::Relaxed) == v
    }

    /// Reads the version visible at `t`: the newest pair whose timestamp
    /// is at most `t`.
    ///
    /// Returns `None` if even the oldest retained version exceeds `t` (the
    /// pre-`t` entry has been evicted). Transactions read recent versions
    /// almost always, so this is a linear scan from the tail rather than a
    /// binary search.
    ///
    /// The result must be validated with [`check_version`](Self::check_version)
    /// unless the caller holds the cell lock.
    pub fn record_at<'g>(&self, t: Tid, guard: &'g Guard) -> Option<(Tid, Shared<'g, Value>)> {
        let n = self.size();
        debug_assert!((1..=NVERSIONS).contains(&n));
        for i in (0..n).rev() {
            let start = self.versions[i].load(Ordering::Relaxed);
            if start <= t {
                let record = self.records[i].load(Ordering::Acquire, guard);
                return Some((start, record));
            }
        }
        None
    }

    /// Reads the version visible at `t` under the optimistic protocol.
    ///
    /// Retries until a read passes validation, guaranteeing the returned
    /// `(start timestamp, payload)` pair is not torn by a concurrent
    /// writer. `None` means the history was truncated past `t`.
    pub fn stable_read(&self, t: Tid) -> Option<(Tid, Option<Value>)> {
        let guard = epoch::pin();
        loop {
            let v = self.stable_version();
            let (start, shared) = self.record_at(t, &guard)?;
            // The payload is copied out while pinned: a concurrent eviction
            // defers destruction until every pinned reader is done.
            let record = unsafe { shared.as_ref() }.cloned();
            if self.check_version(v) {
                return Some((start, record));
            }
        }
    }

    /// Returns true iff the newest stored timestamp is at most `t`.
    #[inline]
    pub fn is_latest_version(&self, t: Tid) -> bool {
        let n = self.size();
        debug_assert!((1..=NVERSIONS).contains(&n));
        self.versions[n - 1].load(Ordering::Relaxed) <= t
    }

    /// [`is_latest_version`](Self::is_latest_version) under the optimistic
    /// protocol.
    pub fn stable_is_latest_version(&self, t: Tid) -> bool {
        loop {
            let v = self.stable_version();
            let ret = self.is_latest_version(t);
            if self.check_version(v) {
                return ret;
            }
        }
    }

    /// Is a read taken at `snapshot_tid` still consistent at `commit_tid`?
    ///
    /// Consistent means the version visible at the snapshot is either still
    /// the newest, or its successor was committed strictly after
    /// `commit_tid`. Returns false if the history has been truncated past
    /// the snapshot.
    ///
    /// `commit_tid` never equals a stored version: commit timestamps are
    /// globally unique and the writer holds the cell lock while installing.
    pub fn is_snapshot_consistent(&self, snapshot_tid: Tid, commit_tid: Tid) -> bool {
        let n = self.size();
        debug_assert!((1..=NVERSIONS).contains(&n));

        // Fast path: no write intervened since the snapshot.
        if self.versions[n - 1].load(Ordering::Relaxed) <= snapshot_tid {
            return true;
        }

        for i in (0..n - 1).rev() {
            if self.versions[i].load(Ordering::Relaxed) <= snapshot_tid {
                let next = self.versions[i + 1].load(Ordering::Relaxed);
                debug_assert_ne!(next, commit_tid);
                return next > commit_tid;
            }
        }

        false
    }

    /// [`is_snapshot_consistent`](Self::is_snapshot_consistent) under the
    /// optimistic protocol.
    pub fn stable_is_snapshot_consistent(&self, snapshot_tid: Tid, commit_tid: Tid) -> bool {
        loop {
            let v = self.stable_version();
            let ret = self.is_snapshot_consistent(snapshot_tid, commit_tid);
            if self.check_version(v) {
                return ret;
            }
        }
    }

    /// A single non-blocking attempt at
    /// [`is_snapshot_consistent`](Self::is_snapshot_consistent).
    ///
    /// Returns false without waiting if the cell is locked or mutates
    /// during the check. Commit validation runs while holding its own
    /// write-set locks, and another commit validating in the opposite
    /// direction may be doing the same; waiting out a foreign lock there
    /// can close a cycle, so a cell mid-install simply fails validation
    /// and the caller aborts.
    pub fn try_snapshot_consistent(&self, snapshot_tid: Tid, commit_tid: Tid) -> bool {
        let v = self.hdr.load(Ordering::Acquire);
        if word_is_locked(v) {
            return false;
        }
        let ret = self.is_snapshot_consistent(snapshot_tid, commit_tid);
        ret && self.check_version(v)
    }

    /// Installs a new version at `t`, evicting the oldest if the cell is
    /// full.
    ///
    /// The caller must hold the cell lock and `t` must strictly exceed the
    /// newest stored timestamp. `None` installs a deletion. Ownership of
    /// the record transfers to the cell; an evicted record is handed to the
    /// epoch collector, since in-flight readers may still hold it.
    pub fn write_record_at(&self, t: Tid, record: Option<Value>) {
        debug_assert!(self.is_locked());
        let n = self.size();
        debug_assert!((1..=NVERSIONS).contains(&n));
        debug_assert!(self.versions[n - 1].load(Ordering::Relaxed) < t);

        let guard = epoch::pin();
        let new: Shared<'_, Value> = match record {
            Some(value) => Owned::new(value).into_shared(&guard),
            None => Shared::null(),
        };

        if n == NVERSIONS {
            // Drop the oldest version and shift the rest down.
            let oldest = self.records[0].load(Ordering::Relaxed, &guard);
            if !oldest.is_null() {
                unsafe { guard.defer_destroy(oldest) };
            }
            for i in 0..NVERSIONS - 1 {
                let ts = self.versions[i + 1].load(Ordering::Relaxed);
                self.versions[i].store(ts, Ordering::Relaxed);
                let rec = self.records[i + 1].load(Ordering::Relaxed, &guard);
                self.records[i].store(rec, Ordering::Relaxed);
            }
            self.records[NVERSIONS - 1].store(new, Ordering::Release);
            self.versions[NVERSIONS - 1].store(t, Ordering::Release);
        } else {
            self.records[n].store(new, Ordering::Release);
            self.versions[n].store(t, Ordering::Release);
            self.set_size(n + 1);
        }
    }

    /// Rewrites the size field. The caller must hold the cell lock.
    fn set_size(&self, n: usize) {
        debug_assert!(n <= NVERSIONS);
        let v = self.hdr.load(Ordering::Relaxed);
        debug_assert!(word_is_locked(v));
        let next = (v & !HDR_SIZE_MASK) | ((n as u64) << HDR_SIZE_SHIFT);
        self.hdr.store(next, Ordering::Relaxed);
    }
}

impl Default for VersionedCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VersionedCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.hdr.load(Ordering::Relaxed);
        f.debug_struct("VersionedCell")
            .field("locked", &word_is_locked(v))
            .field("size", &word_size(v))
            .field("counter", &word_counter(v))
            .finish()
    }
}

impl Drop for VersionedCell {
    fn drop(&mut self) {
        // &mut self: no concurrent readers remain, so the slots can be
        // reclaimed immediately.
        let n = self.size();
        for i in 0..n {
            unsafe {
                let shared = self.records[i].load(Ordering::Relaxed, epoch::unprotected());
                if !shared.is_null() {
                    drop(shared.into_owned());
                }
            }
        }
    }
}
