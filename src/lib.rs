// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! RubidiumDB: an in-memory multi-version optimistic concurrency control (OCC) transaction layer over an ordered key/value index
//!
//! This crate provides snapshot-isolated read/write transactions over
//! byte-string keys, with conflicts (stale reads and phantoms) detected at
//! commit time against the committed serialization order.

pub mod storage;
pub mod time;
pub mod txn;

pub use storage::{BTreeIndex, Key, OrderedIndex, Value, VersionedCell, NVERSIONS};
pub use time::{GlobalClock, Tid, MIN_TID};
pub use txn::{AbsentRangeSet, KeyRange, OccTxnManager, Transaction, TxnError, TxnState};
