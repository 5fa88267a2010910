// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Snapshot-isolated optimistic transactions over an ordered index.
//!
//! This module provides multi-version optimistic concurrency control with:
//! - Snapshot reads against per-key version history, never blocking writers
//! - Write buffering with all conflict detection deferred to commit
//! - Phantom detection for scanned-empty ranges (predicate validation)
//!
//! # Key Concepts
//!
//! ## Optimistic validation
//!
//! Transactions never lock anything while running. Reads record what they
//! observed; scans additionally record the ranges they observed empty.
//! Commit locks the write set (ascending key order, the sole
//! deadlock-avoidance rule), draws a commit timestamp, and revalidates
//! every observation against the versions committed in between. A
//! transaction whose reads no longer hold aborts and surfaces
//! [`TxnError::StaleRead`] or [`TxnError::Phantom`]; the caller retries by
//! re-running it on a fresh snapshot.
//!
//! ## Version history
//!
//! Each key's cell retains up to 15 committed versions, so readers with
//! slightly stale snapshots still resolve. A snapshot older than the
//! oldest retained version reads as not-found and cannot commit a
//! transaction that depended on it.
//!
//! # Example
//!
//! ```
//! use rubidiumdb::storage::{Key, Value};
//! use rubidiumdb::txn::OccTxnManager;
//!
//! let mgr = OccTxnManager::new();
//!
//! let mut txn = mgr.begin();
//! txn.put(Key::from("counter"), Value::from("1"))?;
//! txn.commit()?;
//!
//! let mut txn = mgr.begin();
//! let value = txn.get(&Key::from("counter"))?;
//! assert_eq!(value, Some(Value::from("1")));
//! txn.commit()?;
//! # Ok::<(), rubidiumdb::txn::TxnError>(())
//! ```

mod commit;
mod error;
mod manager;
mod range;
mod transaction;

pub use error::TxnError;
pub use manager::OccTxnManager;
pub use range::{AbsentRangeSet, KeyRange};
pub use transaction::{Transaction, TxnState};
