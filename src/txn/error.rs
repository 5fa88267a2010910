// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction error types.

use crate::storage::Key;

/// Errors that can occur in transaction operations.
///
/// The only recoverable runtime error is commit-time conflict
/// ([`StaleRead`](TxnError::StaleRead) or [`Phantom`](TxnError::Phantom)),
/// after which the transaction is aborted and the caller may retry with a
/// fresh snapshot. Everything else in the core is an invariant and a
/// violation is a programming bug, not an error value.
#[derive(Debug, thiserror::Error)]
pub enum TxnError {
    #[error("commit conflict: read of key {key:?} is no longer consistent")]
    StaleRead { key: Key },

    #[error("commit conflict: phantom key {key:?} appeared in a scanned empty range")]
    Phantom { key: Key },

    #[error("transaction already resolved")]
    AlreadyResolved,
}

impl TxnError {
    /// Returns true if this is a commit-time conflict, the retriable case.
    #[inline]
    pub fn is_conflict(&self) -> bool {
        matches!(self, TxnError::StaleRead { .. } | TxnError::Phantom { .. })
    }
}
