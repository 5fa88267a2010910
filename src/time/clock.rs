// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The global transaction clock.

use std::sync::atomic::{AtomicU64, Ordering};

/// A transaction timestamp.
///
/// Timestamps are totally ordered and produced only by [`GlobalClock`];
/// they are strictly increasing across successful commits.
pub type Tid = u64;

/// The reserved "never written" timestamp.
///
/// Every freshly allocated cell carries one deleted entry at `MIN_TID`, so
/// a key that has never been committed reads as absent at any snapshot.
pub const MIN_TID: Tid = 0;

/// Process-wide monotonic counter issuing transaction timestamps.
///
/// Snapshot timestamps come from [`peek`](GlobalClock::peek); commit
/// timestamps come exclusively from
/// [`increment_and_fetch`](GlobalClock::increment_and_fetch). The counter
/// starts at [`MIN_TID`], so the first commit observes `MIN_TID + 1`.
#[derive(Debug)]
pub struct GlobalClock {
    tid: AtomicU64,
}

impl GlobalClock {
    /// Creates a clock starting at [`MIN_TID`].
    pub fn new() -> Self {
        Self {
            tid: AtomicU64::new(MIN_TID),
        }
    }

    /// Returns the current timestamp without advancing the clock.
    #[inline]
    pub fn peek(&self) -> Tid {
        self.tid.load(Ordering::SeqCst)
    }

    /// Atomically advances the clock by one and returns the new value.
    #[inline]
    pub fn increment_and_fetch(&self) -> Tid {
        self.tid.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for GlobalClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_at_min_tid() {
        let clock = GlobalClock::new();
        assert_eq!(clock.peek(), MIN_TID);
    }

    #[test]
    fn test_first_commit_tid() {
        let clock = GlobalClock::new();
        assert_eq!(clock.increment_and_fetch(), MIN_TID + 1);
        assert_eq!(clock.peek(), MIN_TID + 1);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let clock = GlobalClock::new();
        clock.increment_and_fetch();
        assert_eq!(clock.peek(), clock.peek());
    }

    #[test]
    fn test_increment_is_strictly_increasing() {
        let clock = GlobalClock::new();
        let mut prev = clock.peek();
        for _ in 0..100 {
            let next = clock.increment_and_fetch();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_concurrent_increments_are_unique() {
        let clock = Arc::new(GlobalClock::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let clock = Arc::clone(&clock);
            handles.push(std::thread::spawn(move || {
                (0..1000).map(|_| clock.increment_and_fetch()).collect::<Vec<_>>()
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            for tid in handle.join().unwrap() {
                assert!(seen.insert(tid), "duplicate tid {tid}");
            }
        }
        assert_eq!(clock.peek(), 8000);
    }
}
