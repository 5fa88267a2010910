// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction timestamps and the global clock that issues them.
//!
//! Every transaction samples the clock once at begin
//! ([`GlobalClock::peek`]) to fix its snapshot, and every commit draws a
//! fresh timestamp ([`GlobalClock::increment_and_fetch`]), so commit
//! timestamps are strictly increasing in the order they are issued. That
//! order is the linearization order of committed transactions.

mod clock;

pub use clock::{GlobalClock, Tid, MIN_TID};
