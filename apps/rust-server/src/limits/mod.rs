// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory limiters: daily spend counters and per-client request rates.

pub mod rate;
pub mod spend;

pub use rate::{RateDecision, RateLimiter};
pub use spend::SpendLimiter;
