// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-account, per-UTC-day spend counters.
//!
//! Counters live only in memory and reset on restart. Entries older than
//! the retention window are pruned on a timer and whenever a new day key is
//! inserted, so the map holds at most `accounts × retention_days` entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::primitives::U256;
use chrono::{Days, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;

/// Default number of UTC days kept (today and yesterday).
pub const DEFAULT_RETENTION_DAYS: u32 = 2;

/// How often the background pruner runs.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

type Counters = HashMap<(String, NaiveDate), U256>;

/// Cumulative base units moved per account per UTC day.
pub struct SpendLimiter {
    counters: Mutex<Counters>,
    retention_days: u32,
}

impl SpendLimiter {
    pub fn new(retention_days: u32) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            retention_days: retention_days.max(1),
        }
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        // Counters stay consistent even if a holder panicked mid-update.
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add `amount` to today's counter. Returns the new total.
    pub fn record_spend(&self, account: &str, amount: U256) -> U256 {
        self.record_spend_on(account, today(), amount)
    }

    /// Today's counter, zero if absent.
    pub fn current_spend(&self, account: &str) -> U256 {
        self.current_spend_on(account, today())
    }

    pub fn record_spend_on(&self, account: &str, day: NaiveDate, amount: U256) -> U256 {
        let mut counters = self.counters();
        let key = (account.to_string(), day);
        if !counters.contains_key(&key) {
            prune_locked(&mut counters, cutoff(day, self.retention_days));
        }
        let total = counters.entry(key).or_insert(U256::ZERO);
        *total = total.saturating_add(amount);
        *total
    }

    pub fn current_spend_on(&self, account: &str, day: NaiveDate) -> U256 {
        self.counters()
            .get(&(account.to_string(), day))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Whether spending `amount` now would push today's total past `limit`.
    pub fn would_exceed(&self, account: &str, amount: U256, limit: U256) -> bool {
        self.current_spend(account).saturating_add(amount) > limit
    }

    /// Drop entries older than the retention window ending at `today`.
    /// Returns how many were removed.
    pub fn prune(&self, today: NaiveDate) -> usize {
        prune_locked(&mut self.counters(), cutoff(today, self.retention_days))
    }

    /// Number of live counters.
    pub fn len(&self) -> usize {
        self.counters().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prune periodically until the token is cancelled.
    ///
    /// ```rust,ignore
    /// tokio::spawn(limiter.clone().run_pruner(shutdown.clone()));
    /// ```
    pub async fn run_pruner(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.prune(today());
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.len(), "pruned spend counters");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Spend pruner shutting down");
                    return;
                }
            }
        }
    }
}

impl Default for SpendLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DAYS)
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Oldest day still retained.
fn cutoff(today: NaiveDate, retention_days: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(retention_days.saturating_sub(1))))
        .unwrap_or(NaiveDate::MIN)
}

fn prune_locked(counters: &mut Counters, oldest_kept: NaiveDate) -> usize {
    let before = counters.len();
    counters.retain(|(_, day), _| *day >= oldest_kept);
    before - counters.len()
}
