//! Append-only usage ledger.
//!
//! The ledger is the only component that computes a usage total. Totals are
//! always derived from persisted events filtered to the current local day,
//! never from a running counter, so a restart mid-day sees the same number.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{start_of_day, Clock};
use crate::error::Result;

/// Longest window `history` will report; larger requests are clamped.
pub const MAX_HISTORY_DAYS: u32 = 3650;

/// A single recorded slice of device usage. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub source: String,
    pub duration_secs: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Per-day usage total for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub total_secs: u64,
    pub events: usize,
}

/// Persistence for usage events: append and range query, nothing else.
pub trait UsageStore: Send + Sync {
    fn append(&self, event: &UsageEvent) -> Result<i64>;

    /// Events with `recorded_at >= since`, oldest first.
    fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<UsageEvent>>;
}

pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn UsageStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Start of the current accounting period (local midnight).
    pub fn period_start(&self) -> DateTime<Local> {
        start_of_day(self.clock.now())
    }

    pub fn period(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Append a usage event and return the new period total.
    ///
    /// Returns `Ok(None)` when the duration is zero or negative: such a tick
    /// is a caller bug, so it is logged and nothing is stored.
    pub fn record(&self, source: &str, duration_secs: i64) -> Result<Option<u64>> {
        if duration_secs <= 0 {
            warn!(source, duration_secs, "ignoring non-positive usage duration");
            return Ok(None);
        }
        let event = UsageEvent {
            source: source.to_string(),
            duration_secs: duration_secs as u64,
            recorded_at: self.clock.now().with_timezone(&Utc),
        };
        self.store.append(&event)?;
        let total = self.current_total()?;
        debug!(source, duration_secs, total_secs = total, "usage recorded");
        Ok(Some(total))
    }

    /// Sum of durations recorded since the start of the current period.
    pub fn current_total(&self) -> Result<u64> {
        let since = self.period_start().with_timezone(&Utc);
        let events = self.store.events_since(since)?;
        Ok(events
            .iter()
            .fold(0u64, |total, e| total.saturating_add(e.duration_secs)))
    }

    /// Per-day totals for the last `days` local days, oldest first, today
    /// included. Days without usage are reported with a zero total.
    /// `days` is clamped to `1..=MAX_HISTORY_DAYS`.
    pub fn history(&self, days: u32) -> Result<Vec<DailyUsage>> {
        let days = days.clamp(1, MAX_HISTORY_DAYS);
        let today = self.period();
        let first = today - Duration::days(i64::from(days) - 1);
        let since = self.period_start() - Duration::days(i64::from(days) - 1);
        // DST shifts can move local midnight by an hour; widen and bucket by date.
        let events = self
            .store
            .events_since((since - Duration::hours(2)).with_timezone(&Utc))?;

        let mut buckets: BTreeMap<NaiveDate, DailyUsage> = BTreeMap::new();
        let mut date = first;
        while date <= today {
            buckets.insert(
                date,
                DailyUsage {
                    date,
                    total_secs: 0,
                    events: 0,
                },
            );
            date += Duration::days(1);
        }
        for event in events {
            let day = event.recorded_at.with_timezone(&Local).date_naive();
            if let Some(bucket) = buckets.get_mut(&day) {
                bucket.total_secs = bucket.total_secs.saturating_add(event.duration_secs);
                bucket.events += 1;
            }
        }
        Ok(buckets.into_values().collect())
    }
}
