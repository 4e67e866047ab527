//! Injectable time sources.
//!
//! Every component that needs "now" asks a [`Clock`] instead of calling
//! `Local::now()` directly, so tests can move time across period boundaries
//! deterministically.

use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};

/// Stand-in for "never" when a deadline would overflow `Instant`.
const FAR_FUTURE: StdDuration = StdDuration::from_secs(86_400 * 365 * 30);

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    /// Local calendar day of `now()`; this is the accounting period key.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Clock pinned to a local wall time on the given day.
    ///
    /// Falls back to the system clock's current instant if the local time
    /// does not exist on that day (DST gap).
    pub fn at(date: NaiveDate, hour: u32, minute: u32) -> Self {
        let start = date
            .and_hms_opt(hour, minute, 0)
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
            .unwrap_or_else(Local::now);
        Self::new(start)
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Local>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Tokio deadline `after` from now. Durations too large for `Instant`
/// saturate to roughly thirty years out.
pub fn deadline_after(after: StdDuration) -> tokio::time::Instant {
    let now = tokio::time::Instant::now();
    now.checked_add(after).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Start of the local calendar day containing `at`.
///
/// Midnight can be skipped by a DST transition in some zones; in that case
/// the first valid instant of the day is used.
pub fn start_of_day(at: DateTime<Local>) -> DateTime<Local> {
    let date = at.date_naive();
    let mut candidate = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    for _ in 0..4 {
        if let Some(start) = Local.from_local_datetime(&candidate).earliest() {
            return start;
        }
        candidate += Duration::minutes(30);
    }
    at
}
