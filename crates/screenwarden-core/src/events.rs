use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::advisory::AdvisoryOrigin;
use crate::lockout::{LockState, UnlockReason};

/// Every state change in the engine produces an Event.
/// The CLI prints them as JSON, one per line under `run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    UsageRecorded {
        source: String,
        duration_secs: u64,
        total_secs: u64,
        at: DateTime<Utc>,
    },
    Locked {
        total_secs: u64,
        limit_secs: u64,
        at: DateTime<Utc>,
    },
    Unlocked {
        reason: UnlockReason,
        at: DateTime<Utc>,
    },
    AdvisoryRefreshed {
        score: u8,
        origin: AdvisoryOrigin,
        at: DateTime<Utc>,
    },
    /// A notification pass finished (or hit its deadline).
    EmergencyDispatched {
        incident_id: String,
        notified: usize,
        failed: usize,
        at: DateTime<Utc>,
    },
    /// A trigger arrived while another incident was still active.
    EmergencySuppressed {
        at: DateTime<Utc>,
    },
    StateSnapshot {
        lock_state: LockState,
        used_secs: u64,
        limit_secs: u64,
        remaining_secs: u64,
        usage_pct: f64,
        advisory_score: u8,
        recommendation: String,
        at: DateTime<Utc>,
    },
}
