//! Fatigue advisory: a periodic score and recommendation from an external
//! oracle.
//!
//! The advisory is display-only. It never feeds the lockout decision, and
//! oracle failures never surface as errors: the client falls back to the
//! last good result or a neutral default.

mod client;
mod oracle;
mod prompt;

pub use client::{parse_response, AdvisoryClient};
pub use oracle::{AdvisoryOracle, DisabledOracle, HttpOracle};
pub use prompt::build_prompt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::profile::{Role, RoutineItem};

/// Score used whenever the oracle gives no usable number.
pub const BASELINE_SCORE: u8 = 0;

pub const DEFAULT_RECOMMENDATION: &str =
    "No advisory available right now. Take a short break away from the screen every hour.";

/// Where an [`AdvisoryResult`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryOrigin {
    /// Fresh, validated oracle answer.
    Oracle,
    /// Oracle failed; previous good answer reused.
    LastKnown,
    /// Oracle failed and nothing good was seen yet.
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryResult {
    /// Always within 0..=100.
    pub score: u8,
    pub recommendation: String,
    pub origin: AdvisoryOrigin,
    pub at: DateTime<Utc>,
}

impl AdvisoryResult {
    pub fn neutral(recommendation: &str, at: DateTime<Utc>) -> Self {
        Self {
            score: BASELINE_SCORE,
            recommendation: recommendation.to_string(),
            origin: AdvisoryOrigin::Default,
            at,
        }
    }
}

/// Snapshot handed to the oracle prompt.
#[derive(Debug, Clone)]
pub struct AdvisoryContext {
    pub usage_secs: u64,
    pub limit_min: u32,
    pub now: DateTime<Local>,
    pub role: Role,
    /// Ordered by scheduled time.
    pub routine: Vec<RoutineItem>,
}

impl AdvisoryContext {
    pub fn minutes_used(&self) -> u64 {
        self.usage_secs / 60
    }
}
