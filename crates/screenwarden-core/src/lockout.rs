//! Lockout state machine.
//!
//! ## State Transitions
//!
//! ```text
//! Unlocked --(period total > limit)--> Locked
//! Locked   --(request_unlock)--------> Unlocked
//! Locked   --(new period, only with clear_on_rollover)--> Unlocked
//! ```
//!
//! The machine never reads a usage total on its own; callers pass in the
//! ledger's period total. Nothing but an explicit override clears `Locked`
//! unless the rollover rule is switched on in [`LockPolicy`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    #[default]
    Unlocked,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockReason {
    /// Explicit user or guardian override.
    Override,
    /// A new accounting period began and the rollover rule is enabled.
    Rollover,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPolicy {
    /// Clear `Locked` automatically once a new accounting period starts.
    #[serde(default)]
    pub clear_on_rollover: bool,
}

/// Durable home of the lockout machine.
///
/// Every process that reads or changes the lock goes through the same
/// store, so an override made by one process is seen by the others.
pub trait LockoutStore: Send + Sync {
    /// `None` until a machine has been saved.
    fn load_lockout(&self) -> Result<Option<LockoutMachine>>;
    fn save_lockout(&self, machine: &LockoutMachine) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockoutMachine {
    state: LockState,
    /// Accounting period in which the current lock was applied.
    #[serde(default)]
    locked_period: Option<NaiveDate>,
    #[serde(default)]
    locked_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    policy: LockPolicy,
}

impl LockoutMachine {
    pub fn new(policy: LockPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state == LockState::Locked
    }

    pub fn locked_at(&self) -> Option<DateTime<Utc>> {
        self.locked_at
    }

    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    /// Replace the policy; used after restoring a persisted machine.
    pub fn set_policy(&mut self, policy: LockPolicy) {
        self.policy = policy;
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Lock when `total_secs` strictly exceeds `limit_secs`.
    ///
    /// Re-evaluating while already locked is a no-op.
    pub fn evaluate(
        &mut self,
        total_secs: u64,
        limit_secs: u64,
        period: NaiveDate,
        at: DateTime<Utc>,
    ) -> Option<Event> {
        if self.state == LockState::Locked || total_secs <= limit_secs {
            return None;
        }
        self.state = LockState::Locked;
        self.locked_period = Some(period);
        self.locked_at = Some(at);
        info!(total_secs, limit_secs, %period, "daily limit exceeded, locking");
        Some(Event::Locked {
            total_secs,
            limit_secs,
            at,
        })
    }

    /// Explicit override. Returns `None` when already unlocked.
    pub fn request_unlock(&mut self, at: DateTime<Utc>) -> Option<Event> {
        if self.state == LockState::Unlocked {
            return None;
        }
        self.clear();
        info!("lock cleared by override");
        Some(Event::Unlocked {
            reason: UnlockReason::Override,
            at,
        })
    }

    /// Apply the rollover rule for `period`. A no-op unless the policy
    /// enables it and the lock was applied in an earlier period.
    pub fn rollover(&mut self, period: NaiveDate, at: DateTime<Utc>) -> Option<Event> {
        if !self.policy.clear_on_rollover || self.state != LockState::Locked {
            return None;
        }
        match self.locked_period {
            Some(locked) if locked < period => {
                self.clear();
                info!(%locked, %period, "new accounting period, lock cleared by rollover rule");
                Some(Event::Unlocked {
                    reason: UnlockReason::Rollover,
                    at,
                })
            }
            _ => None,
        }
    }

    fn clear(&mut self) {
        self.state = LockState::Unlocked;
        self.locked_period = None;
        self.locked_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    #[test]
    fn locks_only_above_limit() {
        let mut m = LockoutMachine::default();
        assert!(m.evaluate(60, 60, day(1), Utc::now()).is_none());
        assert_eq!(m.state(), LockState::Unlocked);
        assert!(m.evaluate(61, 60, day(1), Utc::now()).is_some());
        assert_eq!(m.state(), LockState::Locked);
    }

    #[test]
    fn evaluate_while_locked_is_noop() {
        let mut m = LockoutMachine::default();
        m.evaluate(100, 60, day(1), Utc::now());
        let first = m.locked_at();
        assert!(m.evaluate(500, 60, day(1), Utc::now()).is_none());
        assert_eq!(m.locked_at(), first);
    }

    #[test]
    fn unlock_only_from_locked() {
        let mut m = LockoutMachine::default();
        assert!(m.request_unlock(Utc::now()).is_none());
        m.evaluate(100, 60, day(1), Utc::now());
        match m.request_unlock(Utc::now()) {
            Some(Event::Unlocked { reason, .. }) => assert_eq!(reason, UnlockReason::Override),
            other => panic!("expected Unlocked, got {other:?}"),
        }
        assert_eq!(m.state(), LockState::Unlocked);
    }

    #[test]
    fn rollover_does_not_unlock_by_default() {
        let mut m = LockoutMachine::default();
        m.evaluate(100, 60, day(1), Utc::now());
        assert!(m.rollover(day(2), Utc::now()).is_none());
        assert!(m.is_locked());
    }

    #[test]
    fn rollover_rule_clears_lock_from_earlier_period() {
        let mut m = LockoutMachine::new(LockPolicy {
            clear_on_rollover: true,
        });
        m.evaluate(100, 60, day(1), Utc::now());
        assert!(m.rollover(day(1), Utc::now()).is_none());
        assert!(m.rollover(day(2), Utc::now()).is_some());
        assert!(!m.is_locked());
    }

    #[test]
    fn persisted_machine_keeps_state_but_not_policy() {
        let mut m = LockoutMachine::new(LockPolicy {
            clear_on_rollover: true,
        });
        m.evaluate(100, 60, day(1), Utc::now());
        let json = serde_json::to_string(&m).unwrap();
        let restored: LockoutMachine = serde_json::from_str(&json).unwrap();
        assert!(restored.is_locked());
        assert_eq!(restored.policy(), LockPolicy::default());
    }
}
