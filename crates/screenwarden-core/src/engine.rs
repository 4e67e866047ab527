//! The usage accounting and lockout engine.
//!
//! One `UsageEngine` owns all mutable state for one user profile: the ledger
//! and lockout machine (behind a single mutex so accrual and lock evaluation
//! are atomic), the advisory client and the emergency dispatcher. Nothing is
//! global; tests build as many independent engines as they like.
//!
//! The lockout machine lives in a [`LockoutStore`]. Every operation that
//! touches the lock first reloads it from the store and writes it back only
//! when a transition happens, so several engines over the same store (for
//! example a daemon and a one-shot command) never undo each other's changes.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = UsageEngine::from_config(&config, EngineStores::shared(db), Arc::new(SystemClock));
//! engine.record_usage("device", 30)?;
//! if engine.lock_state()? == LockState::Locked { /* show lock screen */ }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::warn;

use crate::advisory::{
    AdvisoryClient, AdvisoryContext, AdvisoryOracle, AdvisoryResult, DisabledOracle, HttpOracle,
};
use crate::clock::Clock;
use crate::emergency::{
    EmergencyDispatcher, IncidentOutcome, LogNotifier, Notifier, WebhookNotifier,
};
use crate::error::Result;
use crate::events::Event;
use crate::ledger::{DailyUsage, UsageLedger, UsageStore};
use crate::lockout::{LockPolicy, LockState, LockoutMachine, LockoutStore};
use crate::profile::{GuardianStore, ProfileStore, RoutineStore};
use crate::storage::config::{ChannelKind, Config};

const EVENT_CAPACITY: usize = 256;

/// Collaborator stores the engine reads from.
#[derive(Clone)]
pub struct EngineStores {
    pub usage: Arc<dyn UsageStore>,
    pub profile: Arc<dyn ProfileStore>,
    pub guardians: Arc<dyn GuardianStore>,
    pub routine: Arc<dyn RoutineStore>,
    pub lockout: Arc<dyn LockoutStore>,
}

impl EngineStores {
    /// Use one backing store for every collaborator.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: UsageStore + ProfileStore + GuardianStore + RoutineStore + LockoutStore + 'static,
    {
        Self {
            usage: store.clone(),
            profile: store.clone(),
            guardians: store.clone(),
            routine: store.clone(),
            lockout: store,
        }
    }
}

/// Result of one `record_usage` call.
#[derive(Debug, Clone)]
pub struct Accrual {
    /// False when the duration was rejected and nothing was stored.
    pub applied: bool,
    pub total_secs: u64,
    pub lock_state: LockState,
    pub events: Vec<Event>,
}

struct Accounting {
    ledger: UsageLedger,
    lockout: LockoutMachine,
    store: Arc<dyn LockoutStore>,
}

impl Accounting {
    /// Pick up changes other engines saved, keeping our policy.
    fn reload(&mut self) -> Result<()> {
        if let Some(mut machine) = self.store.load_lockout()? {
            machine.set_policy(self.lockout.policy());
            self.lockout = machine;
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        self.store.save_lockout(&self.lockout)
    }

    /// Reload, then apply the rollover rule and persist if it fired.
    fn settle(&mut self, now: DateTime<Utc>) -> Result<Option<Event>> {
        self.reload()?;
        let period = self.ledger.period();
        let rolled = self.lockout.rollover(period, now);
        if rolled.is_some() {
            self.save()?;
        }
        Ok(rolled)
    }
}

pub struct UsageEngine {
    clock: Arc<dyn Clock>,
    accounting: Mutex<Accounting>,
    profile: Arc<dyn ProfileStore>,
    guardians: Arc<dyn GuardianStore>,
    routine: Arc<dyn RoutineStore>,
    advisory: AdvisoryClient,
    emergency: EmergencyDispatcher,
    events: broadcast::Sender<Event>,
}

impl UsageEngine {
    pub fn new(
        stores: EngineStores,
        advisory: AdvisoryClient,
        emergency: EmergencyDispatcher,
        policy: LockPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            accounting: Mutex::new(Accounting {
                ledger: UsageLedger::new(stores.usage, clock.clone()),
                lockout: LockoutMachine::new(policy),
                store: stores.lockout,
            }),
            advisory: advisory.with_clock(clock.clone()),
            emergency: emergency.with_clock(clock.clone()),
            clock,
            profile: stores.profile,
            guardians: stores.guardians,
            routine: stores.routine,
            events,
        }
    }

    /// Wire the oracle and notification channel described by `config`.
    pub fn from_config(config: &Config, stores: EngineStores, clock: Arc<dyn Clock>) -> Self {
        let oracle: Arc<dyn AdvisoryOracle> = if config.advisory.enabled {
            Arc::new(HttpOracle::from_config(&config.advisory))
        } else {
            Arc::new(DisabledOracle)
        };
        let notifier: Arc<dyn Notifier> = match config.emergency.channel {
            ChannelKind::Log => Arc::new(LogNotifier),
            ChannelKind::Webhook => Arc::new(WebhookNotifier::new(&config.emergency.webhook_url)),
        };
        Self::new(
            stores,
            AdvisoryClient::new(
                oracle,
                Duration::from_secs(config.advisory.timeout_secs),
                &config.advisory.fallback_recommendation,
            ),
            EmergencyDispatcher::new(notifier, Duration::from_secs(config.emergency.timeout_secs)),
            config.lock_policy(),
            clock,
        )
    }

    fn accounting(&self) -> MutexGuard<'_, Accounting> {
        self.accounting.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.clock.now_utc()
    }

    fn publish(&self, event: &Event) {
        // No subscribers is fine.
        let _ = self.events.send(event.clone());
    }

    /// Receive every event the engine produces from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    // ── Usage & lockout ──────────────────────────────────────────────

    /// Append usage and re-evaluate the lock, atomically.
    ///
    /// Non-positive durations are logged and ignored; the lock is not
    /// re-evaluated for them.
    pub fn record_usage(&self, source: &str, duration_secs: i64) -> Result<Accrual> {
        let limit_secs = self.profile.get()?.limit_secs();
        let mut acc = self.accounting();
        let mut events = Vec::new();

        let now = self.now_utc();
        let period = acc.ledger.period();
        if let Some(event) = acc.settle(now)? {
            events.push(event);
        }

        let applied = acc.ledger.record(source, duration_secs)?;
        let total_secs = match applied {
            Some(total) => {
                events.push(Event::UsageRecorded {
                    source: source.to_string(),
                    duration_secs: duration_secs as u64,
                    total_secs: total,
                    at: now,
                });
                if let Some(event) = acc.lockout.evaluate(total, limit_secs, period, now) {
                    acc.save()?;
                    events.push(event);
                }
                total
            }
            None => acc.ledger.current_total()?,
        };
        let lock_state = acc.lockout.state();
        drop(acc);

        for event in &events {
            self.publish(event);
        }
        Ok(Accrual {
            applied: applied.is_some(),
            total_secs,
            lock_state,
            events,
        })
    }

    /// Current period total, straight from the ledger.
    pub fn current_total(&self) -> Result<u64> {
        self.accounting().ledger.current_total()
    }

    pub fn history(&self, days: u32) -> Result<Vec<DailyUsage>> {
        self.accounting().ledger.history(days)
    }

    pub fn lock_state(&self) -> Result<LockState> {
        let mut acc = self.accounting();
        let rolled = acc.settle(self.now_utc())?;
        let state = acc.lockout.state();
        drop(acc);
        if let Some(event) = rolled {
            self.publish(&event);
        }
        Ok(state)
    }

    /// Explicit override. Returns the transition event, or `None` when the
    /// engine was not locked.
    pub fn request_unlock(&self) -> Result<Option<Event>> {
        let at = self.now_utc();
        let mut acc = self.accounting();
        acc.reload()?;
        let event = acc.lockout.request_unlock(at);
        if event.is_some() {
            acc.save()?;
        }
        drop(acc);
        if let Some(ev) = &event {
            self.publish(ev);
        }
        Ok(event)
    }

    /// Current lockout machine, as last saved by any engine on this store.
    pub fn lockout(&self) -> Result<LockoutMachine> {
        let mut acc = self.accounting();
        acc.reload()?;
        Ok(acc.lockout.clone())
    }

    // ── Advisory ─────────────────────────────────────────────────────

    /// Refresh the fatigue advisory. Never fails; see [`AdvisoryClient`].
    ///
    /// The accounting lock is only held to snapshot the total, never across
    /// the oracle call.
    pub async fn refresh_advisory(&self) -> AdvisoryResult {
        let ctx = match self.advisory_context() {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(error = %e, "could not build advisory context");
                return self.advisory.latest();
            }
        };
        let result = self.advisory.refresh(&ctx).await;
        self.publish(&Event::AdvisoryRefreshed {
            score: result.score,
            origin: result.origin,
            at: result.at,
        });
        result
    }

    pub fn latest_advisory(&self) -> AdvisoryResult {
        self.advisory.latest()
    }

    /// Restore a persisted advisory as the last good result.
    pub fn restore_advisory(&self, result: AdvisoryResult) {
        self.advisory.remember(result);
    }

    fn advisory_context(&self) -> Result<AdvisoryContext> {
        let usage_secs = self.current_total()?;
        let profile = self.profile.get()?;
        let routine = self.routine.list().unwrap_or_else(|e| {
            warn!(error = %e, "routine unavailable for advisory context");
            Vec::new()
        });
        Ok(AdvisoryContext {
            usage_secs,
            limit_min: profile.daily_limit_min,
            now: self.clock.now(),
            role: profile.role,
            routine,
        })
    }

    // ── Emergency ────────────────────────────────────────────────────

    /// Notify every registered guardian, unless an incident is already in
    /// progress. Lock state is neither read nor changed.
    pub async fn trigger_emergency(&self) -> Result<IncidentOutcome> {
        let guardians = self.guardians.list()?;
        let user = self.profile.get()?.display_name;
        let outcome = self.emergency.trigger(&guardians, &user).await;
        let event = match &outcome {
            IncidentOutcome::Dispatched(report) => Event::EmergencyDispatched {
                incident_id: report.incident_id.clone(),
                notified: report.notified().len(),
                failed: report.not_notified().len(),
                at: report.finished_at,
            },
            IncidentOutcome::AlreadyActive => Event::EmergencySuppressed {
                at: self.now_utc(),
            },
        };
        self.publish(&event);
        Ok(outcome)
    }

    pub fn emergency_active(&self) -> bool {
        self.emergency.is_active()
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Result<Event> {
        let limit_secs = self.profile.get()?.limit_secs();
        let lock_state = self.lock_state()?;
        let used_secs = self.current_total()?;
        let advisory = self.advisory.latest();
        let usage_pct = if limit_secs == 0 {
            0.0
        } else {
            used_secs as f64 / limit_secs as f64 * 100.0
        };
        Ok(Event::StateSnapshot {
            lock_state,
            used_secs,
            limit_secs,
            remaining_secs: limit_secs.saturating_sub(used_secs),
            usage_pct,
            advisory_score: advisory.score,
            recommendation: advisory.recommendation,
            at: self.now_utc(),
        })
    }
}
