//! Polling scheduler.
//!
//! Two independent loops, each driven by its own [`TickSource`]:
//! - accrual: credit a fixed usage increment and re-evaluate the lock
//! - advisory: refresh the fatigue advisory
//!
//! The loops run as separate tasks, so a slow oracle call only delays the
//! advisory loop. Neither interval is derived from the other.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::clock::deadline_after;
use crate::engine::UsageEngine;

/// Cadence settings for the two loops.
#[derive(Debug, Clone, PartialEq)]
pub struct Cadences {
    pub accrual: Duration,
    /// Usage credited on each accrual tick.
    pub accrual_increment_secs: u64,
    pub advisory: Duration,
    pub usage_source: String,
}

/// Source of ticks for one loop.
#[async_trait]
pub trait TickSource: Send {
    /// Wait for the next tick. `false` means the source is exhausted and
    /// the loop should stop.
    async fn tick(&mut self) -> bool;
}

/// Wall-clock ticks from a tokio interval. Missed ticks are skipped, not
/// bunched up.
pub struct IntervalTicks {
    interval: Interval,
}

impl IntervalTicks {
    /// First tick fires one `period` from now.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(deadline_after(period), period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl TickSource for IntervalTicks {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticks pushed by hand, for deterministic tests and external drivers.
pub struct ManualTicks {
    rx: mpsc::UnboundedReceiver<()>,
}

impl ManualTicks {
    pub fn channel() -> (mpsc::UnboundedSender<()>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl TickSource for ManualTicks {
    async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

pub struct PollingScheduler {
    engine: Arc<UsageEngine>,
    cadences: Cadences,
}

/// Running scheduler. Dropping the handle also stops both loops, but
/// without waiting for them; use `shutdown` to wait.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    accrual: JoinHandle<()>,
    advisory: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop both loops and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (name, task) in [("accrual", self.accrual), ("advisory", self.advisory)] {
            if let Err(e) = task.await {
                error!(loop_name = name, error = %e, "scheduler loop panicked");
            }
        }
    }
}

impl PollingScheduler {
    pub fn new(engine: Arc<UsageEngine>, cadences: Cadences) -> Self {
        Self { engine, cadences }
    }

    /// Run both loops on wall-clock intervals.
    pub fn spawn(self) -> SchedulerHandle {
        let accrual = IntervalTicks::new(self.cadences.accrual);
        let advisory = IntervalTicks::new(self.cadences.advisory);
        self.spawn_with(accrual, advisory)
    }

    /// Run both loops on caller-supplied tick sources.
    pub fn spawn_with<A, B>(self, accrual_ticks: A, advisory_ticks: B) -> SchedulerHandle
    where
        A: TickSource + 'static,
        B: TickSource + 'static,
    {
        let (shutdown, rx) = watch::channel(false);
        info!(
            accrual_secs = self.cadences.accrual.as_secs(),
            advisory_secs = self.cadences.advisory.as_secs(),
            "starting polling scheduler"
        );

        let accrual = tokio::spawn(accrual_loop(
            self.engine.clone(),
            self.cadences.clone(),
            accrual_ticks,
            rx.clone(),
        ));
        let advisory = tokio::spawn(advisory_loop(self.engine, advisory_ticks, rx));

        SchedulerHandle {
            shutdown,
            accrual,
            advisory,
        }
    }
}

async fn accrual_loop<T: TickSource>(
    engine: Arc<UsageEngine>,
    cadences: Cadences,
    mut ticks: T,
    mut shutdown: watch::Receiver<bool>,
) {
    let increment = i64::try_from(cadences.accrual_increment_secs).unwrap_or(i64::MAX);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            more = ticks.tick() => {
                if !more {
                    break;
                }
                match engine.record_usage(&cadences.usage_source, increment) {
                    Ok(accrual) => debug!(
                        total_secs = accrual.total_secs,
                        lock_state = ?accrual.lock_state,
                        "accrual tick"
                    ),
                    // Skipping a tick is harmless; the next one retries.
                    Err(e) => error!(error = %e, "accrual tick failed"),
                }
            }
        }
    }
    debug!("accrual loop stopped");
}

async fn advisory_loop<T: TickSource>(
    engine: Arc<UsageEngine>,
    mut ticks: T,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            more = ticks.tick() => {
                if !more {
                    break;
                }
                let result = engine.refresh_advisory().await;
                debug!(score = result.score, origin = ?result.origin, "advisory tick");
            }
        }
    }
    debug!("advisory loop stopped");
}
