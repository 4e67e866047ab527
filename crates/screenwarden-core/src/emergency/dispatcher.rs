use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::notifier::{EmergencyAlert, Notifier};
use crate::clock::{deadline_after, Clock, SystemClock};
use crate::error::NotifyError;
use crate::profile::Guardian;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Notified,
    Failed { reason: String },
    /// The incident deadline passed before this guardian was reached.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardianDelivery {
    pub guardian: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

/// Partial-failure summary of one notification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub incident_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub deliveries: Vec<GuardianDelivery>,
}

impl IncidentReport {
    pub fn notified(&self) -> Vec<&str> {
        self.names_where(|s| matches!(s, DeliveryStatus::Notified))
    }

    pub fn not_notified(&self) -> Vec<&str> {
        self.names_where(|s| !matches!(s, DeliveryStatus::Notified))
    }

    pub fn all_notified(&self) -> bool {
        self.deliveries
            .iter()
            .all(|d| d.status == DeliveryStatus::Notified)
    }

    fn names_where(&self, pred: impl Fn(&DeliveryStatus) -> bool) -> Vec<&str> {
        self.deliveries
            .iter()
            .filter(|d| pred(&d.status))
            .map(|d| d.guardian.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IncidentOutcome {
    Dispatched(IncidentReport),
    /// Another incident was still active; nothing was sent.
    AlreadyActive,
}

/// Sends one notification pass per incident and refuses overlapping
/// incidents.
///
/// The `active` flag is the only guard. It is cleared when the pass ends,
/// when the deadline elapses, or when the dispatching future is dropped.
pub struct EmergencyDispatcher {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    active: AtomicBool,
    clock: Arc<dyn Clock>,
}

struct ActiveIncident<'a>(&'a AtomicBool);

impl Drop for ActiveIncident<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EmergencyDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self {
            notifier,
            timeout,
            active: AtomicBool::new(false),
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamp reports with `clock` instead of the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub async fn trigger(&self, guardians: &[Guardian], user_name: &str) -> IncidentOutcome {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("emergency already in progress, ignoring trigger");
            return IncidentOutcome::AlreadyActive;
        }
        let _guard = ActiveIncident(&self.active);

        let started_at = self.clock.now_utc();
        let alert = EmergencyAlert {
            incident_id: uuid::Uuid::new_v4().to_string(),
            user_name: user_name.to_string(),
            message: format!("{user_name} raised an emergency alert and needs to be contacted."),
            raised_at: started_at,
        };
        if guardians.is_empty() {
            warn!(incident_id = %alert.incident_id, "emergency raised with no guardians registered");
        }

        let deadline = deadline_after(self.timeout);
        let mut deliveries = Vec::with_capacity(guardians.len());
        for guardian in guardians {
            let status =
                match tokio::time::timeout_at(deadline, self.notifier.notify(guardian, &alert))
                    .await
                {
                    Ok(Ok(())) => DeliveryStatus::Notified,
                    Ok(Err(NotifyError::TimedOut)) | Err(_) => DeliveryStatus::TimedOut,
                    Ok(Err(e)) => DeliveryStatus::Failed {
                        reason: e.to_string(),
                    },
                };
            if status != DeliveryStatus::Notified {
                warn!(guardian = %guardian.name, ?status, "guardian not notified");
            }
            deliveries.push(GuardianDelivery {
                guardian: guardian.name.clone(),
                status,
            });
        }

        let report = IncidentReport {
            incident_id: alert.incident_id,
            started_at,
            finished_at: self.clock.now_utc(),
            deliveries,
        };
        info!(
            incident_id = %report.incident_id,
            notified = report.notified().len(),
            failed = report.not_notified().len(),
            "emergency notification pass finished"
        );
        IncidentOutcome::Dispatched(report)
    }
}
