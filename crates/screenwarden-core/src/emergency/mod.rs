//! Emergency escape hatch: notify every guardian once per incident.
//!
//! Independent of lock state. An incident can be raised while locked or
//! unlocked and never changes the lockout machine.

mod dispatcher;
mod notifier;

pub use dispatcher::{
    DeliveryStatus, EmergencyDispatcher, GuardianDelivery, IncidentOutcome, IncidentReport,
};
pub use notifier::{EmergencyAlert, LogNotifier, Notifier, WebhookNotifier};
