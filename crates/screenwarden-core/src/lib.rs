//! # Screenwarden Core Library
//!
//! Usage accounting and adaptive lockout for a single device user. All
//! operations are available through the `screenwarden` CLI, which is a thin
//! layer over this crate.
//!
//! ## Architecture
//!
//! - **Ledger**: append-only usage events, summed per local calendar day
//! - **Lockout**: two-state machine that locks once the daily total exceeds
//!   the profile limit and unlocks only on an explicit request
//! - **Advisory**: periodic fatigue score from an external oracle, with
//!   last-known and default fallbacks
//! - **Emergency**: guardian notification with at most one incident in flight
//! - **Scheduler**: independent accrual and advisory polling loops
//! - **Storage**: SQLite persistence and TOML configuration
//!
//! ## Key Components
//!
//! - [`UsageEngine`]: owns ledger, lockout, advisory and emergency state
//! - [`PollingScheduler`]: drives the engine on wall-clock intervals
//! - [`Database`]: persistence for usage, profile, guardians and routine
//! - [`Config`]: application configuration management

pub mod advisory;
pub mod clock;
pub mod credentials;
pub mod emergency;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod lockout;
pub mod profile;
pub mod scheduler;
pub mod storage;

pub use advisory::{AdvisoryClient, AdvisoryOracle, AdvisoryOrigin, AdvisoryResult, HttpOracle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use emergency::{EmergencyDispatcher, IncidentOutcome, IncidentReport, Notifier};
pub use engine::{Accrual, EngineStores, UsageEngine};
pub use error::{AdvisoryError, ConfigError, CoreError, DatabaseError, NotifyError, ValidationError};
pub use events::Event;
pub use ledger::{DailyUsage, UsageEvent, UsageLedger, UsageStore};
pub use lockout::{LockPolicy, LockState, LockoutMachine, LockoutStore, UnlockReason};
pub use profile::{Guardian, Profile, Role, RoutineItem};
pub use scheduler::{Cadences, PollingScheduler, SchedulerHandle};
pub use storage::{Config, Database, MemoryStore};
