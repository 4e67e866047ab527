//! In-memory implementation of every store trait.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::{DatabaseError, Result, ValidationError};
use crate::ledger::{UsageEvent, UsageStore};
use crate::lockout::{LockoutMachine, LockoutStore};
use crate::profile::{Guardian, GuardianStore, Profile, ProfileStore, RoutineItem, RoutineStore};

#[derive(Default)]
struct Tables {
    events: Vec<UsageEvent>,
    profile: Option<Profile>,
    guardians: Vec<Guardian>,
    routine: Vec<RoutineItem>,
    lockout: Option<LockoutMachine>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Volatile store, used by tests and embedders that need no persistence.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(profile: Profile) -> Self {
        Self {
            tables: Mutex::new(Tables {
                profile: Some(profile),
                ..Tables::default()
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, DatabaseError> {
        self.tables.lock().map_err(|_| DatabaseError::Poisoned)
    }
}

fn routine_not_found(id: i64) -> ValidationError {
    ValidationError::NotFound {
        kind: "routine item".into(),
        id,
    }
}

impl UsageStore for MemoryStore {
    fn append(&self, event: &UsageEvent) -> Result<i64> {
        let mut t = self.lock()?;
        t.events.push(event.clone());
        Ok(t.events.len() as i64)
    }

    fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<UsageEvent>> {
        let t = self.lock()?;
        let mut events: Vec<UsageEvent> = t
            .events
            .iter()
            .filter(|e| e.recorded_at >= since)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.recorded_at);
        Ok(events)
    }
}

impl ProfileStore for MemoryStore {
    fn get(&self) -> Result<Profile> {
        Ok(self.lock()?.profile.clone().unwrap_or_default())
    }

    fn put(&self, profile: &Profile) -> Result<()> {
        profile.validate()?;
        self.lock()?.profile = Some(profile.clone());
        Ok(())
    }
}

impl GuardianStore for MemoryStore {
    fn list(&self) -> Result<Vec<Guardian>> {
        Ok(self.lock()?.guardians.clone())
    }

    fn add(&self, guardian: &Guardian) -> Result<i64> {
        guardian.validate()?;
        let mut t = self.lock()?;
        let id = t.next_id();
        t.guardians.push(Guardian {
            id: Some(id),
            ..guardian.clone()
        });
        Ok(id)
    }
}

impl LockoutStore for MemoryStore {
    fn load_lockout(&self) -> Result<Option<LockoutMachine>> {
        Ok(self.lock()?.lockout.clone())
    }

    fn save_lockout(&self, machine: &LockoutMachine) -> Result<()> {
        self.lock()?.lockout = Some(machine.clone());
        Ok(())
    }
}

impl RoutineStore for MemoryStore {
    fn list(&self) -> Result<Vec<RoutineItem>> {
        let mut items = self.lock()?.routine.clone();
        items.sort_by_key(|i| (i.scheduled_time, i.id));
        Ok(items)
    }

    fn add(&self, item: &RoutineItem) -> Result<i64> {
        item.validate()?;
        let mut t = self.lock()?;
        let id = t.next_id();
        t.routine.push(RoutineItem {
            id: Some(id),
            ..item.clone()
        });
        Ok(id)
    }

    fn remove(&self, id: i64) -> Result<()> {
        let mut t = self.lock()?;
        let before = t.routine.len();
        t.routine.retain(|i| i.id != Some(id));
        if t.routine.len() == before {
            return Err(routine_not_found(id).into());
        }
        Ok(())
    }

    fn set_completed(&self, id: i64, completed: bool) -> Result<()> {
        let mut t = self.lock()?;
        let item = t
            .routine
            .iter_mut()
            .find(|i| i.id == Some(id))
            .ok_or_else(|| routine_not_found(id))?;
        item.completed = completed;
        Ok(())
    }
}
