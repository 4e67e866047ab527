//! Profile, guardian and routine records plus the store traits the engine
//! consumes them through.
//!
//! These are plain CRUD surfaces. The only rules enforced here are field
//! validation on the way in; ordering of routine items is the store's job.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Worker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Worker => "worker",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "worker" => Ok(Role::Worker),
            other => Err(ValidationError::invalid(
                "role",
                format!("expected 'student' or 'worker', got '{other}'"),
            )),
        }
    }
}

/// The single user profile. `role` is advisory context only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: String,
    pub role: Role,
    pub daily_limit_min: u32,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            display_name: "User".to_string(),
            role: Role::Student,
            daily_limit_min: 120,
        }
    }
}

impl Profile {
    pub fn limit_secs(&self) -> u64 {
        u64::from(self.daily_limit_min) * 60
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.display_name.trim().is_empty() {
            return Err(ValidationError::invalid("display_name", "must not be empty"));
        }
        if self.daily_limit_min == 0 {
            return Err(ValidationError::invalid(
                "daily_limit_min",
                "must be at least 1 minute",
            ));
        }
        Ok(())
    }
}

/// Emergency contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guardian {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Guardian {
    pub fn new(name: &str, phone: Option<&str>, email: Option<&str>) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            phone: phone.map(str::to_string),
            email: email.map(str::to_string),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::invalid("name", "must not be empty"));
        }
        let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if !has(&self.phone) && !has(&self.email) {
            return Err(ValidationError::invalid(
                "contact",
                "a guardian needs a phone number or an email address",
            ));
        }
        Ok(())
    }
}

/// One scheduled activity in the user's daily routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineItem {
    #[serde(default)]
    pub id: Option<i64>,
    pub scheduled_time: NaiveTime,
    pub activity: String,
    #[serde(default)]
    pub completed: bool,
}

impl RoutineItem {
    pub fn new(scheduled_time: NaiveTime, activity: &str) -> Self {
        Self {
            id: None,
            scheduled_time,
            activity: activity.to_string(),
            completed: false,
        }
    }

    /// Parse an `HH:MM` wall time.
    pub fn parse_time(value: &str) -> Result<NaiveTime, ValidationError> {
        NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| {
            ValidationError::invalid("scheduled_time", format!("expected HH:MM, got '{value}'"))
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.activity.trim().is_empty() {
            return Err(ValidationError::invalid("activity", "must not be empty"));
        }
        Ok(())
    }
}

pub trait ProfileStore: Send + Sync {
    /// Stored profile, or the default one when none was saved yet.
    fn get(&self) -> Result<Profile>;
    fn put(&self, profile: &Profile) -> Result<()>;
}

pub trait GuardianStore: Send + Sync {
    fn list(&self) -> Result<Vec<Guardian>>;
    /// Returns the id assigned to the new guardian.
    fn add(&self, guardian: &Guardian) -> Result<i64>;
}

pub trait RoutineStore: Send + Sync {
    /// All items ordered by scheduled time.
    fn list(&self) -> Result<Vec<RoutineItem>>;
    fn add(&self, item: &RoutineItem) -> Result<i64>;
    fn remove(&self, id: i64) -> Result<()>;
    fn set_completed(&self, id: i64, completed: bool) -> Result<()>;
}
