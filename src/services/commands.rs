//! Command definitions
//!
//! Commands carry raw presentation input into the services, which own all
//! validation.

use serde::{Deserialize, Serialize};

use crate::domain::UserId;

// =========================================================================
// RegisterCommand
// =========================================================================

/// Command to register a new account
#[derive(Clone, Serialize, Deserialize)]
pub struct RegisterCommand {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterCommand {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for RegisterCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterCommand")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

// =========================================================================
// CreateEventCommand
// =========================================================================

/// Command to create an event, with category and schedule still as tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventCommand {
    pub organizer_id: UserId,
    pub name: String,
    /// Category token, matched case-insensitively
    pub category: String,
    /// Schedule token in `dd/mm/yyyy HH:MM`
    pub schedule: String,
    pub location: String,
    pub capacity: i64,
    pub description: String,
}

impl CreateEventCommand {
    pub fn new(
        organizer_id: UserId,
        name: impl Into<String>,
        category: impl Into<String>,
        schedule: impl Into<String>,
        location: impl Into<String>,
        capacity: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            organizer_id,
            name: name.into(),
            category: category.into(),
            schedule: schedule.into(),
            location: location.into(),
            capacity,
            description: description.into(),
        }
    }
}
