//! Domain Error Types
//!
//! Business-rule violations reported by the services. Independent of the
//! web/infrastructure layer.

use std::fmt;

use thiserror::Error;

use super::event::EventId;
use super::user::UserId;

/// Entity referenced by a [`DomainError::NotFound`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    User(UserId),
    Event(EventId),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::User(id) => write!(f, "user {}", id),
            Resource::Event(id) => write!(f, "event {}", id),
        }
    }
}

/// Malformed or missing input
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Schedule is not in the future")]
    ScheduleInPast,

    #[error("Capacity must be positive, got {0}")]
    NonPositiveCapacity(i64),

    #[error("Capacity exceeds the supported maximum, got {0}")]
    CapacityTooLarge(i64),

    #[error("Required field is blank: {0}")]
    BlankField(&'static str),
}

/// Errors returned by every service operation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not found: {0}")]
    NotFound(Resource),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Operation would leave no administrator")]
    LastAdmin,

    #[error("Administrators cannot change their own status")]
    SelfModification,

    #[error("Event {0} has already taken place")]
    PastEvent(EventId),

    #[error("Organizer cannot enroll in own event {0}")]
    SelfOrganizer(EventId),

    #[error("User {user_id} is already enrolled in event {event_id}")]
    AlreadyEnrolled { user_id: UserId, event_id: EventId },

    #[error("User {user_id} is not enrolled in event {event_id}")]
    NotEnrolled { user_id: UserId, event_id: EventId },

    #[error("Event {event_id} is full (capacity {capacity})")]
    CapacityFull { event_id: EventId, capacity: i32 },

    /// Collaborator failure; the caller may retry
    #[error("Storage error: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn user_not_found(id: UserId) -> Self {
        Self::NotFound(Resource::User(id))
    }

    pub fn event_not_found(id: EventId) -> Self {
        Self::NotFound(Resource::Event(id))
    }

    /// Stable identifier for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::DuplicateEmail(_) => "duplicate_email",
            Self::InvalidCredentials => "invalid_credentials",
            Self::NotFound(_) => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::LastAdmin => "last_admin",
            Self::SelfModification => "self_modification",
            Self::PastEvent(_) => "past_event",
            Self::SelfOrganizer(_) => "self_organizer",
            Self::AlreadyEnrolled { .. } => "already_enrolled",
            Self::NotEnrolled { .. } => "not_enrolled",
            Self::CapacityFull { .. } => "capacity_full",
            Self::Storage(_) => "storage_error",
        }
    }

    /// Only collaborator failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
