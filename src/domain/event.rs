//! Events and categories

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use super::user::UserId;

/// Textual format accepted for event schedules, e.g. `25/12/2030 18:30`
pub const SCHEDULE_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Store-assigned event identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EventId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// =========================================================================
// Category
// =========================================================================

/// Closed set of event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Technology,
    Culture,
    Sports,
    Academic,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Technology,
        Category::Culture,
        Category::Sports,
        Category::Academic,
        Category::Other,
    ];

    /// Parse a category token, ignoring case and surrounding whitespace
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(token))
    }

    /// Canonical token, also the persisted form
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Technology => "TECHNOLOGY",
            Category::Culture => "CULTURE",
            Category::Sports => "SPORTS",
            Category::Academic => "ACADEMIC",
            Category::Other => "OTHER",
        }
    }

    /// Display description
    pub fn description(&self) -> &'static str {
        match self {
            Category::Technology => "Technology and Innovation",
            Category::Culture => "Arts, Culture and Leisure",
            Category::Sports => "Sports and Competitions",
            Category::Academic => "Academic and Scientific",
            Category::Other => "Other / Miscellaneous",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ValidationError::UnknownCategory(s.to_string()))
    }
}

/// Parse a schedule token in [`SCHEDULE_FORMAT`]. Wall-clock values are taken as UTC.
pub fn parse_schedule(token: &str) -> Result<DateTime<Utc>, ValidationError> {
    NaiveDateTime::parse_from_str(token.trim(), SCHEDULE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| ValidationError::InvalidSchedule(token.to_string()))
}

// =========================================================================
// Event
// =========================================================================

/// A scheduled event with a fixed capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub category: Category,
    pub scheduled_at: DateTime<Utc>,
    pub location: String,
    pub capacity: i32,
    pub organizer_id: UserId,
    pub description: String,
}

impl Event {
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at < now
    }

    pub fn is_organized_by(&self, user_id: UserId) -> bool {
        self.organizer_id == user_id
    }
}

/// Validated event data handed to the store for insertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub name: String,
    pub category: Category,
    pub scheduled_at: DateTime<Utc>,
    pub location: String,
    pub capacity: i32,
    pub organizer_id: UserId,
    pub description: String,
}

impl NewEvent {
    pub fn into_event(self, id: EventId) -> Event {
        Event {
            id,
            name: self.name,
            category: self.category,
            scheduled_at: self.scheduled_at,
            location: self.location,
            capacity: self.capacity,
            organizer_id: self.organizer_id,
            description: self.description,
        }
    }
}

/// Read projection: an event plus its organizer's display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub organizer_name: String,
}
