//! Domain module
//!
//! Core domain types: accounts, sessions, events, categories, credentials
//! and errors.

pub mod clock;
pub mod context;
pub mod credential;
pub mod error;
pub mod event;
pub mod session;
pub mod user;

pub use clock::{Clock, FixedClock, SystemClock};
pub use context::RequestContext;
pub use credential::{token_digest, PasswordHash, SessionToken};
pub use error::{DomainError, Resource, ValidationError};
pub use event::{parse_schedule, Category, Event, EventDetail, EventId, NewEvent, SCHEDULE_FORMAT};
pub use session::Session;
pub use user::{NewUser, User, UserId};
