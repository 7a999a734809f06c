//! Store module
//!
//! Persistence boundary for accounts, events and enrollments.
//!
//! Every write whose validity depends on current state is a *guarded write*:
//! the store reads a snapshot of the affected rows under the same lock or
//! transaction that performs the mutation, hands it to the caller's guard,
//! and only writes if the guard accepts. Rejections come back as
//! [`StoreError::Rejected`] and leave every row untouched.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;

use crate::domain::{DomainError, Event, EventId, NewEvent, NewUser, Session, User, UserId};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Account rows a user deletion or admin-flag change depends on
#[derive(Debug, Clone)]
pub struct AdminSnapshot {
    pub requester: Option<User>,
    pub target: Option<User>,
    /// Number of administrators before the write
    pub admin_count: i64,
}

/// Rows an event deletion depends on
#[derive(Debug, Clone)]
pub struct EventDeletionSnapshot {
    pub event: Option<Event>,
    pub requester: Option<User>,
}

/// Rows an enrollment depends on
#[derive(Debug, Clone)]
pub struct EnrollmentSnapshot {
    pub event: Option<Event>,
    pub user_exists: bool,
    pub already_enrolled: bool,
    /// Enrollments for the event before the write
    pub participants: i64,
}

pub type AdminGuard = dyn Fn(&AdminSnapshot) -> Result<(), DomainError> + Send + Sync;
pub type EventDeletionGuard = dyn Fn(&EventDeletionSnapshot) -> Result<(), DomainError> + Send + Sync;
pub type EnrollmentGuard = dyn Fn(&EnrollmentSnapshot) -> Result<(), DomainError> + Send + Sync;

/// Rows removed alongside a deleted user or event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cascade {
    pub events: u64,
    pub enrollments: u64,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a user; fails with [`StoreError::DuplicateEmail`] on a taken email
    async fn insert_user(&self, user: NewUser) -> StoreResult<UserId>;

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// All users ordered by id ascending
    async fn list_users(&self) -> StoreResult<Vec<User>>;

    async fn count_admins(&self) -> StoreResult<i64>;

    /// Delete `target` with its sessions and enrollments, the events it
    /// organizes and their enrollments, if `guard` accepts.
    async fn delete_user(
        &self,
        requester: UserId,
        target: UserId,
        guard: &AdminGuard,
    ) -> StoreResult<Cascade>;

    /// Set `target`'s admin flag if `guard` accepts
    async fn set_admin(
        &self,
        requester: UserId,
        target: UserId,
        is_admin: bool,
        guard: &AdminGuard,
    ) -> StoreResult<()>;

    /// Store a session under the digest of its token. Rejects with
    /// `NotFound` if the user does not exist.
    async fn insert_session(&self, token_digest: &str, session: Session) -> StoreResult<()>;

    async fn find_session(&self, token_digest: &str) -> StoreResult<Option<Session>>;

    /// Returns whether a session was removed
    async fn delete_session(&self, token_digest: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert an event; rejects with `NotFound` if the organizer does not exist
    async fn insert_event(&self, event: NewEvent) -> StoreResult<EventId>;

    async fn find_event(&self, id: EventId) -> StoreResult<Option<Event>>;

    /// All events ordered by schedule, then id
    async fn list_events(&self) -> StoreResult<Vec<Event>>;

    async fn list_events_by_organizer(&self, organizer: UserId) -> StoreResult<Vec<Event>>;

    async fn list_events_enrolled_by(&self, user: UserId) -> StoreResult<Vec<Event>>;

    /// Delete an event and its enrollments if `guard` accepts
    async fn delete_event(
        &self,
        event: EventId,
        requester: UserId,
        guard: &EventDeletionGuard,
    ) -> StoreResult<Cascade>;
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Record the enrollment if `guard` accepts the snapshot taken under the
    /// event's lock. The (user, event) pair is unique.
    async fn enroll(&self, user: UserId, event: EventId, guard: &EnrollmentGuard) -> StoreResult<()>;

    /// Returns whether a row was removed
    async fn remove_enrollment(&self, user: UserId, event: EventId) -> StoreResult<bool>;

    async fn is_enrolled(&self, user: UserId, event: EventId) -> StoreResult<bool>;

    /// `None` when the event does not exist
    async fn count_participants(&self, event: EventId) -> StoreResult<Option<i64>>;
}

/// A backend providing all three stores
pub trait Store: AccountStore + EventStore + EnrollmentStore {}

impl<T: AccountStore + EventStore + EnrollmentStore> Store for T {}
