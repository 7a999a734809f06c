//! Application services
//!
//! Services own the business rules. Each rule that depends on stored state
//! is passed to the store as a guard and evaluated under the store's lock.

mod account;
mod commands;
mod detail;
mod enrollment;
mod event;

use std::sync::Arc;

use chrono::Duration;

use crate::domain::Clock;
use crate::store::{AccountStore, EnrollmentStore, EventStore, Store};

pub use account::{AccountService, Login, DEFAULT_SESSION_TTL_MINUTES};
pub use commands::{CreateEventCommand, RegisterCommand};
pub use detail::{DetailAssembler, UNKNOWN_ORGANIZER};
pub use enrollment::EnrollmentService;
pub use event::EventService;

/// All services, wired over one backend and one clock
#[derive(Clone)]
pub struct Services {
    pub accounts: AccountService,
    pub events: EventService,
    pub enrollments: EnrollmentService,
}

impl Services {
    pub fn new<S: Store + 'static>(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        let account_store: Arc<dyn AccountStore> = store.clone();
        let event_store: Arc<dyn EventStore> = store.clone();
        let enrollment_store: Arc<dyn EnrollmentStore> = store;

        let details = DetailAssembler::new(account_store.clone());

        Self {
            accounts: AccountService::new(account_store, clock.clone()),
            events: EventService::new(event_store, details, clock.clone()),
            enrollments: EnrollmentService::new(enrollment_store, clock),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.accounts = self.accounts.with_session_ttl(ttl);
        self
    }
}
