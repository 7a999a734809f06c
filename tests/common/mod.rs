//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use event_hub::domain::{Clock, EventId, FixedClock, NewUser, PasswordHash, UserId, SCHEDULE_FORMAT};
use event_hub::services::{CreateEventCommand, RegisterCommand, Services};
use event_hub::store::{AccountStore, MemoryStore, PgStore, Store};

/// Services over an in-memory store with a controllable clock
pub struct TestContext<S> {
    pub store: Arc<S>,
    pub clock: Arc<FixedClock>,
    pub services: Services,
}

/// Fixed "now" every test starts at
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap()
}

/// Schedule token `days` after [`start_time`]
pub fn schedule_in(days: i64) -> String {
    (start_time() + Duration::days(days))
        .format(SCHEDULE_FORMAT)
        .to_string()
}

pub fn with_store<S: Store + 'static>(store: Arc<S>) -> TestContext<S> {
    let clock = Arc::new(FixedClock::new(start_time()));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let services = Services::new(store.clone(), dyn_clock);

    TestContext {
        store,
        clock,
        services,
    }
}

pub fn setup() -> TestContext<MemoryStore> {
    with_store(Arc::new(MemoryStore::new()))
}

impl<S: Store + 'static> TestContext<S> {
    /// Insert an administrator directly, bypassing registration
    pub async fn admin(&self, name: &str) -> UserId {
        let email = format!("{}@example.com", name.to_lowercase());
        self.store
            .insert_user(NewUser::new(name, email, PasswordHash::new("admin-pw")).as_admin())
            .await
            .expect("Failed to insert admin")
    }

    pub async fn user(&self, name: &str) -> UserId {
        let email = format!("{}@example.com", name.to_lowercase());
        self.services
            .accounts
            .register(RegisterCommand::new(name, email, "user-pw"))
            .await
            .expect("Failed to register user")
    }

    /// Event scheduled one week ahead
    pub async fn event(&self, organizer: UserId, capacity: i64) -> EventId {
        self.event_on(organizer, capacity, schedule_in(7)).await
    }

    pub async fn event_on(&self, organizer: UserId, capacity: i64, schedule: String) -> EventId {
        self.services
            .events
            .create(CreateEventCommand::new(
                organizer,
                "Meetup",
                "technology",
                schedule,
                "Main hall",
                capacity,
                "Talks and networking",
            ))
            .await
            .expect("Failed to create event")
    }
}

/// Connect to the test database and empty it; `None` when `DATABASE_URL` is unset
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    event_hub::db::migrate(&pool).await.expect("Failed to migrate");

    sqlx::query("TRUNCATE TABLE sessions, enrollments, events, users RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    Some(pool)
}

pub async fn setup_pg() -> Option<TestContext<PgStore>> {
    let pool = setup_test_db().await?;
    Some(with_store(Arc::new(PgStore::new(pool))))
}
