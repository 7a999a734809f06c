//! PostgreSQL store
//!
//! Each guarded write runs in one transaction. Rows the guard depends on are
//! locked before they are read, always users before events, so concurrent
//! writers on the same rows serialize and writers on different rows do not.
//! Account rows are locked no harder than the write needs: an enrollment's
//! key-share on its user only waits for that user's deletion.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{
    Category, DomainError, Event, EventId, NewEvent, NewUser, PasswordHash, Session, User,
    UserId,
};

use super::{
    AccountStore, AdminGuard, AdminSnapshot, Cascade, EnrollmentGuard, EnrollmentSnapshot,
    EnrollmentStore, EventDeletionGuard, EventDeletionSnapshot, EventStore, StoreError,
    StoreResult,
};

/// (id, name, email, password_hash, is_admin)
type UserRecord = (i64, String, String, String, bool);

/// (id, name, category, scheduled_at, location, capacity, organizer_id, description)
type EventRecord = (i64, String, String, DateTime<Utc>, String, i32, i64, String);

fn user_from_record((id, name, email, password_hash, is_admin): UserRecord) -> User {
    User {
        id: UserId(id),
        name,
        email,
        password: PasswordHash::from_stored(password_hash),
        is_admin,
    }
}

fn event_from_record(record: EventRecord) -> StoreResult<Event> {
    let (id, name, category, scheduled_at, location, capacity, organizer_id, description) = record;
    let category = Category::parse(&category)
        .ok_or_else(|| StoreError::Corrupt(format!("event {} has category {:?}", id, category)))?;

    Ok(Event {
        id: EventId(id),
        name,
        category,
        scheduled_at,
        location,
        capacity,
        organizer_id: UserId(organizer_id),
        description,
    })
}

fn events_from_records(records: Vec<EventRecord>) -> StoreResult<Vec<Event>> {
    records.into_iter().map(event_from_record).collect()
}

/// Row-level lock modes, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum RowLock {
    /// Keeps the row from being deleted; compatible with flag updates
    KeyShare,
    /// Keeps the row from changing at all; compatible with key-share
    Share,
    /// Only non-key columns change
    NoKeyUpdate,
    /// Row may be deleted
    Update,
}

impl RowLock {
    fn clause(self) -> &'static str {
        match self {
            RowLock::KeyShare => "FOR KEY SHARE",
            RowLock::Share => "FOR SHARE",
            RowLock::NoKeyUpdate => "FOR NO KEY UPDATE",
            RowLock::Update => "FOR UPDATE",
        }
    }
}

/// Rows to lock for an admin guard, ordered by id. A requester acting on
/// itself gets the stronger of the two modes.
fn admin_lock_plan(requester: UserId, target: UserId, target_lock: RowLock) -> Vec<(UserId, RowLock)> {
    if requester == target {
        return vec![(target, target_lock.max(RowLock::Share))];
    }
    let mut plan = vec![(requester, RowLock::Share), (target, target_lock)];
    plan.sort_by_key(|(id, _)| *id);
    plan
}

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PgStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run `attempt` again when Postgres aborts it as a deadlock victim or
    /// serialization failure. Guard rejections are never retried.
    async fn with_retry<T, F, Fut>(&self, attempt: F) -> StoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = StoreResult<T>>,
    {
        const MAX_RETRIES: u32 = 3;

        let mut retry = 0;
        loop {
            match attempt().await {
                Err(StoreError::Database(sqlx::Error::Database(db)))
                    if is_transient(db.code().as_deref()) && retry + 1 < MAX_RETRIES =>
                {
                    retry += 1;
                    tracing::warn!(
                        code = ?db.code(),
                        "Transient conflict, retrying (attempt {}/{})",
                        retry,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_millis(20 * retry as u64)).await;
                }
                other => return other,
            }
        }
    }

    async fn lock_user(
        tx: &mut Transaction<'_, Postgres>,
        id: UserId,
        lock: RowLock,
    ) -> StoreResult<Option<User>> {
        let sql = format!(
            "SELECT id, name, email, password_hash, is_admin FROM users WHERE id = $1 {}",
            lock.clause()
        );

        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(user.map(user_from_record))
    }

    /// Lock requester and target, then read the admin count.
    ///
    /// Only when the write would strip an admin (`removes_admin`) are the
    /// remaining admins share-locked, so concurrent demotions cannot both
    /// count each other. Share locks leave enrollments (key-share) alone.
    async fn lock_admin_snapshot(
        tx: &mut Transaction<'_, Postgres>,
        requester: UserId,
        target: UserId,
        target_lock: RowLock,
        removes_admin: bool,
    ) -> StoreResult<AdminSnapshot> {
        let mut locked = Vec::with_capacity(2);
        for (id, lock) in admin_lock_plan(requester, target, target_lock) {
            locked.push(Self::lock_user(tx, id, lock).await?);
        }
        let locked: Vec<User> = locked.into_iter().flatten().collect();
        let requester_user = locked.iter().find(|u| u.id == requester).cloned();
        let target_user = locked.iter().find(|u| u.id == target).cloned();

        let admin_count: i64 = match &target_user {
            Some(t) if t.is_admin && removes_admin => {
                let others: Vec<i64> = sqlx::query_scalar(
                    "SELECT id FROM users WHERE is_admin AND id <> $1 ORDER BY id",
                )
                .bind(target)
                .fetch_all(&mut **tx)
                .await?;

                // is_admin is rechecked on the locked row versions
                let still_admin: Vec<i64> = sqlx::query_scalar(
                    "SELECT id FROM users WHERE id = ANY($1) AND is_admin ORDER BY id FOR SHARE",
                )
                .bind(&others[..])
                .fetch_all(&mut **tx)
                .await?;

                1 + still_admin.len() as i64
            }
            _ => {
                sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_admin")
                    .fetch_one(&mut **tx)
                    .await?
            }
        };

        Ok(AdminSnapshot {
            requester: requester_user,
            target: target_user,
            admin_count,
        })
    }

    async fn try_delete_user(
        &self,
        requester: UserId,
        target: UserId,
        guard: &AdminGuard,
    ) -> StoreResult<Cascade> {
        let mut tx = self.pool.begin().await?;

        let snapshot =
            Self::lock_admin_snapshot(&mut tx, requester, target, RowLock::Update, true).await?;
        guard(&snapshot)?;
        if snapshot.target.is_none() {
            return Err(DomainError::user_not_found(target).into());
        }

        let organized: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM events WHERE organizer_id = $1 ORDER BY id FOR UPDATE",
        )
        .bind(target)
        .fetch_all(&mut *tx)
        .await?;

        let enrollments = sqlx::query(
            "DELETE FROM enrollments WHERE user_id = $1 OR event_id = ANY($2)",
        )
        .bind(target)
        .bind(&organized[..])
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let events = sqlx::query("DELETE FROM events WHERE organizer_id = $1")
            .bind(target)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(target)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(target)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Cascade { events, enrollments })
    }

    async fn try_set_admin(
        &self,
        requester: UserId,
        target: UserId,
        is_admin: bool,
        guard: &AdminGuard,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let snapshot =
            Self::lock_admin_snapshot(&mut tx, requester, target, RowLock::NoKeyUpdate, !is_admin)
                .await?;
        guard(&snapshot)?;

        let updated = sqlx::query("UPDATE users SET is_admin = $2 WHERE id = $1")
            .bind(target)
            .bind(is_admin)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(DomainError::user_not_found(target).into());
        }

        tx.commit().await?;
        Ok(())
    }

    async fn try_delete_event(
        &self,
        event: EventId,
        requester: UserId,
        guard: &EventDeletionGuard,
    ) -> StoreResult<Cascade> {
        let mut tx = self.pool.begin().await?;

        let requester_user = Self::lock_user(&mut tx, requester, RowLock::Share).await?;

        let existing = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT id, name, category, scheduled_at, location, capacity, organizer_id, description
            FROM events
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(event)
        .fetch_optional(&mut *tx)
        .await?
        .map(event_from_record)
        .transpose()?;

        guard(&EventDeletionSnapshot {
            event: existing,
            requester: requester_user,
        })?;

        let enrollments = sqlx::query("DELETE FROM enrollments WHERE event_id = $1")
            .bind(event)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let events = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(event)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if events == 0 {
            return Err(DomainError::event_not_found(event).into());
        }

        tx.commit().await?;

        Ok(Cascade { events, enrollments })
    }

    async fn try_enroll(
        &self,
        user: UserId,
        event: EventId,
        guard: &EnrollmentGuard,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // Key-share keeps the user from being deleted without blocking admin toggles
        let user_exists = Self::lock_user(&mut tx, user, RowLock::KeyShare)
            .await?
            .is_some();

        // The event row lock serializes every enrollment into this event
        let existing = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT id, name, category, scheduled_at, location, capacity, organizer_id, description
            FROM events
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(event)
        .fetch_optional(&mut *tx)
        .await?
        .map(event_from_record)
        .transpose()?;

        let (already_enrolled, participants): (bool, i64) = sqlx::query_as(
            r#"
            SELECT
                EXISTS (SELECT 1 FROM enrollments WHERE event_id = $1 AND user_id = $2),
                (SELECT COUNT(*) FROM enrollments WHERE event_id = $1)
            "#,
        )
        .bind(event)
        .bind(user)
        .fetch_one(&mut *tx)
        .await?;

        guard(&EnrollmentSnapshot {
            event: existing,
            user_exists,
            already_enrolled,
            participants,
        })?;

        let inserted = sqlx::query("INSERT INTO enrollments (user_id, event_id) VALUES ($1, $2)")
            .bind(user)
            .bind(event)
            .execute(&mut *tx)
            .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(DomainError::AlreadyEnrolled {
                    user_id: user,
                    event_id: event,
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(())
    }
}

/// deadlock_detected, serialization_failure
fn is_transient(code: Option<&str>) -> bool {
    matches!(code, Some("40P01") | Some("40001"))
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<UserId> {
        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (name, email, password_hash, is_admin)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.password.as_str())
        .bind(user.is_admin)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(id) => Ok(UserId(id)),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateEmail(user.email))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, password_hash, is_admin FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user.map(user_from_record))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, password_hash, is_admin FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user.map(user_from_record))
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, password_hash, is_admin FROM users ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users.into_iter().map(user_from_record).collect())
    }

    async fn count_admins(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_admin")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn delete_user(
        &self,
        requester: UserId,
        target: UserId,
        guard: &AdminGuard,
    ) -> StoreResult<Cascade> {
        self.with_retry(|| self.try_delete_user(requester, target, guard))
            .await
    }

    async fn set_admin(
        &self,
        requester: UserId,
        target: UserId,
        is_admin: bool,
        guard: &AdminGuard,
    ) -> StoreResult<()> {
        self.with_retry(|| self.try_set_admin(requester, target, is_admin, guard))
            .await
    }

    async fn insert_session(&self, token_digest: &str, session: Session) -> StoreResult<()> {
        let inserted = sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(token_digest)
        .bind(session.user_id)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(DomainError::user_not_found(session.user_id).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_session(&self, token_digest: &str) -> StoreResult<Option<Session>> {
        let session = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "SELECT user_id, expires_at FROM sessions WHERE token_hash = $1",
        )
        .bind(token_digest)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session.map(|(user_id, expires_at)| Session {
            user_id: UserId(user_id),
            expires_at,
        }))
    }

    async fn delete_session(&self, token_digest: &str) -> StoreResult<bool> {
        let removed = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_digest)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(removed > 0)
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn insert_event(&self, event: NewEvent) -> StoreResult<EventId> {
        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO events (name, category, scheduled_at, location, capacity, organizer_id, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&event.name)
        .bind(event.category.as_str())
        .bind(event.scheduled_at)
        .bind(&event.location)
        .bind(event.capacity)
        .bind(event.organizer_id)
        .bind(&event.description)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(id) => Ok(EventId(id)),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(DomainError::user_not_found(event.organizer_id).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT id, name, category, scheduled_at, location, capacity, organizer_id, description
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(event_from_record)
        .transpose()
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        let records = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT id, name, category, scheduled_at, location, capacity, organizer_id, description
            FROM events
            ORDER BY scheduled_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        events_from_records(records)
    }

    async fn list_events_by_organizer(&self, organizer: UserId) -> StoreResult<Vec<Event>> {
        let records = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT id, name, category, scheduled_at, location, capacity, organizer_id, description
            FROM events
            WHERE organizer_id = $1
            ORDER BY scheduled_at ASC, id ASC
            "#,
        )
        .bind(organizer)
        .fetch_all(&self.pool)
        .await?;

        events_from_records(records)
    }

    async fn list_events_enrolled_by(&self, user: UserId) -> StoreResult<Vec<Event>> {
        let records = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT e.id, e.name, e.category, e.scheduled_at, e.location, e.capacity,
                   e.organizer_id, e.description
            FROM events e
            JOIN enrollments en ON en.event_id = e.id
            WHERE en.user_id = $1
            ORDER BY e.scheduled_at ASC, e.id ASC
            "#,
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        events_from_records(records)
    }

    async fn delete_event(
        &self,
        event: EventId,
        requester: UserId,
        guard: &EventDeletionGuard,
    ) -> StoreResult<Cascade> {
        self.with_retry(|| self.try_delete_event(event, requester, guard))
            .await
    }
}

#[async_trait]
impl EnrollmentStore for PgStore {
    async fn enroll(&self, user: UserId, event: EventId, guard: &EnrollmentGuard) -> StoreResult<()> {
        self.with_retry(|| self.try_enroll(user, event, guard)).await
    }

    async fn remove_enrollment(&self, user: UserId, event: EventId) -> StoreResult<bool> {
        let removed = sqlx::query("DELETE FROM enrollments WHERE user_id = $1 AND event_id = $2")
            .bind(user)
            .bind(event)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(removed > 0)
    }

    async fn is_enrolled(&self, user: UserId, event: EventId) -> StoreResult<bool> {
        let enrolled: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM enrollments WHERE user_id = $1 AND event_id = $2)",
        )
        .bind(user)
        .bind(event)
        .fetch_one(&self.pool)
        .await?;

        Ok(enrolled)
    }

    async fn count_participants(&self, event: EventId) -> StoreResult<Option<i64>> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT (SELECT COUNT(*) FROM enrollments WHERE event_id = e.id)
            FROM events e
            WHERE e.id = $1
            "#,
        )
        .bind(event)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count)
    }
}
