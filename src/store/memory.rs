//! In-memory store
//!
//! Accounts and the event map each sit behind their own `RwLock`, and every
//! event carries its own roster mutex, so enrollments into different events
//! never wait on each other. Guards and mutations run inside critical
//! sections that never await.
//!
//! Lock order is accounts, then the event map, then a roster. A roster
//! holder never waits on either `RwLock`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::domain::{DomainError, Event, EventId, NewEvent, NewUser, Session, User, UserId};

use super::{
    AccountStore, AdminGuard, AdminSnapshot, Cascade, EnrollmentGuard, EnrollmentSnapshot,
    EnrollmentStore, EventDeletionGuard, EventDeletionSnapshot, EventStore, StoreError,
    StoreResult,
};

#[derive(Debug, Default)]
struct Accounts {
    users: BTreeMap<UserId, User>,
    emails: HashMap<String, UserId>,
    /// Keyed by token digest
    sessions: HashMap<String, Session>,
    last_user_id: i64,
}

impl Accounts {
    fn admin_count(&self) -> i64 {
        self.users.values().filter(|u| u.is_admin).count() as i64
    }

    fn admin_snapshot(&self, requester: UserId, target: UserId) -> AdminSnapshot {
        AdminSnapshot {
            requester: self.users.get(&requester).cloned(),
            target: self.users.get(&target).cloned(),
            admin_count: self.admin_count(),
        }
    }
}

#[derive(Debug, Default)]
struct Roster {
    /// Set once the event is deleted; a stale slot handle then sees no event
    removed: bool,
    members: BTreeSet<UserId>,
}

#[derive(Debug)]
struct EventSlot {
    event: Event,
    roster: Mutex<Roster>,
}

impl EventSlot {
    fn roster(&self) -> StoreResult<MutexGuard<'_, Roster>> {
        self.roster.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[derive(Debug, Default)]
struct Events {
    slots: BTreeMap<EventId, Arc<EventSlot>>,
    last_event_id: i64,
}

fn sorted_events<'a>(events: impl Iterator<Item = &'a Event>) -> Vec<Event> {
    let mut events: Vec<Event> = events.cloned().collect();
    events.sort_by_key(|e| (e.scheduled_at, e.id));
    events
}

/// Process-local store backing tests, tooling and database-less deployments
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: RwLock<Accounts>,
    events: RwLock<Events>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn accounts(&self) -> StoreResult<RwLockReadGuard<'_, Accounts>> {
        self.accounts.read().map_err(|_| StoreError::Poisoned)
    }

    fn accounts_mut(&self) -> StoreResult<RwLockWriteGuard<'_, Accounts>> {
        self.accounts.write().map_err(|_| StoreError::Poisoned)
    }

    fn events(&self) -> StoreResult<RwLockReadGuard<'_, Events>> {
        self.events.read().map_err(|_| StoreError::Poisoned)
    }

    fn events_mut(&self) -> StoreResult<RwLockWriteGuard<'_, Events>> {
        self.events.write().map_err(|_| StoreError::Poisoned)
    }

    /// Clone the slot handle out so the map lock is released before the
    /// roster is taken
    fn slot(&self, event: EventId) -> StoreResult<Option<Arc<EventSlot>>> {
        Ok(self.events()?.slots.get(&event).cloned())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<UserId> {
        let mut accounts = self.accounts_mut()?;

        if accounts.emails.contains_key(&user.email) {
            return Err(StoreError::DuplicateEmail(user.email));
        }

        accounts.last_user_id += 1;
        let id = UserId(accounts.last_user_id);
        accounts.emails.insert(user.email.clone(), id);
        accounts.users.insert(id, user.into_user(id));

        Ok(id)
    }

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.accounts()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let accounts = self.accounts()?;
        Ok(accounts
            .emails
            .get(email)
            .and_then(|id| accounts.users.get(id))
            .cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.accounts()?.users.values().cloned().collect())
    }

    async fn count_admins(&self) -> StoreResult<i64> {
        Ok(self.accounts()?.admin_count())
    }

    async fn delete_user(
        &self,
        requester: UserId,
        target: UserId,
        guard: &AdminGuard,
    ) -> StoreResult<Cascade> {
        let mut accounts = self.accounts_mut()?;

        guard(&accounts.admin_snapshot(requester, target))?;

        let Some(user) = accounts.users.remove(&target) else {
            return Err(DomainError::user_not_found(target).into());
        };
        accounts.emails.remove(&user.email);
        accounts.sessions.retain(|_, s| s.user_id != target);

        let mut events = self.events_mut()?;
        let organized: Vec<EventId> = events
            .slots
            .values()
            .filter(|slot| slot.event.organizer_id == target)
            .map(|slot| slot.event.id)
            .collect();

        let mut enrollments = 0u64;
        for slot in events.slots.values() {
            let mut roster = slot.roster()?;
            if slot.event.organizer_id == target {
                roster.removed = true;
                enrollments += roster.members.len() as u64;
                roster.members.clear();
            } else if roster.members.remove(&target) {
                enrollments += 1;
            }
        }

        for id in &organized {
            events.slots.remove(id);
        }

        Ok(Cascade {
            events: organized.len() as u64,
            enrollments,
        })
    }

    async fn set_admin(
        &self,
        requester: UserId,
        target: UserId,
        is_admin: bool,
        guard: &AdminGuard,
    ) -> StoreResult<()> {
        let mut accounts = self.accounts_mut()?;

        guard(&accounts.admin_snapshot(requester, target))?;

        match accounts.users.get_mut(&target) {
            Some(user) => {
                user.is_admin = is_admin;
                Ok(())
            }
            None => Err(DomainError::user_not_found(target).into()),
        }
    }

    async fn insert_session(&self, token_digest: &str, session: Session) -> StoreResult<()> {
        let mut accounts = self.accounts_mut()?;

        if !accounts.users.contains_key(&session.user_id) {
            return Err(DomainError::user_not_found(session.user_id).into());
        }
        accounts.sessions.insert(token_digest.to_string(), session);

        Ok(())
    }

    async fn find_session(&self, token_digest: &str) -> StoreResult<Option<Session>> {
        Ok(self.accounts()?.sessions.get(token_digest).copied())
    }

    async fn delete_session(&self, token_digest: &str) -> StoreResult<bool> {
        Ok(self.accounts_mut()?.sessions.remove(token_digest).is_some())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: NewEvent) -> StoreResult<EventId> {
        // Held so the organizer cannot be deleted before the event lands
        let accounts = self.accounts()?;
        if !accounts.users.contains_key(&event.organizer_id) {
            return Err(DomainError::user_not_found(event.organizer_id).into());
        }

        let mut events = self.events_mut()?;
        events.last_event_id += 1;
        let id = EventId(events.last_event_id);
        events.slots.insert(
            id,
            Arc::new(EventSlot {
                event: event.into_event(id),
                roster: Mutex::new(Roster::default()),
            }),
        );

        Ok(id)
    }

    async fn find_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        Ok(self.events()?.slots.get(&id).map(|slot| slot.event.clone()))
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        let events = self.events()?;
        Ok(sorted_events(events.slots.values().map(|slot| &slot.event)))
    }

    async fn list_events_by_organizer(&self, organizer: UserId) -> StoreResult<Vec<Event>> {
        let events = self.events()?;
        Ok(sorted_events(
            events
                .slots
                .values()
                .map(|slot| &slot.event)
                .filter(|e| e.organizer_id == organizer),
        ))
    }

    async fn list_events_enrolled_by(&self, user: UserId) -> StoreResult<Vec<Event>> {
        let events = self.events()?;
        let mut enrolled = Vec::new();
        for slot in events.slots.values() {
            if slot.roster()?.members.contains(&user) {
                enrolled.push(&slot.event);
            }
        }
        Ok(sorted_events(enrolled.into_iter()))
    }

    async fn delete_event(
        &self,
        event: EventId,
        requester: UserId,
        guard: &EventDeletionGuard,
    ) -> StoreResult<Cascade> {
        let accounts = self.accounts()?;
        let mut events = self.events_mut()?;
        let slot = events.slots.get(&event).cloned();

        let Some(slot) = slot else {
            guard(&EventDeletionSnapshot {
                event: None,
                requester: accounts.users.get(&requester).cloned(),
            })?;
            return Err(DomainError::event_not_found(event).into());
        };

        let mut roster = slot.roster()?;
        guard(&EventDeletionSnapshot {
            event: Some(slot.event.clone()),
            requester: accounts.users.get(&requester).cloned(),
        })?;

        roster.removed = true;
        let enrollments = roster.members.len() as u64;
        roster.members.clear();
        drop(roster);

        events.slots.remove(&event);

        Ok(Cascade {
            events: 1,
            enrollments,
        })
    }
}

#[async_trait]
impl EnrollmentStore for MemoryStore {
    async fn enroll(&self, user: UserId, event: EventId, guard: &EnrollmentGuard) -> StoreResult<()> {
        // Shared: keeps the user alive without blocking other enrollments
        let accounts = self.accounts()?;
        let user_exists = accounts.users.contains_key(&user);

        let Some(slot) = self.slot(event)? else {
            guard(&EnrollmentSnapshot {
                event: None,
                user_exists,
                already_enrolled: false,
                participants: 0,
            })?;
            return Err(DomainError::event_not_found(event).into());
        };

        let mut roster = slot.roster()?;
        let snapshot = EnrollmentSnapshot {
            event: (!roster.removed).then(|| slot.event.clone()),
            user_exists,
            already_enrolled: roster.members.contains(&user),
            participants: roster.members.len() as i64,
        };
        guard(&snapshot)?;

        if roster.removed {
            return Err(DomainError::event_not_found(event).into());
        }
        if !roster.members.insert(user) {
            return Err(DomainError::AlreadyEnrolled {
                user_id: user,
                event_id: event,
            }
            .into());
        }

        Ok(())
    }

    async fn remove_enrollment(&self, user: UserId, event: EventId) -> StoreResult<bool> {
        match self.slot(event)? {
            Some(slot) => Ok(slot.roster()?.members.remove(&user)),
            None => Ok(false),
        }
    }

    async fn is_enrolled(&self, user: UserId, event: EventId) -> StoreResult<bool> {
        match self.slot(event)? {
            Some(slot) => Ok(slot.roster()?.members.contains(&user)),
            None => Ok(false),
        }
    }

    async fn count_participants(&self, event: EventId) -> StoreResult<Option<i64>> {
        let Some(slot) = self.slot(event)? else {
            return Ok(None);
        };
        let roster = slot.roster()?;
        if roster.removed {
            return Ok(None);
        }
        Ok(Some(roster.members.len() as i64))
    }
}
