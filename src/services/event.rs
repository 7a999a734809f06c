//! Event Service
//!
//! Event creation, deletion and the event listings.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    parse_schedule, Category, Clock, DomainError, EventDetail, EventId, NewEvent, UserId,
    ValidationError,
};
use crate::store::{Cascade, EventDeletionSnapshot, EventStore};

use super::{CreateEventCommand, DetailAssembler};

/// Handler for event operations
#[derive(Clone)]
pub struct EventService {
    store: Arc<dyn EventStore>,
    details: DetailAssembler,
    clock: Arc<dyn Clock>,
}

impl EventService {
    pub fn new(store: Arc<dyn EventStore>, details: DetailAssembler, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            details,
            clock,
        }
    }

    /// Validate and persist a new event organized by `command.organizer_id`
    pub async fn create(&self, command: CreateEventCommand) -> Result<EventId, DomainError> {
        let event = validate(command, self.clock.now())?;
        let organizer = event.organizer_id;
        let event_id = self.store.insert_event(event).await?;

        tracing::info!(event_id = %event_id, organizer_id = %organizer, "Event created");
        Ok(event_id)
    }

    /// Delete an event and its enrollments. Only the organizer or an admin may.
    pub async fn delete(&self, event_id: EventId, requester: UserId) -> Result<Cascade, DomainError> {
        let guard = move |s: &EventDeletionSnapshot| authorize_deletion(event_id, requester, s);
        let cascade = self.store.delete_event(event_id, requester, &guard).await?;

        tracing::info!(
            event_id = %event_id,
            requester = %requester,
            enrollments = cascade.enrollments,
            "Event deleted"
        );
        Ok(cascade)
    }

    pub async fn get(&self, event_id: EventId) -> Result<EventDetail, DomainError> {
        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or(DomainError::event_not_found(event_id))?;
        self.details.assemble(event).await
    }

    /// Every event, ordered by schedule
    pub async fn list_all(&self) -> Result<Vec<EventDetail>, DomainError> {
        let events = self.store.list_events().await?;
        self.details.assemble_all(events).await
    }

    pub async fn list_by_organizer(&self, organizer: UserId) -> Result<Vec<EventDetail>, DomainError> {
        let events = self.store.list_events_by_organizer(organizer).await?;
        self.details.assemble_all(events).await
    }

    /// Events `user` is enrolled in
    pub async fn list_enrolled_for(&self, user: UserId) -> Result<Vec<EventDetail>, DomainError> {
        let events = self.store.list_events_enrolled_by(user).await?;
        self.details.assemble_all(events).await
    }
}

/// Checks run in a fixed order; the first failure is reported.
fn validate(command: CreateEventCommand, now: DateTime<Utc>) -> Result<NewEvent, ValidationError> {
    let category: Category = command.category.parse()?;

    let scheduled_at = parse_schedule(&command.schedule)?;
    if scheduled_at <= now {
        return Err(ValidationError::ScheduleInPast);
    }

    if command.capacity <= 0 {
        return Err(ValidationError::NonPositiveCapacity(command.capacity));
    }
    let capacity = i32::try_from(command.capacity)
        .map_err(|_| ValidationError::CapacityTooLarge(command.capacity))?;

    let name = non_blank(command.name, "name")?;
    let location = non_blank(command.location, "location")?;
    let description = non_blank(command.description, "description")?;

    Ok(NewEvent {
        name,
        category,
        scheduled_at,
        location,
        capacity,
        organizer_id: command.organizer_id,
        description,
    })
}

fn non_blank(value: String, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankField(field));
    }
    Ok(trimmed.to_string())
}

fn authorize_deletion(
    event_id: EventId,
    requester: UserId,
    snapshot: &EventDeletionSnapshot,
) -> Result<(), DomainError> {
    let Some(event) = &snapshot.event else {
        return Err(DomainError::event_not_found(event_id));
    };
    let is_admin = snapshot.requester.as_ref().is_some_and(|u| u.is_admin);
    if !event.is_organized_by(requester) && !is_admin {
        return Err(DomainError::PermissionDenied);
    }
    Ok(())
}
