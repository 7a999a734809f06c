//! Enrollment Service
//!
//! Admits users into events without ever exceeding capacity. The capacity
//! check and the insert happen under the same store lock, so concurrent
//! enrollments into one event are serialized.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{Clock, DomainError, EventId, UserId};
use crate::store::{EnrollmentSnapshot, EnrollmentStore};

/// Handler for enrollment operations
#[derive(Clone)]
pub struct EnrollmentService {
    store: Arc<dyn EnrollmentStore>,
    clock: Arc<dyn Clock>,
}

impl EnrollmentService {
    pub fn new(store: Arc<dyn EnrollmentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn enroll(&self, user: UserId, event: EventId) -> Result<(), DomainError> {
        let now = self.clock.now();
        let guard = move |s: &EnrollmentSnapshot| admit(user, event, now, s);

        match self.store.enroll(user, event, &guard).await {
            Ok(()) => {
                tracing::info!(user_id = %user, event_id = %event, "Enrollment recorded");
                Ok(())
            }
            Err(e) => {
                let err = DomainError::from(e);
                if matches!(err, DomainError::CapacityFull { .. }) {
                    tracing::debug!(user_id = %user, event_id = %event, "Enrollment refused, event full");
                }
                Err(err)
            }
        }
    }

    pub async fn cancel(&self, user: UserId, event: EventId) -> Result<(), DomainError> {
        if !self.store.remove_enrollment(user, event).await? {
            return Err(DomainError::NotEnrolled {
                user_id: user,
                event_id: event,
            });
        }

        tracing::info!(user_id = %user, event_id = %event, "Enrollment cancelled");
        Ok(())
    }

    pub async fn is_enrolled(&self, user: UserId, event: EventId) -> Result<bool, DomainError> {
        Ok(self.store.is_enrolled(user, event).await?)
    }

    pub async fn count_participants(&self, event: EventId) -> Result<i64, DomainError> {
        self.store
            .count_participants(event)
            .await?
            .ok_or(DomainError::event_not_found(event))
    }
}

/// Checks run in a fixed order; the first failure is reported.
fn admit(
    user: UserId,
    event_id: EventId,
    now: DateTime<Utc>,
    snapshot: &EnrollmentSnapshot,
) -> Result<(), DomainError> {
    let Some(event) = &snapshot.event else {
        return Err(DomainError::event_not_found(event_id));
    };
    if !snapshot.user_exists {
        return Err(DomainError::user_not_found(user));
    }
    if event.is_past(now) {
        return Err(DomainError::PastEvent(event_id));
    }
    if event.is_organized_by(user) {
        return Err(DomainError::SelfOrganizer(event_id));
    }
    if snapshot.already_enrolled {
        return Err(DomainError::AlreadyEnrolled {
            user_id: user,
            event_id,
        });
    }
    if snapshot.participants >= i64::from(event.capacity) {
        return Err(DomainError::CapacityFull {
            event_id,
            capacity: event.capacity,
        });
    }
    Ok(())
}
