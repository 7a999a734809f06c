//! Event detail projection
//!
//! Joins events with their organizer's display name for read paths.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{DomainError, Event, EventDetail, UserId};
use crate::store::AccountStore;

/// Organizer name shown when the organizer account no longer resolves
pub const UNKNOWN_ORGANIZER: &str = "Unknown organizer";

#[derive(Clone)]
pub struct DetailAssembler {
    accounts: Arc<dyn AccountStore>,
}

impl DetailAssembler {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    pub async fn assemble(&self, event: Event) -> Result<EventDetail, DomainError> {
        let organizer_name = self.organizer_name(&event).await?;
        Ok(EventDetail {
            event,
            organizer_name,
        })
    }

    /// Order is preserved; each organizer is looked up once
    pub async fn assemble_all(&self, events: Vec<Event>) -> Result<Vec<EventDetail>, DomainError> {
        let mut names: HashMap<UserId, String> = HashMap::new();
        let mut details = Vec::with_capacity(events.len());

        for event in events {
            let organizer_name = match names.get(&event.organizer_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self.organizer_name(&event).await?;
                    names.insert(event.organizer_id, name.clone());
                    name
                }
            };
            details.push(EventDetail {
                event,
                organizer_name,
            });
        }

        Ok(details)
    }

    async fn organizer_name(&self, event: &Event) -> Result<String, DomainError> {
        match self.accounts.find_user(event.organizer_id).await? {
            Some(organizer) => Ok(organizer.name),
            None => {
                tracing::warn!(
                    event_id = %event.id,
                    organizer_id = %event.organizer_id,
                    "Event organizer not found"
                );
                Ok(UNKNOWN_ORGANIZER.to_string())
            }
        }
    }
}
