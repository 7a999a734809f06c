//! Event creation, listing and deletion

use chrono::Duration;

use event_hub::domain::{Category, DomainError, EventId, UserId, ValidationError};
use event_hub::services::CreateEventCommand;
use event_hub::store::{Cascade, EnrollmentStore, EventStore};

mod common;

fn command(organizer: UserId, category: &str, schedule: &str, capacity: i64) -> CreateEventCommand {
    CreateEventCommand::new(
        organizer,
        "Workshop",
        category,
        schedule,
        "Lab 2",
        capacity,
        "Hands-on session",
    )
}

#[tokio::test]
async fn test_create_and_get_event() {
    let ctx = common::setup();
    let organizer = ctx.user("Grace").await;

    let id = ctx
        .services
        .events
        .create(command(organizer, "ACADEMIC", &common::schedule_in(3), 25))
        .await
        .unwrap();

    let detail = ctx.services.events.get(id).await.unwrap();
    assert_eq!(detail.event.category, Category::Academic);
    assert_eq!(detail.event.capacity, 25);
    assert_eq!(detail.organizer_name, "Grace");
    assert_eq!(
        detail.event.scheduled_at,
        common::start_time() + Duration::days(3)
    );
}

#[tokio::test]
async fn test_create_validation_order() {
    let ctx = common::setup();
    let organizer = ctx.user("Grace").await;
    let events = &ctx.services.events;

    let err = events
        .create(command(organizer, "music", "not a date", 0))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DomainError::Validation(ValidationError::UnknownCategory("music".to_string()))
    );

    let err = events
        .create(command(organizer, "sports", "2030-02-01 10:00", 0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::Validation(ValidationError::InvalidSchedule(_))
    ));

    let err = events
        .create(command(organizer, "sports", &common::schedule_in(-1), 0))
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::Validation(ValidationError::ScheduleInPast));

    let err = events
        .create(command(organizer, "sports", &common::schedule_in(1), 0))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DomainError::Validation(ValidationError::NonPositiveCapacity(0))
    );

    assert!(ctx.services.events.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_schedule_equal_to_now_is_rejected() {
    let ctx = common::setup();
    let organizer = ctx.user("Grace").await;

    let err = ctx
        .services
        .events
        .create(command(organizer, "other", &common::schedule_in(0), 5))
        .await
        .unwrap_err();

    assert_eq!(err, DomainError::Validation(ValidationError::ScheduleInPast));
}

#[tokio::test]
async fn test_create_for_unknown_organizer() {
    let ctx = common::setup();

    let err = ctx
        .services
        .events
        .create(command(UserId(77), "culture", &common::schedule_in(2), 5))
        .await
        .unwrap_err();

    assert_eq!(err, DomainError::user_not_found(UserId(77)));
}

#[tokio::test]
async fn test_listings_are_ordered_by_schedule() {
    let ctx = common::setup();
    let grace = ctx.user("Grace").await;
    let linus = ctx.user("Linus").await;

    let late = ctx.event_on(grace, 5, common::schedule_in(10)).await;
    let early = ctx.event_on(linus, 5, common::schedule_in(2)).await;
    let middle = ctx.event_on(grace, 5, common::schedule_in(5)).await;

    let all: Vec<EventId> = ctx
        .services
        .events
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.event.id)
        .collect();
    assert_eq!(all, vec![early, middle, late]);

    let by_grace: Vec<EventId> = ctx
        .services
        .events
        .list_by_organizer(grace)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.event.id)
        .collect();
    assert_eq!(by_grace, vec![middle, late]);
}

#[tokio::test]
async fn test_enrolled_listing() {
    let ctx = common::setup();
    let grace = ctx.user("Grace").await;
    let ada = ctx.user("Ada").await;

    let first = ctx.event_on(grace, 5, common::schedule_in(4)).await;
    let second = ctx.event_on(grace, 5, common::schedule_in(1)).await;
    ctx.event_on(grace, 5, common::schedule_in(2)).await;

    ctx.services.enrollments.enroll(ada, first).await.unwrap();
    ctx.services.enrollments.enroll(ada, second).await.unwrap();

    let enrolled: Vec<EventId> = ctx
        .services
        .events
        .list_enrolled_for(ada)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.event.id)
        .collect();
    assert_eq!(enrolled, vec![second, first]);
}

#[tokio::test]
async fn test_delete_event_permissions() {
    let ctx = common::setup();
    let admin = ctx.admin("Root").await;
    let organizer = ctx.user("Grace").await;
    let stranger = ctx.user("Eve").await;

    let first = ctx.event(organizer, 5).await;
    let second = ctx.event(organizer, 5).await;

    assert_eq!(
        ctx.services.events.delete(first, stranger).await.unwrap_err(),
        DomainError::PermissionDenied
    );
    assert!(ctx.store.find_event(first).await.unwrap().is_some());

    ctx.services.events.delete(first, organizer).await.unwrap();
    ctx.services.events.delete(second, admin).await.unwrap();
    assert!(ctx.services.events.list_all().await.unwrap().is_empty());

    assert_eq!(
        ctx.services.events.delete(first, organizer).await.unwrap_err(),
        DomainError::event_not_found(first)
    );
}

#[tokio::test]
async fn test_delete_event_cascades_enrollments() {
    let ctx = common::setup();
    let organizer = ctx.user("Grace").await;
    let ada = ctx.user("Ada").await;
    let bob = ctx.user("Bob").await;

    let event = ctx.event(organizer, 5).await;
    ctx.services.enrollments.enroll(ada, event).await.unwrap();
    ctx.services.enrollments.enroll(bob, event).await.unwrap();

    let cascade = ctx.services.events.delete(event, organizer).await.unwrap();

    assert_eq!(
        cascade,
        Cascade {
            events: 1,
            enrollments: 2
        }
    );
    assert!(!ctx.store.is_enrolled(ada, event).await.unwrap());
    assert_eq!(ctx.store.count_participants(event).await.unwrap(), None);
}

#[tokio::test]
async fn test_get_unknown_event() {
    let ctx = common::setup();

    assert_eq!(
        ctx.services.events.get(EventId(12)).await.unwrap_err(),
        DomainError::event_not_found(EventId(12))
    );
}
