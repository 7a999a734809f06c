//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Category, EventDetail, EventId, RequestContext, User, UserId};
use crate::error::AppError;
use crate::services::{CreateEventCommand, RegisterCommand, Services};
use crate::store::Cascade;

use super::middleware::bearer_token;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetAdminRequest {
    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
    pub category: String,
    /// `dd/mm/yyyy HH:MM`
    pub schedule: String,
    pub location: String,
    pub capacity: i64,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<User> for AccountResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            is_admin: user.is_admin,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    /// Bearer token for the `Authorization` header
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub account: AccountResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletionResponse {
    pub events_removed: u64,
    pub enrollments_removed: u64,
}

impl From<Cascade> for DeletionResponse {
    fn from(cascade: Cascade) -> Self {
        Self {
            events_removed: cascade.events,
            enrollments_removed: cascade.enrollments,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub category: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventResponse {
    pub id: EventId,
    pub name: String,
    pub category: String,
    pub scheduled_at: DateTime<Utc>,
    pub location: String,
    pub capacity: i32,
    pub organizer_id: UserId,
    pub organizer_name: String,
    pub description: String,
}

impl From<EventDetail> for EventResponse {
    fn from(detail: EventDetail) -> Self {
        let event = detail.event;
        Self {
            id: event.id,
            name: event.name,
            category: event.category.as_str().to_string(),
            scheduled_at: event.scheduled_at,
            location: event.location,
            capacity: event.capacity,
            organizer_id: event.organizer_id,
            organizer_name: detail.organizer_name,
            description: event.description,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ParticipantsResponse {
    pub event_id: EventId,
    pub participants: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollmentStatusResponse {
    pub event_id: EventId,
    pub user_id: UserId,
    pub enrolled: bool,
}

fn requester(context: &RequestContext) -> Result<UserId, AppError> {
    context
        .requester
        .ok_or_else(|| AppError::Unauthenticated("a session token is required".to_string()))
}

fn event_responses(details: Vec<EventDetail>) -> Vec<EventResponse> {
    details.into_iter().map(EventResponse::from).collect()
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<Services> {
    Router::new()
        // Accounts
        .route("/accounts", post(register).get(list_accounts))
        .route("/sessions", post(login).delete(logout))
        .route("/accounts/:user_id", get(get_account).delete(delete_account))
        .route("/accounts/:user_id/admin", put(set_admin))
        .route("/accounts/:user_id/events", get(list_organized_events))
        .route("/accounts/:user_id/enrollments", get(list_enrolled_events))
        // Events
        .route("/categories", get(list_categories))
        .route("/events", post(create_event).get(list_events))
        .route("/events/:event_id", get(get_event).delete(delete_event))
        // Enrollments
        .route("/events/:event_id/enrollments", post(enroll).delete(cancel_enrollment))
        .route("/events/:event_id/enrollments/count", get(count_participants))
        .route("/events/:event_id/enrollments/:user_id", get(enrollment_status))
}

// =========================================================================
// Accounts
// =========================================================================

/// Register a regular account
async fn register(
    State(services): State<Services>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let command = RegisterCommand::new(request.name, request.email, request.password);
    let user_id = services.accounts.register(command).await?;

    Ok((StatusCode::CREATED, Json(CreatedResponse { id: user_id.0 })))
}

/// Authenticate with email and password and open a session
async fn login(
    State(services): State<Services>,
    Extension(context): Extension<RequestContext>,
    Json(request): Json<LoginRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let result = services.accounts.login(&request.email, &request.password).await;

    if result.is_err() {
        tracing::warn!(client_ip = ?context.client_ip, "Authentication failed");
    }
    let login = result?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token: login.token.as_str().to_string(),
            expires_at: login.expires_at,
            account: login.user.into(),
        }),
    ))
}

/// Close the session presented in the `Authorization` header
async fn logout(
    State(services): State<Services>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let token = bearer_token(&headers)
        .ok()
        .flatten()
        .ok_or_else(|| AppError::Unauthenticated("a session token is required".to_string()))?;

    services.accounts.logout(token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List every account (administrators only)
async fn list_accounts(
    State(services): State<Services>,
    Extension(context): Extension<RequestContext>,
) -> Result<Json<Vec<AccountResponse>>, AppError> {
    let users = services.accounts.list_as(requester(&context)?).await?;
    Ok(Json(users.into_iter().map(AccountResponse::from).collect()))
}

async fn get_account(
    State(services): State<Services>,
    Path(user_id): Path<i64>,
) -> Result<Json<AccountResponse>, AppError> {
    let user = services.accounts.get(UserId(user_id)).await?;
    Ok(Json(user.into()))
}

/// Delete an account with everything it owns
async fn delete_account(
    State(services): State<Services>,
    Extension(context): Extension<RequestContext>,
    Path(user_id): Path<i64>,
) -> Result<Json<DeletionResponse>, AppError> {
    let cascade = services
        .accounts
        .delete(requester(&context)?, UserId(user_id))
        .await?;
    Ok(Json(cascade.into()))
}

async fn set_admin(
    State(services): State<Services>,
    Extension(context): Extension<RequestContext>,
    Path(user_id): Path<i64>,
    Json(request): Json<SetAdminRequest>,
) -> Result<StatusCode, AppError> {
    services
        .accounts
        .set_admin_status(requester(&context)?, UserId(user_id), request.is_admin)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_organized_events(
    State(services): State<Services>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<EventResponse>>, AppError> {
    let details = services.events.list_by_organizer(UserId(user_id)).await?;
    Ok(Json(event_responses(details)))
}

async fn list_enrolled_events(
    State(services): State<Services>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<EventResponse>>, AppError> {
    let details = services.events.list_enrolled_for(UserId(user_id)).await?;
    Ok(Json(event_responses(details)))
}

// =========================================================================
// Events
// =========================================================================

async fn list_categories() -> Json<Vec<CategoryResponse>> {
    Json(
        Category::ALL
            .iter()
            .map(|category| CategoryResponse {
                category: category.as_str().to_string(),
                description: category.description().to_string(),
            })
            .collect(),
    )
}

/// Create an event organized by the requesting user
async fn create_event(
    State(services): State<Services>,
    Extension(context): Extension<RequestContext>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let command = CreateEventCommand::new(
        requester(&context)?,
        request.name,
        request.category,
        request.schedule,
        request.location,
        request.capacity,
        request.description,
    );
    let event_id = services.events.create(command).await?;

    Ok((StatusCode::CREATED, Json(CreatedResponse { id: event_id.0 })))
}

async fn list_events(
    State(services): State<Services>,
) -> Result<Json<Vec<EventResponse>>, AppError> {
    let details = services.events.list_all().await?;
    Ok(Json(event_responses(details)))
}

async fn get_event(
    State(services): State<Services>,
    Path(event_id): Path<i64>,
) -> Result<Json<EventResponse>, AppError> {
    let detail = services.events.get(EventId(event_id)).await?;
    Ok(Json(detail.into()))
}

async fn delete_event(
    State(services): State<Services>,
    Extension(context): Extension<RequestContext>,
    Path(event_id): Path<i64>,
) -> Result<Json<DeletionResponse>, AppError> {
    let cascade = services
        .events
        .delete(EventId(event_id), requester(&context)?)
        .await?;
    Ok(Json(cascade.into()))
}

// =========================================================================
// Enrollments
// =========================================================================

/// Enroll the requesting user
async fn enroll(
    State(services): State<Services>,
    Extension(context): Extension<RequestContext>,
    Path(event_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    services
        .enrollments
        .enroll(requester(&context)?, EventId(event_id))
        .await?;
    Ok(StatusCode::CREATED)
}

async fn cancel_enrollment(
    State(services): State<Services>,
    Extension(context): Extension<RequestContext>,
    Path(event_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    services
        .enrollments
        .cancel(requester(&context)?, EventId(event_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn count_participants(
    State(services): State<Services>,
    Path(event_id): Path<i64>,
) -> Result<Json<ParticipantsResponse>, AppError> {
    let event_id = EventId(event_id);
    let participants = services.enrollments.count_participants(event_id).await?;
    Ok(Json(ParticipantsResponse {
        event_id,
        participants,
    }))
}

async fn enrollment_status(
    State(services): State<Services>,
    Path((event_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<EnrollmentStatusResponse>, AppError> {
    let (event_id, user_id) = (EventId(event_id), UserId(user_id));
    let enrolled = services.enrollments.is_enrolled(user_id, event_id).await?;
    Ok(Json(EnrollmentStatusResponse {
        event_id,
        user_id,
        enrolled,
    }))
}
