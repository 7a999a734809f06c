//! API Integration Tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;

use event_hub::api::{
    self,
    routes::{CreateEventRequest, LoginRequest, RegisterRequest, SetAdminRequest},
};
use event_hub::store::AccountStore;

mod common;

fn authorized(builder: axum::http::request::Builder, token: Option<&str>) -> axum::http::request::Builder {
    match token {
        Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
        None => builder,
    }
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: &impl serde::Serialize) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    authorized(builder, token)
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    authorized(builder, token).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn register(app: &Router, name: &str) -> i64 {
    let (status, json) = send(
        app,
        json_request(
            "POST",
            "/api/v1/accounts",
            None,
            &RegisterRequest {
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                password: "pw".to_string(),
            },
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "Registration of {} failed", name);
    json["id"].as_i64().unwrap()
}

/// Open a session and return its bearer token
async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, json) = send(
        app,
        json_request(
            "POST",
            "/api/v1/sessions",
            None,
            &LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            },
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "Login of {} failed: {}", email, json);
    json["token"].as_str().unwrap().to_string()
}

/// Register and log in; returns (id, token)
async fn sign_up(app: &Router, name: &str) -> (i64, String) {
    let id = register(app, name).await;
    let token = login(app, &format!("{}@example.com", name.to_lowercase()), "pw").await;
    (id, token)
}

fn event_request(capacity: i64) -> CreateEventRequest {
    CreateEventRequest {
        name: "Rust night".to_string(),
        category: "technology".to_string(),
        schedule: common::schedule_in(5),
        location: "Hall A".to_string(),
        capacity,
        description: "Talks".to_string(),
    }
}

#[tokio::test]
async fn test_health() {
    let ctx = common::setup();
    let app = api::build_router(ctx.services.clone());

    let response = app.oneshot(empty_request("GET", "/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_enrollment_e2e() {
    let ctx = common::setup();
    let app = api::build_router(ctx.services.clone());

    let (_, organizer) = sign_up(&app, "Grace").await;
    let (ada_id, ada) = sign_up(&app, "Ada").await;
    let (_, bob) = sign_up(&app, "Bob").await;

    // 1. Create an event with a single seat
    let (status, json) = send(&app, json_request("POST", "/api/v1/events", Some(&organizer), &event_request(1))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", json);
    let event = json["id"].as_i64().unwrap();

    // 2. Event detail carries the organizer name
    let (status, json) = send(&app, empty_request("GET", &format!("/api/v1/events/{}", event), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["organizer_name"], "Grace");
    assert_eq!(json["category"], "TECHNOLOGY");

    // 3. First enrollment fills the event
    let uri = format!("/api/v1/events/{}/enrollments", event);
    let (status, _) = send(&app, empty_request("POST", &uri, Some(&ada))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = send(&app, empty_request("POST", &uri, Some(&bob))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error_code"], "capacity_full");

    // 4. Organizer cannot enroll
    let (status, json) = send(&app, empty_request("POST", &uri, Some(&organizer))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error_code"], "self_organizer");

    // 5. Count and status
    let (status, json) = send(&app, empty_request("GET", &format!("{}/count", uri), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["participants"], 1);

    let (_, json) = send(&app, empty_request("GET", &format!("{}/{}", uri, ada_id), None)).await;
    assert_eq!(json["enrolled"], true);

    let (_, json) = send(&app, empty_request("GET", &format!("/api/v1/accounts/{}/enrollments", ada_id), None)).await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    // 6. Cancel twice
    let (status, _) = send(&app, empty_request("DELETE", &uri, Some(&ada))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, json) = send(&app, empty_request("DELETE", &uri, Some(&ada))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error_code"], "not_enrolled");
}

#[tokio::test]
async fn test_acting_endpoints_require_a_session() {
    let ctx = common::setup();
    let app = api::build_router(ctx.services.clone());

    let (status, json) = send(&app, json_request("POST", "/api/v1/events", None, &event_request(5))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "unauthenticated");

    let (status, json) = send(&app, empty_request("GET", "/api/v1/accounts", Some("not-a-token"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "invalid_token");

    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/accounts")
        .header("Authorization", "Basic YWRtaW46YWRtaW4=")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "invalid_authorization");

    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/accounts")
        .header("X-Request-User-Id", "not-a-number")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "invalid_user_id");
}

#[tokio::test]
async fn test_requester_header_alone_grants_nothing() {
    let ctx = common::setup();
    let root = ctx.admin("Root").await;
    let app = api::build_router(ctx.services.clone());
    let (ada, ada_token) = sign_up(&app, "Ada").await;

    // Claiming to be the admin without a session
    let request = Request::builder()
        .method("PUT")
        .uri(format!("/api/v1/accounts/{}/admin", ada))
        .header("content-type", "application/json")
        .header("X-Request-User-Id", root.0.to_string())
        .body(Body::from(serde_json::to_string(&SetAdminRequest { is_admin: true }).unwrap()))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "unauthenticated");

    // Claiming to be the admin with someone else's session
    let request = Request::builder()
        .method("PUT")
        .uri(format!("/api/v1/accounts/{}/admin", ada))
        .header("content-type", "application/json")
        .header("Authorization", format!("Bearer {}", ada_token))
        .header("X-Request-User-Id", root.0.to_string())
        .body(Body::from(serde_json::to_string(&SetAdminRequest { is_admin: true }).unwrap()))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error_code"], "requester_mismatch");

    let account = ctx.store.find_user(event_hub::domain::UserId(ada)).await.unwrap().unwrap();
    assert!(!account.is_admin);
    assert_eq!(ctx.store.count_admins().await.unwrap(), 1);

    // A matching header alongside the session is accepted
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/events")
        .header("content-type", "application/json")
        .header("Authorization", format!("Bearer {}", ada_token))
        .header("X-Request-User-Id", ada.to_string())
        .body(Body::from(serde_json::to_string(&event_request(3)).unwrap()))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_login() {
    let ctx = common::setup();
    let app = api::build_router(ctx.services.clone());
    let ada = register(&app, "Ada").await;

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/sessions",
            None,
            &LoginRequest {
                email: "ada@example.com".to_string(),
                password: "pw".to_string(),
            },
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["account"]["id"], ada);
    assert_eq!(json["account"]["name"], "Ada");
    assert!(json["account"].get("password").is_none());
    assert!(json["token"].as_str().is_some_and(|t| !t.is_empty()));

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/sessions",
            None,
            &LoginRequest {
                email: "ada@example.com".to_string(),
                password: "wrong".to_string(),
            },
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "invalid_credentials");
}

#[tokio::test]
async fn test_logout_and_expiry_revoke_tokens() {
    let ctx = common::setup();
    let app = api::build_router(ctx.services.clone());
    let (_, first) = sign_up(&app, "Ada").await;
    let second = login(&app, "ada@example.com", "pw").await;

    let (status, _) = send(&app, json_request("POST", "/api/v1/events", Some(&first), &event_request(2))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, empty_request("DELETE", "/api/v1/sessions", Some(&first))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = send(&app, json_request("POST", "/api/v1/events", Some(&first), &event_request(2))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "invalid_token");

    let (status, json) = send(&app, empty_request("DELETE", "/api/v1/sessions", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "unauthenticated");

    ctx.clock.advance(Duration::days(2));
    let (status, json) = send(&app, json_request("POST", "/api/v1/events", Some(&second), &event_request(2))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "invalid_token");
}

#[tokio::test]
async fn test_admin_endpoints() {
    let ctx = common::setup();
    let root_id = ctx.admin("Root").await.0;
    let app = api::build_router(ctx.services.clone());
    let root = login(&app, "root@example.com", "admin-pw").await;
    let (ada_id, ada) = sign_up(&app, "Ada").await;

    // Listing needs an admin
    let (status, _) = send(&app, empty_request("GET", "/api/v1/accounts", Some(&ada))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, json) = send(&app, empty_request("GET", "/api/v1/accounts", Some(&root))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);

    // Sole admin cannot leave
    let (status, json) = send(&app, empty_request("DELETE", &format!("/api/v1/accounts/{}", root_id), Some(&root))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error_code"], "last_admin");

    // Promote Ada, then Root may leave
    let (status, _) = send(
        &app,
        json_request(
            "PUT",
            &format!("/api/v1/accounts/{}/admin", ada_id),
            Some(&root),
            &SetAdminRequest { is_admin: true },
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = send(&app, empty_request("DELETE", &format!("/api/v1/accounts/{}", root_id), Some(&root))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["events_removed"], 0);

    assert_eq!(ctx.store.count_admins().await.unwrap(), 1);
    let (status, json) = send(&app, empty_request("GET", &format!("/api/v1/accounts/{}", root_id), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "not_found");

    // The deleted account's session died with it
    let (status, json) = send(&app, empty_request("GET", "/api/v1/accounts", Some(&root))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "invalid_token");
}

#[tokio::test]
async fn test_create_event_validation_error() {
    let ctx = common::setup();
    let app = api::build_router(ctx.services.clone());
    let (_, organizer) = sign_up(&app, "Grace").await;

    let mut request = event_request(5);
    request.category = "gaming".to_string();

    let (status, json) = send(&app, json_request("POST", "/api/v1/events", Some(&organizer), &request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "validation_error");
}

#[tokio::test]
async fn test_list_categories() {
    let ctx = common::setup();
    let app = api::build_router(ctx.services.clone());

    let (status, json) = send(&app, empty_request("GET", "/api/v1/categories", None)).await;
    assert_eq!(status, StatusCode::OK);

    let categories: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["category"].as_str().unwrap())
        .collect();
    assert_eq!(categories, vec!["TECHNOLOGY", "CULTURE", "SPORTS", "ACADEMIC", "OTHER"]);
}
