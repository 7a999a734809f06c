//! API Middleware
//!
//! Session authentication, request context extraction and request logging.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::AUTHORIZATION, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::domain::{DomainError, RequestContext, UserId};
use crate::error::AppError;
use crate::services::Services;

pub const REQUEST_USER_HEADER: &str = "X-Request-User-Id";
pub const CORRELATION_HEADER: &str = "X-Correlation-Id";

fn reject(status: StatusCode, error: &str, error_code: &str) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "error_code": error_code
        })),
    )
        .into_response()
}

/// Token from `Authorization: Bearer <token>`. `Err` when the header is
/// present but not a bearer credential.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ()> {
    let Some(raw) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = raw.to_str().map_err(|_| ())?;
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(Some(token.trim()))
        }
        _ => Err(()),
    }
}

// =========================================================================
// Request Context Middleware
// =========================================================================

/// Authenticate the caller and build a [`RequestContext`].
///
/// The requester comes only from a live session token. `X-Request-User-Id`
/// is accepted as an assertion and must name the session's own user;
/// without a token it is refused. Anonymous requests pass through with no
/// requester, and endpoints acting on behalf of a user reject them.
pub async fn context_middleware(
    State(services): State<Services>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let mut context = RequestContext::new();

    let claimed = match headers.get(REQUEST_USER_HEADER) {
        None => None,
        Some(raw) => match raw.to_str().ok().and_then(|s| s.trim().parse::<i64>().ok()) {
            Some(id) => Some(UserId(id)),
            None => {
                return Err(reject(
                    StatusCode::BAD_REQUEST,
                    "Invalid X-Request-User-Id header format",
                    "invalid_user_id",
                ));
            }
        },
    };

    let token = bearer_token(&headers).map_err(|_| {
        reject(
            StatusCode::UNAUTHORIZED,
            "Authorization header must be a bearer token",
            "invalid_authorization",
        )
    })?;

    let requester = match (token, claimed) {
        (Some(token), claimed) => {
            let user_id = match services.accounts.resolve_session(token).await {
                Ok(user_id) => user_id,
                Err(DomainError::InvalidCredentials) => {
                    return Err(reject(
                        StatusCode::UNAUTHORIZED,
                        "Invalid or expired session token",
                        "invalid_token",
                    ));
                }
                Err(e) => return Err(AppError::from(e).into_response()),
            };

            if claimed.is_some_and(|claimed| claimed != user_id) {
                tracing::warn!(
                    user_id = %user_id,
                    claimed = ?claimed,
                    "Requester header does not match session"
                );
                return Err(reject(
                    StatusCode::FORBIDDEN,
                    "X-Request-User-Id does not match the session",
                    "requester_mismatch",
                ));
            }
            Some(user_id)
        }
        (None, Some(_)) => {
            return Err(reject(
                StatusCode::UNAUTHORIZED,
                "X-Request-User-Id requires a session token",
                "unauthenticated",
            ));
        }
        (None, None) => None,
    };

    if let Some(user_id) = requester {
        context = context.with_requester(user_id);
    }

    if let Some(correlation_id) = headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
    {
        context = context.with_correlation_id(correlation_id);
    }
    context.ensure_correlation_id();

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        context = context.with_client_ip(addr.ip());
    }

    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "proxy-authorization"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware. Runs inside [`context_middleware`].
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    let headers = mask_headers_for_logging(request.headers());

    let (correlation_id, requester) = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| (ctx.correlation_id, ctx.requester))
        .unwrap_or((None, None));

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        correlation_id = ?correlation_id,
        requester = ?requester,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_headers_for_logging() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        headers.insert("x-request-user-id", "42".parse().unwrap());

        let masked = mask_headers_for_logging(&headers);

        let auth = masked.iter().find(|(k, _)| k == "authorization");
        let content_type = masked.iter().find(|(k, _)| k == "content-type");
        let user_id = masked.iter().find(|(k, _)| k == "x-request-user-id");

        assert_eq!(auth.unwrap().1, "[REDACTED]");
        assert_eq!(content_type.unwrap().1, "application/json");
        assert_eq!(user_id.unwrap().1, "42");
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), Ok(None));

        headers.insert("authorization", "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Ok(Some("abc123")));

        headers.insert("authorization", "bearer  abc123 ".parse().unwrap());
        assert_eq!(bearer_token(&headers), Ok(Some("abc123")));

        headers.insert("authorization", "Basic dXNlcjpwdw==".parse().unwrap());
        assert_eq!(bearer_token(&headers), Err(()));

        headers.insert("authorization", "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), Err(()));
    }

    #[test]
    fn test_sensitive_headers_list() {
        assert!(SENSITIVE_HEADERS.contains(&"authorization"));
        assert!(SENSITIVE_HEADERS.contains(&"cookie"));
        assert!(!SENSITIVE_HEADERS.contains(&"content-type"));
    }
}
