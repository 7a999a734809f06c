//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::services::Services;

pub use routes::create_router;

/// Build the application router
pub fn build_router(services: Services) -> Router {
    // Layers run last-added first: context -> logging -> handler
    let api_routes = create_router()
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(axum::middleware::from_fn_with_state(
            services.clone(),
            middleware::context_middleware,
        ));

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(services)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
