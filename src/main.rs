//! Event Hub - event scheduling backend API
//!
//! Accounts, events and capacity-bounded enrollments behind a JSON API.
//! Backed by PostgreSQL when `DATABASE_URL` is set, otherwise by an
//! in-memory store.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use event_hub::config::LogFormat;
use event_hub::domain::{Clock, SystemClock};
use event_hub::store::{MemoryStore, PgStore, Store};
use event_hub::{api, bootstrap, db, Config, Services};

/// Initialize tracing/logging
fn init_tracing(format: LogFormat) {
    let json = format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "event_hub=debug,tower_http=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

/// Seed the administrator and wire the services over `store`
async fn start<S: Store + 'static>(store: Arc<S>, config: &Config) -> anyhow::Result<Services> {
    bootstrap::seed_admin(store.as_ref(), &config.admin).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    Ok(Services::new(store, clock).with_session_ttl(config.session_ttl))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting event hub server");

    let mut pool: Option<PgPool> = None;
    let services = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let connected = db::connect(url, config.database_max_connections).await?;
            db::migrate(&connected).await?;

            if !db::check_schema(&connected).await? {
                tracing::error!("Database schema is not complete. Please run migrations.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }
            tracing::info!("Database connected successfully");

            let store = Arc::new(PgStore::new(connected.clone()));
            pool = Some(connected);
            start(store, &config).await?
        }
        None => {
            if config.is_production() {
                return Err(anyhow::anyhow!("DATABASE_URL is required in production"));
            }
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            start(Arc::new(MemoryStore::new()), &config).await?
        }
    };

    let app = api::build_router(services);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutting down...");
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
