use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meetpoint_backend::api;
use meetpoint_backend::auth::AuthService;
use meetpoint_backend::config::Config;
use meetpoint_backend::persistence::{create_pool, MeetingDirectory, MeetingRepository, RecordSink};
use meetpoint_backend::signaling::{RandomPicker, SignalingService};
use meetpoint_backend::state::AppState;
use meetpoint_backend::ws::ws_routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting MeetPoint Backend...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        host = %config.server_host,
        port = %config.server_port,
        grace_ms = config.reconnect_grace_ms,
        "Configuration loaded"
    );

    // Create Redis connection pool and meeting repository
    let redis_pool = create_pool(&config)?;
    let meetings = MeetingRepository::new(redis_pool, config.meeting_ttl_seconds);

    // Test Redis connection
    match meetings.health_check().await {
        Ok(true) => tracing::info!("Redis connection established"),
        Ok(false) => tracing::warn!("Redis health check returned false"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to Redis");
            // Continue anyway, might recover later
        }
    }

    // Create auth service
    let auth = AuthService::new(&config);

    // Create the signaling core; one instance for the whole process,
    // injected by reference into every connection handler.
    let directory: Arc<dyn MeetingDirectory> = Arc::new(meetings.clone());
    let records: Arc<dyn RecordSink> = Arc::new(meetings.clone());
    let signaling = SignalingService::new(
        directory,
        records,
        Arc::new(RandomPicker),
        config.reconnect_grace(),
    );

    // Create application state
    let state = AppState::new(config.clone(), auth, meetings, signaling);

    // Build router
    let app = Router::new()
        .merge(api::create_router(state.clone()))
        .merge(ws_routes().with_state(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = config.server_addr().parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(address = %addr, "Server listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Handle shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down...");
        },
    }
}
