//! order-relay: order API and real-time change relay
//!
//! Long-running service that:
//! - Serves CRUD endpoints for the `orders` table
//! - Holds one LISTEN connection to PostgreSQL with keep-alive and reconnect
//! - Pushes every decoded change notification to all WebSocket clients

use order_relay::config::{BoxError, Config};
use order_relay::relay::{Broadcaster, ClientRegistry, PgChangeSource, Supervisor};
use order_relay::{AppState, api};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "order_relay=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting order-relay (env: {})", config.environment);

    let pool = PgPool::connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let shutdown = CancellationToken::new();
    let registry = ClientRegistry::new(config.client_outbox_capacity);
    let broadcaster =
        Broadcaster::new(registry.clone()).with_decode_failures(config.broadcast_decode_failures);

    let supervisor = Supervisor::new(
        PgChangeSource::new(&config.database_url),
        config.supervisor(),
        broadcaster,
        shutdown.clone(),
    );
    let state = AppState::new(
        pool,
        registry.clone(),
        supervisor.status(),
        shutdown.clone(),
    );

    let supervisor_handle = tokio::spawn(supervisor.run());
    let liveness_handle = tokio::spawn(
        registry
            .clone()
            .run_liveness(config.liveness_interval, shutdown.clone()),
    );

    let app = api::create_router(state, &config.static_dir);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("order-relay listening on {addr}");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await?;

    // Timers stop before the upstream connection closes
    shutdown.cancel();
    liveness_handle.await?;
    supervisor_handle.await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown handler
///
/// Listens for SIGTERM and Ctrl+C signals
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
