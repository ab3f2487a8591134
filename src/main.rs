use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chattu_relay::auth::{PostgresUserDirectory, StaticUserDirectory, UserDirectory};
use chattu_relay::config::Settings;
use chattu_relay::server::{create_app, AppState};
use chattu_relay::store::{MemoryMessageStore, MessageStore, PostgresMessageStore};
use chattu_relay::tasks::HeartbeatTask;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!("Configuration loaded");

    // Wire up the persistence and user-store collaborators
    let (store, directory): (Arc<dyn MessageStore>, Arc<dyn UserDirectory>) =
        if settings.database.url.is_some() {
            let store = Arc::new(PostgresMessageStore::connect(&settings.database).await?);
            let directory = Arc::new(PostgresUserDirectory::new(store.pool().clone()));
            (store, directory)
        } else {
            tracing::warn!("No database configured, using in-memory collaborators");
            (
                Arc::new(MemoryMessageStore::new()),
                Arc::new(StaticUserDirectory::new()),
            )
        };

    // Create application state
    let state = AppState::new(settings.clone(), store, directory);
    tracing::info!("Application state initialized");

    // Start heartbeat task in background
    let (shutdown_tx, _) = broadcast::channel(1);
    let heartbeat_task = HeartbeatTask::new(
        settings.websocket.clone(),
        state.router.hub().clone(),
        shutdown_tx.subscribe(),
    );
    let heartbeat_handle = tokio::spawn(async move {
        heartbeat_task.run().await;
    });

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    // Wait for background tasks to finish
    tracing::info!("Waiting for background tasks to finish...");
    let _ = heartbeat_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
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
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop background tasks
    let _ = shutdown_tx.send(());
}
