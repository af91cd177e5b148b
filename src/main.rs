use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use flood_watch::common::AppState;
use flood_watch::config::{Config, Deployment};
use flood_watch::routes;
use flood_watch::store::PgStore;
use flood_watch::sync::scheduler;

fn init_tracing(deployment: Deployment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,flood_watch=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if deployment.json_logs() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Log how the long-lived views came up. Serving starts regardless; requests
/// wait on views that are still loading.
async fn report_warmup(state: &AppState) {
    let timeout = state.config.view_ready_timeout();
    match state.views.statuses.ready_within(timeout).await {
        Ok(snapshot) => tracing::info!(sensors = snapshot.items.len(), "Status view ready"),
        Err(e) => tracing::warn!(error = %e, "Status view not ready at startup"),
    }
    match state.views.today_ready(timeout).await {
        Ok((window, snapshot)) => tracing::info!(
            day = %window.date(),
            readings = snapshot.items.len(),
            "Today's readings view ready"
        ),
        Err(e) => tracing::warn!(error = %e, "Readings view not ready at startup"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first: it decides the log format (fail-fast)
    let config = Config::from_env()?;
    init_tracing(config.deployment);

    tracing::info!(
        deployment = ?config.deployment,
        host = %config.api_host,
        port = config.api_port,
        channel = %config.change_channel,
        reject_stale = config.reconcile_reject_stale,
        "Starting flood-watch"
    );

    let db = Database::connect(&config.database_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Store connected and migrated");

    let store = PgStore::new(db, config.change_channel.clone(), config.subscription_buffer);
    let state = AppState::new(Arc::new(store), config.clone());

    tokio::spawn(scheduler::run_day_rollover(state.clone()));
    tokio::spawn(scheduler::run_cache_invalidation(state.clone()));
    report_warmup(&state).await;

    let app = routes::build_router(state);

    let addr = config.bind_address();
    tracing::info!(address = %addr, "Listening");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        },
    }
}
