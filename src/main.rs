use std::net::SocketAddr;
use std::sync::Arc;

use area_engine::{
    engine::{Engine, EngineConfig, EngineStores},
    handlers::admin_router,
    services::builtin_registry,
    state::AppState,
    store::SqliteStore,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("area_engine=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:area.db".to_string());
    let bind_addr =
        std::env::var("AREA_ADMIN_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3002".to_string());
    let admin_api_token = std::env::var("AREA_ADMIN_API_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty());

    let options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let registry = Arc::new(builtin_registry()?);
    let config = EngineConfig::from_env();
    info!(
        services = registry.services().count(),
        batch_size = config.batch_size,
        max_attempts = config.retry.max_attempts,
        "engine configured",
    );

    let engine = Arc::new(Engine::new(
        EngineStores::shared(SqliteStore::new(pool)),
        registry,
        config,
    ));
    engine.start().await;

    if admin_api_token.is_none() {
        tracing::warn!("AREA_ADMIN_API_TOKEN not set, admin routes are unauthenticated");
    }
    let app = admin_router(AppState {
        engine: engine.clone(),
        admin_api_token,
    });

    let addr: SocketAddr = bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "admin server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.stop();
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
