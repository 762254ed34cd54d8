use dotenvy::dotenv;
use inventory_service::config::get_configuration;
use inventory_service::services::{metrics, Database};
use inventory_service::startup::{build_router, AppState};
use service_core::observability::logging::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        "inventory-service",
        &configuration.log_level,
        &configuration.otlp_endpoint,
    );

    metrics::init();

    let db = Database::new(
        &configuration.database.url,
        configuration.database.max_connections,
        configuration.database.min_connections,
    )
    .await?;

    db.run_migrations().await?;

    let app = build_router(AppState::new(db));

    let address = format!("{}:{}", configuration.host, configuration.port);
    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
        anyhow::anyhow!("Failed to bind to address {}: {}", address, e)
    })?;

    info!("Starting inventory-service on {}", address);
    axum::serve(listener, app).await.map_err(|e| {
        tracing::error!("Server error: {}", e);
        anyhow::anyhow!("Server error: {}", e)
    })?;

    Ok(())
}
