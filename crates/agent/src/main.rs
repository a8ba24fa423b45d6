//! Telemetry Agent - periodic collection, analysis and reporting
//!
//! Runs the telemetry pipeline against simulated units and exposes
//! liveness, readiness and Prometheus endpoints.

use anyhow::Result;
use std::sync::Arc;
use telemetry_lib::{
    health::HealthRegistry,
    models::UnitConfig,
    source::{SimulatedUnitSource, SnapshotSource, UnitRegistry},
    MetricsStore, Pipeline,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting telemetry-agent");

    let config = config::AgentConfig::load()?;
    info!(
        node_name = %config.node_name,
        units = config.unit_ids.len(),
        database = %config.database_path.display(),
        "Agent configured"
    );

    let store = Arc::new(MetricsStore::open(&config.database_path)?);
    let registry = Arc::new(UnitRegistry::from_units(
        config.unit_ids.iter().map(|id| UnitConfig::new(id.as_str())),
    ));
    let source = SnapshotSource::new(Arc::new(SimulatedUnitSource::new()));

    let health_registry = HealthRegistry::new();
    let mut pipeline = Pipeline::builder()
        .store(store)
        .source(source)
        .registry(registry)
        .health(health_registry.clone())
        .node_name(config.node_name.clone())
        .config(config.pipeline_config())
        .build()?;

    let app_state = Arc::new(api::AppState::new(health_registry));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    pipeline.start().await?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            pipeline.shutdown("SIGINT received").await;
        }
        result = api_handle => {
            let reason = match result {
                Ok(Ok(())) => "API server stopped".to_string(),
                Ok(Err(e)) => format!("API server failed: {e}"),
                Err(e) => format!("API server task failed: {e}"),
            };
            error!(reason = %reason, "Stopping pipeline");
            pipeline.shutdown(&reason).await;
        }
    }

    info!("Shut down");
    Ok(())
}
