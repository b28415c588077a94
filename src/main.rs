// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::connector::Connector;
use crate::application::connector_service::ConnectorService;
use crate::application::events::ConnectorEvent;
use crate::application::importer::{Importer, Transport};
use crate::infrastructure::config::load_connector_config;
use crate::infrastructure::fingrid_importer::FingridImporter;
use crate::infrastructure::fmi_importer::FmiImporter;
use crate::infrastructure::http_transport::HttpTransport;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    activate_series, deactivate_series, get_series, health_check, list_sources, load_data_sets,
    load_preferences, resize_window, save_data_sets, save_preferences,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = load_connector_config()?;
    let api_key = config.fingrid.api_key()?;

    // Create transport and importers (infrastructure layer)
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(reply_tx));
    let importers: Vec<Box<dyn Importer>> = vec![
        Box::new(FmiImporter::new(0, &config.fmi, transport.clone())),
        Box::new(FingridImporter::new(1, &config.fingrid, api_key, transport)),
    ];

    // Create the connector service (application layer)
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let window = config.window.initial_window(Utc::now());
    let connector = Connector::new(importers, window, event_tx);
    let (service, handle) = ConnectorService::new(
        connector,
        reply_rx,
        config.fetch.stale_after(),
        config.fetch.sweep_interval(),
    );
    tokio::spawn(service.run());
    tokio::spawn(log_events(event_rx));

    let state = Arc::new(AppState { connector: handle });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/sources", get(list_sources))
        .route("/series", get(get_series))
        .route("/series/activate", post(activate_series))
        .route("/series/deactivate", post(deactivate_series))
        .route("/window", put(resize_window))
        .route("/datasets/save", post(save_data_sets))
        .route("/datasets/load", post(load_data_sets))
        .route("/preferences/save", post(save_preferences))
        .route("/preferences/load", post(load_preferences))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    tracing::info!(
        "Starting weather-electric-connector on {} with window {} .. {}",
        addr,
        window.start,
        window.end
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}

/// Stands in for a display: reports every connector event.
async fn log_events(mut events: mpsc::UnboundedReceiver<ConnectorEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectorEvent::SeriesReady {
                name,
                unit,
                points,
                magnitude,
                ..
            } => tracing::info!(
                "{} ready: {} points, magnitude {:.1} {}",
                name,
                points.len(),
                magnitude,
                unit
            ),
            ConnectorEvent::PointsAdded {
                name,
                points,
                add_before,
            } => tracing::info!(
                "{}: {} points added {}",
                name,
                points.len(),
                if add_before { "before" } else { "after" }
            ),
            ConnectorEvent::PointsRemoved {
                name,
                index,
                remove_before,
            } => tracing::info!(
                "{}: points {} index {} removed",
                name,
                if remove_before { "before" } else { "from" },
                index
            ),
            ConnectorEvent::SeriesRebuildRequired { source } => {
                tracing::info!("{} must be rebuilt", source.series_name)
            }
            ConnectorEvent::MetricsChanged {
                name,
                magnitude,
                extent,
            } => tracing::debug!(
                "{}: magnitude {:.1}, extent {:?}",
                name,
                magnitude,
                extent.bounds()
            ),
            ConnectorEvent::SourceRestored { source } => {
                tracing::info!("{} restored from file", source.series_name)
            }
        }
    }
}
