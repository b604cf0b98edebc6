//! Tile Visualizer
//!
//! Thin backend for the tile visualization marketing site: accepts a room
//! photo plus a material swatch, delegates the material replacement to a
//! hosted generative image model, and serves back a post-processed result
//! fitted to the original photo's dimensions.

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;

mod api;
mod config;
mod domain;
mod engine;
mod providers;
#[cfg(test)]
mod test_util;

use crate::config::Settings;
use crate::domain::TileCatalog;
use crate::engine::Visualizer;
use crate::providers::ReplicateClient;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,
    pub catalog: Arc<TileCatalog>,
    pub visualizer: Arc<Visualizer>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tile_visualizer=info".parse().unwrap())
                .add_directive("actix_web=info".parse().unwrap())
        )
        .json()
        .init();

    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);

    info!(
        "Starting Tile Visualizer v{} on {}",
        env!("CARGO_PKG_VERSION"),
        bind_addr
    );

    if std::env::var("REPLICATE_API_TOKEN").map(|t| t.trim().is_empty()).unwrap_or(true) {
        // The server still comes up (health checks, artifact serving);
        // visualization requests will fail until the token is provided.
        tracing::warn!("REPLICATE_API_TOKEN is not set; transform requests will fail");
    }

    // Build the read-only tile catalog
    let catalog = Arc::new(TileCatalog::builtin(&settings.tiles_root()));
    info!(
        tiles = catalog.len(),
        tiles_root = %settings.tiles_root().display(),
        "Loaded tile catalog"
    );

    // Provider client and visualization pipeline
    let transformer = Arc::new(ReplicateClient::new(&settings.provider));
    let visualizer = Arc::new(Visualizer::new(transformer, &settings));

    // Optional age-based artifact sweep; the handle is detached, the task
    // lives as long as the process
    if settings.sweep.enabled {
        let _ = engine::sweeper::spawn(settings.sweep.clone(), settings.primary_public_root());
    }

    let workers = settings.server.workers.unwrap_or_else(|| num_cpus::get() * 2);

    // Create shared application state
    let app_state = web::Data::new(AppState {
        settings: settings.clone(),
        catalog,
        visualizer,
    });

    // Configure and start HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            // Middleware (order matters)
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Service", "tile-visualizer"))
                    .add(("X-Version", env!("CARGO_PKG_VERSION")))
            )
            // Routes
            .configure(api::configure_routes)
            // Unmatched routes answer JSON, never HTML
            .default_service(web::route().to(api::handlers::not_found))
    })
    .workers(workers)
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {bind_addr}"))?
    .run()
    .await?;

    Ok(())
}
