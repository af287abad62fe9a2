//! MVT Tiler - a vector tile server for PostGIS tables.
//!
//! This binary starts the HTTP server and configures all components.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mvt_tiler::{
    create_router, Config, PostGisEngine, RouterConfig, TileCacheStore, TileService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("MVT Tiler v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Database: {}", config.redacted_database_url());
    info!("  Schema: {}", config.db_schema);
    info!(
        "  Cache: {} ({} bytes, cleanup to {:.0}%)",
        config.cache_dir.display(),
        config.cache_capacity,
        config.cache_cleanup_fraction * 100.0
    );
    info!(
        "  Engine timeout: {}s, single-flight: {}",
        config.engine_timeout_secs, config.single_flight
    );

    info!("Connecting to database...");
    let engine = match PostGisEngine::connect(
        &config.database_url,
        config.db_schema.clone(),
        config.db_max_connections,
        config.engine_timeout(),
    )
    .await
    {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cache = match TileCacheStore::open(config.cache_config()).await {
        Ok(cache) => cache,
        Err(e) => {
            error!("Failed to open tile cache: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "  Tile cache holds {} tile(s), {} bytes",
        cache.len().await,
        cache.size().await
    );

    let tile_service = TileService::with_options(Arc::new(engine), cache, config.service_options());
    let router = create_router(tile_service, build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/tiling/sources", addr);
    info!("  curl http://{}/tiling/mvt/<source>/0/0/0.pbf", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "mvt_tiler=debug,tower_http=debug"
    } else {
        "mvt_tiler=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}
