//! Router configuration for the tile server.
//!
//! # Route Structure
//!
//! ```text
//! /health                                   - Health check
//! /tiling/mvt/{source}/{z}/{x}/{y}.pbf      - Vector tile
//! /tiling/sources                           - List sources
//! /tiling/tile-coords?lat&lon&zoom          - Tile containing a point
//! /tiling/geometry-type/{source}            - Geometry type
//! /tiling/extent/{source}                   - Bounding box
//! /tiling/check-srid/{source}               - Spatial reference check
//! /tiling/fields/{source}                   - Attribute columns
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mvt_tiler::server::routes::{create_router, RouterConfig};
//!
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(tile_service, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    check_srid_handler, extent_handler, fields_handler, geometry_type_handler, health_handler,
    sources_handler, tile_coords_handler, tile_handler, AppState,
};
use crate::engine::SpatialEngine;
use crate::tile::TileService;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a router configuration.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Cache max-age is 1 hour (3600 seconds)
    /// - Tracing is enabled
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 3600,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
pub fn create_router<E>(tile_service: TileService<E>, config: RouterConfig) -> Router
where
    E: SpatialEngine,
{
    let app_state = AppState::with_cache_max_age(tile_service, config.cache_max_age);
    let cors = build_cors_layer(&config);

    // {filename} captures "{y}", "{y}.pbf" and "{y}.mvt"
    let tiling = Router::new()
        .route("/mvt/{source}/{z}/{x}/{filename}", get(tile_handler::<E>))
        .route("/sources", get(sources_handler::<E>))
        .route("/tile-coords", get(tile_coords_handler))
        .route("/geometry-type/{source}", get(geometry_type_handler::<E>))
        .route("/extent/{source}", get(extent_handler::<E>))
        .route("/check-srid/{source}", get(check_srid_handler::<E>))
        .route("/fields/{source}", get(fields_handler::<E>))
        .with_state(app_state);

    let router = Router::new()
        .route("/health", get(health_handler))
        .nest("/tiling", tiling)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
