//! # MVT Tiler
//!
//! A Mapbox Vector Tile server for PostGIS tables with a size-bounded disk cache.
//!
//! Tiles are generated on demand by the spatial engine. This crate decides how
//! each tile is generated (which pre-simplified geometry tier to read, whether
//! to cluster points, which attributes to carry) and keeps the encoded bytes in
//! an LRU disk cache with a hysteresis band so that eviction runs in bursts.
//!
//! ## Architecture
//!
//! - [`tile`] - Tile keys, zoom policy, attribute projection, disk cache and the tile service
//! - [`source`] - Per-source metadata registry
//! - [`engine`] - Spatial engine boundary and the PostGIS implementation
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mvt_tiler::{create_router, PostGisEngine, RouterConfig, TileCacheConfig, TileCacheStore, TileService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = PostGisEngine::connect(
//!         "postgres://localhost/gis",
//!         "layers",
//!         10,
//!         Duration::from_secs(30),
//!     )
//!     .await?;
//!     let cache = TileCacheStore::open(TileCacheConfig::new("./tile_cache")).await?;
//!     let service = TileService::new(Arc::new(engine), cache);
//!
//!     let router = create_router(service, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod flight;
pub mod server;
pub mod source;
pub mod tile;

// Re-export commonly used types
pub use config::{parse_byte_size, Config};
pub use engine::{
    AttributeSchema, Column, Extent, GenerationRequest, PostGisEngine, SourceCatalog,
    SpatialEngine, TileGenerator, MVT_BUFFER, MVT_EXTENT, MVT_LAYER_NAME,
};
pub use error::{CacheIoError, EngineError, TileError};
pub use flight::SingleFlight;
pub use server::{create_router, AppState, ErrorResponse, HealthResponse, RouterConfig};
pub use source::{SourceInfo, SourceRegistry, SridCheck};
pub use tile::{
    select_policy, tile_for_lat_lon, AttributeSet, CacheStats, ClusterParams, EvictionReport,
    GenerationPolicy, GeometryKind, ResolutionTier, TileCacheConfig, TileCacheStore, TileCoords,
    TileKey, TileRequest, TileResponse, TileService, TileServiceOptions,
};
