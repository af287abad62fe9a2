//! Tile generation and caching.
//!
//! # Architecture
//!
//! The tile service sits between the HTTP layer and the spatial engine:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ TileCache    │  │ Policy +        │  │
//! │  │ Store (disk, │  │ Attribute       │  │
//! │  │ LRU)         │  │ projection      │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   SourceRegistry + TileGenerator        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: entry point for tile requests, orchestrates the pipeline
//! - [`TileCacheStore`]: disk cache with size-based LRU eviction
//! - [`TileKey`]: validated `(source, z, x, y)` address
//! - [`select_policy`]: zoom-dependent resolution tier or clustering parameters
//! - [`AttributeSet`]: fields projected into a tile under a policy

mod attributes;
mod cache;
mod key;
mod policy;
mod service;

pub use attributes::{is_identifier_like, Aggregation, AttributeSet, POINT_COUNT_FIELD};
pub use cache::{
    EvictionReport, TileCacheConfig, TileCacheStore, DEFAULT_CACHE_CAPACITY,
    DEFAULT_CLEANUP_FRACTION, MIN_ENTRY_COST,
};
pub use key::{
    tile_for_lat_lon, tiles_per_axis, validate_source_name, TileCoords, TileKey,
    MAX_MERCATOR_LAT, MAX_SOURCE_NAME_LEN, MAX_ZOOM, TILE_FILE_EXTENSION,
};
pub use policy::{select_policy, ClusterParams, GenerationPolicy, GeometryKind, ResolutionTier};
pub use service::{
    CacheStats, TileRequest, TileResponse, TileService, TileServiceOptions,
    DEFAULT_ENGINE_TIMEOUT,
};
