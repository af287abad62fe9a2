//! Tile Service for orchestrating tile generation.
//!
//! The TileService is the main entry point for tile requests. It orchestrates:
//! - Key validation (before any I/O)
//! - Cache lookups
//! - Source metadata resolution via the registry
//! - Policy selection and attribute projection
//! - The generation call to the spatial engine
//! - Result caching
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Validate key      4. Select policy + attributes     │    │
//! │  │  2. Check cache       5. Generate (with timeout)        │    │
//! │  │  3. Resolve source    6. Cache & return                 │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │  ┌────────────────┐   ┌────────────────┐   ┌────────────────┐   │
//! │  │ TileCacheStore │   │ SourceRegistry │   │ TileGenerator  │   │
//! │  └────────────────┘   └────────────────┘   └────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed generation is reported once and never retried internally. Cache
//! failures are logged and absorbed: an unreadable entry is regenerated and a
//! failed write still returns the generated tile.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::engine::{with_timeout, GenerationRequest, SpatialEngine};
use crate::error::{CacheIoError, TileError};
use crate::flight::SingleFlight;
use crate::source::{SourceRegistry, DEFAULT_SOURCE_CACHE_CAPACITY};

use super::attributes::AttributeSet;
use super::cache::TileCacheStore;
use super::key::TileKey;
use super::policy::select_policy;

/// Default limit for a single engine call.
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Tile Request / Response
// =============================================================================

/// A request for a tile, as received from a client.
#[derive(Debug, Clone)]
pub struct TileRequest {
    /// Source table name
    pub source: String,

    /// Zoom level
    pub z: u32,

    /// Tile column
    pub x: u32,

    /// Tile row
    pub y: u32,
}

impl TileRequest {
    pub fn new(source: impl Into<String>, z: u32, x: u32, y: u32) -> Self {
        Self {
            source: source.into(),
            z,
            x,
            y,
        }
    }
}

/// Response from the tile service.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// Encoded MVT tile, empty when no features intersect the tile
    pub data: Bytes,

    /// Whether this tile was served from cache
    pub cache_hit: bool,
}

/// Snapshot of the tile cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size_bytes: u64,
    pub capacity_bytes: u64,
    pub entries: usize,
}

// =============================================================================
// Options
// =============================================================================

/// Tunables for a [`TileService`].
#[derive(Debug, Clone)]
pub struct TileServiceOptions {
    /// Limit applied to each engine call
    pub engine_timeout: Duration,

    /// Number of sources whose metadata is kept in memory
    pub source_cache_capacity: usize,

    /// Coalesce concurrent misses for the same tile
    pub single_flight: bool,
}

impl Default for TileServiceOptions {
    fn default() -> Self {
        Self {
            engine_timeout: DEFAULT_ENGINE_TIMEOUT,
            source_cache_capacity: DEFAULT_SOURCE_CACHE_CAPACITY,
            single_flight: true,
        }
    }
}

// =============================================================================
// Tile Service
// =============================================================================

/// Service for generating and caching tiles.
///
/// # Type Parameters
///
/// * `E` - The spatial engine (e.g. [`PostGisEngine`](crate::engine::PostGisEngine))
pub struct TileService<E: SpatialEngine> {
    /// Engine used for tile generation
    engine: Arc<E>,

    /// Source metadata, resolved once per source
    registry: SourceRegistry<E>,

    /// Disk cache for encoded tiles
    cache: TileCacheStore,

    /// In-flight generations, when coalescing is enabled
    in_flight: Option<SingleFlight<TileKey, Result<Bytes, TileError>>>,

    /// Limit applied to each engine call
    timeout: Duration,
}

impl<E: SpatialEngine> TileService<E> {
    /// Create a tile service with default options.
    pub fn new(engine: Arc<E>, cache: TileCacheStore) -> Self {
        Self::with_options(engine, cache, TileServiceOptions::default())
    }

    /// Create a tile service.
    ///
    /// # Arguments
    ///
    /// * `engine` - Spatial engine for introspection and generation
    /// * `cache` - Opened tile cache store
    /// * `options` - Timeouts, metadata cache size and coalescing
    pub fn with_options(engine: Arc<E>, cache: TileCacheStore, options: TileServiceOptions) -> Self {
        Self {
            registry: SourceRegistry::new(
                engine.clone(),
                options.source_cache_capacity,
                options.engine_timeout,
            ),
            engine,
            cache,
            in_flight: options.single_flight.then(SingleFlight::new),
            timeout: options.engine_timeout,
        }
    }

    /// Get a tile, using the cache when available.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The source name or tile coordinates are invalid (nothing is read)
    /// - The source has no geometry column or an unsupported geometry type
    /// - The engine fails or times out
    pub async fn get_tile(&self, request: TileRequest) -> Result<TileResponse, TileError> {
        let key = TileKey::new(request.source, request.z, request.x, request.y)?;

        if let Some(data) = self.cache.get(&key).await {
            debug!(tile = %key, bytes = data.len(), "Tile cache hit");
            return Ok(TileResponse {
                data,
                cache_hit: true,
            });
        }

        let data = match &self.in_flight {
            Some(in_flight) => {
                in_flight
                    .run(key.clone(), || self.generate_and_store(&key))
                    .await?
            }
            None => self.generate_and_store(&key).await?,
        };

        Ok(TileResponse {
            data,
            cache_hit: false,
        })
    }

    /// Generate a tile and write it to the cache.
    async fn generate_and_store(&self, key: &TileKey) -> Result<Bytes, TileError> {
        let data = self.generate_tile(key).await?;

        if let Err(err) = self.cache.put(key, &data).await {
            log_cache_write_failure(key, &err);
        }
        Ok(data)
    }

    /// Generate a tile without consulting or updating the cache.
    pub async fn generate_tile(&self, key: &TileKey) -> Result<Bytes, TileError> {
        let source = self.registry.get_source(key.source()).await?;
        let policy = select_policy(source.kind(), key.z());
        let attributes = AttributeSet::project(source.attributes(), &policy);

        debug!(
            tile = %key,
            kind = ?source.kind(),
            policy = %policy,
            fields = attributes.output_names().len(),
            "Tile cache miss, generating"
        );

        let request = GenerationRequest {
            key,
            source: &source,
            policy,
            attributes: &attributes,
        };
        let tile = with_timeout(self.timeout, "tile generation", self.engine.generate(request))
            .await?;

        Ok(tile.unwrap_or_default())
    }

    /// Drop cached metadata and tiles of a source.
    pub async fn invalidate_source(&self, source: &str) -> Result<usize, TileError> {
        crate::tile::validate_source_name(source)?;
        self.registry.invalidate(source).await;
        match self.cache.purge_source(source).await {
            Ok(dropped) => Ok(dropped),
            Err(err) => {
                warn!(source, error = %err, "Failed to purge cached tiles");
                Ok(0)
            }
        }
    }

    /// Get tile cache statistics.
    pub async fn cache_stats(&self) -> CacheStats {
        CacheStats {
            size_bytes: self.cache.size().await,
            capacity_bytes: self.cache.capacity(),
            entries: self.cache.len().await,
        }
    }

    /// Get a reference to the source registry.
    pub fn registry(&self) -> &SourceRegistry<E> {
        &self.registry
    }

    /// Get a reference to the tile cache.
    pub fn cache(&self) -> &TileCacheStore {
        &self.cache
    }

    /// Whether concurrent misses for the same tile are coalesced.
    pub fn single_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}

fn log_cache_write_failure(key: &TileKey, err: &CacheIoError) {
    warn!(tile = %key, error = %err, "Failed to cache tile, serving uncached");
}

// =============================================================================
// Tests
// =============================================================================
