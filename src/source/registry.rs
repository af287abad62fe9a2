//! Source registry for resolving and caching source metadata.
//!
//! The registry provides:
//! - LRU caching of resolved [`SourceInfo`] so geometry kind and attribute
//!   schema are looked up once per source, not per tile
//! - Single-flight loading so concurrent first requests for a source issue one
//!   set of catalog queries
//! - Timeouts around every catalog call
//!
//! Failed loads are not cached; the next request retries.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::RwLock;
use tracing::debug;

use crate::engine::{with_timeout, AttributeSchema, Extent, SourceCatalog};
use crate::error::TileError;
use crate::flight::SingleFlight;
use crate::tile::{validate_source_name, GeometryKind, ResolutionTier};

use super::{SourceInfo, SridCheck};

// =============================================================================
// Configuration
// =============================================================================

/// Default number of sources whose metadata is kept in memory.
pub const DEFAULT_SOURCE_CACHE_CAPACITY: usize = 256;

type LoadResult = Result<Arc<SourceInfo>, TileError>;

// =============================================================================
// SourceRegistry
// =============================================================================

/// Registry resolving source metadata through a [`SourceCatalog`].
pub struct SourceRegistry<C: SourceCatalog> {
    /// Catalog used for introspection
    catalog: Arc<C>,

    /// Resolved sources indexed by name
    cache: RwLock<LruCache<String, Arc<SourceInfo>>>,

    /// In-flight loads
    in_flight: SingleFlight<String, LoadResult>,

    /// Limit applied to each catalog call
    timeout: Duration,
}

impl<C: SourceCatalog> SourceRegistry<C> {
    /// Create a registry.
    ///
    /// # Arguments
    /// * `catalog` - Catalog used for introspection
    /// * `capacity` - Maximum number of cached sources (minimum 1)
    /// * `timeout` - Limit applied to each catalog call
    pub fn new(catalog: Arc<C>, capacity: usize, timeout: Duration) -> Self {
        Self {
            catalog,
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            in_flight: SingleFlight::new(),
            timeout,
        }
    }

    /// Get the resolved metadata of a source, loading it on first use.
    pub async fn get_source(&self, name: &str) -> LoadResult {
        validate_source_name(name)?;

        {
            let mut cache = self.cache.write().await;
            if let Some(info) = cache.get(name) {
                return Ok(info.clone());
            }
        }

        self.in_flight
            .run(name.to_string(), || async {
                let result = self.load_source(name).await.map(Arc::new);
                if let Ok(ref info) = result {
                    let mut cache = self.cache.write().await;
                    cache.put(name.to_string(), info.clone());
                }
                result
            })
            .await
    }

    async fn load_source(&self, name: &str) -> Result<SourceInfo, TileError> {
        let columns = self.geometry_columns(name).await?;
        let (tiers, base): (Vec<String>, Vec<String>) = columns
            .into_iter()
            .partition(|c| ResolutionTier::is_tier_column(c));

        let geometry_column =
            base.into_iter()
                .next()
                .ok_or_else(|| TileError::MissingGeometryColumn {
                    source_name: name.to_string(),
                })?;

        let geometry_type = with_timeout(
            self.timeout,
            "geometry type lookup",
            self.catalog.geometry_type(name, &geometry_column),
        )
        .await?
        .unwrap_or_default();

        let kind = GeometryKind::from_geometry_type(&geometry_type).ok_or_else(|| {
            TileError::UnknownGeometryKind {
                source_name: name.to_string(),
                geometry_type: if geometry_type.is_empty() {
                    "no geometries".to_string()
                } else {
                    geometry_type.clone()
                },
            }
        })?;

        let attributes = self.columns(name).await?;

        debug!(
            source = name,
            geometry_column = %geometry_column,
            geometry_type = %geometry_type,
            tiers = tiers.len(),
            attributes = attributes.columns().len(),
            "Resolved source"
        );

        Ok(SourceInfo::new(
            name,
            geometry_column,
            tiers,
            geometry_type,
            kind,
            attributes,
        ))
    }

    async fn geometry_columns(&self, name: &str) -> Result<Vec<String>, TileError> {
        Ok(with_timeout(
            self.timeout,
            "geometry column lookup",
            self.catalog.geometry_columns(name),
        )
        .await?)
    }

    /// Full-resolution geometry column of a source, if it has one.
    async fn base_geometry_column(&self, name: &str) -> Result<Option<String>, TileError> {
        validate_source_name(name)?;
        Ok(self
            .geometry_columns(name)
            .await?
            .into_iter()
            .find(|c| !ResolutionTier::is_tier_column(c)))
    }

    async fn columns(&self, name: &str) -> Result<AttributeSchema, TileError> {
        Ok(with_timeout(self.timeout, "column lookup", self.catalog.columns(name)).await?)
    }

    // -------------------------------------------------------------------------
    // Metadata lookups (uncached)
    // -------------------------------------------------------------------------

    /// Tables with a geometry column at SRID 4326.
    pub async fn list_sources(&self) -> Result<Vec<String>, TileError> {
        let mut sources =
            with_timeout(self.timeout, "source listing", self.catalog.list_sources()).await?;
        sources.sort();
        Ok(sources)
    }

    /// Geometry type of the first non-null geometry, `None` when the source
    /// has no geometry column or no geometries.
    pub async fn geometry_type(&self, name: &str) -> Result<Option<String>, TileError> {
        let Some(column) = self.base_geometry_column(name).await? else {
            return Ok(None);
        };
        Ok(with_timeout(
            self.timeout,
            "geometry type lookup",
            self.catalog.geometry_type(name, &column),
        )
        .await?)
    }

    /// Bounding box of a source, `None` when it has no geometries.
    pub async fn extent(&self, name: &str) -> Result<Option<Extent>, TileError> {
        let Some(column) = self.base_geometry_column(name).await? else {
            return Ok(None);
        };
        Ok(with_timeout(
            self.timeout,
            "extent lookup",
            self.catalog.extent(name, &column),
        )
        .await?)
    }

    /// Check that a source stores its geometry in EPSG:4326.
    pub async fn check_srid(&self, name: &str) -> Result<SridCheck, TileError> {
        let Some(column) = self.base_geometry_column(name).await? else {
            return Ok(SridCheck::no_geometry_column());
        };
        let srid = with_timeout(
            self.timeout,
            "SRID lookup",
            self.catalog.srid(name, &column),
        )
        .await?;
        Ok(SridCheck::from_srid(srid))
    }

    /// Non-geometry column names sorted alphabetically.
    pub async fn field_names(&self, name: &str) -> Result<Vec<String>, TileError> {
        validate_source_name(name)?;
        let mut names: Vec<String> = self
            .columns(name)
            .await?
            .names()
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    // -------------------------------------------------------------------------
    // Cache management
    // -------------------------------------------------------------------------

    /// Drop a source's cached metadata so the next request reloads it.
    pub async fn invalidate(&self, name: &str) {
        let mut cache = self.cache.write().await;
        cache.pop(name);
    }

    /// Drop all cached metadata.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    /// Number of sources with cached metadata.
    pub async fn cached_count(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
