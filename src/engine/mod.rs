//! Spatial engine boundary.
//!
//! The spatial engine owns the data and does the geometry work: simplification,
//! clustering aggregation and MVT encoding. This crate only decides which
//! parameters to pass it. Two traits describe the boundary:
//!
//! - [`SourceCatalog`]: schema introspection (geometry column, geometry type,
//!   extent, SRID, attribute columns)
//! - [`TileGenerator`]: encodes one tile given a resolved generation request
//!
//! [`PostGisEngine`] implements both against a PostGIS database.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       TileService / SourceRegistry      │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   SourceCatalog + TileGenerator traits  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     PostGisEngine (sqlx, PgPool)        │
//! └─────────────────────────────────────────┘
//! ```

mod postgis;
pub mod sql;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::error::EngineError;
use crate::source::SourceInfo;
use crate::tile::{AttributeSet, GenerationPolicy, TileKey};

pub use postgis::{PostGisEngine, DEFAULT_SCHEMA};

/// Name of the single layer written into every tile.
pub const MVT_LAYER_NAME: &str = "features";

/// Tile extent in MVT coordinate units.
pub const MVT_EXTENT: u32 = 4096;

/// Clip buffer around the tile, in MVT coordinate units.
pub const MVT_BUFFER: u32 = 256;

/// A non-geometry column of a source table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Ordered non-geometry columns of a source, as reported by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSchema {
    columns: Vec<Column>,
}

impl AttributeSchema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extent {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Schema introspection for source tables.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// List sources with a registered geometry column.
    async fn list_sources(&self) -> Result<Vec<String>, EngineError>;

    /// All registered geometry columns of a source, sorted by name.
    ///
    /// Empty when the source does not exist or has no geometry.
    async fn geometry_columns(&self, source: &str) -> Result<Vec<String>, EngineError>;

    /// PostGIS type name (e.g. `ST_Point`) of the first non-null geometry.
    async fn geometry_type(
        &self,
        source: &str,
        geometry_column: &str,
    ) -> Result<Option<String>, EngineError>;

    /// Bounding box of all geometries, `None` when there are none.
    async fn extent(
        &self,
        source: &str,
        geometry_column: &str,
    ) -> Result<Option<Extent>, EngineError>;

    /// SRID of the first non-null geometry.
    async fn srid(&self, source: &str, geometry_column: &str)
        -> Result<Option<i32>, EngineError>;

    /// Non-geometry columns in table order.
    async fn columns(&self, source: &str) -> Result<AttributeSchema, EngineError>;
}

/// A fully resolved tile generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub key: &'a TileKey,
    pub source: &'a SourceInfo,
    pub policy: GenerationPolicy,
    pub attributes: &'a AttributeSet,
}

impl GenerationRequest<'_> {
    /// Geometry column to read for this request.
    ///
    /// Resolution tiers use their pre-simplified column when the source has
    /// one and fall back to the base column otherwise.
    pub fn geometry_column(&self) -> &str {
        match self.policy {
            GenerationPolicy::Resolution { tier } => tier
                .column_name()
                .filter(|column| self.source.has_tier_column(column))
                .unwrap_or(self.source.geometry_column()),
            _ => self.source.geometry_column(),
        }
    }
}

/// Boundary call to the spatial engine that encodes tiles.
#[async_trait]
pub trait TileGenerator: Send + Sync {
    /// Encode one tile. `Ok(None)` means no features intersect the tile.
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Option<Bytes>, EngineError>;
}

/// An engine providing both introspection and tile generation.
pub trait SpatialEngine: SourceCatalog + TileGenerator + 'static {}

impl<T: SourceCatalog + TileGenerator + 'static> SpatialEngine for T {}

/// Bound an engine call by `limit`; expiry becomes [`EngineError::Timeout`].
pub async fn with_timeout<T, F>(
    limit: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(EngineError::Timeout {
            operation,
            limit,
        }))
}
