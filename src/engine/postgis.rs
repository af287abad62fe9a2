//! PostGIS-backed spatial engine.
//!
//! All sources live in one schema (`layers` by default). Identifiers are
//! validated by the callers and quoted by [`sql`](super::sql); values are
//! always bound.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::debug;

use crate::error::EngineError;

use super::sql;
use super::{AttributeSchema, Column, Extent, GenerationRequest, SourceCatalog, TileGenerator};

/// Schema holding the source tables unless configured otherwise.
pub const DEFAULT_SCHEMA: &str = "layers";

/// Spatial engine backed by a PostgreSQL/PostGIS connection pool.
#[derive(Clone)]
pub struct PostGisEngine {
    pool: PgPool,
    schema: String,
}

impl PostGisEngine {
    /// Connect a pool to `database_url`.
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    /// * `schema` - Schema holding the source tables
    /// * `max_connections` - Pool size
    /// * `acquire_timeout` - Maximum wait for a pooled connection
    pub async fn connect(
        database_url: &str,
        schema: impl Into<String>,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, EngineError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self::from_pool(pool, schema))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SourceCatalog for PostGisEngine {
    async fn list_sources(&self) -> Result<Vec<String>, EngineError> {
        let sources = sqlx::query_scalar::<_, String>(sql::LIST_SOURCES)
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await?;
        Ok(sources)
    }

    async fn geometry_columns(&self, source: &str) -> Result<Vec<String>, EngineError> {
        let columns = sqlx::query_scalar::<_, String>(sql::GEOMETRY_COLUMNS)
            .bind(&self.schema)
            .bind(source)
            .fetch_all(&self.pool)
            .await?;
        Ok(columns)
    }

    async fn geometry_type(
        &self,
        source: &str,
        geometry_column: &str,
    ) -> Result<Option<String>, EngineError> {
        let query = sql::geometry_type_query(&self.schema, source, geometry_column);
        let geometry_type = sqlx::query_scalar::<_, Option<String>>(&query)
            .fetch_optional(&self.pool)
            .await?;
        Ok(geometry_type.flatten())
    }

    async fn extent(
        &self,
        source: &str,
        geometry_column: &str,
    ) -> Result<Option<Extent>, EngineError> {
        let query = sql::extent_query(&self.schema, source, geometry_column);
        let row = sqlx::query_as::<_, (Option<f64>, Option<f64>, Option<f64>, Option<f64>)>(&query)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some((Some(west), Some(south), Some(east), Some(north))) => Some(Extent {
                west,
                south,
                east,
                north,
            }),
            _ => None,
        })
    }

    async fn srid(
        &self,
        source: &str,
        geometry_column: &str,
    ) -> Result<Option<i32>, EngineError> {
        let query = sql::srid_query(&self.schema, source, geometry_column);
        let srid = sqlx::query_scalar::<_, Option<i32>>(&query)
            .fetch_optional(&self.pool)
            .await?;
        Ok(srid.flatten())
    }

    async fn columns(&self, source: &str) -> Result<AttributeSchema, EngineError> {
        let rows = sqlx::query_as::<_, (String, String)>(sql::ATTRIBUTE_COLUMNS)
            .bind(&self.schema)
            .bind(source)
            .fetch_all(&self.pool)
            .await?;

        Ok(AttributeSchema::new(
            rows.into_iter()
                .map(|(name, data_type)| Column::new(name, data_type))
                .collect(),
        ))
    }
}

#[async_trait]
impl TileGenerator for PostGisEngine {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Option<Bytes>, EngineError> {
        let query = sql::tile_query(&self.schema, &request);
        let key = request.key;

        debug!(
            source = key.source(),
            z = key.z(),
            x = key.x(),
            y = key.y(),
            geometry_column = request.geometry_column(),
            policy = %request.policy,
            "Generating tile"
        );

        // Tile coordinates are at most 2^22 - 1 and fit in an int4.
        let mut statement = sqlx::query_scalar::<_, Option<Vec<u8>>>(&query.sql)
            .bind(i32::from(key.z()))
            .bind(key.x() as i32)
            .bind(key.y() as i32);
        if let Some(cell_size) = query.cell_size {
            statement = statement.bind(cell_size);
        }

        let tile = statement.fetch_optional(&self.pool).await?;
        Ok(tile.flatten().filter(|data| !data.is_empty()).map(Bytes::from))
    }
}
