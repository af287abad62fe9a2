//! Test utilities for integration tests.
//!
//! Provides an in-memory spatial engine and helpers for driving the router.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use tower::ServiceExt;

use mvt_tiler::engine::{
    AttributeSchema, Column, Extent, GenerationRequest, SourceCatalog, TileGenerator,
};
use mvt_tiler::error::EngineError;
use mvt_tiler::tile::{
    GenerationPolicy, TileCacheConfig, TileCacheStore, TileService, TileServiceOptions,
};
use mvt_tiler::{create_router, RouterConfig};

// =============================================================================
// Mock Tables
// =============================================================================

/// One table known to the mock engine.
#[derive(Debug, Clone, Default)]
pub struct MockTable {
    pub geometry_columns: Vec<String>,
    pub geometry_type: Option<String>,
    pub extent: Option<Extent>,
    pub srid: Option<i32>,
    pub columns: Vec<Column>,
}

impl MockTable {
    pub fn new(geometry_type: &str) -> Self {
        Self {
            geometry_columns: vec!["geom".to_string()],
            geometry_type: Some(geometry_type.to_string()),
            extent: Some(Extent {
                west: -10.0,
                south: 40.0,
                east: 5.0,
                north: 52.0,
            }),
            srid: Some(4326),
            columns: Vec::new(),
        }
    }

    pub fn with_tiers(mut self, tiers: &[&str]) -> Self {
        self.geometry_columns
            .extend(tiers.iter().map(|t| t.to_string()));
        self.geometry_columns.sort();
        self
    }

    pub fn with_columns(mut self, columns: &[(&str, &str)]) -> Self {
        self.columns = columns
            .iter()
            .map(|(name, data_type)| Column::new(*name, *data_type))
            .collect();
        self
    }

    pub fn with_srid(mut self, srid: Option<i32>) -> Self {
        self.srid = srid;
        self
    }

    /// A table with a geometry column but no rows.
    pub fn empty() -> Self {
        Self {
            geometry_columns: vec!["geom".to_string()],
            ..Default::default()
        }
    }
}

// =============================================================================
// Mock Engine
// =============================================================================

/// What the engine was asked to generate.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub tile: String,
    pub policy: GenerationPolicy,
    pub geometry_column: String,
    pub fields: Vec<String>,
}

/// An in-memory spatial engine that tracks generation calls.
pub struct MockEngine {
    tables: HashMap<String, MockTable>,
    tile: Option<Bytes>,
    fail: Option<EngineError>,
    delay: Duration,
    generate_calls: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            tile: Some(Bytes::from_static(b"\x1a\x0cfeatures-mvt")),
            fail: None,
            delay: Duration::ZERO,
            generate_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_table(mut self, name: &str, table: MockTable) -> Self {
        self.tables.insert(name.to_string(), table);
        self
    }

    /// Every tile comes back with this payload.
    pub fn with_tile(mut self, payload: impl Into<Bytes>) -> Self {
        self.tile = Some(payload.into());
        self
    }

    /// No features intersect any tile.
    pub fn with_empty_tiles(mut self) -> Self {
        self.tile = None;
        self
    }

    pub fn with_failure(mut self, err: EngineError) -> Self {
        self.fail = Some(err);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests().last().cloned().expect("no tile generated")
    }

    fn table(&self, source: &str) -> Option<&MockTable> {
        self.tables.get(source)
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceCatalog for MockEngine {
    async fn list_sources(&self) -> Result<Vec<String>, EngineError> {
        Ok(self
            .tables
            .iter()
            .filter(|(_, t)| t.srid == Some(4326) && !t.geometry_columns.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn geometry_columns(&self, source: &str) -> Result<Vec<String>, EngineError> {
        Ok(self
            .table(source)
            .map(|t| t.geometry_columns.clone())
            .unwrap_or_default())
    }

    async fn geometry_type(
        &self,
        source: &str,
        _geometry_column: &str,
    ) -> Result<Option<String>, EngineError> {
        Ok(self.table(source).and_then(|t| t.geometry_type.clone()))
    }

    async fn extent(
        &self,
        source: &str,
        _geometry_column: &str,
    ) -> Result<Option<Extent>, EngineError> {
        Ok(self.table(source).and_then(|t| t.extent))
    }

    async fn srid(&self, source: &str, _geometry_column: &str) -> Result<Option<i32>, EngineError> {
        Ok(self.table(source).and_then(|t| t.srid))
    }

    async fn columns(&self, source: &str) -> Result<AttributeSchema, EngineError> {
        Ok(AttributeSchema::new(
            self.table(source)
                .map(|t| t.columns.clone())
                .unwrap_or_default(),
        ))
    }
}

#[async_trait]
impl TileGenerator for MockEngine {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Option<Bytes>, EngineError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(RecordedRequest {
            tile: request.key.to_string(),
            policy: request.policy,
            geometry_column: request.geometry_column().to_string(),
            fields: request
                .attributes
                .fields()
                .iter()
                .map(|f| f.to_string())
                .collect(),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = &self.fail {
            return Err(err.clone());
        }
        Ok(self.tile.clone())
    }
}

/// Engine with the tables used across the integration tests.
///
/// - `roads`: lines with two pre-simplified tiers
/// - `pois`: points
/// - `empty`: geometry column, no rows
/// - `legacy`: points stored without an SRID
pub fn sample_engine() -> MockEngine {
    MockEngine::new()
        .with_table(
            "roads",
            MockTable::new("ST_LineString")
                .with_tiers(&["geom_z_0_3", "geom_z_3_6"])
                .with_columns(&[("gid", "int4"), ("name", "text"), ("road_id", "int8")]),
        )
        .with_table(
            "pois",
            MockTable::new("ST_Point").with_columns(&[
                ("id", "int4"),
                ("name", "text"),
                ("category", "text"),
                ("point_count", "int4"),
            ]),
        )
        .with_table("empty", MockTable::empty())
        .with_table(
            "legacy",
            MockTable::new("ST_Point")
                .with_srid(Some(0))
                .with_columns(&[("label", "text")]),
        )
}

// =============================================================================
// Router Helpers
// =============================================================================

/// A router over `engine` with a fresh cache under `cache_dir`.
pub async fn build_router(engine: Arc<MockEngine>, cache_dir: &Path, capacity: u64) -> Router {
    build_router_with(engine, cache_dir, capacity, TileServiceOptions::default()).await
}

pub async fn build_router_with(
    engine: Arc<MockEngine>,
    cache_dir: &Path,
    capacity: u64,
    options: TileServiceOptions,
) -> Router {
    let cache = TileCacheStore::open(TileCacheConfig::new(cache_dir).with_capacity(capacity))
        .await
        .unwrap();
    let service = TileService::with_options(engine, cache, options);
    create_router(service, RouterConfig::new().with_tracing(false))
}

/// Send a GET request and collect the response.
pub async fn get(router: &Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

/// Parse a JSON response body.
pub fn json(body: &Bytes) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}
