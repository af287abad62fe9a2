//! HTTP request handlers for the tiling API.
//!
//! This module contains the Axum handlers for tile delivery and the source
//! metadata endpoints under `/tiling`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::engine::{Extent, SpatialEngine, MVT_LAYER_NAME};
use crate::error::{EngineError, TileError};
use crate::source::SridCheck;
use crate::tile::{tile_for_lat_lon, TileCoords, TileRequest, TileService};

/// Response header reporting whether a tile came from the disk cache.
pub const TILE_CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-tile-cache-hit");

/// Response header listing the MVT layers in a tile.
pub const MVT_LAYERS_HEADER: HeaderName = HeaderName::from_static("x-mvt-layers");

/// Content type of encoded vector tiles.
pub const MVT_CONTENT_TYPE: &str = "application/x-protobuf";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state passed to all handlers.
pub struct AppState<E: SpatialEngine> {
    /// The tile service
    pub tile_service: Arc<TileService<E>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,
}

impl<E: SpatialEngine> AppState<E> {
    /// Create a new application state with the default max-age of one hour.
    pub fn new(tile_service: TileService<E>) -> Self {
        Self::with_cache_max_age(tile_service, 3600)
    }

    pub fn with_cache_max_age(tile_service: TileService<E>, cache_max_age: u32) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            cache_max_age,
        }
    }
}

impl<E: SpatialEngine> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// Path parameters for tile requests.
///
/// Segments are captured as text and parsed by the handler so that malformed
/// numbers get the JSON error body. The last segment is captured whole so that
/// `12`, `12.pbf` and `12.mvt` all address the same row.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub source: String,
    pub z: String,
    pub x: String,
    pub filename: String,
}

impl TilePathParams {
    pub fn z(&self) -> Result<u32, TileError> {
        parse_number("zoom", &self.z)
    }

    pub fn x(&self) -> Result<u32, TileError> {
        parse_number("tile column", &self.x)
    }

    /// Parse the tile row from the trailing path segment.
    pub fn y(&self) -> Result<u32, TileError> {
        let raw = self
            .filename
            .strip_suffix(".pbf")
            .or_else(|| self.filename.strip_suffix(".mvt"))
            .unwrap_or(&self.filename);

        raw.parse().map_err(|_| TileError::InvalidCoordinate {
            message: format!("tile row '{}' is not a non-negative integer", self.filename),
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, TileError> {
    raw.parse().map_err(|_| TileError::InvalidCoordinate {
        message: format!("{} '{}' is not a valid number", name, raw),
    })
}

/// Query parameters for the tile-coords endpoint.
///
/// Values stay textual until the handler parses them, like the tile path.
#[derive(Debug, Deserialize)]
pub struct TileCoordsQuery {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub zoom: Option<String>,
}

// =============================================================================
// Response Types
// =============================================================================

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (for client convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SourcesResponse {
    pub sources: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeometryTypeResponse {
    #[serde(rename = "geometryType")]
    pub geometry_type: String,
}

#[derive(Debug, Serialize)]
pub struct ExtentResponse {
    pub bounds: Extent,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FieldsResponse {
    pub fields: Vec<FieldInfo>,
}

// =============================================================================
// Error Handling
// =============================================================================

/// Map a tile error to its status code and error type identifier.
fn classify(err: &TileError) -> (StatusCode, &'static str) {
    match err {
        TileError::InvalidSource { .. } => (StatusCode::BAD_REQUEST, "invalid_source"),
        TileError::InvalidZoom { .. } => (StatusCode::BAD_REQUEST, "invalid_zoom"),
        TileError::TileOutOfBounds { .. } => (StatusCode::BAD_REQUEST, "tile_out_of_bounds"),
        TileError::InvalidCoordinate { .. } => (StatusCode::BAD_REQUEST, "invalid_coordinate"),
        TileError::MissingGeometryColumn { .. } | TileError::UnknownGeometryKind { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
        }
        TileError::Upstream(EngineError::Timeout { .. }) => {
            (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout")
        }
        TileError::Upstream(EngineError::Connection(_)) => {
            (StatusCode::BAD_GATEWAY, "upstream_unavailable")
        }
        TileError::Upstream(EngineError::Database(_)) => {
            (StatusCode::BAD_GATEWAY, "upstream_error")
        }
    }
}

fn error_response(status: StatusCode, error_type: &'static str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    (
        status,
        Json(ErrorResponse::with_status(error_type, message, status)),
    )
        .into_response()
}

impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = classify(&self);
        error_response(status, error_type, self.to_string())
    }
}

/// Wrapper type for handler errors.
#[derive(Debug)]
pub struct HandlerError(pub TileError);

impl From<TileError> for HandlerError {
    fn from(err: TileError) -> Self {
        HandlerError(err)
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

/// Errors from the metadata endpoints.
#[derive(Debug)]
pub enum MetadataError {
    /// The source exists but has no geometries to describe
    NoGeometry(String),

    /// The requested metadata is absent
    NotFound(String),

    Tile(TileError),
}

impl From<TileError> for MetadataError {
    fn from(err: TileError) -> Self {
        MetadataError::Tile(err)
    }
}

impl IntoResponse for MetadataError {
    fn into_response(self) -> Response {
        match self {
            MetadataError::NoGeometry(message) => {
                error_response(StatusCode::BAD_REQUEST, "no_geometry", message)
            }
            MetadataError::NotFound(message) => {
                error_response(StatusCode::NOT_FOUND, "not_found", message)
            }
            MetadataError::Tile(err) => err.into_response(),
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /tiling/mvt/{source}/{z}/{x}/{y}.pbf`
///
/// The row segment may also end in `.mvt` or carry no extension.
///
/// # Response
///
/// - **200 OK**: encoded MVT tile (possibly empty when no features intersect)
/// - **400 Bad Request**: invalid source name, zoom or tile coordinates
/// - **500 Internal Server Error**: the source is misconfigured
/// - **502 Bad Gateway**: the spatial engine failed
/// - **504 Gateway Timeout**: the spatial engine did not answer in time
///
/// # Headers
///
/// - `Content-Type: application/x-protobuf`
/// - `Cache-Control: public, max-age=3600`
/// - `X-MVT-Layers: features`
/// - `X-Tile-Cache-Hit: true|false`
pub async fn tile_handler<E: SpatialEngine>(
    State(state): State<AppState<E>>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, HandlerError> {
    let (z, x, y) = (params.z()?, params.x()?, params.y()?);
    let request = TileRequest::new(params.source, z, x, y);

    let tile = state.tile_service.get_tile(request).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, MVT_CONTENT_TYPE.to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", state.cache_max_age),
            ),
            (MVT_LAYERS_HEADER, MVT_LAYER_NAME.to_string()),
            (TILE_CACHE_HIT_HEADER, tile.cache_hit.to_string()),
        ],
        tile.data,
    )
        .into_response())
}

/// Health check endpoint.
///
/// # Endpoint
///
/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List tile sources.
///
/// # Endpoint
///
/// `GET /tiling/sources`
///
/// # Response
///
/// Names of tables in the configured schema with a 4326 geometry column,
/// sorted alphabetically.
pub async fn sources_handler<E: SpatialEngine>(
    State(state): State<AppState<E>>,
) -> Result<Json<SourcesResponse>, HandlerError> {
    let sources = state.tile_service.registry().list_sources().await?;
    Ok(Json(SourcesResponse { sources }))
}

/// Compute the tile containing a geographic point.
///
/// # Endpoint
///
/// `GET /tiling/tile-coords?lat={lat}&lon={lon}&zoom={zoom}`
pub async fn tile_coords_handler(
    Query(query): Query<TileCoordsQuery>,
) -> Result<Json<TileCoords>, HandlerError> {
    let (Some(lat), Some(lon), Some(zoom)) = (query.lat, query.lon, query.zoom) else {
        return Err(TileError::InvalidCoordinate {
            message: "lat, lon and zoom are required".to_string(),
        }
        .into());
    };
    let lat: f64 = parse_number("lat", &lat)?;
    let lon: f64 = parse_number("lon", &lon)?;
    let zoom: u32 = parse_number("zoom", &zoom)?;

    Ok(Json(tile_for_lat_lon(lat, lon, zoom)?))
}

/// Geometry type of a source.
///
/// # Endpoint
///
/// `GET /tiling/geometry-type/{source}`
///
/// # Response
///
/// - **200 OK**: `{"geometryType": "ST_Point"}`
/// - **400 Bad Request**: the table holds no geometries
pub async fn geometry_type_handler<E: SpatialEngine>(
    State(state): State<AppState<E>>,
    Path(source): Path<String>,
) -> Result<Json<GeometryTypeResponse>, MetadataError> {
    match state.tile_service.registry().geometry_type(&source).await? {
        Some(geometry_type) => Ok(Json(GeometryTypeResponse { geometry_type })),
        None => Err(MetadataError::NoGeometry(format!(
            "No geometries found in '{}'",
            source
        ))),
    }
}

/// Bounding box of a source in degrees.
///
/// # Endpoint
///
/// `GET /tiling/extent/{source}`
pub async fn extent_handler<E: SpatialEngine>(
    State(state): State<AppState<E>>,
    Path(source): Path<String>,
) -> Result<Json<ExtentResponse>, MetadataError> {
    match state.tile_service.registry().extent(&source).await? {
        Some(bounds) => Ok(Json(ExtentResponse { bounds })),
        None => Err(MetadataError::NotFound(format!(
            "No extent available for '{}'",
            source
        ))),
    }
}

/// Spatial reference check for a source.
///
/// # Endpoint
///
/// `GET /tiling/check-srid/{source}`
///
/// # Response
///
/// Always 200 for a reachable engine; the body reports validity.
pub async fn check_srid_handler<E: SpatialEngine>(
    State(state): State<AppState<E>>,
    Path(source): Path<String>,
) -> Result<Json<SridCheck>, HandlerError> {
    let check = state.tile_service.registry().check_srid(&source).await?;
    Ok(Json(check))
}

/// Attribute columns of a source, sorted by name.
///
/// # Endpoint
///
/// `GET /tiling/fields/{source}`
pub async fn fields_handler<E: SpatialEngine>(
    State(state): State<AppState<E>>,
    Path(source): Path<String>,
) -> Result<Json<FieldsResponse>, MetadataError> {
    let names = state.tile_service.registry().field_names(&source).await?;
    if names.is_empty() {
        return Err(MetadataError::NotFound(format!(
            "No fields found for '{}'",
            source
        )));
    }

    Ok(Json(FieldsResponse {
        fields: names.into_iter().map(|name| FieldInfo { name }).collect(),
    }))
}

// =============================================================================
// Tests
// =============================================================================
