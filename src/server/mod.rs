//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │           GET /tiling/mvt/{source}/{z}/{x}/{y}.pbf              │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌────────────────────────────┐   │
//! │  │        handlers          │  │          routes            │   │
//! │  │ (tiles, metadata, errors)│  │  (router config, CORS)     │   │
//! │  └──────────────────────────┘  └────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    check_srid_handler, extent_handler, fields_handler, geometry_type_handler, health_handler,
    sources_handler, tile_coords_handler, tile_handler, AppState, ErrorResponse, ExtentResponse,
    FieldInfo, FieldsResponse, GeometryTypeResponse, HandlerError, HealthResponse, MetadataError,
    SourcesResponse, TileCoordsQuery, TilePathParams, MVT_CONTENT_TYPE, MVT_LAYERS_HEADER,
    TILE_CACHE_HIT_HEADER,
};
pub use routes::{create_router, RouterConfig};
