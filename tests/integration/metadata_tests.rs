//! Metadata endpoint integration tests.
//!
//! Tests verify:
//! - Source listing
//! - Geometry type, extent, SRID check and field listing per source
//! - Tile coordinate lookup for a geographic point

use std::sync::Arc;

use axum::http::StatusCode;
use tempfile::TempDir;

use super::test_utils::{build_router, get, json, sample_engine};

const CAPACITY: u64 = 1024 * 1024;

async fn router(dir: &TempDir) -> axum::Router {
    build_router(Arc::new(sample_engine()), dir.path(), CAPACITY).await
}

// =============================================================================
// Sources
// =============================================================================

#[tokio::test]
async fn test_sources_lists_4326_tables_sorted() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir).await;

    let (status, _, body) = get(&router, "/tiling/sources").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["sources"], serde_json::json!(["pois", "roads"]));
}

// =============================================================================
// Geometry Type
// =============================================================================

#[tokio::test]
async fn test_geometry_type() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir).await;

    let (status, _, body) = get(&router, "/tiling/geometry-type/roads").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["geometryType"], "ST_LineString");

    let (_, _, body) = get(&router, "/tiling/geometry-type/pois").await;
    assert_eq!(json(&body)["geometryType"], "ST_Point");
}

#[tokio::test]
async fn test_geometry_type_without_geometries() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir).await;

    for uri in ["/tiling/geometry-type/empty", "/tiling/geometry-type/rivers"] {
        let (status, _, body) = get(&router, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json(&body)["error"], "no_geometry");
    }
}

#[tokio::test]
async fn test_metadata_rejects_unsafe_source_name() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir).await;

    let (status, _, body) = get(&router, "/tiling/geometry-type/roads%3Bdrop").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "invalid_source");

    let (status, _, _) = get(&router, "/tiling/fields/roads%3Bdrop").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Extent
// =============================================================================

#[tokio::test]
async fn test_extent() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir).await;

    let (status, _, body) = get(&router, "/tiling/extent/roads").await;

    assert_eq!(status, StatusCode::OK);
    let bounds = &json(&body)["bounds"];
    assert_eq!(bounds["west"], -10.0);
    assert_eq!(bounds["south"], 40.0);
    assert_eq!(bounds["east"], 5.0);
    assert_eq!(bounds["north"], 52.0);
}

#[tokio::test]
async fn test_extent_missing_is_404() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir).await;

    let (status, _, body) = get(&router, "/tiling/extent/empty").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "not_found");
}

// =============================================================================
// SRID Check
// =============================================================================

#[tokio::test]
async fn test_check_srid_valid() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir).await;

    let (status, _, body) = get(&router, "/tiling/check-srid/roads").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), serde_json::json!({"valid": true, "srid": 4326}));
}

#[tokio::test]
async fn test_check_srid_invalid_cases_are_200() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir).await;

    let cases = [
        ("legacy", "Invalid SRID (0). Please set a valid SRID."),
        ("empty", "SRID not found or no geometries."),
        ("rivers", "No geometry column found."),
    ];

    for (source, message) in cases {
        let (status, _, body) = get(&router, &format!("/tiling/check-srid/{}", source)).await;
        assert_eq!(status, StatusCode::OK, "{}", source);
        let check = json(&body);
        assert_eq!(check["valid"], false);
        assert_eq!(check["error"], message);
    }
}

// =============================================================================
// Fields
// =============================================================================

#[tokio::test]
async fn test_fields_sorted() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir).await;

    let (status, _, body) = get(&router, "/tiling/fields/pois").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json(&body)["fields"],
        serde_json::json!([
            {"name": "category"},
            {"name": "id"},
            {"name": "name"},
            {"name": "point_count"}
        ])
    );
}

#[tokio::test]
async fn test_fields_empty_is_404() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir).await;

    let (status, _, body) = get(&router, "/tiling/fields/rivers").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "not_found");
}

// =============================================================================
// Tile Coordinates
// =============================================================================

#[tokio::test]
async fn test_tile_coords() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir).await;

    let (status, _, body) = get(&router, "/tiling/tile-coords?lat=0&lon=0&zoom=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), serde_json::json!({"z": 1, "x": 1, "y": 1}));

    let (_, _, body) = get(&router, "/tiling/tile-coords?lat=0&lon=0&zoom=0").await;
    assert_eq!(json(&body), serde_json::json!({"z": 0, "x": 0, "y": 0}));
}

#[tokio::test]
async fn test_tile_coords_clamps_to_grid() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir).await;

    let (status, _, body) = get(&router, "/tiling/tile-coords?lat=90&lon=180&zoom=3").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), serde_json::json!({"z": 3, "x": 7, "y": 0}));
}

#[tokio::test]
async fn test_tile_coords_validation() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir).await;

    let (status, _, body) = get(&router, "/tiling/tile-coords?lat=91&lon=0&zoom=3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "invalid_coordinate");

    let (status, _, body) = get(&router, "/tiling/tile-coords?lat=0&lon=0&zoom=23").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "invalid_zoom");

    let (status, _, body) = get(&router, "/tiling/tile-coords?lat=0&lon=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "invalid_coordinate");

    let (status, _, body) = get(&router, "/tiling/tile-coords?lat=abc&lon=0&zoom=3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "invalid_coordinate");
}
