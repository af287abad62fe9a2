//! Cache effectiveness integration tests.
//!
//! Tests verify:
//! - Repeated requests are served from the disk cache
//! - Eviction keeps the cache under capacity and honours recency
//! - Concurrent misses for one tile reach the engine once
//! - The cache survives a restart

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use tempfile::TempDir;

use super::test_utils::{build_router, get, sample_engine};

const CAPACITY: u64 = 1024 * 1024;

fn tile_path(dir: &TempDir, source: &str, z: u32, x: u32, y: u32) -> std::path::PathBuf {
    dir.path()
        .join(source)
        .join(z.to_string())
        .join(x.to_string())
        .join(format!("{}.mvt", y))
}

// =============================================================================
// Hits and Misses
// =============================================================================

#[tokio::test]
async fn test_second_request_is_cache_hit() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(sample_engine().with_tile(&b"roads-tile"[..]));
    let router = build_router(engine.clone(), dir.path(), CAPACITY).await;

    let (_, headers, first) = get(&router, "/tiling/mvt/roads/5/10/12.pbf").await;
    assert_eq!(headers["x-tile-cache-hit"], "false");

    let (status, headers, second) = get(&router, "/tiling/mvt/roads/5/10/12.pbf").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-tile-cache-hit"], "true");
    assert_eq!(first, second);

    assert_eq!(engine.generate_calls(), 1);
    assert_eq!(
        std::fs::read(tile_path(&dir, "roads", 5, 10, 12)).unwrap(),
        b"roads-tile"
    );
}

#[tokio::test]
async fn test_empty_tile_is_cached() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(sample_engine().with_empty_tiles());
    let router = build_router(engine.clone(), dir.path(), CAPACITY).await;

    get(&router, "/tiling/mvt/pois/14/100/100.pbf").await;
    let (status, headers, body) = get(&router, "/tiling/mvt/pois/14/100/100.pbf").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert_eq!(headers["x-tile-cache-hit"], "true");
    assert_eq!(engine.generate_calls(), 1);
}

#[tokio::test]
async fn test_sources_cached_independently() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(sample_engine());
    let router = build_router(engine.clone(), dir.path(), CAPACITY).await;

    let (_, headers, _) = get(&router, "/tiling/mvt/roads/1/0/0.pbf").await;
    assert_eq!(headers["x-tile-cache-hit"], "false");
    let (_, headers, _) = get(&router, "/tiling/mvt/pois/1/0/0.pbf").await;
    assert_eq!(headers["x-tile-cache-hit"], "false");

    assert!(tile_path(&dir, "roads", 1, 0, 0).exists());
    assert!(tile_path(&dir, "pois", 1, 0, 0).exists());
    assert_eq!(engine.generate_calls(), 2);
}

// =============================================================================
// Eviction
// =============================================================================

#[tokio::test]
async fn test_eviction_over_http_removes_least_recent() {
    let dir = TempDir::new().unwrap();
    // 300-byte tiles, 1000-byte capacity: eviction trims to 900 bytes
    let engine = Arc::new(sample_engine().with_tile(vec![7u8; 300]));
    let router = build_router(engine.clone(), dir.path(), 1000).await;

    get(&router, "/tiling/mvt/roads/3/0/0.pbf").await;
    get(&router, "/tiling/mvt/roads/3/1/0.pbf").await;
    get(&router, "/tiling/mvt/roads/3/2/0.pbf").await;

    // At 900 bytes nothing is evicted yet
    assert!(tile_path(&dir, "roads", 3, 0, 0).exists());

    // Touch the oldest so (3,1,0) becomes least recent
    let (_, headers, _) = get(&router, "/tiling/mvt/roads/3/0/0.pbf").await;
    assert_eq!(headers["x-tile-cache-hit"], "true");

    get(&router, "/tiling/mvt/roads/3/3/0.pbf").await;

    assert!(tile_path(&dir, "roads", 3, 0, 0).exists());
    assert!(!tile_path(&dir, "roads", 3, 1, 0).exists());
    assert!(tile_path(&dir, "roads", 3, 2, 0).exists());
    assert!(tile_path(&dir, "roads", 3, 3, 0).exists());

    // The evicted tile is regenerated on the next request
    let (status, headers, _) = get(&router, "/tiling/mvt/roads/3/1/0.pbf").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-tile-cache-hit"], "false");
    assert_eq!(engine.generate_calls(), 5);
}

#[tokio::test]
async fn test_oversized_tile_served_but_not_kept() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(sample_engine().with_tile(vec![1u8; 2048]));
    let router = build_router(engine.clone(), dir.path(), 1000).await;

    let (status, _, body) = get(&router, "/tiling/mvt/roads/1/0/0.pbf").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.len(), 2048);
    assert!(!tile_path(&dir, "roads", 1, 0, 0).exists());
}

#[tokio::test]
async fn test_oversized_tile_leaves_cached_tiles_alone() {
    let dir = TempDir::new().unwrap();
    let small = Arc::new(sample_engine().with_tile(vec![7u8; 200]));
    let router = build_router(small, dir.path(), 1000).await;
    get(&router, "/tiling/mvt/roads/3/0/0.pbf").await;
    get(&router, "/tiling/mvt/roads/3/1/0.pbf").await;

    let large = Arc::new(sample_engine().with_tile(vec![1u8; 4096]));
    let router = build_router(large.clone(), dir.path(), 1000).await;
    let (status, _, body) = get(&router, "/tiling/mvt/roads/3/2/0.pbf").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.len(), 4096);

    assert!(tile_path(&dir, "roads", 3, 0, 0).exists());
    assert!(tile_path(&dir, "roads", 3, 1, 0).exists());
    assert!(!tile_path(&dir, "roads", 3, 2, 0).exists());

    let (_, headers, _) = get(&router, "/tiling/mvt/roads/3/0/0.pbf").await;
    assert_eq!(headers["x-tile-cache-hit"], "true");
    assert_eq!(large.generate_calls(), 1);
}

// =============================================================================
// Concurrency and Restart
// =============================================================================

#[tokio::test]
async fn test_concurrent_misses_generate_once() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(sample_engine().with_delay(Duration::from_millis(100)));
    let router = build_router(engine.clone(), dir.path(), CAPACITY).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            get(&router, "/tiling/mvt/roads/6/30/20.pbf").await
        }));
    }

    for handle in handles {
        let (status, _, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(!body.is_empty());
    }

    assert_eq!(engine.generate_calls(), 1);
}

#[tokio::test]
async fn test_cache_survives_restart() {
    let dir = TempDir::new().unwrap();

    {
        let engine = Arc::new(sample_engine().with_tile(&b"persisted"[..]));
        let router = build_router(engine, dir.path(), CAPACITY).await;
        get(&router, "/tiling/mvt/roads/4/3/2.pbf").await;
    }

    let engine = Arc::new(sample_engine());
    let router = build_router(engine.clone(), dir.path(), CAPACITY).await;

    let (status, headers, body) = get(&router, "/tiling/mvt/roads/4/3/2.pbf").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-tile-cache-hit"], "true");
    assert_eq!(&body[..], b"persisted");
    assert_eq!(engine.generate_calls(), 0);
}
