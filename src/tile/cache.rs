//! Disk-backed tile cache with size-based LRU eviction.
//!
//! Tiles are stored one file per key at `<root>/<source>/<z>/<x>/<y>.mvt`.
//! An in-memory LRU index of entry sizes tracks recency and the running total,
//! so eviction never has to walk the directory tree. The index is rebuilt from
//! disk when the store is opened, ordered by file modification time; reads
//! refresh the modification time so recency survives restarts.
//!
//! # Eviction
//!
//! Whenever a write leaves the total above the capacity, least-recently-used
//! entries are removed until the total is at or below
//! `capacity * cleanup_fraction`. The band below the hard limit keeps repeated
//! near-limit writes from triggering an eviction pass each time.
//!
//! Every entry is charged at least [`MIN_ENTRY_COST`] bytes, so the number of
//! files the cache keeps is bounded even when tiles are empty. A tile whose
//! charge exceeds the eviction target is served but never stored.
//!
//! Evicting the last tile of a column directory removes that directory and,
//! when it empties too, its zoom directory.
//!
//! # Concurrency
//!
//! Writes go to a uniquely named temp file in the destination directory and
//! are renamed into place, so readers never observe a partial tile. Two writers
//! racing on the same key both succeed; the later rename wins. Files that
//! disappear underneath the store (a concurrent eviction, another process) are
//! treated as misses.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use filetime::FileTime;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::CacheIoError;

use super::key::TileKey;

/// Default cache capacity: 1GB
pub const DEFAULT_CACHE_CAPACITY: u64 = 1024 * 1024 * 1024;

/// Default fraction of capacity to shrink to when evicting.
pub const DEFAULT_CLEANUP_FRACTION: f64 = 0.90;

/// Temp files older than this are leftovers from interrupted writes.
const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

const TEMP_SUFFIX: &str = ".tmp";

/// Smallest number of bytes an entry is charged against the capacity.
pub const MIN_ENTRY_COST: u64 = 64;

/// Bytes charged against the capacity for a tile of `size` bytes.
pub fn entry_cost(size: u64) -> u64 {
    size.max(MIN_ENTRY_COST)
}

// =============================================================================
// Configuration
// =============================================================================

/// Settings for a [`TileCacheStore`].
#[derive(Debug, Clone)]
pub struct TileCacheConfig {
    /// Cache root directory
    pub root: PathBuf,

    /// Maximum total size of cached tiles in bytes
    pub capacity_bytes: u64,

    /// Fraction of capacity to shrink to when evicting, in `(0, 1]`
    pub cleanup_fraction: f64,
}

impl TileCacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            capacity_bytes: DEFAULT_CACHE_CAPACITY,
            cleanup_fraction: DEFAULT_CLEANUP_FRACTION,
        }
    }

    pub fn with_capacity(mut self, capacity_bytes: u64) -> Self {
        self.capacity_bytes = capacity_bytes;
        self
    }

    pub fn with_cleanup_fraction(mut self, cleanup_fraction: f64) -> Self {
        self.cleanup_fraction = cleanup_fraction;
        self
    }

    /// Total size an eviction pass shrinks the cache to.
    pub fn target_bytes(&self) -> u64 {
        let fraction = if self.cleanup_fraction > 0.0 && self.cleanup_fraction <= 1.0 {
            self.cleanup_fraction
        } else {
            DEFAULT_CLEANUP_FRACTION
        };
        (self.capacity_bytes as f64 * fraction).floor() as u64
    }
}

/// Outcome of an eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Entries dropped from the cache
    pub evicted: usize,

    /// Bytes accounted to the dropped entries
    pub freed_bytes: u64,

    /// Total cache size after the pass
    pub remaining_bytes: u64,
}

// =============================================================================
// Index
// =============================================================================

/// Recency-ordered entry charges plus their running total.
struct Index {
    entries: LruCache<TileKey, u64>,
    total: u64,
}

impl Index {
    fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
            total: 0,
        }
    }

    /// Record an access (or a write) of `key` with its current size.
    fn touch(&mut self, key: &TileKey, size: u64) {
        let cost = entry_cost(size);
        if let Some(old) = self.entries.put(key.clone(), cost) {
            self.total = self.total.saturating_sub(old);
        }
        self.total += cost;
    }

    fn forget(&mut self, key: &TileKey) -> Option<u64> {
        let size = self.entries.pop(key)?;
        self.total = self.total.saturating_sub(size);
        Some(size)
    }
}

// =============================================================================
// Tile Cache Store
// =============================================================================

/// Size-bounded persistent tile store.
///
/// Cache I/O failures never reach callers of [`get`](Self::get): a failed read
/// is a miss. [`put`](Self::put) reports write failures so the caller can log
/// them; the tile itself is still usable.
pub struct TileCacheStore {
    root: PathBuf,
    capacity: u64,
    target: u64,
    index: Mutex<Index>,
    temp_counter: AtomicU64,
}

impl TileCacheStore {
    /// Open a store, creating the root directory and indexing existing tiles.
    pub async fn open(config: TileCacheConfig) -> Result<Self, CacheIoError> {
        let root = config.root.clone();
        let create_root = root.clone();
        run_blocking(move || fs::create_dir_all(&create_root))
            .await
            .map_err(|e| CacheIoError::CreateRoot {
                path: root.clone(),
                message: e.to_string(),
            })?;

        let store = Self {
            root,
            capacity: config.capacity_bytes,
            target: config.target_bytes(),
            index: Mutex::new(Index::new()),
            temp_counter: AtomicU64::new(0),
        };
        store.rescan().await?;
        Ok(store)
    }

    /// Absolute path of the file holding `key`.
    pub fn path_for(&self, key: &TileKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Read a cached tile, marking it most recently used.
    ///
    /// Returns `None` on a miss or when the file cannot be read.
    pub async fn get(&self, key: &TileKey) -> Option<Bytes> {
        let path = self.path_for(key);
        let read_path = path.clone();
        let result = run_blocking(move || {
            let data = fs::read(&read_path)?;
            // Recency only; a failure here must not turn a hit into a miss.
            let _ = filetime::set_file_mtime(&read_path, FileTime::now());
            Ok(data)
        })
        .await;

        match result {
            Ok(data) => {
                self.index.lock().await.touch(key, data.len() as u64);
                Some(Bytes::from(data))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.index.lock().await.forget(key);
                None
            }
            Err(e) => {
                let err = CacheIoError::Read {
                    path,
                    message: e.to_string(),
                };
                warn!(error = %err, "Treating unreadable cache entry as a miss");
                None
            }
        }
    }

    /// Store a tile atomically, then run an eviction pass.
    ///
    /// A tile larger than the eviction target is not stored; any older copy
    /// of it is removed so a stale version is never served.
    pub async fn put(&self, key: &TileKey, data: &Bytes) -> Result<EvictionReport, CacheIoError> {
        let size = data.len() as u64;
        if entry_cost(size) > self.target {
            debug!(
                tile = %key,
                size,
                target = self.target,
                "Tile exceeds cache target, not storing"
            );
            self.remove(key).await?;
            return Ok(EvictionReport {
                remaining_bytes: self.size().await,
                ..Default::default()
            });
        }

        let path = self.path_for(key);
        let temp = self.temp_path(&path);
        let write_path = path.clone();
        let payload = data.clone();
        run_blocking(move || {
            let parent = write_path.parent();
            if let Some(parent) = parent {
                fs::create_dir_all(parent)?;
            }
            let mut written = fs::write(&temp, &payload);
            // The directory can be pruned by a concurrent eviction in between
            if matches!(&written, Err(e) if e.kind() == io::ErrorKind::NotFound) {
                if let Some(parent) = parent {
                    fs::create_dir_all(parent)?;
                    written = fs::write(&temp, &payload);
                }
            }
            let written = written.and_then(|_| fs::rename(&temp, &write_path));
            if written.is_err() {
                let _ = fs::remove_file(&temp);
            }
            written
        })
        .await
        .map_err(|e| CacheIoError::Write {
            path,
            message: e.to_string(),
        })?;

        self.index.lock().await.touch(key, size);
        Ok(self.evict().await)
    }

    /// Evict least-recently-used entries if the total exceeds capacity.
    ///
    /// Entries whose files are already gone are dropped without error. Other
    /// removal failures are logged; the entry is still dropped from the index.
    pub async fn evict(&self) -> EvictionReport {
        let (victims, remaining_bytes) = {
            let mut index = self.index.lock().await;
            if index.total <= self.capacity {
                return EvictionReport {
                    remaining_bytes: index.total,
                    ..Default::default()
                };
            }

            let mut victims = Vec::new();
            while index.total > self.target {
                let Some((key, size)) = index.entries.pop_lru() else {
                    break;
                };
                index.total = index.total.saturating_sub(size);
                victims.push((key, size));
            }
            (victims, index.total)
        };

        let report = EvictionReport {
            evicted: victims.len(),
            freed_bytes: victims.iter().map(|(_, size)| size).sum(),
            remaining_bytes,
        };

        let paths: Vec<PathBuf> = victims.iter().map(|(key, _)| self.path_for(key)).collect();
        let root = self.root.clone();
        let failures = run_blocking(move || Ok(remove_files(&root, &paths)))
            .await
            .unwrap_or_default();
        for err in failures {
            warn!(error = %err, "Failed to delete evicted tile");
        }

        info!(
            evicted = report.evicted,
            freed_bytes = report.freed_bytes,
            remaining_bytes = report.remaining_bytes,
            capacity = self.capacity,
            "Cache eviction pass"
        );
        report
    }

    /// Remove one tile. Returns whether it was cached.
    pub async fn remove(&self, key: &TileKey) -> Result<bool, CacheIoError> {
        let indexed = self.index.lock().await.forget(key).is_some();
        let path = self.path_for(key);
        let remove_path = path.clone();
        let root = self.root.clone();
        let removed = run_blocking(move || match fs::remove_file(&remove_path) {
            Ok(()) => {
                prune_empty_dirs(&root, &remove_path);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        })
        .await
        .map_err(|e| CacheIoError::Remove {
            path,
            message: e.to_string(),
        })?;
        Ok(indexed || removed)
    }

    /// Remove every cached tile of a source. Returns the number of indexed
    /// entries dropped.
    pub async fn purge_source(&self, source: &str) -> Result<usize, CacheIoError> {
        let dropped = {
            let mut index = self.index.lock().await;
            let keys: Vec<TileKey> = index
                .entries
                .iter()
                .filter(|(key, _)| key.source() == source)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                index.forget(key);
            }
            keys.len()
        };

        let dir = self.root.join(source);
        let remove_dir = dir.clone();
        run_blocking(move || match fs::remove_dir_all(&remove_dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        })
        .await
        .map_err(|e| CacheIoError::Remove {
            path: dir,
            message: e.to_string(),
        })?;

        info!(source, dropped, "Purged cached tiles");
        Ok(dropped)
    }

    /// Rebuild the index from the directory tree.
    ///
    /// Entries are ordered oldest-modified first. Stale temp files are
    /// deleted. Returns the number of indexed tiles.
    pub async fn rescan(&self) -> Result<usize, CacheIoError> {
        let root = self.root.clone();
        let scan_root = root.clone();
        let mut found = run_blocking(move || scan_tree(&scan_root))
            .await
            .map_err(|e| CacheIoError::Scan {
                path: root,
                message: e.to_string(),
            })?;
        found.sort_by_key(|entry| entry.modified);

        let mut index = Index::new();
        for entry in &found {
            index.touch(&entry.key, entry.size);
        }

        let count = index.entries.len();
        debug!(
            root = %self.root.display(),
            entries = count,
            total_bytes = index.total,
            "Indexed tile cache"
        );
        *self.index.lock().await = index;
        Ok(count)
    }

    /// Whether a tile is indexed, without touching its recency.
    pub async fn contains(&self, key: &TileKey) -> bool {
        self.index.lock().await.entries.contains(key)
    }

    /// Total bytes charged to indexed tiles.
    ///
    /// Each tile counts as at least [`MIN_ENTRY_COST`] bytes, so this is never
    /// less than the tiles' on-disk size.
    pub async fn size(&self) -> u64 {
        self.index.lock().await.total
    }

    /// Number of indexed tiles.
    pub async fn len(&self) -> usize {
        self.index.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Maximum total size in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Size an eviction pass shrinks the cache to.
    pub fn target_bytes(&self) -> u64 {
        self.target
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let counter = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}.{}{}", std::process::id(), counter, TEMP_SUFFIX));
        path.with_file_name(name)
    }
}

// =============================================================================
// Blocking helpers
// =============================================================================

async fn run_blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .unwrap_or_else(|e| Err(io::Error::other(e)))
}

fn remove_files(root: &Path, paths: &[PathBuf]) -> Vec<CacheIoError> {
    paths
        .iter()
        .filter_map(|path| match fs::remove_file(path) {
            Ok(()) => {
                prune_empty_dirs(root, path);
                None
            }
            Err(e) if e.kind() != io::ErrorKind::NotFound => Some(CacheIoError::Remove {
                path: path.clone(),
                message: e.to_string(),
            }),
            Err(_) => None,
        })
        .collect()
}

/// Remove the `<x>` and `<z>` directories above a deleted tile if they are
/// now empty. Source directories are kept.
fn prune_empty_dirs(root: &Path, tile: &Path) {
    let mut dir = tile.parent();
    for _ in 0..2 {
        let Some(current) = dir else {
            return;
        };
        if current == root || !current.starts_with(root) {
            return;
        }
        // Fails while the directory still holds entries
        if fs::remove_dir(current).is_err() {
            return;
        }
        dir = current.parent();
    }
}

struct ScannedEntry {
    key: TileKey,
    size: u64,
    modified: SystemTime,
}

/// Walk `<root>/<source>/<z>/<x>/` collecting tile files.
fn scan_tree(root: &Path) -> io::Result<Vec<ScannedEntry>> {
    let mut found = Vec::new();
    scan_dir(root, root, 0, &mut found)?;
    Ok(found)
}

fn scan_dir(root: &Path, dir: &Path, depth: usize, found: &mut Vec<ScannedEntry>) -> io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        // Removed by a concurrent purge
        Err(e) if e.kind() == io::ErrorKind::NotFound && depth > 0 => return Ok(()),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };

        if metadata.is_dir() {
            if depth < 3 {
                scan_dir(root, &path, depth + 1, found)?;
            }
            continue;
        }
        if depth != 3 || !metadata.is_file() {
            continue;
        }

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if path.to_string_lossy().ends_with(TEMP_SUFFIX) {
            let age = SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO);
            if age > STALE_TEMP_AGE {
                debug!(path = %path.display(), "Removing stale temp file");
                let _ = fs::remove_file(&path);
            }
            continue;
        }

        let key = path
            .strip_prefix(root)
            .ok()
            .and_then(TileKey::from_relative_path);
        if let Some(key) = key {
            found.push(ScannedEntry {
                key,
                size: metadata.len(),
                modified,
            });
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
