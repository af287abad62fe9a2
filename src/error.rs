use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the external spatial engine.
///
/// Messages are captured as strings so the error can be cloned and handed to
/// every caller waiting on the same coalesced request.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine rejected or failed to run a query
    #[error("Database error: {0}")]
    Database(String),

    /// The engine could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// The engine did not answer within the configured timeout
    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => EngineError::Connection(err.to_string()),
            other => EngineError::Database(other.to_string()),
        }
    }
}

/// Local tile cache I/O failures.
///
/// These never reach HTTP clients: reads degrade to regeneration and writes are
/// logged and skipped.
#[derive(Debug, Clone, Error)]
pub enum CacheIoError {
    /// The cache root could not be created
    #[error("Failed to create cache root {path:?}: {message}")]
    CreateRoot { path: PathBuf, message: String },

    /// A cached tile exists but could not be read
    #[error("Failed to read cached tile {path:?}: {message}")]
    Read { path: PathBuf, message: String },

    /// A tile could not be written to the cache
    #[error("Failed to write cached tile {path:?}: {message}")]
    Write { path: PathBuf, message: String },

    /// A cached tile could not be deleted
    #[error("Failed to remove cached tile {path:?}: {message}")]
    Remove { path: PathBuf, message: String },

    /// Walking the cache tree failed
    #[error("Failed to scan cache directory {path:?}: {message}")]
    Scan { path: PathBuf, message: String },
}

/// Errors surfaced by the tile service.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Source identifier is not a safe table name
    #[error("Invalid source '{source_name}': {reason}")]
    InvalidSource {
        source_name: String,
        reason: &'static str,
    },

    /// Zoom level outside the supported range
    #[error("Invalid zoom {z} (valid range: 0-{max_zoom})")]
    InvalidZoom { z: u32, max_zoom: u8 },

    /// Tile column or row outside the grid for this zoom
    #[error("Tile ({x}, {y}) is out of bounds at zoom {z} (max: {max})")]
    TileOutOfBounds { z: u8, x: u32, y: u32, max: u32 },

    /// Malformed coordinate input (non-numeric row, lat/lon out of range)
    #[error("Invalid coordinate: {message}")]
    InvalidCoordinate { message: String },

    /// Source has no usable geometry column
    #[error("No geometry column found for source '{source_name}'")]
    MissingGeometryColumn { source_name: String },

    /// Geometry kind could not be determined from the stored geometry type
    #[error("Cannot determine geometry kind for source '{source_name}' (type: {geometry_type})")]
    UnknownGeometryKind {
        source_name: String,
        geometry_type: String,
    },

    /// The spatial engine failed or timed out
    #[error("Upstream error: {0}")]
    Upstream(#[from] EngineError),
}

impl TileError {
    /// Whether this is a client error (malformed request).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TileError::InvalidSource { .. }
                | TileError::InvalidZoom { .. }
                | TileError::TileOutOfBounds { .. }
                | TileError::InvalidCoordinate { .. }
        )
    }

    /// Whether the caller may retry. Generation is idempotent, so only
    /// upstream failures qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TileError::Upstream(_))
    }
}
