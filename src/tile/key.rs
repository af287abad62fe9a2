//! Tile addressing.
//!
//! A [`TileKey`] identifies one cached artifact: a source table plus a
//! `(z, x, y)` position in the Web Mercator tile grid. Keys are validated on
//! construction, so holding one means the coordinates are in range and the
//! source name is safe to use as both a path segment and a SQL identifier.

use std::f64::consts::PI;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::error::TileError;

/// Highest zoom level served.
pub const MAX_ZOOM: u8 = 22;

/// Maximum source name length (PostgreSQL identifier limit).
pub const MAX_SOURCE_NAME_LEN: usize = 63;

/// File extension for cached tiles.
pub const TILE_FILE_EXTENSION: &str = "mvt";

/// Latitude limit of the Web Mercator projection.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// Check that a source name is usable as a table name and a directory name.
pub fn validate_source_name(name: &str) -> Result<(), TileError> {
    let invalid = |reason| {
        Err(TileError::InvalidSource {
            source_name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("name is empty");
    }
    if name.len() > MAX_SOURCE_NAME_LEN {
        return invalid("name is longer than 63 characters");
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return invalid("only ASCII letters, digits, '_' and '-' are allowed");
    }
    Ok(())
}

/// Number of tiles along one axis at zoom `z`.
#[inline]
pub fn tiles_per_axis(z: u8) -> u32 {
    1u32 << z
}

/// Identifies a single tile of a single source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    source: Arc<str>,
    z: u8,
    x: u32,
    y: u32,
}

impl TileKey {
    /// Create a validated tile key.
    ///
    /// Fails when the source name is unsafe, `z > 22`, or `x`/`y` fall outside
    /// `0..2^z`.
    pub fn new(source: impl Into<Arc<str>>, z: u32, x: u32, y: u32) -> Result<Self, TileError> {
        let source = source.into();
        validate_source_name(&source)?;

        if z > MAX_ZOOM as u32 {
            return Err(TileError::InvalidZoom {
                z,
                max_zoom: MAX_ZOOM,
            });
        }
        let z = z as u8;

        let max = tiles_per_axis(z) - 1;
        if x > max || y > max {
            return Err(TileError::TileOutOfBounds { z, x, y, max });
        }

        Ok(Self { source, z, x, y })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn z(&self) -> u8 {
        self.z
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    /// Path of this tile relative to the cache root: `<source>/<z>/<x>/<y>.mvt`.
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::from(self.source.as_ref());
        path.push(self.z.to_string());
        path.push(self.x.to_string());
        path.push(format!("{}.{}", self.y, TILE_FILE_EXTENSION));
        path
    }

    /// Parse a path produced by [`relative_path`](Self::relative_path).
    ///
    /// Returns `None` for anything that is not a valid tile file, including
    /// temp files left by interrupted writes.
    pub fn from_relative_path(path: &Path) -> Option<Self> {
        let parts: Vec<&str> = path
            .components()
            .map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect::<Option<_>>()?;

        let [source, z, x, file] = parts.as_slice() else {
            return None;
        };
        let y = file.strip_suffix(".mvt")?;

        TileKey::new(*source, z.parse().ok()?, x.parse().ok()?, y.parse().ok()?).ok()
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.source, self.z, self.x, self.y)
    }
}

/// Tile coordinates returned by the tile-coords endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileCoords {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

/// Find the tile containing a geographic point.
///
/// Latitude is clamped to the Web Mercator limit and the result is clamped to
/// the grid, so points on the antimeridian or the poles map to edge tiles.
pub fn tile_for_lat_lon(lat: f64, lon: f64, zoom: u32) -> Result<TileCoords, TileError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(TileError::InvalidCoordinate {
            message: format!("latitude {} is outside [-90, 90]", lat),
        });
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(TileError::InvalidCoordinate {
            message: format!("longitude {} is outside [-180, 180]", lon),
        });
    }
    if zoom > MAX_ZOOM as u32 {
        return Err(TileError::InvalidZoom {
            z: zoom,
            max_zoom: MAX_ZOOM,
        });
    }
    let z = zoom as u8;

    let n = tiles_per_axis(z) as f64;
    let max = tiles_per_axis(z) - 1;
    let lat_rad = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();

    let x = ((lon + 180.0) / 360.0 * n).floor();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor();

    Ok(TileCoords {
        z,
        x: (x.max(0.0) as u32).min(max),
        y: (y.max(0.0) as u32).min(max),
    })
}
