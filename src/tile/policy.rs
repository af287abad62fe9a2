//! Zoom-dependent generation policy.
//!
//! Line and polygon sources are served from pre-simplified geometry columns at
//! low zoom and from the full-resolution column once detail matters. Point
//! sources are grid-clustered at low and medium zoom and served raw once the
//! map is close enough to show individual points.
//!
//! | Geometry kind | Zoom  | Policy                      |
//! |---------------|-------|-----------------------------|
//! | LineOrPolygon | 0-3   | Coarse tier                 |
//! | LineOrPolygon | 4-6   | Medium tier                 |
//! | LineOrPolygon | 7-10  | Fine tier                   |
//! | LineOrPolygon | 11+   | Full resolution             |
//! | Point         | 0-6   | Cluster: 64px grid, ~100m   |
//! | Point         | 7-12  | Cluster: 32px grid, ~50m    |
//! | Point         | 13+   | Unclustered                 |

use std::fmt;

/// Broad class of a source's stored geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
    LineOrPolygon,
}

impl GeometryKind {
    /// Classify a PostGIS geometry type name such as `ST_MultiPolygon`.
    ///
    /// Returns `None` for collections and unknown types.
    pub fn from_geometry_type(geometry_type: &str) -> Option<Self> {
        let upper = geometry_type.to_ascii_uppercase();
        if upper.contains("COLLECTION") {
            None
        } else if upper.contains("POINT") {
            Some(GeometryKind::Point)
        } else if upper.contains("LINESTRING") || upper.contains("POLYGON") {
            Some(GeometryKind::LineOrPolygon)
        } else {
            None
        }
    }
}

/// Simplification level for line and polygon sources.
///
/// Variants are ordered from coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResolutionTier {
    Coarse,
    Medium,
    Fine,
    Full,
}

impl ResolutionTier {
    /// All pre-simplified tiers (everything except `Full`).
    pub const SIMPLIFIED: [ResolutionTier; 3] = [
        ResolutionTier::Coarse,
        ResolutionTier::Medium,
        ResolutionTier::Fine,
    ];

    /// Name of the pre-simplified geometry column for this tier.
    ///
    /// Tier columns are built offline with 1000m, 500m and 250m simplification
    /// tolerances. `Full` has no dedicated column; it reads the source's base
    /// geometry.
    pub fn column_name(self) -> Option<&'static str> {
        match self {
            ResolutionTier::Coarse => Some("geom_z_0_3"),
            ResolutionTier::Medium => Some("geom_z_3_6"),
            ResolutionTier::Fine => Some("geom_z_6_10"),
            ResolutionTier::Full => None,
        }
    }

    /// Whether `column` is one of the pre-simplified tier columns.
    pub fn is_tier_column(column: &str) -> bool {
        Self::SIMPLIFIED
            .iter()
            .any(|tier| tier.column_name() == Some(column))
    }
}

/// Point clustering parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Grid cell size in screen pixels (of a 256px tile)
    pub grid_size_px: u32,

    /// Minimum cluster distance in meters
    pub tolerance_m: f64,
}

impl ClusterParams {
    pub const HEAVY: ClusterParams = ClusterParams {
        grid_size_px: 64,
        tolerance_m: 100.0,
    };

    pub const MEDIUM: ClusterParams = ClusterParams {
        grid_size_px: 32,
        tolerance_m: 50.0,
    };
}

/// How a tile is generated for a given source and zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GenerationPolicy {
    Resolution { tier: ResolutionTier },
    Cluster(ClusterParams),
    Unclustered,
}

impl GenerationPolicy {
    pub fn is_clustered(&self) -> bool {
        matches!(self, GenerationPolicy::Cluster(_))
    }

    /// Ordinal detail level; higher means finer. Used to check that policy
    /// never coarsens as zoom increases.
    pub fn detail_rank(&self) -> u8 {
        match self {
            GenerationPolicy::Resolution { tier } => *tier as u8,
            GenerationPolicy::Cluster(params) if params.grid_size_px >= 64 => 0,
            GenerationPolicy::Cluster(_) => 1,
            GenerationPolicy::Unclustered => 2,
        }
    }
}

impl fmt::Display for GenerationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationPolicy::Resolution { tier } => write!(f, "{:?}", tier),
            GenerationPolicy::Cluster(p) => {
                write!(f, "Cluster({}px, {}m)", p.grid_size_px, p.tolerance_m)
            }
            GenerationPolicy::Unclustered => f.write_str("Unclustered"),
        }
    }
}

/// Select the generation policy for a geometry kind at zoom `z`.
///
/// Total over every `u8` zoom; zooms past the last breakpoint keep the finest
/// policy.
pub fn select_policy(kind: GeometryKind, z: u8) -> GenerationPolicy {
    match kind {
        GeometryKind::LineOrPolygon => {
            let tier = match z {
                0..=3 => ResolutionTier::Coarse,
                4..=6 => ResolutionTier::Medium,
                7..=10 => ResolutionTier::Fine,
                _ => ResolutionTier::Full,
            };
            GenerationPolicy::Resolution { tier }
        }
        GeometryKind::Point => match z {
            0..=6 => GenerationPolicy::Cluster(ClusterParams::HEAVY),
            7..=12 => GenerationPolicy::Cluster(ClusterParams::MEDIUM),
            _ => GenerationPolicy::Unclustered,
        },
    }
}
