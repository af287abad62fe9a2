//! Source metadata.
//!
//! A source is a table in the configured schema with at least one geometry
//! column. [`SourceRegistry`] resolves the metadata tile generation needs
//! (base geometry column, pre-simplified tier columns, geometry kind and
//! attribute schema) once per source and caches it.

mod registry;

use serde::Serialize;

use crate::engine::AttributeSchema;
use crate::tile::GeometryKind;

pub use registry::{SourceRegistry, DEFAULT_SOURCE_CACHE_CAPACITY};

/// SRID every source is expected to store its geometry in.
pub const REQUIRED_SRID: i32 = 4326;

/// Resolved metadata for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    name: String,
    geometry_column: String,
    tier_columns: Vec<String>,
    geometry_type: String,
    kind: GeometryKind,
    attributes: AttributeSchema,
}

impl SourceInfo {
    /// # Arguments
    /// * `name` - Table name
    /// * `geometry_column` - Full-resolution geometry column
    /// * `tier_columns` - Pre-simplified tier columns present on the table
    /// * `geometry_type` - PostGIS geometry type name, e.g. `ST_MultiPolygon`
    /// * `kind` - Geometry kind derived from `geometry_type`
    /// * `attributes` - Non-geometry columns in table order
    pub fn new(
        name: impl Into<String>,
        geometry_column: impl Into<String>,
        tier_columns: Vec<String>,
        geometry_type: impl Into<String>,
        kind: GeometryKind,
        attributes: AttributeSchema,
    ) -> Self {
        Self {
            name: name.into(),
            geometry_column: geometry_column.into(),
            tier_columns,
            geometry_type: geometry_type.into(),
            kind,
            attributes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry_column(&self) -> &str {
        &self.geometry_column
    }

    pub fn tier_columns(&self) -> &[String] {
        &self.tier_columns
    }

    pub fn has_tier_column(&self, column: &str) -> bool {
        self.tier_columns.iter().any(|c| c == column)
    }

    pub fn geometry_type(&self) -> &str {
        &self.geometry_type
    }

    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    pub fn attributes(&self) -> &AttributeSchema {
        &self.attributes
    }
}

/// Result of validating a source's spatial reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SridCheck {
    Valid { valid: bool, srid: i32 },
    Invalid { valid: bool, error: String },
}

impl SridCheck {
    fn invalid(error: impl Into<String>) -> Self {
        SridCheck::Invalid {
            valid: false,
            error: error.into(),
        }
    }

    /// The source has no geometry column at all.
    pub fn no_geometry_column() -> Self {
        Self::invalid("No geometry column found.")
    }

    /// Classify the SRID read from the first non-null geometry.
    pub fn from_srid(srid: Option<i32>) -> Self {
        match srid {
            None => Self::invalid("SRID not found or no geometries."),
            Some(0) => Self::invalid("Invalid SRID (0). Please set a valid SRID."),
            Some(REQUIRED_SRID) => SridCheck::Valid {
                valid: true,
                srid: REQUIRED_SRID,
            },
            Some(other) => Self::invalid(format!(
                "Table must use SRID {}. Found: {}",
                REQUIRED_SRID, other
            )),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, SridCheck::Valid { .. })
    }
}
