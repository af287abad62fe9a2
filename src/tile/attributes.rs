//! Attribute projection for tile features.
//!
//! Unclustered tiles carry every non-geometry column unchanged. Clustered
//! tiles drop identifier-like columns (an id is meaningless for a group of
//! points), keep one representative value per remaining column, and append a
//! synthetic `point_count`.

use crate::engine::AttributeSchema;

use super::policy::GenerationPolicy;

/// Name of the synthetic cluster size field.
pub const POINT_COUNT_FIELD: &str = "point_count";

const IDENTIFIER_NAMES: &[&str] = &["id", "gid", "fid", "oid", "ogc_fid", "objectid", "uuid"];

/// Whether a column name looks like a row identifier.
pub fn is_identifier_like(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IDENTIFIER_NAMES.contains(&lower.as_str()) || lower.ends_with("_id")
}

/// How each projected field is aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Value copied from the feature
    Direct,
    /// First value encountered within the cluster group
    FirstInGroup,
}

/// Ordered set of fields to include in a tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSet {
    fields: Vec<String>,
    aggregation: Aggregation,
    point_count: bool,
}

impl AttributeSet {
    /// Derive the projected fields for a source under `policy`.
    ///
    /// Schema order is preserved.
    pub fn project(schema: &AttributeSchema, policy: &GenerationPolicy) -> Self {
        if policy.is_clustered() {
            let fields = schema
                .names()
                .filter(|name| !is_identifier_like(name) && *name != POINT_COUNT_FIELD)
                .map(str::to_string)
                .collect();
            Self {
                fields,
                aggregation: Aggregation::FirstInGroup,
                point_count: true,
            }
        } else {
            Self {
                fields: schema.names().map(str::to_string).collect(),
                aggregation: Aggregation::Direct,
                point_count: false,
            }
        }
    }

    /// Source columns to project, in order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// Whether the synthetic `point_count` field is appended.
    pub fn has_point_count(&self) -> bool {
        self.point_count
    }

    /// All output field names, including `point_count` when clustering.
    pub fn output_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.iter().map(String::as_str).collect();
        if self.point_count {
            names.push(POINT_COUNT_FIELD);
        }
        names
    }
}
