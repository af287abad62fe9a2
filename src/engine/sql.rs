//! SQL builders for the PostGIS engine.
//!
//! Table and column names cannot be bound as query parameters, so they are
//! spliced into the text here, always through [`quote_ident`]. Tile
//! coordinates and the cluster cell size are bound as `$1..$4`.

use crate::tile::{Aggregation, AttributeSet, ClusterParams, GenerationPolicy, POINT_COUNT_FIELD};

use super::{GenerationRequest, MVT_BUFFER, MVT_EXTENT, MVT_LAYER_NAME};

/// Equatorial circumference of the Web Mercator sphere, in meters.
const EARTH_CIRCUMFERENCE_M: f64 = 40_075_016.685_578_49;

/// Reference tile size for converting pixel grid sizes to meters.
const TILE_SIZE_PX: f64 = 256.0;

/// Name of the encoded geometry column inside the tile query.
const MVT_GEOM: &str = "__mvt_geom";

/// Tables in `$1` with a geometry column registered at SRID 4326.
pub const LIST_SOURCES: &str = "\
SELECT DISTINCT f_table_name::text
FROM geometry_columns
WHERE f_table_schema = $1 AND srid = 4326
ORDER BY 1";

/// Registered geometry columns of table `$2` in schema `$1`.
pub const GEOMETRY_COLUMNS: &str = "\
SELECT f_geometry_column::text
FROM geometry_columns
WHERE f_table_schema = $1 AND f_table_name = $2
ORDER BY 1";

/// Non-geometry columns of table `$2` in schema `$1`, in table order.
pub const ATTRIBUTE_COLUMNS: &str = "\
SELECT column_name::text, data_type::text
FROM information_schema.columns
WHERE table_schema = $1 AND table_name = $2
  AND udt_name NOT IN ('geometry', 'geography')
ORDER BY ordinal_position";

/// Quote an SQL identifier, doubling any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

pub fn geometry_type_query(schema: &str, table: &str, column: &str) -> String {
    let column = quote_ident(column);
    format!(
        "SELECT ST_GeometryType({column}) FROM {table} WHERE {column} IS NOT NULL LIMIT 1",
        table = qualified_table(schema, table),
    )
}

pub fn extent_query(schema: &str, table: &str, column: &str) -> String {
    let column = quote_ident(column);
    format!(
        "WITH e AS (SELECT ST_Extent({column}) AS box FROM {table} WHERE {column} IS NOT NULL) \
         SELECT ST_XMin(box), ST_YMin(box), ST_XMax(box), ST_YMax(box) FROM e",
        table = qualified_table(schema, table),
    )
}

pub fn srid_query(schema: &str, table: &str, column: &str) -> String {
    let column = quote_ident(column);
    format!(
        "SELECT ST_SRID({column}) FROM {table} WHERE {column} IS NOT NULL LIMIT 1",
        table = qualified_table(schema, table),
    )
}

/// Grid cell size in meters for clustering at zoom `z`.
///
/// The pixel grid is converted to meters at the tile's resolution and never
/// drops below the minimum cluster distance.
pub fn cluster_cell_size(z: u8, params: &ClusterParams) -> f64 {
    let meters_per_px = EARTH_CIRCUMFERENCE_M / f64::from(1u32 << z) / TILE_SIZE_PX;
    (meters_per_px * f64::from(params.grid_size_px)).max(params.tolerance_m)
}

/// A tile query and its extra bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct TileQuery {
    pub sql: String,
    /// Cluster cell size bound as `$4`, present for clustered tiles only
    pub cell_size: Option<f64>,
}

/// Build the MVT query for a generation request.
///
/// Binds: `$1` z, `$2` x, `$3` y, and `$4` cell size when clustering.
pub fn tile_query(schema: &str, request: &GenerationRequest<'_>) -> TileQuery {
    let table = qualified_table(schema, request.source.name());
    let geometry = quote_ident(request.geometry_column());

    match request.policy {
        GenerationPolicy::Cluster(params) => TileQuery {
            sql: clustered_tile_query(&table, &geometry, request.attributes),
            cell_size: Some(cluster_cell_size(request.key.z(), &params)),
        },
        _ => TileQuery {
            sql: plain_tile_query(&table, &geometry, request.attributes),
            cell_size: None,
        },
    }
}

fn plain_tile_query(table: &str, geometry: &str, attributes: &AttributeSet) -> String {
    let columns: String = attributes
        .fields()
        .iter()
        .map(|f| format!(", t.{}", quote_ident(f)))
        .collect();

    format!(
        "WITH bounds AS (SELECT ST_TileEnvelope($1, $2, $3) AS geom), \
         features_data AS ( \
           SELECT ST_AsMVTGeom(ST_Transform(t.{geometry}, 3857), bounds.geom, \
                  {MVT_EXTENT}, {MVT_BUFFER}, true) AS {MVT_GEOM}{columns} \
           FROM {table} t, bounds \
           WHERE ST_Intersects(ST_Transform(t.{geometry}, 3857), bounds.geom) \
         ) \
         SELECT ST_AsMVT(features_data.*, '{MVT_LAYER_NAME}', {MVT_EXTENT}, '{MVT_GEOM}') \
         FROM features_data"
    )
}

fn clustered_tile_query(table: &str, geometry: &str, attributes: &AttributeSet) -> String {
    let source_columns: String = attributes
        .fields()
        .iter()
        .map(|f| format!(", t.{}", quote_ident(f)))
        .collect();

    let mut aggregates: String = attributes
        .fields()
        .iter()
        .map(|f| {
            let f = quote_ident(f);
            match attributes.aggregation() {
                Aggregation::FirstInGroup => {
                    format!(", (array_agg({f} ORDER BY __mvt_src))[1] AS {f}")
                }
                Aggregation::Direct => format!(", {f}"),
            }
        })
        .collect();
    if attributes.has_point_count() {
        aggregates.push_str(&format!(", count(*) AS {}", quote_ident(POINT_COUNT_FIELD)));
    }

    let outputs: String = attributes
        .output_names()
        .iter()
        .map(|f| format!(", {}", quote_ident(f)))
        .collect();

    format!(
        "WITH bounds AS (SELECT ST_TileEnvelope($1, $2, $3) AS geom), \
         src AS ( \
           SELECT ST_Transform(t.{geometry}, 3857) AS __mvt_src{source_columns} \
           FROM {table} t, bounds \
           WHERE ST_Intersects(ST_Transform(t.{geometry}, 3857), bounds.geom) \
         ), \
         clusters AS ( \
           SELECT ST_Centroid(ST_Collect(__mvt_src)) AS __mvt_center{aggregates} \
           FROM src \
           GROUP BY ST_SnapToGrid(__mvt_src, $4) \
         ), \
         features_data AS ( \
           SELECT ST_AsMVTGeom(__mvt_center, bounds.geom, \
                  {MVT_EXTENT}, {MVT_BUFFER}, true) AS {MVT_GEOM}{outputs} \
           FROM clusters, bounds \
         ) \
         SELECT ST_AsMVT(features_data.*, '{MVT_LAYER_NAME}', {MVT_EXTENT}, '{MVT_GEOM}') \
         FROM features_data"
    )
}
