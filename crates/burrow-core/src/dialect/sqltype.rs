//! Default mapping from field kinds to SQL column types.

use crate::types::{FieldKind, FieldType};

pub const BOOLEAN: &str = "BOOLEAN";
pub const SMALLINT: &str = "SMALLINT";
pub const INTEGER: &str = "INTEGER";
pub const BIGINT: &str = "BIGINT";
pub const REAL: &str = "REAL";
pub const DOUBLE_PRECISION: &str = "DOUBLE PRECISION";
pub const VARCHAR: &str = "VARCHAR";
pub const TIMESTAMP: &str = "TIMESTAMP";
pub const BLOB: &str = "BLOB";
pub const BYTEA: &str = "BYTEA";
pub const JSON: &str = "JSON";
pub const JSONB: &str = "JSONB";

/// Discovers the SQL type of a field from its kind.
///
/// Strings, collections, JSON and custom kinds default to `VARCHAR`; dialects
/// refine this table.
#[must_use]
pub fn discover(ty: &FieldType) -> String {
    let name = match &ty.kind {
        FieldKind::Bool => BOOLEAN,
        FieldKind::Int8 | FieldKind::Int16 | FieldKind::UInt8 | FieldKind::UInt16 => SMALLINT,
        FieldKind::Int32 | FieldKind::UInt32 => INTEGER,
        FieldKind::Int64 | FieldKind::UInt64 => BIGINT,
        FieldKind::Float32 => REAL,
        FieldKind::Float64 => DOUBLE_PRECISION,
        FieldKind::Timestamp => TIMESTAMP,
        FieldKind::String
        | FieldKind::Bytes
        | FieldKind::Json
        | FieldKind::Array(_)
        | FieldKind::Custom(_) => VARCHAR,
    };
    name.to_string()
}
