//! PostgreSQL dialect.

use std::fmt::Write;

use super::append;
use super::scan::{self, ScanFn};
use super::sqltype;
use super::{Dialect, DialectOptions, Feature, Registry};
use crate::formatter::Formatter;
use crate::types::{FieldKind, FieldType};
use crate::value::Value;

/// PostgreSQL dialect: `$n` placeholders, native arrays, `BYTEA` and
/// `JSONB`.
#[derive(Debug, Default)]
pub struct PgDialect {
    registry: Registry,
}

impl PgDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a PostgreSQL dialect with type and codec overrides.
    #[must_use]
    pub fn with_options(options: DialectOptions) -> Self {
        Self {
            registry: Registry::new(options),
        }
    }
}

impl Dialect for PgDialect {
    fn name(&self) -> &'static str {
        "pg"
    }

    fn features(&self) -> Feature {
        Feature::RETURNING
            | Feature::DEFAULT_PLACEHOLDER
            | Feature::DOUBLE_COLON_CAST
            | Feature::INSERT_TABLE_ALIAS
            | Feature::TABLE_CASCADE
            | Feature::TABLE_IDENTITY
            | Feature::TABLE_TRUNCATE
            | Feature::INSERT_ON_CONFLICT
    }

    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn as_dyn(&self) -> &dyn Dialect {
        self
    }

    fn append_placeholder(&self, b: &mut String, position: usize) {
        let _ = write!(b, "${position}");
    }

    fn append_bytes(&self, b: &mut String, bytes: &[u8]) {
        append::append_bytea(b, bytes);
    }

    fn append_float(&self, b: &mut String, f: f64) {
        append::append_float_pg(b, f);
    }

    fn append_array(&self, f: &Formatter<'_>, b: &mut String, items: &[Value]) {
        append::append_pg_array(f, b, items);
    }

    fn default_sql_type(&self, ty: &FieldType) -> String {
        match &ty.kind {
            FieldKind::Json => sqltype::JSONB.to_string(),
            FieldKind::Bytes => sqltype::BYTEA.to_string(),
            FieldKind::Array(inner) => {
                format!("{}[]", self.default_sql_type(&FieldType::new((**inner).clone())))
            }
            _ => sqltype::discover(ty),
        }
    }

    fn default_scanner(&self, ty: &FieldType) -> ScanFn {
        match ty.kind {
            FieldKind::Array(_) => scan::scan_pg_array,
            FieldKind::Bytes => scan::scan_bytea,
            _ => scan::scanner(ty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pg_placeholders() {
        let dialect = PgDialect::new();
        let mut b = String::new();
        dialect.append_placeholder(&mut b, 1);
        b.push_str(", ");
        dialect.append_placeholder(&mut b, 12);
        assert_eq!(b, "$1, $12");
    }

    #[test]
    fn test_pg_sql_types() {
        let dialect = PgDialect::new();
        let array = FieldType::new(FieldKind::Array(Box::new(FieldKind::String)));
        assert_eq!(dialect.sql_type(&array), "VARCHAR[]");
        assert_eq!(dialect.sql_type(&FieldType::new(FieldKind::Json)), "JSONB");
        assert_eq!(dialect.sql_type(&FieldType::new(FieldKind::Bytes)), "BYTEA");
        assert!(dialect.has_feature(Feature::TABLE_CASCADE | Feature::RETURNING));
        assert!(!dialect.has_feature(Feature::ON_DUPLICATE_KEY));
    }

    #[test]
    fn test_pg_array_scan_round_trip() {
        let dialect = PgDialect::new();
        let ty = FieldType::new(FieldKind::Array(Box::new(FieldKind::String)));
        let items = vec![
            Value::Text("plain".into()),
            Value::Text("with, comma".into()),
            Value::Text("with \"quotes\"".into()),
            Value::Text("back\\slash".into()),
            Value::Text("{braces}".into()),
        ];
        let f = Formatter::new(&dialect);
        let mut b = String::new();
        (dialect.appender(&ty))(&f, &mut b, &Value::Array(items.clone()));

        // Strip the SQL literal quotes the way the server would.
        let text = b[1..b.len() - 1].replace("''", "'");
        let scanned = (dialect.scanner(&ty))(&ty, Value::Text(text));
        assert_eq!(scanned, Ok(Value::Array(items)));
    }
}
