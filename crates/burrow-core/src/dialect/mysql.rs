//! MySQL dialect.

use chrono::{DateTime, Utc};

use super::append;
use super::sqltype;
use super::{Dialect, DialectOptions, Feature, Registry};
use crate::types::{FieldKind, FieldType};

/// MySQL dialect: backtick identifiers, backslash-escaping string literals
/// and offset-less UTC timestamps.
#[derive(Debug, Default)]
pub struct MysqlDialect {
    registry: Registry,
}

impl MysqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a MySQL dialect with type and codec overrides.
    #[must_use]
    pub fn with_options(options: DialectOptions) -> Self {
        Self {
            registry: Registry::new(options),
        }
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn features(&self) -> Feature {
        Feature::AUTO_INCREMENT
            | Feature::DEFAULT_PLACEHOLDER
            | Feature::UPDATE_MULTI_TABLE
            | Feature::VALUES_ROW
            | Feature::TABLE_TRUNCATE
            | Feature::ON_DUPLICATE_KEY
    }

    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn as_dyn(&self) -> &dyn Dialect {
        self
    }

    fn identifier_quote(&self) -> char {
        '`'
    }

    fn append_string(&self, b: &mut String, s: &str) {
        append::append_string_escaped(b, s);
    }

    fn append_time(&self, b: &mut String, t: &DateTime<Utc>) {
        append::append_time(b, t, append::TIME_FORMAT_NAIVE);
    }

    fn append_offset_only_limit(&self, b: &mut String) {
        b.push_str(" LIMIT 18446744073709551615");
    }

    fn default_sql_type(&self, ty: &FieldType) -> String {
        match ty.kind {
            FieldKind::String => "VARCHAR(255)".to_string(),
            FieldKind::Timestamp => "DATETIME".to_string(),
            FieldKind::Json | FieldKind::Array(_) => sqltype::JSON.to_string(),
            FieldKind::Bytes => sqltype::BLOB.to_string(),
            _ => sqltype::discover(ty),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::formatter::Formatter;
    use crate::value::Value;

    #[test]
    fn test_mysql_offset_needs_max_limit() {
        let mut b = String::new();
        MysqlDialect::new().append_offset_only_limit(&mut b);
        assert_eq!(b, " LIMIT 18446744073709551615");

        let mut b = String::new();
        crate::dialect::PgDialect::new().append_offset_only_limit(&mut b);
        assert!(b.is_empty());
    }

    #[test]
    fn test_mysql_literals() {
        let dialect = MysqlDialect::new();
        let f = Formatter::new(&dialect);
        let mut b = String::new();
        f.append_value(&mut b, &Value::Text("a\\'b".into()));
        assert_eq!(b, "'a\\\\''b'");

        let t = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut b = String::new();
        f.append_value(&mut b, &Value::Timestamp(t));
        assert_eq!(b, "'2024-01-02 03:04:05.000000'");
    }

    #[test]
    fn test_mysql_sql_types() {
        let dialect = MysqlDialect::new();
        assert_eq!(dialect.sql_type(&FieldType::new(FieldKind::String)), "VARCHAR(255)");
        assert_eq!(dialect.sql_type(&FieldType::new(FieldKind::Timestamp)), "DATETIME");
        assert!(!dialect.has_feature(Feature::RETURNING));
    }
}
