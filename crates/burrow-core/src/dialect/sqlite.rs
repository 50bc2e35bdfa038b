//! SQLite dialect.

use super::sqltype;
use super::{Dialect, DialectOptions, Feature, Registry};
use crate::types::{FieldKind, FieldType};

/// SQLite dialect.
///
/// Every integer width maps to `INTEGER`, so a single integer primary key
/// aliases the rowid and autoincrements.
#[derive(Debug, Default)]
pub struct SqliteDialect {
    registry: Registry,
}

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a SQLite dialect with type and codec overrides.
    #[must_use]
    pub fn with_options(options: DialectOptions) -> Self {
        Self {
            registry: Registry::new(options),
        }
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn features(&self) -> Feature {
        Feature::RETURNING | Feature::INSERT_ON_CONFLICT
    }

    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn as_dyn(&self) -> &dyn Dialect {
        self
    }

    fn append_offset_only_limit(&self, b: &mut String) {
        b.push_str(" LIMIT -1");
    }

    fn default_sql_type(&self, ty: &FieldType) -> String {
        match ty.kind {
            ref kind if kind.is_integer() => sqltype::INTEGER.to_string(),
            FieldKind::Bytes => sqltype::BLOB.to_string(),
            _ => sqltype::discover(ty),
        }
    }
}
