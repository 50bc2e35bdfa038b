//! Dialect-owned registry: overrides, codec memo and the schema catalog.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use super::append::AppendFn;
use super::scan::ScanFn;
use crate::schema::Tables;
use crate::types::{FieldKind, FieldType};

/// Overrides applied when a dialect is constructed.
///
/// ```ignore
/// let dialect = PgDialect::with_options(
///     DialectOptions::new()
///         .sql_type(FieldKind::String, "TEXT")
///         .appender(FieldType::new(FieldKind::Custom("money")), append_money),
/// );
/// ```
#[derive(Clone, Default)]
pub struct DialectOptions {
    sql_types: HashMap<FieldKind, String>,
    appenders: HashMap<FieldType, AppendFn>,
    scanners: HashMap<FieldType, ScanFn>,
}

impl DialectOptions {
    /// Creates an empty set of overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a field kind to a SQL type, replacing the dialect's choice.
    #[must_use]
    pub fn sql_type(mut self, kind: FieldKind, sql_type: impl Into<String>) -> Self {
        self.sql_types.insert(kind, sql_type.into());
        self
    }

    /// Uses `append` for every field of type `ty`.
    #[must_use]
    pub fn appender(mut self, ty: FieldType, append: AppendFn) -> Self {
        self.appenders.insert(ty, append);
        self
    }

    /// Uses `scan` for every field of type `ty`.
    #[must_use]
    pub fn scanner(mut self, ty: FieldType, scan: ScanFn) -> Self {
        self.scanners.insert(ty, scan);
        self
    }
}

impl fmt::Debug for DialectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectOptions")
            .field("sql_types", &self.sql_types)
            .field("appenders", &self.appenders.keys().collect::<Vec<_>>())
            .field("scanners", &self.scanners.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Per-dialect state that lives as long as the dialect.
///
/// Overrides are fixed at construction. The codec memo and the catalog are
/// populated lazily; a miss computes a deterministic result and publishes
/// it, so concurrent misses converge.
#[derive(Default)]
pub struct Registry {
    options: DialectOptions,
    appenders: RwLock<HashMap<FieldType, AppendFn>>,
    scanners: RwLock<HashMap<FieldType, ScanFn>>,
    tables: Tables,
}

impl Registry {
    /// Creates a registry with the given overrides.
    #[must_use]
    pub fn new(options: DialectOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// The schema catalog of this dialect.
    #[must_use]
    pub const fn tables(&self) -> &Tables {
        &self.tables
    }

    pub(crate) fn sql_type_override(&self, kind: &FieldKind) -> Option<&str> {
        self.options.sql_types.get(kind).map(String::as_str)
    }

    pub(crate) fn appender(&self, ty: &FieldType, resolve: impl FnOnce() -> AppendFn) -> AppendFn {
        if let Some(f) = self.options.appenders.get(ty) {
            return *f;
        }
        memoize(&self.appenders, ty, resolve)
    }

    pub(crate) fn scanner(&self, ty: &FieldType, resolve: impl FnOnce() -> ScanFn) -> ScanFn {
        if let Some(f) = self.options.scanners.get(ty) {
            return *f;
        }
        memoize(&self.scanners, ty, resolve)
    }
}

fn memoize<F: Copy>(
    cache: &RwLock<HashMap<FieldType, F>>,
    ty: &FieldType,
    resolve: impl FnOnce() -> F,
) -> F {
    if let Some(f) = cache.read().unwrap_or_else(PoisonError::into_inner).get(ty) {
        return *f;
    }
    tracing::trace!(kind = %ty.kind, nullable = ty.nullable, "resolving codec function");
    let f = resolve();
    *cache
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(ty.clone())
        .or_insert(f)
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("options", &self.options)
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}
