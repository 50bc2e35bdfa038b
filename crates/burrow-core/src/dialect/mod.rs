//! SQL dialect support.
//!
//! A dialect decides how identifiers are quoted, which optional clauses the
//! backend understands, which SQL type a field kind maps to and how values
//! are encoded and decoded. It also owns the schema catalog, so table
//! metadata is built once per (dialect, model type).

pub mod append;
mod feature;
mod generic;
mod mysql;
mod pg;
mod registry;
pub mod scan;
mod sqlite;
pub mod sqltype;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use append::AppendFn;
pub use feature::Feature;
pub use generic::GenericDialect;
pub use mysql::MysqlDialect;
pub use pg::PgDialect;
pub use registry::{DialectOptions, Registry};
pub use scan::ScanFn;
pub use sqlite::SqliteDialect;

use crate::error::Result;
use crate::formatter::Formatter;
use crate::schema::{ModelInfo, Relation, Relations, Table};
use crate::types::{FieldKind, FieldType};
use crate::value::Value;

/// Trait for SQL dialect-specific behavior.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Returns the name of the dialect.
    fn name(&self) -> &'static str;

    /// Returns the optional features this backend supports.
    fn features(&self) -> Feature;

    /// Returns the registry owned by this dialect.
    fn registry(&self) -> &Registry;

    /// Upcasts to a trait object.
    fn as_dyn(&self) -> &dyn Dialect;

    /// Returns the identifier quote character.
    fn identifier_quote(&self) -> char {
        '"'
    }

    /// Appends the marker for the `position`-th (1-based) argument of a
    /// placeholder template.
    fn append_placeholder(&self, b: &mut String, position: usize) {
        let _ = position;
        b.push('?');
    }

    fn append_string(&self, b: &mut String, s: &str) {
        append::append_string(b, s);
    }

    fn append_bytes(&self, b: &mut String, bytes: &[u8]) {
        append::append_hex_bytes(b, bytes);
    }

    fn append_time(&self, b: &mut String, t: &DateTime<Utc>) {
        append::append_time(b, t, append::TIME_FORMAT_OFFSET);
    }

    fn append_float(&self, b: &mut String, f: f64) {
        append::append_float(b, f);
    }

    /// Renders a collection literal. Defaults to quoted JSON text.
    fn append_array(&self, f: &Formatter<'_>, b: &mut String, items: &[Value]) {
        append::append_json_array(f, b, items);
    }

    fn append_json(&self, b: &mut String, json: &serde_json::Value) {
        self.append_string(b, &json.to_string());
    }

    /// Appends the ` LIMIT ...` clause required before an OFFSET that has
    /// no limit of its own. Engines accepting a bare OFFSET append nothing.
    fn append_offset_only_limit(&self, b: &mut String) {
        let _ = b;
    }

    /// The SQL type for a field type, before user overrides.
    fn default_sql_type(&self, ty: &FieldType) -> String {
        sqltype::discover(ty)
    }

    /// The append function for a field type, before user overrides.
    fn default_appender(&self, ty: &FieldType) -> AppendFn {
        match ty.kind {
            FieldKind::Json => append::append_json_field,
            FieldKind::Array(_) => append::append_array_field,
            _ => append::append_value,
        }
    }

    /// The scan function for a field type, before user overrides.
    fn default_scanner(&self, ty: &FieldType) -> ScanFn {
        scan::scanner(ty)
    }

    /// Returns true if the dialect supports every feature in `feature`.
    fn has_feature(&self, feature: Feature) -> bool {
        self.features().contains(feature)
    }

    /// Appends a quoted identifier. Dots separate qualified names and `*`
    /// is left bare.
    fn append_ident(&self, b: &mut String, ident: &str) {
        let quote = self.identifier_quote();
        for (i, part) in ident.split('.').enumerate() {
            if i > 0 {
                b.push('.');
            }
            if part == "*" {
                b.push('*');
                continue;
            }
            b.push(quote);
            for c in part.chars() {
                if c == quote {
                    b.push(quote);
                }
                b.push(c);
            }
            b.push(quote);
        }
    }

    /// Quotes an identifier into a new string.
    fn quote_identifier(&self, ident: &str) -> String {
        let mut b = String::with_capacity(ident.len() + 2);
        self.append_ident(&mut b, ident);
        b
    }

    /// Resolves the SQL type of a field type, honoring overrides.
    fn sql_type(&self, ty: &FieldType) -> String {
        self.registry()
            .sql_type_override(&ty.kind)
            .map_or_else(|| self.default_sql_type(ty), str::to_string)
    }

    /// Resolves and memoizes the append function for a field type.
    fn appender(&self, ty: &FieldType) -> AppendFn {
        self.registry().appender(ty, || self.default_appender(ty))
    }

    /// Resolves and memoizes the scan function for a field type.
    fn scanner(&self, ty: &FieldType) -> ScanFn {
        self.registry().scanner(ty, || self.default_scanner(ty))
    }

    /// Resolves the table of a model, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`](crate::SchemaError) when the model
    /// definition is invalid.
    fn table(&self, info: ModelInfo) -> Result<Arc<Table>> {
        self.registry().tables().get(self.as_dyn(), info)
    }

    /// Resolves a table and makes it discoverable by SQL name, which
    /// many-to-many bridge tables require.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`](crate::SchemaError) when the model
    /// definition is invalid.
    fn register(&self, info: ModelInfo) -> Result<Arc<Table>> {
        self.registry().tables().register(self.as_dyn(), info)
    }

    /// Resolves every relation declared on `table`.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`](crate::SchemaError) when a relation
    /// cannot be resolved.
    fn relations(&self, table: &Arc<Table>) -> Result<Arc<Relations>> {
        self.registry().tables().relations(self.as_dyn(), table)
    }

    /// Resolves one relation of `table` by field name.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownRelation`](crate::SchemaError) when the
    /// table declares no such relation.
    fn relation(&self, table: &Arc<Table>, name: &str) -> Result<Arc<Relation>> {
        self.relations(table)?
            .get(name)
            .cloned()
            .ok_or_else(|| crate::SchemaError::UnknownRelation {
                table: table.type_name.to_string(),
                relation: name.to_string(),
            })
    }
}
