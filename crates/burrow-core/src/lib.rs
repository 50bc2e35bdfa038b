//! # burrow-core
//!
//! Schema catalog, SQL dialects and value codec for the burrow ORM.
//!
//! This crate provides:
//! - Table, column and relation metadata derived once per model type from
//!   `#[derive(Model)]` descriptors and cached by the dialect
//! - Dialects for PostgreSQL, MySQL and SQLite: identifier quoting, feature
//!   flags, SQL type discovery
//! - A value codec that renders every caller-supplied value as an escaped
//!   literal (or a positional placeholder) and scans driver values back
//!
//! The crate is synchronous and performs no I/O; statement building and
//! execution live in `burrow-orm`.
//!
//! ## SQL Injection Prevention
//!
//! Values never reach SQL text unescaped:
//!
//! ```rust
//! use burrow_core::{fragment, Formatter, Ident, PgDialect};
//!
//! let dialect = PgDialect::new();
//! let f = Formatter::new(&dialect);
//!
//! let user_input = "'; DROP TABLE users; --";
//! let mut sql = String::new();
//! fragment!("? = ?", Ident("user.name"), user_input)
//!     .append_query(&f, &mut sql, None)
//!     .unwrap();
//!
//! assert_eq!(sql, r#""user"."name" = '''; DROP TABLE users; --'"#);
//! ```
//!
//! ## Placeholder templates
//!
//! The same fragment renders as a template with its arguments collected:
//!
//! ```rust
//! use burrow_core::{fragment, Formatter, PgDialect, Value};
//!
//! let dialect = PgDialect::new();
//! let f = Formatter::placeholders(&dialect);
//!
//! let mut sql = String::new();
//! fragment!("name = ? AND age > ?", "bun", 18)
//!     .append_query(&f, &mut sql, None)
//!     .unwrap();
//!
//! assert_eq!(sql, "name = $1 AND age > $2");
//! assert_eq!(f.take_args(), vec![Value::Text("bun".into()), Value::Int(18)]);
//! ```

pub mod dialect;
pub mod error;
pub mod formatter;
pub mod schema;
pub mod types;
pub mod value;

pub use dialect::{
    Dialect, DialectOptions, Feature, GenericDialect, MysqlDialect, PgDialect, Registry,
    SqliteDialect,
};
pub use error::{BuildError, Result, ScanError, SchemaError};
pub use formatter::{Arg, ArgAppender, Formatter, Ident, In, QueryWithArgs, Safe, ToArg};
pub use schema::{
    Destination, Field, HookError, IntoDestination, Model, ModelDef, ModelInfo, OneSlot, Record,
    RecordList, Relation, RelationKind, RelationMut, RelationRef, RelationValue, Relations,
    ScanHooks, Table, Tables,
};
pub use types::{FieldKind, FieldType, SqlType};
pub use value::{FromValue, Json, Row, ToValue, Value, ValueKey};
