//! # burrow-orm
//!
//! Statement builders, model binding and relation loading on top of
//! `burrow-core`.
//!
//! This crate provides:
//! - [`Db`]: a dialect, a connection and query observers
//! - SELECT, INSERT, UPDATE, DELETE and schema statement builders that
//!   render literal SQL or placeholder templates
//! - A model binder that scans rows into a model, a model list, column
//!   maps or scalar targets
//! - Relation loading: to-one relations are joined into the statement,
//!   to-many and many-to-many relations are loaded with one extra query
//!   each and stitched into the parents in order
//! - Soft deletes and primary-key predicates
//! - An sqlx SQLite connection adapter
//!
//! ## Quick Start
//!
//! ```ignore
//! use burrow_orm::{driver::sqlite, fragment, Context, Db, SqliteDialect};
//!
//! #[derive(Debug, Default, Clone, burrow_derive::Model)]
//! struct User {
//!     id: i64,
//!     name: String,
//!     emails: Vec<String>,
//! }
//!
//! async fn example() -> burrow_orm::Result<()> {
//!     let pool = sqlite::memory_pool().await.expect("sqlite");
//!     let db = Db::new(SqliteDialect::new(), pool);
//!     let ctx = Context::new();
//!
//!     db.new_create_table().model_type::<User>().exec(&ctx).await?;
//!
//!     let mut user = User {
//!         name: "bun".into(),
//!         emails: vec!["bun@uptrace".into()],
//!         ..User::default()
//!     };
//!     db.new_insert().model(&mut user).exec(&ctx).await?;
//!
//!     let mut found = User::default();
//!     db.new_select()
//!         .model(&mut found)
//!         .where_(fragment!("id = ?", user.id))
//!         .scan(&ctx)
//!         .await?;
//!     assert_eq!(found.emails, vec!["bun@uptrace".to_string()]);
//!     Ok(())
//! }
//! ```
//!
//! ## Relations
//!
//! ```ignore
//! let mut stories: Vec<Story> = Vec::new();
//! db.new_select()
//!     .model(&mut stories)
//!     .relation("author")
//!     .relation_with("comments", |q| q.order("id DESC"))
//!     .scan(&ctx)
//!     .await?;
//! ```
//!
//! The first statement selects the stories with
//! `LEFT JOIN "users" AS "author" ON ("author"."id" = "story"."author_id")`
//! and the author's columns as `author__id`, `author__name`, ...; the
//! second selects the comments of every distinct story id.
//!
//! ## Dry runs
//!
//! Every builder renders without executing:
//!
//! ```ignore
//! let sql = db.new_delete().model(&mut story).where_pk().to_sql()?;
//! let (template, args) = db.new_select().model(&mut users).where_(fragment!("name = ?", "bun")).to_template()?;
//! ```

pub mod config;
pub mod conn;
pub mod db;
pub mod driver;
pub mod error;
pub mod hook;
mod join;
pub mod model;
pub mod query;

pub use config::{Config, DialectName};
pub use conn::{CancelToken, Conn, Context, RowSet};
pub use db::Db;
pub use error::{BindError, DriverError, Error, Result};
pub use hook::{QueryEvent, QueryHook, QueryLogger};
pub use join::ScopeFn;
pub use model::{Binder, BoxedRecords, IntoBinder, MapDest, ScalarTarget, Scalars};
pub use query::{
    AddColumnQuery, CreateIndexQuery, CreateTableQuery, DeleteQuery, DropColumnQuery,
    DropTableQuery, InsertQuery, SelectQuery, SoftDelete, TruncateTableQuery, UpdateQuery,
    WhereGroup,
};

pub use burrow_core::{
    fragment, BuildError, Dialect, Feature, FromValue, Ident, In, Json, Model, MysqlDialect,
    PgDialect, QueryWithArgs, Row, Safe, ScanError, SchemaError, SqliteDialect, ToValue, Value,
};
