//! Statement builders.
//!
//! Every builder is created from a [`Db`](crate::Db), configured with
//! consuming `#[must_use]` methods and finished with `to_sql`,
//! `to_template` or one of the async execution methods. Errors from
//! builder calls (an unknown relation, an invalid model) are recorded and
//! reported when the statement is rendered.

pub(crate) mod base;
mod ddl;
mod delete;
mod insert;
mod select;
mod update;
pub(crate) mod r#where;

pub use ddl::{
    AddColumnQuery, CreateIndexQuery, CreateTableQuery, DropColumnQuery, DropTableQuery,
    TruncateTableQuery,
};
pub use delete::DeleteQuery;
pub use insert::InsertQuery;
pub use r#where::{SoftDelete, WhereGroup};
pub use select::SelectQuery;
pub use update::UpdateQuery;
