//! The database handle: dialect, connection and query observers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use burrow_core::{Dialect, Model, Table};
use tracing::{debug, warn};

use crate::config::Config;
use crate::conn::{Conn, Context, RowSet};
use crate::error::{DriverError, Error, Result};
use crate::hook::{QueryEvent, QueryHook};
use crate::query::{
    AddColumnQuery, CreateIndexQuery, CreateTableQuery, DeleteQuery, DropColumnQuery,
    DropTableQuery, InsertQuery, SelectQuery, TruncateTableQuery, UpdateQuery,
};

/// Entry point for building and running statements.
///
/// `Db` is cheap to clone; clones share the dialect, and with it the
/// schema catalog.
///
/// # Example
///
/// ```ignore
/// use burrow_orm::{driver::sqlite, Context, Db, SqliteDialect};
///
/// let pool = sqlite::memory_pool().await?;
/// let db = Db::new(SqliteDialect::new(), pool);
///
/// let mut user = User::default();
/// db.new_select()
///     .model(&mut user)
///     .where_(fragment!("id = ?", 1))
///     .scan(&Context::new())
///     .await?;
/// ```
#[derive(Clone)]
pub struct Db {
    dialect: Arc<dyn Dialect>,
    conn: Arc<dyn Conn>,
    hooks: Arc<Vec<Arc<dyn QueryHook>>>,
    timeout: Option<Duration>,
}

impl Db {
    pub fn new(dialect: impl Dialect + 'static, conn: impl Conn + 'static) -> Self {
        Self::from_parts(Arc::new(dialect), Arc::new(conn))
    }

    #[must_use]
    pub fn from_parts(dialect: Arc<dyn Dialect>, conn: Arc<dyn Conn>) -> Self {
        Self {
            dialect,
            conn,
            hooks: Arc::new(Vec::new()),
            timeout: None,
        }
    }

    /// Builds a handle from configuration: dialect, type overrides, default
    /// timeout and the query logger.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid type overrides.
    pub fn from_config(conn: impl Conn + 'static, config: &Config) -> Result<Self> {
        let mut db = Self::from_parts(config.build_dialect()?, Arc::new(conn));
        db.timeout = config.query_timeout();
        if let Some(logger) = config.logger() {
            db = db.with_query_hook(logger);
        }
        Ok(db)
    }

    /// Returns a handle with the same dialect, hooks and timeout over
    /// another connection, e.g. an open transaction.
    #[must_use]
    pub fn with_conn(&self, conn: impl Conn + 'static) -> Self {
        Self {
            conn: Arc::new(conn),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_query_hook(mut self, hook: impl QueryHook + 'static) -> Self {
        Arc::make_mut(&mut self.hooks).push(Arc::new(hook));
        self
    }

    /// Sets the deadline applied to round trips whose context has none.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        &*self.dialect
    }

    /// Resolves the table of `T`.
    ///
    /// # Errors
    ///
    /// Returns the [`SchemaError`](burrow_core::SchemaError) of an invalid
    /// model.
    pub fn table<T: Model>(&self) -> Result<Arc<Table>> {
        Ok(self.dialect.table(T::info())?)
    }

    /// Resolves `T` and makes it available as a many-to-many bridge table.
    ///
    /// # Errors
    ///
    /// Returns the [`SchemaError`](burrow_core::SchemaError) of an invalid
    /// model.
    pub fn register_model<T: Model>(&self) -> Result<Arc<Table>> {
        Ok(self.dialect.register(T::info())?)
    }

    #[must_use]
    pub fn new_select<'a>(&self) -> SelectQuery<'a> {
        SelectQuery::new(self.clone())
    }

    #[must_use]
    pub fn new_insert<'a>(&self) -> InsertQuery<'a> {
        InsertQuery::new(self.clone())
    }

    #[must_use]
    pub fn new_update<'a>(&self) -> UpdateQuery<'a> {
        UpdateQuery::new(self.clone())
    }

    #[must_use]
    pub fn new_delete<'a>(&self) -> DeleteQuery<'a> {
        DeleteQuery::new(self.clone())
    }

    #[must_use]
    pub fn new_create_table(&self) -> CreateTableQuery {
        CreateTableQuery::new(self.clone())
    }

    #[must_use]
    pub fn new_drop_table(&self) -> DropTableQuery {
        DropTableQuery::new(self.clone())
    }

    #[must_use]
    pub fn new_add_column(&self) -> AddColumnQuery {
        AddColumnQuery::new(self.clone())
    }

    #[must_use]
    pub fn new_drop_column(&self) -> DropColumnQuery {
        DropColumnQuery::new(self.clone())
    }

    #[must_use]
    pub fn new_create_index(&self) -> CreateIndexQuery {
        CreateIndexQuery::new(self.clone())
    }

    #[must_use]
    pub fn new_truncate_table(&self) -> TruncateTableQuery {
        TruncateTableQuery::new(self.clone())
    }

    /// Runs a plain SQL statement that returns rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] when the round trip fails.
    pub async fn query_raw(&self, ctx: &Context, sql: &str) -> Result<RowSet> {
        self.run_query(ctx, sql).await
    }

    /// Runs a plain SQL statement and returns the affected row count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Execution`] when the round trip fails.
    pub async fn exec_raw(&self, ctx: &Context, sql: &str) -> Result<u64> {
        self.run_exec(ctx, sql).await
    }

    pub(crate) async fn run_query(&self, ctx: &Context, sql: &str) -> Result<RowSet> {
        let mut event = self.before(sql);
        let started = Instant::now();
        let result = ctx.run(self.timeout, self.conn.query(sql)).await;
        event.rows = result.as_ref().ok().and_then(|rows| u64::try_from(rows.len()).ok());
        self.after(event, started, result)
    }

    pub(crate) async fn run_exec(&self, ctx: &Context, sql: &str) -> Result<u64> {
        let mut event = self.before(sql);
        let started = Instant::now();
        let result = ctx.run(self.timeout, self.conn.exec(sql)).await;
        event.rows = result.as_ref().ok().copied();
        self.after(event, started, result)
    }

    fn before(&self, sql: &str) -> QueryEvent {
        debug!(query = %sql, dialect = self.dialect.name(), "executing query");
        let event = QueryEvent::new(sql);
        for hook in self.hooks.iter() {
            hook.before_query(&event);
        }
        event
    }

    fn after<T>(
        &self,
        mut event: QueryEvent,
        started: Instant,
        result: std::result::Result<T, DriverError>,
    ) -> Result<T> {
        event.elapsed = started.elapsed();
        if let Err(err) = &result {
            warn!(query = %event.query, error = %err, "query failed");
            event.error = Some(err.to_string());
        }
        for hook in self.hooks.iter().rev() {
            hook.after_query(&event);
        }
        result.map_err(|source| Error::Execution {
            query: event.query,
            source,
        })
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("dialect", &self.dialect.name())
            .field("hooks", &self.hooks.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
