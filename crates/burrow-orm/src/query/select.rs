//! SELECT statements.

use std::sync::Arc;

use burrow_core::{Arg, BuildError, Formatter, FromValue, Model, QueryWithArgs, Table, Value};
use futures::future::BoxFuture;

use super::base::{self, Column, Deferred, QueryBase};
use super::r#where::{Sep, SoftDelete, WhereGroup};
use crate::conn::{Context, RowSet};
use crate::db::Db;
use crate::error::{BindError, Error, Result};
use crate::join::{self, JoinNode, ScopeFn};
use crate::model::{BridgeColumns, Bound, IntoBinder, Layout};

const DIRECTION_WORDS: &[&str] = &["ASC", "DESC", "NULLS", "FIRST", "LAST"];

/// Which clauses a rendering includes.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// The full statement.
    Rows,
    /// `count(*)` over FROM, joins and WHERE.
    Count,
    /// The full statement without ORDER BY, LIMIT and OFFSET.
    Unordered,
}

/// A SELECT statement builder.
///
/// # Example
///
/// ```ignore
/// let mut stories: Vec<Story> = Vec::new();
/// db.new_select()
///     .model(&mut stories)
///     .relation("author")
///     .relation_with("comments", |q| q.order("id DESC").limit(3))
///     .where_(fragment!("?TableAlias.title LIKE ?", "bun%"))
///     .limit(10)
///     .scan(&ctx)
///     .await?;
/// ```
pub struct SelectQuery<'a> {
    pub(crate) base: QueryBase<'a>,
    distinct: bool,
    joins: Vec<QueryWithArgs>,
    relations: Vec<JoinNode>,
    /// Raw column SQL selected after the regular columns.
    captured: Vec<String>,
    group: Vec<QueryWithArgs>,
    having: Vec<QueryWithArgs>,
    order: Vec<QueryWithArgs>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'a> SelectQuery<'a> {
    pub(crate) fn new(db: Db) -> Self {
        Self {
            base: QueryBase::new(db),
            distinct: false,
            joins: Vec::new(),
            relations: Vec::new(),
            captured: Vec::new(),
            group: Vec::new(),
            having: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// An unbound query against `table` referenced as `alias`, handed to
    /// relation scopes.
    pub(crate) fn scratch(db: Db, table: &Arc<Table>, alias: &str) -> Self {
        let mut query = Self::new(db);
        query.base.table = Some(Arc::clone(table));
        query.base.alias = Some(alias.to_string());
        query
    }

    /// Adds a common table expression.
    #[must_use]
    pub fn with(mut self, name: &str, query: SelectQuery<'a>) -> Self {
        self.base.with.push((name.to_string(), Box::new(query)));
        self
    }

    /// Sets the destination; a model destination also sets the table.
    #[must_use]
    pub fn model(mut self, dest: impl IntoBinder<'a>) -> Self {
        self.base.set_model(dest);
        self
    }

    /// Sets the table from a model type without a destination.
    #[must_use]
    pub fn model_type<T: Model>(mut self) -> Self {
        self.base.set_model_type(T::info());
        self
    }

    #[must_use]
    pub fn table(mut self, name: &str) -> Self {
        self.base.tables.push(QueryWithArgs::ident(name));
        self
    }

    #[must_use]
    pub fn table_expr(mut self, query: QueryWithArgs) -> Self {
        self.base.tables.push(query);
        self
    }

    /// Selects a column. Columns of the model table are qualified with
    /// the table alias.
    #[must_use]
    pub fn column(mut self, name: &str) -> Self {
        self.base.columns.push(Column::Name(name.to_string()));
        self
    }

    #[must_use]
    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base
            .columns
            .extend(names.into_iter().map(|n| Column::Name(n.into())));
        self
    }

    #[must_use]
    pub fn column_expr(mut self, query: QueryWithArgs) -> Self {
        self.base.columns.push(Column::Expr(query));
        self
    }

    /// Removes a model column from the default column list.
    #[must_use]
    pub fn exclude_column(mut self, name: &str) -> Self {
        self.base.excluded.push(name.to_string());
        self
    }

    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Appends a JOIN fragment verbatim after the relation joins.
    #[must_use]
    pub fn join(mut self, query: QueryWithArgs) -> Self {
        self.joins.push(query);
        self
    }

    /// Loads a relation, or a dot-separated relation path such as
    /// `"author.profile"`.
    #[must_use]
    pub fn relation(self, path: &str) -> Self {
        self.add_relation(path, None)
    }

    /// Loads a relation and applies `scope` to the query against the
    /// related table. Named arguments inside the scope resolve against the
    /// related table and its alias.
    #[must_use]
    pub fn relation_with<F>(self, path: &str, scope: F) -> Self
    where
        F: for<'q> Fn(SelectQuery<'q>) -> SelectQuery<'q> + Send + Sync + 'static,
    {
        self.add_relation(path, Some(Arc::new(scope)))
    }

    fn add_relation(mut self, path: &str, scope: Option<ScopeFn>) -> Self {
        let Some(table) = self.base.table.clone() else {
            self.base
                .defer(Deferred::Build(BuildError::MissingTable { statement: "SELECT" }));
            return self;
        };
        let dialect = self.base.dialect();
        if let Err(err) = join::add_path(dialect, &mut self.relations, &table, path, scope) {
            self.base.defer(Deferred::Schema(err));
        }
        self
    }

    #[must_use]
    pub fn where_(mut self, query: QueryWithArgs) -> Self {
        self.base.add_where(Sep::And, query);
        self
    }

    #[must_use]
    pub fn where_or(mut self, query: QueryWithArgs) -> Self {
        self.base.add_where(Sep::Or, query);
        self
    }

    /// Adds a parenthesized group of predicates joined with AND.
    #[must_use]
    pub fn where_group(mut self, group: impl FnOnce(WhereGroup) -> WhereGroup) -> Self {
        self.base.add_where_group(Sep::And, group);
        self
    }

    /// Adds a parenthesized group of predicates joined with OR.
    #[must_use]
    pub fn where_group_or(mut self, group: impl FnOnce(WhereGroup) -> WhereGroup) -> Self {
        self.base.add_where_group(Sep::Or, group);
        self
    }

    /// Restricts the query to the primary keys of the model value(s).
    #[must_use]
    pub const fn where_pk(mut self) -> Self {
        self.base.wheres.pk = true;
        self
    }

    /// Selects only soft-deleted rows.
    #[must_use]
    pub fn where_deleted(mut self) -> Self {
        self.base.set_soft_delete(SoftDelete::OnlyDeleted);
        self
    }

    /// Selects live and soft-deleted rows.
    #[must_use]
    pub fn where_all_with_deleted(mut self) -> Self {
        self.base.set_soft_delete(SoftDelete::WithDeleted);
        self
    }

    #[must_use]
    pub fn group(mut self, column: &str) -> Self {
        self.group.push(QueryWithArgs::ident(column));
        self
    }

    #[must_use]
    pub fn group_expr(mut self, query: QueryWithArgs) -> Self {
        self.group.push(query);
        self
    }

    #[must_use]
    pub fn having(mut self, query: QueryWithArgs) -> Self {
        self.having.push(query);
        self
    }

    /// Orders by a column with an optional direction, e.g. `"id DESC"` or
    /// `"name ASC NULLS LAST"`.
    #[must_use]
    pub fn order(mut self, spec: &str) -> Self {
        let mut words = spec.split_whitespace();
        let column = words.next().unwrap_or_default();
        let direction: Vec<String> = words.map(str::to_ascii_uppercase).collect();
        let query = if !direction.is_empty()
            && direction.iter().all(|w| DIRECTION_WORDS.contains(&w.as_str()))
        {
            QueryWithArgs {
                query: format!("? {}", direction.join(" ")),
                args: vec![Arg::Ident(column.to_string())],
            }
        } else {
            QueryWithArgs::ident(spec.trim())
        };
        self.order.push(query);
        self
    }

    #[must_use]
    pub fn order_expr(mut self, query: QueryWithArgs) -> Self {
        self.order.push(query);
        self
    }

    #[must_use]
    pub const fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    #[must_use]
    pub const fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Appends rendered JOIN SQL; it is never scanned for `?` markers.
    pub(crate) fn join_raw(mut self, sql: String) -> Self {
        self.joins.push(verbatim(sql));
        self
    }

    /// Adds a rendered predicate; it is never scanned for `?` markers.
    pub(crate) fn where_raw(mut self, sql: String) -> Self {
        self.base.add_where(Sep::And, verbatim(sql));
        self
    }

    pub(crate) fn capture_column(mut self, sql: String) -> Self {
        self.captured.push(sql);
        self
    }

    /// Takes over relation nodes resolved against this query's table.
    pub(crate) fn adopt(mut self, nodes: Vec<JoinNode>) -> Self {
        self.relations.extend(nodes);
        self
    }

    /// Renders the statement with every value inlined as a literal.
    ///
    /// # Errors
    ///
    /// Returns the first builder error, or a [`BuildError`] found while
    /// rendering.
    pub fn to_sql(&self) -> Result<String> {
        base::to_sql(self.base.dialect(), |f, b| self.append_select(f, b))
    }

    /// Renders the statement as a placeholder template and its arguments.
    ///
    /// # Errors
    ///
    /// Same as [`SelectQuery::to_sql`].
    pub fn to_template(&self) -> Result<(String, Vec<Value>)> {
        base::to_template(self.base.dialect(), |f, b| self.append_select(f, b))
    }

    pub(crate) fn append_select(&self, f: &Formatter<'_>, b: &mut String) -> Result<()> {
        self.append_shape(f, b, Shape::Rows)
    }

    fn append_shape(&self, f: &Formatter<'_>, b: &mut String, shape: Shape) -> Result<()> {
        self.base.check()?;
        self.base.append_with(f, b)?;
        let dialect = self.base.dialect();
        let inline = match self.base.table_alias() {
            Some(alias) => join::inline(dialect, &self.relations, alias),
            None => Vec::new(),
        };

        b.push_str("SELECT ");
        if self.distinct && shape != Shape::Count {
            b.push_str("DISTINCT ");
        }
        if shape == Shape::Count {
            b.push_str("count(*)");
        } else {
            let mut first = true;
            let mut sep = |b: &mut String| {
                if !first {
                    b.push_str(", ");
                }
                first = false;
            };
            if !self.base.columns.is_empty() {
                for column in &self.base.columns {
                    sep(b);
                    self.base.append_column(f, b, column)?;
                }
            } else if let (Some(table), Some(alias)) = (&self.base.table, self.base.table_alias()) {
                for field in table.fields.iter().filter(|c| !self.base.excluded.contains(&c.name)) {
                    sep(b);
                    b.push_str(alias);
                    b.push('.');
                    b.push_str(&field.sql_name);
                }
            } else if self.captured.is_empty() && inline.is_empty() {
                sep(b);
                b.push('*');
            }
            for column in &self.captured {
                sep(b);
                b.push_str(column);
            }
            for join in &inline {
                sep(b);
                join.append_columns(&self.base.db, b);
            }
        }

        if self.base.has_table() {
            b.push_str(" FROM ");
            self.base.append_tables_with_alias(f, b)?;
        }
        for join in &inline {
            join.append_join(&self.base.db, f, b, self.base.wheres.soft_delete)?;
        }
        for join in &self.joins {
            b.push(' ');
            self.base.append_query(join, f, b)?;
        }
        self.base.append_where(f, b)?;

        if shape == Shape::Count {
            return Ok(());
        }
        if !self.group.is_empty() {
            b.push_str(" GROUP BY ");
            self.append_list(f, b, &self.group)?;
        }
        if !self.having.is_empty() {
            b.push_str(" HAVING ");
            for (i, query) in self.having.iter().enumerate() {
                if i > 0 {
                    b.push_str(" AND ");
                }
                b.push('(');
                self.base.append_query(query, f, b)?;
                b.push(')');
            }
        }
        if shape == Shape::Unordered {
            return Ok(());
        }
        if !self.order.is_empty() {
            b.push_str(" ORDER BY ");
            self.append_list(f, b, &self.order)?;
        }
        match (self.limit, self.offset) {
            (Some(limit), _) => {
                b.push_str(" LIMIT ");
                b.push_str(&limit.to_string());
            }
            (None, Some(_)) => dialect.append_offset_only_limit(b),
            (None, None) => {}
        }
        if let Some(offset) = self.offset {
            b.push_str(" OFFSET ");
            b.push_str(&offset.to_string());
        }
        Ok(())
    }

    fn append_list(&self, f: &Formatter<'_>, b: &mut String, list: &[QueryWithArgs]) -> Result<()> {
        for (i, query) in list.iter().enumerate() {
            if i > 0 {
                b.push_str(", ");
            }
            self.base.append_query(query, f, b)?;
        }
        Ok(())
    }

    fn layout(&self, bridge: Option<BridgeColumns>) -> Layout {
        let joins = match self.base.table_alias() {
            Some(alias) => join::inline(self.base.dialect(), &self.relations, alias)
                .iter()
                .map(join::Inline::columns)
                .collect(),
            None => Vec::new(),
        };
        Layout {
            table: self.base.table.clone(),
            joins,
            bridge,
        }
    }

    fn count_sql(&self) -> Result<String> {
        base::to_sql(self.base.dialect(), |f, b| {
            if self.distinct || !self.group.is_empty() {
                b.push_str("SELECT count(*) FROM (");
                self.append_shape(f, b, Shape::Unordered)?;
                b.push_str(") AS ");
                f.append_ident(b, "_count");
                Ok(())
            } else {
                self.append_shape(f, b, Shape::Count)
            }
        })
    }

    /// Runs the statement, binds the rows and loads the requested
    /// relations.
    pub(crate) fn fetch<'c>(
        self,
        ctx: &'c Context,
        bridge: Option<BridgeColumns>,
    ) -> BoxFuture<'c, Result<Bound>>
    where
        'a: 'c,
    {
        Box::pin(async move {
            let mut this = self;
            let sql = this.to_sql()?;
            let layout = this.layout(bridge);
            let rows = this.base.db.run_query(ctx, &sql).await?;

            let Self { base, relations, .. } = &mut this;
            let binder = base.binder.as_mut().ok_or(BindError::NoDestination)?;
            let bound = binder.bind_with(rows, &layout)?;
            if bound.count == 0 && binder.is_single() {
                return Err(Error::NoRows);
            }
            if bound.count > 0 && !relations.is_empty() {
                join::load(&base.db, ctx, binder.records_mut(), relations.as_slice()).await?;
            }
            Ok(bound)
        })
    }

    /// Runs the statement and scans the rows into the model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRows`] when a single-record destination matched
    /// nothing, and any build, execution or bind error.
    pub async fn scan(self, ctx: &Context) -> Result<()> {
        self.fetch(ctx, None).await.map(|_| ())
    }

    /// Runs the statement and scans the rows into `dest` instead of the
    /// model. The table context of the model is kept.
    ///
    /// # Errors
    ///
    /// Same as [`SelectQuery::scan`].
    pub async fn scan_into(mut self, ctx: &Context, dest: impl IntoBinder<'a>) -> Result<()> {
        self.base.set_model(dest);
        self.fetch(ctx, None).await.map(|_| ())
    }

    /// Runs the statement and returns the raw rows.
    ///
    /// # Errors
    ///
    /// Returns any build or execution error.
    pub async fn rows(&self, ctx: &Context) -> Result<RowSet> {
        let sql = self.to_sql()?;
        self.base.db.run_query(ctx, &sql).await
    }

    /// Counts the matching rows, ignoring ORDER BY, LIMIT and OFFSET.
    ///
    /// # Errors
    ///
    /// Returns any build or execution error.
    pub async fn count(&self, ctx: &Context) -> Result<u64> {
        let sql = self.count_sql()?;
        let rows = self.base.db.run_query(ctx, &sql).await?;
        let value = first_value(rows);
        u64::from_value(value).map_err(|source| {
            Error::from(BindError::Scan {
                column: "count".to_string(),
                source,
            })
        })
    }

    /// Reports whether the statement matches at least one row.
    ///
    /// # Errors
    ///
    /// Returns any build or execution error.
    pub async fn exists(&self, ctx: &Context) -> Result<bool> {
        let sql = base::to_sql(self.base.dialect(), |f, b| {
            b.push_str("SELECT EXISTS (");
            self.append_select(f, b)?;
            b.push(')');
            Ok(())
        })?;
        let rows = self.base.db.run_query(ctx, &sql).await?;
        bool::from_value(first_value(rows)).map_err(|source| {
            Error::from(BindError::Scan {
                column: "exists".to_string(),
                source,
            })
        })
    }
}

fn verbatim(sql: String) -> QueryWithArgs {
    QueryWithArgs {
        query: "?".to_string(),
        args: vec![Arg::Safe(sql)],
    }
}

fn first_value(rows: RowSet) -> Value {
    rows.rows
        .into_iter()
        .next()
        .and_then(|row| row.into_iter().next())
        .unwrap_or(Value::Null)
}
