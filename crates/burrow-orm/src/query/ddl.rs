//! Schema statements: CREATE/DROP TABLE, ADD/DROP COLUMN, CREATE INDEX and
//! TRUNCATE TABLE.
//!
//! Each builder targets the model table, or the tables given with `table`
//! and `table_expr`, and runs with `exec`.

use burrow_core::{BuildError, Feature, Field, Formatter, ModelInfo, QueryWithArgs, Table, Value};

use super::base::{self, Column, QueryBase};
use super::r#where::Sep;
use crate::conn::Context;
use crate::db::Db;
use crate::error::{Error, Result};

/// Builder methods shared by every schema statement.
macro_rules! table_target {
    ($ty:ident) => {
        impl $ty {
            /// Targets the table of `T`.
            #[must_use]
            pub fn model_type<T: burrow_core::Model>(mut self) -> Self {
                self.base.set_model_type(T::info());
                self
            }

            /// Targets the table of a model known at runtime.
            #[must_use]
            pub fn model_info(mut self, info: ModelInfo) -> Self {
                self.base.set_model_type(info);
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

            /// Renders the statement with every value inlined as a literal.
            ///
            /// # Errors
            ///
            /// Returns the first builder error or a [`BuildError`].
            pub fn to_sql(&self) -> Result<String> {
                base::to_sql(self.base.dialect(), |f, b| self.append_statement(f, b))
            }

            /// Renders the statement as a placeholder template and its
            /// arguments.
            ///
            /// # Errors
            ///
            /// Returns the first builder error or a [`BuildError`].
            pub fn to_template(&self) -> Result<(String, Vec<Value>)> {
                base::to_template(self.base.dialect(), |f, b| self.append_statement(f, b))
            }

            /// Runs the statement.
            ///
            /// # Errors
            ///
            /// Returns any build or execution error.
            pub async fn exec(&self, ctx: &Context) -> Result<u64> {
                let sql = self.to_sql()?;
                self.base.db.run_exec(ctx, &sql).await
            }
        }
    };
}

fn append_table_list(
    query: &QueryBase<'_>,
    f: &Formatter<'_>,
    b: &mut String,
    statement: &'static str,
) -> Result<()> {
    if !query.has_table() {
        return Err(BuildError::MissingTable { statement }.into());
    }
    let mut first = true;
    if let Some(table) = &query.table {
        b.push_str(&table.sql_name);
        first = false;
    }
    for table in &query.tables {
        if !first {
            b.push_str(", ");
        }
        query.append_query(table, f, b)?;
        first = false;
    }
    Ok(())
}

/// `CREATE TABLE` from a model.
///
/// ```ignore
/// db.new_create_table().model_type::<User>().if_not_exists().exec(&ctx).await?;
/// ```
pub struct CreateTableQuery {
    base: QueryBase<'static>,
    if_not_exists: bool,
    temp: bool,
}

impl CreateTableQuery {
    pub(crate) fn new(db: Db) -> Self {
        Self {
            base: QueryBase::new(db),
            if_not_exists: false,
            temp: false,
        }
    }
}

table_target!(CreateTableQuery);

impl CreateTableQuery {
    #[must_use]
    pub const fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    #[must_use]
    pub const fn temp(mut self) -> Self {
        self.temp = true;
        self
    }

    fn append_statement(&self, _f: &Formatter<'_>, b: &mut String) -> Result<()> {
        const STATEMENT: &str = "CREATE TABLE";
        self.base.check()?;
        let table = self
            .base
            .table
            .as_deref()
            .ok_or(BuildError::MissingTable { statement: STATEMENT })?;

        b.push_str("CREATE ");
        if self.temp {
            b.push_str("TEMP ");
        }
        b.push_str("TABLE ");
        if self.if_not_exists {
            b.push_str("IF NOT EXISTS ");
        }
        b.push_str(&table.sql_name);
        b.push_str(" (");
        for (i, field) in table.fields.iter().enumerate() {
            if i > 0 {
                b.push_str(", ");
            }
            self.append_column_def(b, field);
        }
        append_primary_key(b, table);
        b.push(')');
        Ok(())
    }

    fn append_column_def(&self, b: &mut String, field: &Field) {
        let dialect = self.base.dialect();
        b.push_str(&field.sql_name);
        b.push(' ');
        b.push_str(field.user_sql_type.as_deref().unwrap_or(&field.sql_type));

        if field.not_null || (field.is_pk && !field.auto_increment) {
            b.push_str(" NOT NULL");
        }
        if field.unique {
            b.push_str(" UNIQUE");
        }
        if field.auto_increment {
            if dialect.has_feature(Feature::TABLE_IDENTITY) {
                b.push_str(" GENERATED BY DEFAULT AS IDENTITY");
            } else if dialect.has_feature(Feature::AUTO_INCREMENT) {
                b.push_str(" AUTO_INCREMENT");
            }
        }
        if let Some(default) = &field.default {
            b.push_str(" DEFAULT ");
            b.push_str(default);
        }
    }
}

fn append_primary_key(b: &mut String, table: &Table) {
    if table.pks.is_empty() {
        return;
    }
    b.push_str(", PRIMARY KEY (");
    for (i, pk) in table.pks.iter().enumerate() {
        if i > 0 {
            b.push_str(", ");
        }
        b.push_str(&pk.sql_name);
    }
    b.push(')');
}

/// `DROP TABLE`.
pub struct DropTableQuery {
    base: QueryBase<'static>,
    if_exists: bool,
    cascade: bool,
    restrict: bool,
}

impl DropTableQuery {
    pub(crate) fn new(db: Db) -> Self {
        Self {
            base: QueryBase::new(db),
            if_exists: false,
            cascade: false,
            restrict: false,
        }
    }
}

table_target!(DropTableQuery);

impl DropTableQuery {
    #[must_use]
    pub const fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    /// Drops dependent objects too, where the dialect supports it.
    #[must_use]
    pub const fn cascade(mut self) -> Self {
        self.cascade = true;
        self
    }

    #[must_use]
    pub const fn restrict(mut self) -> Self {
        self.restrict = true;
        self
    }

    fn append_statement(&self, f: &Formatter<'_>, b: &mut String) -> Result<()> {
        self.base.check()?;
        b.push_str("DROP TABLE ");
        if self.if_exists {
            b.push_str("IF EXISTS ");
        }
        append_table_list(&self.base, f, b, "DROP TABLE")?;
        append_cascade(&self.base, b, self.cascade, self.restrict);
        Ok(())
    }
}

fn append_cascade(query: &QueryBase<'_>, b: &mut String, cascade: bool, restrict: bool) {
    if !query.dialect().has_feature(Feature::TABLE_CASCADE) {
        return;
    }
    if cascade {
        b.push_str(" CASCADE");
    } else if restrict {
        b.push_str(" RESTRICT");
    }
}

/// `ALTER TABLE ... ADD COLUMN` with exactly one column definition.
///
/// ```ignore
/// db.new_add_column()
///     .model_type::<User>()
///     .column_expr(fragment!("email TEXT NOT NULL DEFAULT ''"))
///     .exec(&ctx)
///     .await?;
/// ```
pub struct AddColumnQuery {
    base: QueryBase<'static>,
    if_not_exists: bool,
}

impl AddColumnQuery {
    pub(crate) fn new(db: Db) -> Self {
        Self {
            base: QueryBase::new(db),
            if_not_exists: false,
        }
    }
}

table_target!(AddColumnQuery);

impl AddColumnQuery {
    /// Sets the column definition.
    #[must_use]
    pub fn column_expr(mut self, query: QueryWithArgs) -> Self {
        self.base.columns.push(Column::Expr(query));
        self
    }

    /// Skips the column if it exists. PostgreSQL only.
    #[must_use]
    pub const fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    fn append_statement(&self, f: &Formatter<'_>, b: &mut String) -> Result<()> {
        const STATEMENT: &str = "ADD COLUMN";
        self.base.check()?;
        let column = single_column(&self.base, STATEMENT)?;
        b.push_str("ALTER TABLE ");
        self.base.append_first_table(f, b, STATEMENT)?;
        b.push_str(" ADD COLUMN ");
        if self.if_not_exists {
            b.push_str("IF NOT EXISTS ");
        }
        append_unqualified(&self.base, f, b, column)
    }
}

/// `ALTER TABLE ... DROP COLUMN` with exactly one column.
pub struct DropColumnQuery {
    base: QueryBase<'static>,
}

impl DropColumnQuery {
    pub(crate) fn new(db: Db) -> Self {
        Self {
            base: QueryBase::new(db),
        }
    }
}

table_target!(DropColumnQuery);

impl DropColumnQuery {
    #[must_use]
    pub fn column(mut self, name: &str) -> Self {
        self.base.columns.push(Column::Name(name.to_string()));
        self
    }

    #[must_use]
    pub fn column_expr(mut self, query: QueryWithArgs) -> Self {
        self.base.columns.push(Column::Expr(query));
        self
    }

    fn append_statement(&self, f: &Formatter<'_>, b: &mut String) -> Result<()> {
        const STATEMENT: &str = "DROP COLUMN";
        self.base.check()?;
        let column = single_column(&self.base, STATEMENT)?;
        b.push_str("ALTER TABLE ");
        self.base.append_first_table(f, b, STATEMENT)?;
        b.push_str(" DROP COLUMN ");
        append_unqualified(&self.base, f, b, column)
    }
}

fn single_column<'q>(query: &'q QueryBase<'_>, statement: &'static str) -> Result<&'q Column> {
    match query.columns.as_slice() {
        [column] => Ok(column),
        columns => Err(BuildError::ColumnCount {
            statement,
            count: columns.len(),
        }
        .into()),
    }
}

/// Column names in schema statements are never qualified with an alias.
fn append_unqualified(
    query: &QueryBase<'_>,
    f: &Formatter<'_>,
    b: &mut String,
    column: &Column,
) -> Result<()> {
    match column {
        Column::Name(name) => {
            f.append_ident(b, name);
            Ok(())
        }
        Column::Expr(expr) => query.append_query(expr, f, b),
    }
}

/// `CREATE INDEX`.
///
/// ```ignore
/// db.new_create_index()
///     .model_type::<User>()
///     .unique()
///     .index("users_name_idx")
///     .column("name")
///     .exec(&ctx)
///     .await?;
/// ```
pub struct CreateIndexQuery {
    base: QueryBase<'static>,
    index: Option<String>,
    unique: bool,
    if_not_exists: bool,
    using: Option<QueryWithArgs>,
}

impl CreateIndexQuery {
    pub(crate) fn new(db: Db) -> Self {
        Self {
            base: QueryBase::new(db),
            index: None,
            unique: false,
            if_not_exists: false,
            using: None,
        }
    }
}

table_target!(CreateIndexQuery);

impl CreateIndexQuery {
    #[must_use]
    pub fn index(mut self, name: &str) -> Self {
        self.index = Some(name.to_string());
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub const fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Sets the index method, e.g. `fragment!("gin")`. PostgreSQL only.
    #[must_use]
    pub fn using(mut self, query: QueryWithArgs) -> Self {
        self.using = Some(query);
        self
    }

    #[must_use]
    pub fn column(mut self, name: &str) -> Self {
        self.base.columns.push(Column::Name(name.to_string()));
        self
    }

    #[must_use]
    pub fn column_expr(mut self, query: QueryWithArgs) -> Self {
        self.base.columns.push(Column::Expr(query));
        self
    }

    /// Makes the index partial.
    #[must_use]
    pub fn where_(mut self, query: QueryWithArgs) -> Self {
        self.base.add_where(Sep::And, query);
        self
    }

    fn append_statement(&self, f: &Formatter<'_>, b: &mut String) -> Result<()> {
        const STATEMENT: &str = "CREATE INDEX";
        self.base.check()?;
        let index = self
            .index
            .as_deref()
            .ok_or_else(|| unsupported(STATEMENT, "index name is required"))?;
        if self.base.columns.is_empty() {
            return Err(unsupported(STATEMENT, "at least one column is required"));
        }

        b.push_str("CREATE ");
        if self.unique {
            b.push_str("UNIQUE ");
        }
        b.push_str("INDEX ");
        if self.if_not_exists {
            b.push_str("IF NOT EXISTS ");
        }
        f.append_ident(b, index);
        b.push_str(" ON ");
        self.base.append_first_table(f, b, STATEMENT)?;
        if let Some(using) = &self.using {
            b.push_str(" USING ");
            self.base.append_query(using, f, b)?;
        }
        b.push_str(" (");
        for (i, column) in self.base.columns.iter().enumerate() {
            if i > 0 {
                b.push_str(", ");
            }
            append_unqualified(&self.base, f, b, column)?;
        }
        b.push(')');

        if !self.base.wheres.is_empty() {
            b.push_str(" WHERE ");
            let named = self.base.named();
            self.base.wheres.append_nodes(
                f,
                b,
                named.as_ref().map(|n| n as &dyn burrow_core::ArgAppender),
            )?;
        }
        Ok(())
    }
}

/// `TRUNCATE TABLE`, or `DELETE FROM` where the dialect has no TRUNCATE.
pub struct TruncateTableQuery {
    base: QueryBase<'static>,
    continue_identity: bool,
    cascade: bool,
    restrict: bool,
}

impl TruncateTableQuery {
    pub(crate) fn new(db: Db) -> Self {
        Self {
            base: QueryBase::new(db),
            continue_identity: false,
            cascade: false,
            restrict: false,
        }
    }
}

table_target!(TruncateTableQuery);

impl TruncateTableQuery {
    /// Keeps identity sequences instead of restarting them.
    #[must_use]
    pub const fn continue_identity(mut self) -> Self {
        self.continue_identity = true;
        self
    }

    #[must_use]
    pub const fn cascade(mut self) -> Self {
        self.cascade = true;
        self
    }

    #[must_use]
    pub const fn restrict(mut self) -> Self {
        self.restrict = true;
        self
    }

    fn append_statement(&self, f: &Formatter<'_>, b: &mut String) -> Result<()> {
        const STATEMENT: &str = "TRUNCATE TABLE";
        self.base.check()?;
        let dialect = self.base.dialect();
        if !dialect.has_feature(Feature::TABLE_TRUNCATE) {
            b.push_str("DELETE FROM ");
            return self.base.append_first_table(f, b, STATEMENT);
        }

        b.push_str("TRUNCATE TABLE ");
        append_table_list(&self.base, f, b, STATEMENT)?;
        if dialect.has_feature(Feature::TABLE_IDENTITY) {
            b.push_str(if self.continue_identity {
                " CONTINUE IDENTITY"
            } else {
                " RESTART IDENTITY"
            });
        }
        append_cascade(&self.base, b, self.cascade, self.restrict);
        Ok(())
    }
}

fn unsupported(statement: &'static str, reason: &str) -> Error {
    BuildError::Unsupported {
        statement,
        reason: reason.to_string(),
    }
    .into()
}
