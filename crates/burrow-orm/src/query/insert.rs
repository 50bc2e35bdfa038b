//! INSERT statements.

use std::sync::Arc;

use burrow_core::{BuildError, Feature, Field, Formatter, QueryWithArgs, Table, Value};
use tracing::debug;

use super::base::{self, Column, QueryBase};
use super::select::SelectQuery;
use crate::conn::Context;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{Binder, IntoBinder, MapDest};

const STATEMENT: &str = "INSERT";

/// An INSERT statement builder.
///
/// Zero-valued autoincrement and `default:` columns are left to the
/// database: they render as `DEFAULT` where the dialect supports it and are
/// omitted otherwise. When the dialect supports RETURNING, those columns
/// are returned and written back into the model.
///
/// ```ignore
/// let mut user = User { name: "bun".into(), ..User::default() };
/// db.new_insert().model(&mut user).exec(&ctx).await?;
/// assert_ne!(user.id, 0);
/// ```
pub struct InsertQuery<'a> {
    base: QueryBase<'a>,
    on: Option<QueryWithArgs>,
    set: Vec<QueryWithArgs>,
    ignore: bool,
}

impl<'a> InsertQuery<'a> {
    pub(crate) fn new(db: Db) -> Self {
        Self {
            base: QueryBase::new(db),
            on: None,
            set: Vec::new(),
            ignore: false,
        }
    }

    #[must_use]
    pub fn with(mut self, name: &str, query: SelectQuery<'a>) -> Self {
        self.base.with.push((name.to_string(), Box::new(query)));
        self
    }

    /// Sets the values to insert: a model, a list of models or a column map.
    #[must_use]
    pub fn model(mut self, dest: impl IntoBinder<'a>) -> Self {
        self.base.set_model(dest);
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

    /// Restricts the inserted columns of a model.
    #[must_use]
    pub fn column(mut self, name: &str) -> Self {
        self.base.columns.push(Column::Name(name.to_string()));
        self
    }

    #[must_use]
    pub fn exclude_column(mut self, name: &str) -> Self {
        self.base.excluded.push(name.to_string());
        self
    }

    /// Adds a conflict clause, rendered after `ON`: e.g.
    /// `fragment!("CONFLICT (id) DO UPDATE")` or
    /// `fragment!("DUPLICATE KEY UPDATE")`.
    #[must_use]
    pub fn on(mut self, query: QueryWithArgs) -> Self {
        self.on = Some(query);
        self
    }

    /// Adds an assignment to the conflict clause's update.
    #[must_use]
    pub fn set(mut self, query: QueryWithArgs) -> Self {
        self.set.push(query);
        self
    }

    /// Skips rows that violate a constraint: `INSERT IGNORE` on MySQL,
    /// `ON CONFLICT DO NOTHING` elsewhere.
    #[must_use]
    pub const fn ignore(mut self) -> Self {
        self.ignore = true;
        self
    }

    #[must_use]
    pub fn returning(mut self, query: QueryWithArgs) -> Self {
        self.base.returning.push(query);
        self
    }

    /// Renders the statement with every value inlined as a literal.
    ///
    /// # Errors
    ///
    /// Returns the first builder error or a [`BuildError`].
    pub fn to_sql(&self) -> Result<String> {
        base::to_sql(self.base.dialect(), |f, b| self.append_insert(f, b))
    }

    /// Renders the statement as a placeholder template and its arguments.
    ///
    /// # Errors
    ///
    /// Same as [`InsertQuery::to_sql`].
    pub fn to_template(&self) -> Result<(String, Vec<Value>)> {
        base::to_template(self.base.dialect(), |f, b| self.append_insert(f, b))
    }

    /// Runs the statement and returns the number of inserted rows. Returned
    /// columns are written back into the model.
    ///
    /// # Errors
    ///
    /// Returns any build, execution or bind error.
    pub async fn exec(mut self, ctx: &Context) -> Result<u64> {
        let sql = self.to_sql()?;
        let scan_back = self.has_returning()
            && matches!(self.base.binder, Some(Binder::Struct(_) | Binder::Slice(_)));
        let table = match &self.base.table {
            Some(table) if scan_back => Arc::clone(table),
            _ => return self.base.db.run_exec(ctx, &sql).await,
        };
        let rows = self.base.db.run_query(ctx, &sql).await?;
        let affected = rows.len();
        let written = self.base.binder_mut()?.bind_back(rows, &table)?;
        debug!(table = %table.name, affected, written, "scanned returned columns");
        Ok(u64::try_from(affected).unwrap_or(u64::MAX))
    }

    fn uses_ignore_keyword(&self) -> bool {
        self.ignore && self.base.dialect().has_feature(Feature::ON_DUPLICATE_KEY)
    }

    /// Columns generated by the database and returned automatically.
    fn auto_returning(&self) -> Vec<Arc<Field>> {
        let Some(table) = &self.base.table else {
            return Vec::new();
        };
        if self.ignore
            || !self.base.returning.is_empty()
            || !self.base.dialect().has_feature(Feature::RETURNING)
            || !matches!(self.base.binder, Some(Binder::Struct(_) | Binder::Slice(_)))
        {
            return Vec::new();
        }
        table
            .fields
            .iter()
            .filter(|f| f.auto_increment || f.default.is_some())
            .cloned()
            .collect()
    }

    fn has_returning(&self) -> bool {
        self.base.has_returning() || !self.auto_returning().is_empty()
    }

    fn append_insert(&self, f: &Formatter<'_>, b: &mut String) -> Result<()> {
        self.base.check()?;
        self.base.append_with(f, b)?;
        let dialect = self.base.dialect();

        b.push_str("INSERT ");
        if self.uses_ignore_keyword() {
            b.push_str("IGNORE ");
        }
        b.push_str("INTO ");
        self.base.append_first_table(f, b, STATEMENT)?;
        if dialect.has_feature(Feature::INSERT_TABLE_ALIAS) && self.base.table.is_some() {
            if let Some(alias) = self.base.table_alias() {
                b.push_str(" AS ");
                b.push_str(alias);
            }
        }

        match &self.base.binder {
            Some(Binder::Map(MapDest::One(row))) => {
                if row.is_empty() {
                    return Err(unsupported("column map is empty"));
                }
                b.push_str(" (");
                for (i, column) in row.keys().enumerate() {
                    if i > 0 {
                        b.push_str(", ");
                    }
                    f.append_ident(b, column);
                }
                b.push_str(") VALUES (");
                for (i, value) in row.values().enumerate() {
                    if i > 0 {
                        b.push_str(", ");
                    }
                    f.append_value(b, value);
                }
                b.push(')');
            }
            Some(Binder::Struct(_) | Binder::Slice(_)) => {
                let table = self
                    .base
                    .table
                    .as_deref()
                    .ok_or(BuildError::MissingTable { statement: STATEMENT })?;
                self.append_values(f, b, table)?;
            }
            Some(Binder::Map(MapDest::Many(_)) | Binder::Scalars(_)) => {
                return Err(unsupported("values must be a model, a model list or a column map"));
            }
            None => return Err(unsupported("query has no values; use model()")),
        }

        self.append_on(f, b)?;

        if self.base.has_returning() {
            self.base.append_returning(f, b, STATEMENT)?;
        } else {
            let fields = self.auto_returning();
            if !fields.is_empty() {
                b.push_str(" RETURNING ");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        b.push_str(", ");
                    }
                    b.push_str(&field.sql_name);
                }
            }
        }
        Ok(())
    }

    fn fields(&self, table: &Table) -> Result<Vec<Arc<Field>>> {
        let names: Vec<&str> = self
            .base
            .columns
            .iter()
            .filter_map(|c| match c {
                Column::Name(name) => Some(name.as_str()),
                Column::Expr(_) => None,
            })
            .collect();
        if names.is_empty() {
            return Ok(table
                .fields
                .iter()
                .filter(|f| !self.base.excluded.contains(&f.name))
                .cloned()
                .collect());
        }
        names
            .into_iter()
            .map(|name| {
                table.field(name).cloned().ok_or_else(|| {
                    Error::from(BuildError::UnknownColumn {
                        table: table.name.clone(),
                        column: name.to_string(),
                    })
                })
            })
            .collect()
    }

    fn append_values(&self, f: &Formatter<'_>, b: &mut String, table: &Table) -> Result<()> {
        let records = self.base.records();
        if records.is_empty() {
            return Err(unsupported("model list is empty"));
        }
        let with_default = self.base.dialect().has_feature(Feature::DEFAULT_PLACEHOLDER);

        let mut columns: Vec<(Arc<Field>, bool)> = Vec::new();
        for field in self.fields(table)? {
            let generated = field.auto_increment || field.default.is_some();
            let zero_everywhere = records.iter().all(|r| field.has_zero_value(*r));
            // Without DEFAULT, a generated column left zero in every row is
            // omitted so the database fills it in.
            if generated && zero_everywhere && !with_default {
                continue;
            }
            columns.push((field, generated));
        }
        if columns.is_empty() {
            return append_default_values(b, records.len());
        }

        b.push_str(" (");
        for (i, (field, _)) in columns.iter().enumerate() {
            if i > 0 {
                b.push_str(", ");
            }
            b.push_str(&field.sql_name);
        }
        b.push_str(") VALUES ");
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                b.push_str(", ");
            }
            b.push('(');
            for (j, (field, generated)) in columns.iter().enumerate() {
                if j > 0 {
                    b.push_str(", ");
                }
                if *generated && field.has_zero_value(*record) {
                    append_generated(b, field, with_default);
                } else {
                    field.append_value(f, b, *record);
                }
            }
            b.push(')');
        }
        Ok(())
    }

    fn append_on(&self, f: &Formatter<'_>, b: &mut String) -> Result<()> {
        let dialect = self.base.dialect();
        let upsert = dialect.has_feature(Feature::INSERT_ON_CONFLICT);
        let duplicate_key = dialect.has_feature(Feature::ON_DUPLICATE_KEY);
        if let Some(on) = &self.on {
            if !upsert && !duplicate_key {
                return Err(unsupported(&format!("{} has no conflict clause", dialect.name())));
            }
            b.push_str(" ON ");
            self.base.append_query(on, f, b)?;
            if !self.set.is_empty() {
                b.push_str(if duplicate_key { " " } else { " SET " });
                for (i, query) in self.set.iter().enumerate() {
                    if i > 0 {
                        b.push_str(", ");
                    }
                    self.base.append_query(query, f, b)?;
                }
            }
        } else if self.ignore && !self.uses_ignore_keyword() {
            if !upsert {
                return Err(unsupported(&format!("{} cannot ignore conflicts", dialect.name())));
            }
            b.push_str(" ON CONFLICT DO NOTHING");
        }
        Ok(())
    }
}

/// Appends a zero-valued generated column: `DEFAULT`, or the default
/// expression (`NULL` for autoincrement keys) where DEFAULT is unsupported.
fn append_generated(b: &mut String, field: &Field, with_default: bool) {
    if with_default {
        b.push_str("DEFAULT");
        return;
    }
    match &field.default {
        Some(expr) => b.push_str(expr),
        None => b.push_str("NULL"),
    }
}

fn append_default_values(b: &mut String, rows: usize) -> Result<()> {
    if rows > 1 {
        return Err(unsupported("cannot insert several rows with only default values"));
    }
    b.push_str(" DEFAULT VALUES");
    Ok(())
}

fn unsupported(reason: &str) -> Error {
    BuildError::Unsupported {
        statement: STATEMENT,
        reason: reason.to_string(),
    }
    .into()
}
