//! UPDATE statements.

use std::sync::Arc;

use burrow_core::{BuildError, Field, Formatter, QueryWithArgs, Record, Table, Value};

use super::base::{self, Column, QueryBase};
use super::r#where::{Sep, WhereGroup};
use super::select::SelectQuery;
use super::SoftDelete;
use crate::conn::Context;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{Binder, IntoBinder, MapDest};

const STATEMENT: &str = "UPDATE";

/// An UPDATE statement builder.
///
/// Without explicit [`set`](UpdateQuery::set) fragments the SET list comes
/// from the model: every non-key column, the columns named with
/// [`column`](UpdateQuery::column), or only non-zero fields with
/// [`omit_zero`](UpdateQuery::omit_zero). A statement with neither WHERE
/// predicates nor [`where_pk`](UpdateQuery::where_pk) is rejected.
///
/// ```ignore
/// user.name = "renamed".into();
/// db.new_update().model(&mut user).column("name").where_pk().exec(&ctx).await?;
/// ```
pub struct UpdateQuery<'a> {
    base: QueryBase<'a>,
    set: Vec<QueryWithArgs>,
    omit_zero: bool,
}

impl<'a> UpdateQuery<'a> {
    pub(crate) fn new(db: Db) -> Self {
        Self {
            base: QueryBase::new(db),
            set: Vec::new(),
            omit_zero: false,
        }
    }

    #[must_use]
    pub fn with(mut self, name: &str, query: SelectQuery<'a>) -> Self {
        self.base.with.push((name.to_string(), Box::new(query)));
        self
    }

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

    /// Restricts the SET list to the named model columns.
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

    /// Adds an assignment, e.g. `fragment!("name = ?", "bun")`.
    #[must_use]
    pub fn set(mut self, query: QueryWithArgs) -> Self {
        self.set.push(query);
        self
    }

    /// Leaves zero-valued model fields out of the SET list.
    #[must_use]
    pub const fn omit_zero(mut self) -> Self {
        self.omit_zero = true;
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

    #[must_use]
    pub fn where_group(mut self, group: impl FnOnce(WhereGroup) -> WhereGroup) -> Self {
        self.base.add_where_group(Sep::And, group);
        self
    }

    #[must_use]
    pub fn where_group_or(mut self, group: impl FnOnce(WhereGroup) -> WhereGroup) -> Self {
        self.base.add_where_group(Sep::Or, group);
        self
    }

    #[must_use]
    pub const fn where_pk(mut self) -> Self {
        self.base.wheres.pk = true;
        self
    }

    #[must_use]
    pub fn where_deleted(mut self) -> Self {
        self.base.set_soft_delete(SoftDelete::OnlyDeleted);
        self
    }

    #[must_use]
    pub fn where_all_with_deleted(mut self) -> Self {
        self.base.set_soft_delete(SoftDelete::WithDeleted);
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
    /// Returns [`BuildError::UnsafeMutation`] without predicates, the first
    /// builder error, or another [`BuildError`].
    pub fn to_sql(&self) -> Result<String> {
        base::to_sql(self.base.dialect(), |f, b| self.append_update(f, b))
    }

    /// Renders the statement as a placeholder template and its arguments.
    ///
    /// # Errors
    ///
    /// Same as [`UpdateQuery::to_sql`].
    pub fn to_template(&self) -> Result<(String, Vec<Value>)> {
        base::to_template(self.base.dialect(), |f, b| self.append_update(f, b))
    }

    /// Runs the statement and returns the number of updated rows. Columns
    /// named in RETURNING are written back into the model.
    ///
    /// # Errors
    ///
    /// Returns any build, execution or bind error. Build errors are
    /// reported before anything is sent.
    pub async fn exec(mut self, ctx: &Context) -> Result<u64> {
        let sql = self.to_sql()?;
        let scan_back = self.base.has_returning()
            && matches!(self.base.binder, Some(Binder::Struct(_) | Binder::Slice(_)));
        let table = match &self.base.table {
            Some(table) if scan_back => Arc::clone(table),
            _ => return self.base.db.run_exec(ctx, &sql).await,
        };
        let rows = self.base.db.run_query(ctx, &sql).await?;
        let affected = rows.len();
        self.base.binder_mut()?.bind_back(rows, &table)?;
        Ok(u64::try_from(affected).unwrap_or(u64::MAX))
    }

    fn append_update(&self, f: &Formatter<'_>, b: &mut String) -> Result<()> {
        self.base.check()?;
        if !self.base.wheres.has_predicates() {
            return Err(BuildError::UnsafeMutation { statement: STATEMENT }.into());
        }
        self.base.append_with(f, b)?;

        b.push_str("UPDATE ");
        self.base.append_first_table_with_alias(f, b, STATEMENT)?;
        b.push_str(" SET ");
        self.append_set(f, b)?;
        self.base.append_where(f, b)?;
        self.base.append_returning(f, b, STATEMENT)
    }

    fn append_set(&self, f: &Formatter<'_>, b: &mut String) -> Result<()> {
        if !self.set.is_empty() {
            for (i, query) in self.set.iter().enumerate() {
                if i > 0 {
                    b.push_str(", ");
                }
                self.base.append_query(query, f, b)?;
            }
            return Ok(());
        }

        match &self.base.binder {
            Some(Binder::Struct(record)) => {
                let table = self
                    .base
                    .table
                    .as_deref()
                    .ok_or(BuildError::MissingTable { statement: STATEMENT })?;
                let fields = self.fields(table, &**record)?;
                if fields.is_empty() {
                    return Err(unsupported("no columns to update"));
                }
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        b.push_str(", ");
                    }
                    b.push_str(&field.sql_name);
                    b.push_str(" = ");
                    field.append_value(f, b, &**record);
                }
                Ok(())
            }
            Some(Binder::Map(MapDest::One(row))) => {
                if row.is_empty() {
                    return Err(unsupported("column map is empty"));
                }
                for (i, (column, value)) in row.iter().enumerate() {
                    if i > 0 {
                        b.push_str(", ");
                    }
                    f.append_ident(b, column);
                    b.push_str(" = ");
                    f.append_value(b, value);
                }
                Ok(())
            }
            Some(Binder::Slice(_)) => Err(unsupported("updating a model list requires set()")),
            _ => Err(unsupported("query has no values; use model() or set()")),
        }
    }

    fn fields(&self, table: &Table, record: &dyn Record) -> Result<Vec<Arc<Field>>> {
        let names: Vec<&str> = self
            .base
            .columns
            .iter()
            .filter_map(|c| match c {
                Column::Name(name) => Some(name.as_str()),
                Column::Expr(_) => None,
            })
            .collect();
        let fields: Vec<Arc<Field>> = if names.is_empty() {
            table
                .data_fields
                .iter()
                .filter(|f| !self.base.excluded.contains(&f.name))
                .cloned()
                .collect()
        } else {
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
                .collect::<Result<_>>()?
        };
        Ok(fields
            .into_iter()
            .filter(|f| !self.omit_zero || !f.has_zero_value(record))
            .collect())
    }
}

fn unsupported(reason: &str) -> Error {
    BuildError::Unsupported {
        statement: STATEMENT,
        reason: reason.to_string(),
    }
    .into()
}
