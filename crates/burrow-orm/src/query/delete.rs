//! DELETE statements.

use burrow_core::{BuildError, Formatter, QueryWithArgs, Value};
use chrono::{DateTime, SubsecRound, Utc};
use tracing::debug;

use super::base::{self, QueryBase};
use super::r#where::{Sep, WhereGroup};
use super::select::SelectQuery;
use super::SoftDelete;
use crate::conn::Context;
use crate::db::Db;
use crate::error::{BindError, Result};
use crate::model::{Binder, IntoBinder};

const STATEMENT: &str = "DELETE";

/// A DELETE statement builder.
///
/// Deleting from a table with a soft-delete marker sets the marker to the
/// current time instead of removing rows, and writes that time back into
/// the model. [`force_delete`](DeleteQuery::force_delete) removes the rows.
///
/// ```ignore
/// db.new_delete().model(&mut story).where_pk().exec(&ctx).await?;
/// assert!(story.deleted_at.is_some());
/// ```
pub struct DeleteQuery<'a> {
    base: QueryBase<'a>,
    force: bool,
    /// Marker value of a soft delete, fixed on first render.
    now: Option<DateTime<Utc>>,
}

impl<'a> DeleteQuery<'a> {
    pub(crate) fn new(db: Db) -> Self {
        Self {
            base: QueryBase::new(db),
            force: false,
            now: None,
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

    /// Removes rows even when the table has a soft-delete marker. Rows
    /// already marked as deleted are included.
    #[must_use]
    pub fn force_delete(mut self) -> Self {
        self.force = true;
        if self.base.wheres.soft_delete == SoftDelete::Default {
            self.base.set_soft_delete(SoftDelete::WithDeleted);
        }
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
        let now = self.now.unwrap_or_else(marker_time);
        base::to_sql(self.base.dialect(), |f, b| self.append_delete(f, b, now))
    }

    /// Renders the statement as a placeholder template and its arguments.
    ///
    /// # Errors
    ///
    /// Same as [`DeleteQuery::to_sql`].
    pub fn to_template(&self) -> Result<(String, Vec<Value>)> {
        let now = self.now.unwrap_or_else(marker_time);
        base::to_template(self.base.dialect(), |f, b| self.append_delete(f, b, now))
    }

    fn is_soft(&self) -> bool {
        !self.force
            && self
                .base
                .table
                .as_ref()
                .is_some_and(|t| t.soft_delete_field.is_some())
    }

    /// Runs the statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns any build, execution or bind error. Build errors are
    /// reported before anything is sent.
    pub async fn exec(mut self, ctx: &Context) -> Result<u64> {
        let now = *self.now.get_or_insert_with(marker_time);
        let sql = self.to_sql()?;
        let scan_back = self.base.has_returning()
            && matches!(self.base.binder, Some(Binder::Struct(_) | Binder::Slice(_)));

        let affected = match self.base.table.clone().filter(|_| scan_back) {
            Some(table) => {
                let rows = self.base.db.run_query(ctx, &sql).await?;
                let affected = rows.len();
                self.base.binder_mut()?.bind_back(rows, &table)?;
                u64::try_from(affected).unwrap_or(u64::MAX)
            }
            _ => self.base.db.run_exec(ctx, &sql).await?,
        };

        if self.is_soft() {
            self.write_marker(now)?;
        }
        Ok(affected)
    }

    /// Stores the soft-delete time into every record of the model.
    fn write_marker(&mut self, now: DateTime<Utc>) -> Result<()> {
        let Some(field) = self.base.table.as_ref().and_then(|t| t.soft_delete_field.clone()) else {
            return Ok(());
        };
        let Some(binder) = self.base.binder.as_mut() else {
            return Ok(());
        };
        let records = binder.records_mut();
        debug!(column = %field.name, records = records.len(), "writing soft delete marker");
        for record in records {
            field
                .scan_value(record, Value::Timestamp(now))
                .map_err(|source| BindError::Scan {
                    column: field.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    fn append_delete(&self, f: &Formatter<'_>, b: &mut String, now: DateTime<Utc>) -> Result<()> {
        self.base.check()?;
        if !self.base.wheres.has_predicates() {
            return Err(BuildError::UnsafeMutation { statement: STATEMENT }.into());
        }
        self.base.append_with(f, b)?;

        match self.base.table.as_ref().and_then(|t| t.soft_delete_field.as_ref()) {
            Some(field) if !self.force => {
                b.push_str("UPDATE ");
                self.base.append_first_table_with_alias(f, b, STATEMENT)?;
                b.push_str(" SET ");
                b.push_str(&field.sql_name);
                b.push_str(" = ");
                field.append(f, b, &Value::Timestamp(now));
            }
            _ => {
                b.push_str("DELETE FROM ");
                self.base.append_first_table_with_alias(f, b, STATEMENT)?;
            }
        }
        self.base.append_where(f, b)?;
        self.base.append_returning(f, b, STATEMENT)
    }
}

/// Current time at microsecond precision, the finest every dialect stores.
fn marker_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
