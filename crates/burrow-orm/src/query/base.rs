//! State shared by every statement builder: the model binding, table
//! context, CTEs, column list, WHERE state and RETURNING list.

use std::sync::Arc;

use burrow_core::{
    ArgAppender, BuildError, Dialect, Feature, Formatter, ModelInfo, QueryWithArgs, Record,
    SchemaError, Table,
};

use super::select::SelectQuery;
use super::r#where::{self, Sep, SoftDelete, Where, WhereGroup};
use crate::db::Db;
use crate::error::{BindError, Error, Result};
use crate::model::{Binder, IntoBinder};

/// A builder error recorded by a chained call and reported when the
/// statement is rendered.
#[derive(Debug, Clone)]
pub(crate) enum Deferred {
    Schema(SchemaError),
    Build(BuildError),
}

impl From<Deferred> for Error {
    fn from(err: Deferred) -> Self {
        match err {
            Deferred::Schema(err) => Self::Schema(err),
            Deferred::Build(err) => Self::Build(err),
        }
    }
}

/// An entry of a column list.
#[derive(Debug, Clone)]
pub(crate) enum Column {
    /// A column of the bound table, qualified with its alias when rendered.
    Name(String),
    Expr(QueryWithArgs),
}

/// Resolves `?TableName`, `?TableAlias`, `?PKs`, `?TablePKs`, `?Columns`
/// and `?TableColumns` against a table and the alias it is referenced by.
pub(crate) struct TableArgs<'t> {
    pub table: &'t Table,
    /// Quoted alias.
    pub alias: &'t str,
}

impl ArgAppender for TableArgs<'_> {
    fn append_named_arg(&self, _f: &Formatter<'_>, b: &mut String, name: &str) -> bool {
        let qualified = |b: &mut String, fields: &[Arc<burrow_core::Field>], alias: Option<&str>| {
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    b.push_str(", ");
                }
                if let Some(alias) = alias {
                    b.push_str(alias);
                    b.push('.');
                }
                b.push_str(&field.sql_name);
            }
        };
        match name {
            "TableName" => b.push_str(&self.table.sql_name),
            "TableAlias" => b.push_str(self.alias),
            "PKs" => qualified(b, &self.table.pks, None),
            "TablePKs" => qualified(b, &self.table.pks, Some(self.alias)),
            "Columns" => qualified(b, &self.table.fields, None),
            "TableColumns" => qualified(b, &self.table.fields, Some(self.alias)),
            _ => return false,
        }
        true
    }
}

pub(crate) struct QueryBase<'a> {
    pub db: Db,
    pub binder: Option<Binder<'a>>,
    pub table: Option<Arc<Table>>,
    /// Quoted alias replacing the table's own, used by relation scopes.
    pub alias: Option<String>,
    pub err: Option<Deferred>,
    pub with: Vec<(String, Box<SelectQuery<'a>>)>,
    pub tables: Vec<QueryWithArgs>,
    pub columns: Vec<Column>,
    pub excluded: Vec<String>,
    pub wheres: Where,
    pub returning: Vec<QueryWithArgs>,
}

impl<'a> QueryBase<'a> {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            binder: None,
            table: None,
            alias: None,
            err: None,
            with: Vec::new(),
            tables: Vec::new(),
            columns: Vec::new(),
            excluded: Vec::new(),
            wheres: Where::default(),
            returning: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.db.dialect()
    }

    pub fn defer(&mut self, err: Deferred) {
        self.err.get_or_insert(err);
    }

    /// Returns the first error recorded by a chained call.
    pub fn check(&self) -> Result<()> {
        match &self.err {
            Some(err) => Err(err.clone().into()),
            None => Ok(()),
        }
    }

    pub fn set_model(&mut self, dest: impl IntoBinder<'a>) {
        let binder = dest.into_binder();
        match binder.describe(self.db.dialect()) {
            Ok(Some(table)) => self.table = Some(table),
            Ok(None) => {}
            Err(err) => self.defer(Deferred::Schema(err)),
        }
        self.binder = Some(binder);
    }

    pub fn set_model_type(&mut self, info: ModelInfo) {
        match self.db.dialect().table(info) {
            Ok(table) => self.table = Some(table),
            Err(err) => self.defer(Deferred::Schema(err)),
        }
    }

    pub fn add_where(&mut self, sep: Sep, query: QueryWithArgs) {
        self.wheres.push(sep, query);
    }

    pub fn add_where_group(&mut self, sep: Sep, group: impl FnOnce(WhereGroup) -> WhereGroup) {
        self.wheres.push_group(sep, group(WhereGroup::default()));
    }

    pub fn set_soft_delete(&mut self, mode: SoftDelete) {
        self.wheres.soft_delete = mode;
    }

    /// Quoted alias of the bound table.
    pub fn table_alias(&self) -> Option<&str> {
        self.alias
            .as_deref()
            .or_else(|| self.table.as_deref().map(|t| t.sql_alias.as_str()))
    }

    pub fn named(&self) -> Option<TableArgs<'_>> {
        let table = self.table.as_deref()?;
        Some(TableArgs {
            table,
            alias: self.table_alias().unwrap_or(&table.sql_alias),
        })
    }

    pub fn has_table(&self) -> bool {
        self.table.is_some() || !self.tables.is_empty()
    }

    /// Returns true when the destination is a record list.
    pub fn is_many(&self) -> bool {
        matches!(self.binder, Some(Binder::Slice(_)))
    }

    pub fn records(&self) -> Vec<&dyn Record> {
        self.binder.as_ref().map_or_else(Vec::new, Binder::records)
    }

    pub fn binder_mut(&mut self) -> Result<&mut Binder<'a>> {
        self.binder.as_mut().ok_or_else(|| BindError::NoDestination.into())
    }

    pub fn append_query(
        &self,
        query: &QueryWithArgs,
        f: &Formatter<'_>,
        b: &mut String,
    ) -> Result<()> {
        let named = self.named();
        query.append_query(f, b, named.as_ref().map(|n| n as &dyn ArgAppender))?;
        Ok(())
    }

    pub fn append_with(&self, f: &Formatter<'_>, b: &mut String) -> Result<()> {
        if self.with.is_empty() {
            return Ok(());
        }
        b.push_str("WITH ");
        for (i, (name, query)) in self.with.iter().enumerate() {
            if i > 0 {
                b.push_str(", ");
            }
            f.append_ident(b, name);
            b.push_str(" AS (");
            query.append_select(f, b)?;
            b.push(')');
        }
        b.push(' ');
        Ok(())
    }

    /// Appends the target table of a mutation without its alias.
    pub fn append_first_table(
        &self,
        f: &Formatter<'_>,
        b: &mut String,
        statement: &'static str,
    ) -> Result<()> {
        if let Some(table) = &self.table {
            b.push_str(&table.sql_name);
            return Ok(());
        }
        let first = self
            .tables
            .first()
            .ok_or(BuildError::MissingTable { statement })?;
        self.append_query(first, f, b)
    }

    /// Appends the target table of a mutation, aliased when it is a model
    /// table.
    pub fn append_first_table_with_alias(
        &self,
        f: &Formatter<'_>,
        b: &mut String,
        statement: &'static str,
    ) -> Result<()> {
        self.append_first_table(f, b, statement)?;
        if let (Some(_), Some(alias)) = (&self.table, self.table_alias()) {
            b.push_str(" AS ");
            b.push_str(alias);
        }
        Ok(())
    }

    /// Appends every FROM entry: the model table, then the explicit ones.
    pub fn append_tables_with_alias(&self, f: &Formatter<'_>, b: &mut String) -> Result<()> {
        let mut first = true;
        if let Some(table) = &self.table {
            b.push_str(&table.sql_name_for_select);
            b.push_str(" AS ");
            b.push_str(self.table_alias().unwrap_or(&table.sql_alias));
            first = false;
        }
        for table in &self.tables {
            if !first {
                b.push_str(", ");
            }
            self.append_query(table, f, b)?;
            first = false;
        }
        Ok(())
    }

    /// Appends one column of the column list.
    pub fn append_column(&self, f: &Formatter<'_>, b: &mut String, column: &Column) -> Result<()> {
        match column {
            Column::Name(name) => {
                let own = self.table.as_ref().is_some_and(|t| t.has_field(name));
                if let (true, Some(alias)) = (own, self.table_alias()) {
                    b.push_str(alias);
                    b.push('.');
                }
                f.append_ident(b, name);
                Ok(())
            }
            Column::Expr(query) => self.append_query(query, f, b),
        }
    }

    /// Appends ` WHERE ...` combining the user predicates, the soft-delete
    /// predicate and the primary-key predicate with AND. Several user
    /// predicates are grouped in parentheses first. Nothing is appended
    /// when there is no predicate at all.
    pub fn append_where(&self, f: &Formatter<'_>, b: &mut String) -> Result<()> {
        let mut parts: Vec<String> = Vec::with_capacity(3);
        if !self.wheres.is_empty() {
            let mut part = String::new();
            let named = self.named();
            self.wheres
                .append_nodes(f, &mut part, named.as_ref().map(|n| n as &dyn ArgAppender))?;
            parts.push(part);
        }
        let grouped = parts.len() == 1 && self.wheres.is_compound();
        if let (Some(table), Some(alias)) = (&self.table, self.table_alias()) {
            let mut part = String::new();
            if r#where::append_soft_delete(&mut part, table, alias, self.wheres.soft_delete) {
                parts.push(part);
            }
            if self.wheres.pk {
                let mut part = String::new();
                r#where::append_pk(f, &mut part, table, alias, &self.records(), self.is_many())?;
                parts.push(part);
            }
        } else if self.wheres.pk {
            return Err(BuildError::MissingTable { statement: "where_pk" }.into());
        }

        if parts.is_empty() {
            return Ok(());
        }
        b.push_str(" WHERE ");
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                b.push_str(" AND ");
            }
            if i == 0 && grouped && parts.len() > 1 {
                b.push('(');
                b.push_str(part);
                b.push(')');
            } else {
                b.push_str(part);
            }
        }
        Ok(())
    }

    pub fn has_returning(&self) -> bool {
        !self.returning.is_empty()
    }

    /// Appends ` RETURNING ...` when requested.
    pub fn append_returning(
        &self,
        f: &Formatter<'_>,
        b: &mut String,
        statement: &'static str,
    ) -> Result<()> {
        if self.returning.is_empty() {
            return Ok(());
        }
        if !self.dialect().has_feature(Feature::RETURNING) {
            return Err(BuildError::Unsupported {
                statement,
                reason: format!("{} does not support RETURNING", self.dialect().name()),
            }
            .into());
        }
        b.push_str(" RETURNING ");
        for (i, query) in self.returning.iter().enumerate() {
            if i > 0 {
                b.push_str(", ");
            }
            self.append_query(query, f, b)?;
        }
        Ok(())
    }
}

/// Renders `render` in literal mode.
pub(crate) fn to_sql(
    dialect: &dyn Dialect,
    render: impl FnOnce(&Formatter<'_>, &mut String) -> Result<()>,
) -> Result<String> {
    let f = Formatter::new(dialect);
    let mut b = String::new();
    render(&f, &mut b)?;
    Ok(b)
}

/// Renders `render` in template mode, returning the positional arguments.
pub(crate) fn to_template(
    dialect: &dyn Dialect,
    render: impl FnOnce(&Formatter<'_>, &mut String) -> Result<()>,
) -> Result<(String, Vec<burrow_core::Value>)> {
    let f = Formatter::placeholders(dialect);
    let mut b = String::new();
    render(&f, &mut b)?;
    Ok((b, f.take_args()))
}
