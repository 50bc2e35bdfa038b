//! WHERE clause state: user predicates with one level of grouping, the
//! soft-delete mode and the primary-key predicate.

use std::collections::HashSet;

use burrow_core::{
    ArgAppender, BuildError, Field, Formatter, QueryWithArgs, Record, SchemaError, Table, ValueKey,
};

use crate::error::Result;

/// Soft-delete filtering of a query against a table with a marker column.
///
/// The three modes are mutually exclusive; selecting one replaces the
/// previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SoftDelete {
    /// Only live rows: `marker IS NULL`.
    #[default]
    Default,
    /// Live and deleted rows: no marker predicate.
    WithDeleted,
    /// Only deleted rows: `marker IS NOT NULL`.
    OnlyDeleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sep {
    And,
    Or,
}

impl Sep {
    const fn as_str(self) -> &'static str {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Pred(Sep, QueryWithArgs),
    Group(Sep, Vec<Node>),
}

/// Predicates combined inside one pair of parentheses.
///
/// ```ignore
/// db.new_select()
///     .model(&mut users)
///     .where_(fragment!("status = ?", "active"))
///     .where_group(|g| g.where_(fragment!("age > ?", 18)).where_or(fragment!("admin")))
/// ```
#[derive(Debug, Clone, Default)]
pub struct WhereGroup {
    nodes: Vec<Node>,
}

impl WhereGroup {
    /// Adds a predicate joined with AND.
    #[must_use]
    pub fn where_(mut self, query: QueryWithArgs) -> Self {
        self.nodes.push(Node::Pred(Sep::And, query));
        self
    }

    /// Adds a predicate joined with OR.
    #[must_use]
    pub fn where_or(mut self, query: QueryWithArgs) -> Self {
        self.nodes.push(Node::Pred(Sep::Or, query));
        self
    }
}

/// Accumulated WHERE state of a statement.
#[derive(Debug, Clone, Default)]
pub(crate) struct Where {
    nodes: Vec<Node>,
    pub soft_delete: SoftDelete,
    pub pk: bool,
}

impl Where {
    pub fn push(&mut self, sep: Sep, query: QueryWithArgs) {
        self.nodes.push(Node::Pred(sep, query));
    }

    pub fn push_group(&mut self, sep: Sep, group: WhereGroup) {
        if !group.nodes.is_empty() {
            self.nodes.push(Node::Group(sep, group.nodes));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true for more than one top-level predicate or group.
    pub fn is_compound(&self) -> bool {
        self.nodes.len() > 1
    }

    /// Returns true when the statement restricts the rows it touches.
    pub fn has_predicates(&self) -> bool {
        !self.nodes.is_empty() || self.pk
    }

    /// Renders the user predicates as `(p1) AND (p2) OR (p3)`.
    pub fn append_nodes(
        &self,
        f: &Formatter<'_>,
        b: &mut String,
        named: Option<&dyn ArgAppender>,
    ) -> Result<()> {
        append_list(f, b, &self.nodes, named)
    }
}

fn append_list(
    f: &Formatter<'_>,
    b: &mut String,
    nodes: &[Node],
    named: Option<&dyn ArgAppender>,
) -> Result<()> {
    for (i, node) in nodes.iter().enumerate() {
        let (Node::Pred(sep, _) | Node::Group(sep, _)) = node;
        if i > 0 {
            b.push_str(sep.as_str());
        }
        b.push('(');
        match node {
            Node::Pred(_, query) => query.append_query(f, b, named)?,
            Node::Group(_, group) => append_list(f, b, group, named)?,
        }
        b.push(')');
    }
    Ok(())
}

/// Appends `alias.marker IS [NOT] NULL` for the given mode, if any.
pub(crate) fn append_soft_delete(
    b: &mut String,
    table: &Table,
    alias: &str,
    mode: SoftDelete,
) -> bool {
    let Some(field) = &table.soft_delete_field else {
        return false;
    };
    let op = match mode {
        SoftDelete::Default => "IS NULL",
        SoftDelete::OnlyDeleted => "IS NOT NULL",
        SoftDelete::WithDeleted => return false,
    };
    b.push_str(alias);
    b.push('.');
    b.push_str(&field.sql_name);
    b.push(' ');
    b.push_str(op);
    true
}

/// Appends the primary-key predicate for `records`.
///
/// One record renders `alias.pk = v` per key column; several render
/// `alias.pk IN (...)` (or a row-value IN for composite keys) over the
/// deduplicated key tuples, in first-seen order.
pub(crate) fn append_pk(
    f: &Formatter<'_>,
    b: &mut String,
    table: &Table,
    alias: &str,
    records: &[&dyn Record],
    many: bool,
) -> Result<()> {
    if table.pks.is_empty() {
        return Err(SchemaError::MissingPrimaryKey {
            table: table.type_name.to_string(),
        }
        .into());
    }
    if !many {
        let Some(record) = records.first() else {
            return Err(BuildError::Unsupported {
                statement: "where_pk",
                reason: "query has no model value".to_string(),
            }
            .into());
        };
        for (i, pk) in table.pks.iter().enumerate() {
            if i > 0 {
                b.push_str(" AND ");
            }
            append_column(b, alias, pk);
            b.push_str(" = ");
            pk.append_value(f, b, *record);
        }
        return Ok(());
    }

    if records.is_empty() {
        return Err(BuildError::Unsupported {
            statement: "where_pk",
            reason: "model slice is empty".to_string(),
        }
        .into());
    }
    let keys = unique_keys(&table.pks, records);
    let composite = table.pks.len() > 1;
    if composite {
        b.push('(');
    }
    for (i, pk) in table.pks.iter().enumerate() {
        if i > 0 {
            b.push_str(", ");
        }
        append_column(b, alias, pk);
    }
    if composite {
        b.push(')');
    }
    b.push_str(" IN (");
    for (i, record) in keys.iter().enumerate() {
        if i > 0 {
            b.push_str(", ");
        }
        if composite {
            b.push('(');
        }
        for (j, pk) in table.pks.iter().enumerate() {
            if j > 0 {
                b.push_str(", ");
            }
            pk.append_value(f, b, *record);
        }
        if composite {
            b.push(')');
        }
    }
    b.push(')');
    Ok(())
}

fn append_column(b: &mut String, alias: &str, field: &Field) {
    b.push_str(alias);
    b.push('.');
    b.push_str(&field.sql_name);
}

/// Returns the records whose key tuple over `fields` was not seen before,
/// comparing decoded values.
pub(crate) fn unique_keys<'r>(
    fields: &[std::sync::Arc<Field>],
    records: &[&'r dyn Record],
) -> Vec<&'r dyn Record> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .copied()
        .filter(|record| {
            let key: Vec<ValueKey> =
                fields.iter().map(|f| ValueKey::from(&f.value(*record))).collect();
            seen.insert(key)
        })
        .collect()
}
