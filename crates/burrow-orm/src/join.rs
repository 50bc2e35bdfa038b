//! Association loading.
//!
//! Requested relations form a tree of [`JoinNode`]s under a SELECT. To-one
//! relations (belongs-to, has-one) are joined into the owning statement
//! with `LEFT JOIN ... AS alias`, and their columns come back as
//! `alias__column`. To-many relations (has-many, many-to-many) are loaded
//! after the owning rows are bound, with one secondary query per relation
//! restricted to the deduplicated parent keys; the children are grouped by
//! key and assigned to each parent in the parent's order.
//!
//! Aliases are the relation names along the path from the statement root
//! joined by `__`, so two distinct paths never share an alias.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use burrow_core::{
    ArgAppender, Dialect, Field, Formatter, Record, Relation, RelationKind, RelationMut, Table,
    Value, ValueKey,
};
use futures::future::BoxFuture;
use tracing::{debug, trace};

use crate::conn::Context;
use crate::db::Db;
use crate::error::{BindError, Result};
use crate::model::{BoxedRecords, BridgeColumns, JoinColumns, ALIAS_SEP};
use crate::query::base::{Column, TableArgs};
use crate::query::r#where;
use crate::query::{SelectQuery, SoftDelete};

/// A relation scope: receives a query against the related table and
/// returns it with extra predicates, columns, ordering or limits.
pub type ScopeFn = Arc<dyn for<'q> Fn(SelectQuery<'q>) -> SelectQuery<'q> + Send + Sync>;

/// Prefix of bridge table aliases in many-to-many queries.
const M2M_PREFIX: &str = "m2m";

/// One requested relation and the relations requested beneath it.
#[derive(Clone)]
pub(crate) struct JoinNode {
    pub relation: Arc<Relation>,
    pub scope: Option<ScopeFn>,
    pub children: Vec<JoinNode>,
}

impl std::fmt::Debug for JoinNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinNode")
            .field("relation", &self.relation.name)
            .field("scoped", &self.scope.is_some())
            .field("children", &self.children)
            .finish()
    }
}

/// Adds the dot-separated relation `path` below `nodes`, resolving each
/// segment against the previous segment's table. The scope, if any,
/// applies to the last segment.
pub(crate) fn add_path(
    dialect: &dyn Dialect,
    nodes: &mut Vec<JoinNode>,
    root: &Arc<Table>,
    path: &str,
    scope: Option<ScopeFn>,
) -> burrow_core::Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut table = Arc::clone(root);
    let mut nodes = nodes;
    for (i, name) in segments.iter().enumerate() {
        let relation = dialect.relation(&table, name)?;
        let pos = match nodes.iter().position(|n| n.relation.name == relation.name) {
            Some(pos) => pos,
            None => {
                nodes.push(JoinNode {
                    relation: Arc::clone(&relation),
                    scope: None,
                    children: Vec::new(),
                });
                nodes.len() - 1
            }
        };
        let node = &mut nodes[pos];
        if i + 1 == segments.len() && scope.is_some() {
            node.scope.clone_from(&scope);
        }
        table = Arc::clone(&relation.join_table);
        nodes = &mut node.children;
    }
    Ok(())
}

/// A to-one relation joined into the owning statement.
pub(crate) struct Inline<'n> {
    pub node: &'n JoinNode,
    /// Unquoted alias, e.g. `author__profile`.
    pub alias: String,
    /// Quoted alias of the table the relation starts from.
    pub parent_alias: String,
    pub path: Vec<Arc<Relation>>,
}

/// Flattens the to-one chains below `nodes` in depth-first order.
pub(crate) fn inline<'n>(
    dialect: &dyn Dialect,
    nodes: &'n [JoinNode],
    root_alias: &str,
) -> Vec<Inline<'n>> {
    let mut out = Vec::new();
    collect_inline(dialect, nodes, root_alias, "", &[], &mut out);
    out
}

fn collect_inline<'n>(
    dialect: &dyn Dialect,
    nodes: &'n [JoinNode],
    parent_alias: &str,
    prefix: &str,
    path: &[Arc<Relation>],
    out: &mut Vec<Inline<'n>>,
) {
    for node in nodes.iter().filter(|n| n.relation.is_to_one()) {
        let alias = format!("{prefix}{}", node.relation.name);
        let mut node_path = path.to_vec();
        node_path.push(Arc::clone(&node.relation));
        let quoted = dialect.quote_identifier(&alias);
        out.push(Inline {
            node,
            alias: alias.clone(),
            parent_alias: parent_alias.to_string(),
            path: node_path.clone(),
        });
        collect_inline(
            dialect,
            &node.children,
            &quoted,
            &format!("{alias}{ALIAS_SEP}"),
            &node_path,
            out,
        );
    }
}

impl Inline<'_> {
    pub fn columns(&self) -> JoinColumns {
        JoinColumns {
            alias: self.alias.clone(),
            path: self.path.clone(),
        }
    }

    /// Applies the scope to an empty query against the joined table.
    fn scoped(&self, db: &Db, quoted: &str) -> Option<SelectQuery<'static>> {
        let scope = self.node.scope.as_ref()?;
        let query = SelectQuery::scratch(db.clone(), &self.node.relation.join_table, quoted);
        Some(scope(query))
    }

    /// Appends `"alias"."col" AS "alias__col"` for every selected column.
    pub fn append_columns(&self, db: &Db, b: &mut String) {
        let dialect = db.dialect();
        let quoted = dialect.quote_identifier(&self.alias);
        let table = &self.node.relation.join_table;
        let restricted: Vec<String> = self
            .scoped(db, &quoted)
            .map(|q| {
                q.base
                    .columns
                    .iter()
                    .filter_map(|c| match c {
                        Column::Name(name) => Some(name.clone()),
                        Column::Expr(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let mut first = true;
        for field in &table.fields {
            if !restricted.is_empty() && !restricted.contains(&field.name) {
                continue;
            }
            if !first {
                b.push_str(", ");
            }
            first = false;
            b.push_str(&quoted);
            b.push('.');
            b.push_str(&field.sql_name);
            b.push_str(" AS ");
            dialect.append_ident(b, &format!("{}{ALIAS_SEP}{}", self.alias, field.name));
        }
    }

    /// Appends ` LEFT JOIN table AS alias ON (keys) [AND ...]`.
    pub fn append_join(
        &self,
        db: &Db,
        f: &Formatter<'_>,
        b: &mut String,
        mode: SoftDelete,
    ) -> Result<()> {
        let relation = &self.node.relation;
        let table = &relation.join_table;
        let quoted = db.dialect().quote_identifier(&self.alias);

        b.push_str(" LEFT JOIN ");
        b.push_str(&table.sql_name_for_select);
        b.push_str(" AS ");
        b.push_str(&quoted);
        b.push_str(" ON (");
        let pairs = relation.base_fields.iter().zip(&relation.join_fields);
        for (i, (base, join)) in pairs.enumerate() {
            if i > 0 {
                b.push_str(" AND ");
            }
            append_qualified(b, &quoted, join);
            b.push_str(" = ");
            append_qualified(b, &self.parent_alias, base);
        }
        b.push(')');

        if let Some(poly) = &relation.polymorphic {
            b.push_str(" AND ");
            append_qualified(b, &quoted, &poly.field);
            b.push_str(" = ");
            f.append_value(b, &Value::Text(poly.value.clone()));
        }
        let mut part = String::new();
        if r#where::append_soft_delete(&mut part, table, &quoted, mode) {
            b.push_str(" AND ");
            b.push_str(&part);
        }
        if let Some(scoped) = self.scoped(db, &quoted) {
            let wheres = &scoped.base.wheres;
            if !wheres.is_empty() {
                b.push_str(" AND ");
                let named = TableArgs {
                    table,
                    alias: &quoted,
                };
                if wheres.is_compound() {
                    b.push('(');
                }
                wheres.append_nodes(f, b, Some(&named as &dyn ArgAppender))?;
                if wheres.is_compound() {
                    b.push(')');
                }
            }
        }
        Ok(())
    }
}

fn append_qualified(b: &mut String, alias: &str, field: &Field) {
    b.push_str(alias);
    b.push('.');
    b.push_str(&field.sql_name);
}

fn key_of(fields: &[Arc<Field>], record: &dyn Record) -> Option<Vec<ValueKey>> {
    let values: Vec<Value> = fields.iter().map(|f| f.value(record)).collect();
    if values.iter().any(Value::is_null) {
        return None;
    }
    Some(values.iter().map(ValueKey::from).collect())
}

/// Loads the to-many relations below `nodes` into `parents`, descending
/// through to-one relations that were joined into the owning statement.
///
/// Nodes are processed in order and the first failure aborts the whole
/// load, including siblings that have not started.
pub(crate) fn load<'f>(
    db: &'f Db,
    ctx: &'f Context,
    mut parents: Vec<&'f mut dyn Record>,
    nodes: &'f [JoinNode],
) -> BoxFuture<'f, Result<()>> {
    Box::pin(async move {
        if parents.is_empty() {
            return Ok(());
        }
        for node in nodes {
            let relation = &node.relation;
            if relation.is_to_one() {
                let nested: Vec<&mut dyn Record> = parents
                    .iter_mut()
                    .filter_map(|p| match p.relation_mut(&relation.index) {
                        Some(RelationMut::One(slot)) => slot.get_mut(),
                        _ => None,
                    })
                    .collect();
                load(db, ctx, nested, &node.children).await?;
            } else {
                load_many(db, ctx, &mut parents, node).await?;
            }
        }
        Ok(())
    })
}

async fn load_many(
    db: &Db,
    ctx: &Context,
    parents: &mut [&mut dyn Record],
    node: &JoinNode,
) -> Result<()> {
    let relation = &node.relation;

    let mut seen = HashSet::new();
    let keys: Vec<Vec<Value>> = parents
        .iter()
        .filter_map(|p| {
            let key = key_of(&relation.base_fields, &**p)?;
            seen.insert(key)
                .then(|| relation.base_fields.iter().map(|f| f.value(&**p)).collect())
        })
        .collect();

    if keys.is_empty() {
        trace!(relation = %relation.name, "no parent keys, skipping relation query");
        for parent in parents.iter_mut() {
            clear_many(&mut **parent, relation)?;
        }
        return Ok(());
    }

    let mut children = BoxedRecords::new(relation.join_table.info);
    let bound = {
        let (query, bridge) = secondary(db, node, &keys, &mut children);
        query.fetch(ctx, bridge).await?
    };
    let children = children.into_inner();
    debug!(
        relation = %relation.name,
        parents = parents.len(),
        keys = keys.len(),
        children = children.len(),
        "loaded relation"
    );

    // Group child positions by the key they belong to.
    let mut groups: HashMap<Vec<ValueKey>, Vec<usize>> = HashMap::new();
    for (i, child) in children.iter().enumerate() {
        let key = match &relation.m2m {
            Some(m2m) => bound
                .bridges
                .get(i)
                .and_then(|bridge| key_of(&m2m.base_fields, bridge.as_ref())),
            None => key_of(&relation.join_fields, child.as_ref()),
        };
        if let Some(key) = key {
            groups.entry(key).or_default().push(i);
        }
    }

    for parent in parents.iter_mut() {
        let key = key_of(&relation.base_fields, &**parent);
        let Some(RelationMut::Many(list)) = parent.relation_mut(&relation.index) else {
            return Err(not_a_list(relation));
        };
        list.clear();
        let Some(positions) = key.and_then(|k| groups.get(&k)) else {
            continue;
        };
        for &i in positions {
            list.push(children[i].clone_record()).map_err(|source| BindError::Scan {
                column: relation.name.clone(),
                source,
            })?;
        }
    }
    Ok(())
}

fn clear_many(parent: &mut dyn Record, relation: &Relation) -> Result<()> {
    match parent.relation_mut(&relation.index) {
        Some(RelationMut::Many(list)) => {
            list.clear();
            Ok(())
        }
        _ => Err(not_a_list(relation)),
    }
}

fn not_a_list(relation: &Relation) -> crate::error::Error {
    BindError::Unsupported(format!("relation {} is not a list field", relation.name)).into()
}

/// Builds the secondary query of a to-many node. Many-to-many queries
/// also return the bridge columns the binder scans aside.
fn secondary<'q>(
    db: &Db,
    node: &JoinNode,
    keys: &[Vec<Value>],
    dest: &'q mut BoxedRecords,
) -> (SelectQuery<'q>, Option<BridgeColumns>) {
    let relation = &node.relation;
    let dialect = db.dialect();
    let table = &relation.join_table;
    let mut query = SelectQuery::new(db.clone()).model(dest);
    let mut bridge = None;

    match (&relation.kind, &relation.m2m) {
        (RelationKind::ManyToMany, Some(m2m)) => {
            let bridge_alias = format!("{M2M_PREFIX}{ALIAS_SEP}{}", m2m.table.alias);
            let quoted = dialect.quote_identifier(&bridge_alias);

            let mut on = String::new();
            let pairs = m2m.join_fields.iter().zip(&relation.join_fields);
            for (i, (bridge, join)) in pairs.enumerate() {
                if i > 0 {
                    on.push_str(" AND ");
                }
                append_qualified(&mut on, &quoted, bridge);
                on.push_str(" = ");
                append_qualified(&mut on, &table.sql_alias, join);
            }
            query = query.join_raw(format!("JOIN {} AS {quoted} ON ({on})", m2m.table.sql_name));

            for field in &m2m.base_fields {
                let capture = format!("{bridge_alias}{ALIAS_SEP}{}", field.name);
                let mut column = String::new();
                append_qualified(&mut column, &quoted, field);
                column.push_str(" AS ");
                dialect.append_ident(&mut column, &capture);
                query = query.capture_column(column);
            }
            query = query.where_raw(key_predicate(dialect, &quoted, &m2m.base_fields, keys));
            bridge = Some(BridgeColumns {
                alias: bridge_alias,
                table: Arc::clone(&m2m.table),
            });
        }
        _ => {
            let pred = key_predicate(dialect, &table.sql_alias, &relation.join_fields, keys);
            query = query.where_raw(pred);
            if let Some(poly) = &relation.polymorphic {
                let mut pred = String::new();
                append_qualified(&mut pred, &table.sql_alias, &poly.field);
                pred.push_str(" = ");
                Formatter::new(dialect).append_value(&mut pred, &Value::Text(poly.value.clone()));
                query = query.where_raw(pred);
            }
        }
    }

    query = query.adopt(node.children.clone());
    if let Some(scope) = &node.scope {
        query = scope(query);
    }
    (query, bridge)
}

/// Renders `alias.col IN (...)`, or a row-value IN for composite keys.
fn key_predicate(
    dialect: &dyn Dialect,
    alias: &str,
    fields: &[Arc<Field>],
    keys: &[Vec<Value>],
) -> String {
    let f = Formatter::new(dialect);
    let composite = fields.len() > 1;
    let mut b = String::new();
    if composite {
        b.push('(');
    }
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            b.push_str(", ");
        }
        append_qualified(&mut b, alias, field);
    }
    if composite {
        b.push(')');
    }
    b.push_str(" IN (");
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            b.push_str(", ");
        }
        if composite {
            b.push('(');
        }
        for (j, (field, value)) in fields.iter().zip(key).enumerate() {
            if j > 0 {
                b.push_str(", ");
            }
            field.append(&f, &mut b, value);
        }
        if composite {
            b.push(')');
        }
    }
    b.push(')');
    b
}
