//! The model binder: scans result rows into one of four destination shapes.
//!
//! - [`Binder::Struct`]: one record, columns matched to fields by name
//! - [`Binder::Slice`]: a record list grown to the row count
//! - [`Binder::Map`]: ordered column maps, for queries without a model
//! - [`Binder::Scalars`]: independent targets matched by position
//!
//! Columns of inline-joined relations arrive as `alias__column` and are
//! routed to the nested record through the join's relation path.
//! Many-to-many loads also select bridge-table columns, which are scanned
//! into a bridge record kept alongside each row.

use std::collections::HashMap;
use std::sync::Arc;

use burrow_core::{
    Destination, Dialect, Field, FromValue, HookError, IntoDestination, ModelInfo, Record,
    RecordList, Relation, RelationMut, Row, ScanError, SchemaError, Table, Value, ValueKey,
};

use crate::conn::RowSet;
use crate::error::BindError;

/// Separator between a join alias and a column name in result columns.
pub const ALIAS_SEP: &str = "__";

/// A scalar destination.
pub trait ScalarTarget: Send + Sync {
    /// Stores a driver value.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] when the value cannot be converted.
    fn scan_value(&mut self, value: Value) -> Result<(), ScanError>;
}

impl<T: FromValue + Send + Sync> ScalarTarget for T {
    fn scan_value(&mut self, value: Value) -> Result<(), ScanError> {
        *self = T::from_value(value)?;
        Ok(())
    }
}

/// Scalar targets, one per selected column.
///
/// ```ignore
/// let (mut id, mut name) = (0_i64, String::new());
/// db.new_select()
///     .table("users")
///     .column(["id", "name"])
///     .limit(1)
///     .scan_into(&ctx, Scalars::new().push(&mut id).push(&mut name))
///     .await?;
/// ```
#[derive(Default)]
pub struct Scalars<'a> {
    targets: Vec<&'a mut dyn ScalarTarget>,
}

impl<'a> Scalars<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn push(mut self, target: &'a mut dyn ScalarTarget) -> Self {
        self.targets.push(target);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Records of a model known only at runtime, used for relation queries.
pub struct BoxedRecords {
    info: ModelInfo,
    items: Vec<Box<dyn Record>>,
}

impl BoxedRecords {
    #[must_use]
    pub const fn new(info: ModelInfo) -> Self {
        Self {
            info,
            items: Vec::new(),
        }
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<Box<dyn Record>> {
        self.items
    }
}

impl RecordList for BoxedRecords {
    fn element_info(&self) -> ModelInfo {
        self.info
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, i: usize) -> Option<&dyn Record> {
        self.items.get(i).map(AsRef::as_ref)
    }

    fn get_mut(&mut self, i: usize) -> Option<&mut dyn Record> {
        self.items.get_mut(i).map(AsMut::as_mut)
    }

    fn records(&self) -> Vec<&dyn Record> {
        self.items.iter().map(AsRef::as_ref).collect()
    }

    fn records_mut(&mut self) -> Vec<&mut dyn Record> {
        self.items.iter_mut().map(AsMut::as_mut).collect()
    }

    fn get_or_push(&mut self, i: usize) -> &mut dyn Record {
        while self.items.len() <= i {
            self.items.push(self.info.new_record());
        }
        self.items[i].as_mut()
    }

    fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    fn push(&mut self, record: Box<dyn Record>) -> Result<(), ScanError> {
        if !self.info.is(record.as_ref()) {
            return Err(ScanError::WrongRecordType {
                expected: self.info.type_name,
                found: record.model_info().type_name,
            });
        }
        self.items.push(record);
        Ok(())
    }
}

/// Map destinations.
pub enum MapDest<'a> {
    One(&'a mut Row),
    Many(&'a mut Vec<Row>),
}

/// A classified destination.
pub enum Binder<'a> {
    Struct(&'a mut dyn Record),
    Slice(&'a mut dyn RecordList),
    Map(MapDest<'a>),
    Scalars(Scalars<'a>),
}

/// Converts a destination into a [`Binder`].
///
/// Every [`IntoDestination`] is accepted, so `&mut T`, `&mut Vec<T>`,
/// `&mut Row` and `&mut Vec<Row>` work directly; [`Scalars`] adds
/// positional targets.
pub trait IntoBinder<'a> {
    fn into_binder(self) -> Binder<'a>;
}

impl<'a> IntoBinder<'a> for Binder<'a> {
    fn into_binder(self) -> Binder<'a> {
        self
    }
}

impl<'a, D: IntoDestination<'a>> IntoBinder<'a> for D {
    fn into_binder(self) -> Binder<'a> {
        match self.into_destination() {
            Destination::Record(record) => Binder::Struct(record),
            Destination::List(list) => Binder::Slice(list),
            Destination::Row(row) => Binder::Map(MapDest::One(row)),
            Destination::Rows(rows) => Binder::Map(MapDest::Many(rows)),
        }
    }
}

impl<'a> IntoDestination<'a> for &'a mut BoxedRecords {
    fn into_destination(self) -> Destination<'a> {
        Destination::List(self)
    }
}

impl<'a> IntoBinder<'a> for Scalars<'a> {
    fn into_binder(self) -> Binder<'a> {
        Binder::Scalars(self)
    }
}

/// An inline join as seen by the binder: its column prefix and the
/// relation path from the statement's root table.
#[derive(Debug, Clone)]
pub(crate) struct JoinColumns {
    pub alias: String,
    pub path: Vec<Arc<Relation>>,
}

/// The bridge table of a many-to-many load. Its columns arrive either
/// as `alias__column` or unprefixed when the joined table has no field of
/// that name.
#[derive(Debug, Clone)]
pub(crate) struct BridgeColumns {
    pub alias: String,
    pub table: Arc<Table>,
}

/// Everything the binder needs to route result columns.
#[derive(Debug, Clone, Default)]
pub(crate) struct Layout {
    pub table: Option<Arc<Table>>,
    pub joins: Vec<JoinColumns>,
    pub bridge: Option<BridgeColumns>,
}

/// Result of a bind.
#[derive(Default)]
pub(crate) struct Bound {
    pub count: usize,
    /// Bridge rows, one per bound row when the layout has a bridge.
    pub bridges: Vec<Box<dyn Record>>,
}

enum Target {
    Field { join: Option<usize>, field: Arc<Field> },
    Bridge(Arc<Field>),
}

struct ScanPlan<'l> {
    layout: &'l Layout,
    targets: Vec<Target>,
}

impl<'l> ScanPlan<'l> {
    fn build(layout: &'l Layout, table: &Table, columns: &[String]) -> Result<Self, BindError> {
        let unknown = |column: &str| BindError::UnknownColumn {
            table: table.name.clone(),
            column: column.to_string(),
        };
        let mut targets = Vec::with_capacity(columns.len());
        for column in columns {
            let bridged = layout.bridge.as_ref().and_then(|bridge| {
                column
                    .strip_prefix(bridge.alias.as_str())
                    .and_then(|rest| rest.strip_prefix(ALIAS_SEP))
                    .and_then(|name| bridge.table.field(name))
            });
            if let Some(field) = bridged {
                targets.push(Target::Bridge(Arc::clone(field)));
                continue;
            }
            if let Some(field) = table.field(column) {
                targets.push(Target::Field {
                    join: None,
                    field: Arc::clone(field),
                });
                continue;
            }
            // The longest matching alias wins: `author__profile__id` belongs
            // to `author__profile`, not to `author`.
            let join = layout
                .joins
                .iter()
                .enumerate()
                .filter(|(_, j)| {
                    column.len() > j.alias.len() + ALIAS_SEP.len()
                        && column.starts_with(j.alias.as_str())
                        && column[j.alias.len()..].starts_with(ALIAS_SEP)
                })
                .max_by_key(|(_, j)| j.alias.len());
            let Some((i, join)) = join else {
                let field = layout
                    .bridge
                    .as_ref()
                    .and_then(|bridge| bridge.table.field(column))
                    .ok_or_else(|| unknown(column))?;
                targets.push(Target::Bridge(Arc::clone(field)));
                continue;
            };
            let name = &column[join.alias.len() + ALIAS_SEP.len()..];
            let Some(last) = join.path.last() else {
                return Err(unknown(column));
            };
            let field = last.join_table.field(name).ok_or_else(|| unknown(column))?;
            targets.push(Target::Field {
                join: Some(i),
                field: Arc::clone(field),
            });
        }
        Ok(Self { layout, targets })
    }

    /// Scans one row into `record` and returns the bridge row, if the
    /// layout has a bridge.
    fn scan_row(
        &self,
        record: &mut dyn Record,
        row: Vec<Value>,
        columns: &[String],
    ) -> Result<Option<Box<dyn Record>>, BindError> {
        // A LEFT JOIN without a match yields NULL in every column of the
        // joined table; such relations stay empty.
        let mut matched = vec![false; self.layout.joins.len()];
        for (target, value) in self.targets.iter().zip(&row) {
            if let Target::Field { join: Some(j), .. } = target {
                matched[*j] |= !value.is_null();
            }
        }

        record.before_scan().map_err(|e| hook_error(record, &e))?;
        let mut bridge = self.layout.bridge.as_ref().map(|b| b.table.info.new_record());
        for ((target, value), column) in self.targets.iter().zip(row).zip(columns) {
            match target {
                Target::Bridge(field) => {
                    if let Some(bridge) = bridge.as_deref_mut() {
                        field.scan_value(bridge, value).map_err(|e| scan_error(column, e))?;
                    }
                }
                Target::Field { join: None, field } => {
                    field.scan_value(record, value).map_err(|e| scan_error(column, e))?;
                }
                Target::Field { join: Some(j), field } => {
                    if !matched[*j] {
                        continue;
                    }
                    let nested = descend(record, &self.layout.joins[*j].path)?;
                    field.scan_value(nested, value).map_err(|e| scan_error(column, e))?;
                }
            }
        }
        for (j, join) in self.layout.joins.iter().enumerate() {
            if !matched[j] {
                clear_join(record, &join.path);
            }
        }
        record.after_scan().map_err(|e| hook_error(record, &e))?;
        Ok(bridge)
    }
}

fn scan_error(column: &str, source: ScanError) -> BindError {
    BindError::Scan {
        column: column.to_string(),
        source,
    }
}

fn hook_error(record: &dyn Record, err: &HookError) -> BindError {
    BindError::Hook {
        model: record.model_info().type_name,
        message: err.to_string(),
    }
}

/// Follows to-one relations from `record`, creating zero values on the way.
fn descend<'r>(
    record: &'r mut dyn Record,
    path: &[Arc<Relation>],
) -> Result<&'r mut dyn Record, BindError> {
    let mut current = record;
    for relation in path {
        current = match current.relation_mut(&relation.index) {
            Some(RelationMut::One(slot)) => slot.get_or_insert(),
            _ => {
                return Err(BindError::Unsupported(format!(
                    "relation {} is not a to-one field",
                    relation.name
                )))
            }
        };
    }
    Ok(current)
}

fn clear_join(record: &mut dyn Record, path: &[Arc<Relation>]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = record;
    for relation in parents {
        current = match current.relation_mut(&relation.index) {
            Some(RelationMut::One(slot)) => match slot.get_mut() {
                Some(next) => next,
                None => return,
            },
            _ => return,
        };
    }
    if let Some(RelationMut::One(slot)) = current.relation_mut(&last.index) {
        slot.clear();
    }
}

impl Binder<'_> {
    /// Returns the model of struct and slice destinations.
    #[must_use]
    pub fn model_info(&self) -> Option<ModelInfo> {
        match self {
            Self::Struct(record) => Some(record.model_info()),
            Self::Slice(list) => Some(list.element_info()),
            Self::Map(_) | Self::Scalars(_) => None,
        }
    }

    /// Returns the table of struct and slice destinations.
    ///
    /// # Errors
    ///
    /// Returns the [`SchemaError`] of an invalid model.
    pub fn describe(&self, dialect: &dyn Dialect) -> Result<Option<Arc<Table>>, SchemaError> {
        self.model_info().map(|info| dialect.table(info)).transpose()
    }

    /// Returns true for single-record destinations, which report zero
    /// rows as [`Error::NoRows`](crate::Error::NoRows).
    #[must_use]
    pub const fn is_single(&self) -> bool {
        matches!(self, Self::Struct(_) | Self::Map(MapDest::One(_)) | Self::Scalars(_))
    }

    /// Scans `rows` into the destination and returns the bound row count.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] for unknown columns, conversion failures and
    /// failing hooks. Rows bound before the failure stay written.
    pub fn bind(&mut self, dialect: &dyn Dialect, rows: RowSet) -> Result<usize, BindError> {
        let table = self
            .describe(dialect)
            .map_err(|e| BindError::Unsupported(e.to_string()))?;
        let layout = Layout {
            table,
            ..Layout::default()
        };
        self.bind_with(rows, &layout).map(|bound| bound.count)
    }

    pub(crate) fn bind_with(&mut self, rows: RowSet, layout: &Layout) -> Result<Bound, BindError> {
        let RowSet { columns, rows } = rows;
        let mut bound = Bound::default();
        match self {
            Self::Struct(record) => {
                let table = layout.table.as_deref().ok_or(BindError::NoDestination)?;
                let Some(row) = rows.into_iter().next() else {
                    return Ok(bound);
                };
                let plan = ScanPlan::build(layout, table, &columns)?;
                bound.bridges.extend(plan.scan_row(&mut **record, row, &columns)?);
                bound.count = 1;
            }
            Self::Slice(list) => {
                let table = layout.table.as_deref().ok_or(BindError::NoDestination)?;
                list.truncate(0);
                if rows.is_empty() {
                    return Ok(bound);
                }
                let plan = ScanPlan::build(layout, table, &columns)?;
                for (i, row) in rows.into_iter().enumerate() {
                    let record = list.get_or_push(i);
                    bound.bridges.extend(plan.scan_row(record, row, &columns)?);
                    bound.count += 1;
                }
            }
            Self::Map(MapDest::One(map)) => {
                let Some(row) = rows.into_iter().next() else {
                    return Ok(bound);
                };
                map.clear();
                map.extend(columns.iter().cloned().zip(row));
                bound.count = 1;
            }
            Self::Map(MapDest::Many(maps)) => {
                maps.clear();
                for row in rows {
                    maps.push(columns.iter().cloned().zip(row).collect());
                }
                bound.count = maps.len();
            }
            Self::Scalars(scalars) => {
                // Drivers may report no columns for an empty result.
                let Some(row) = rows.into_iter().next() else {
                    return Ok(bound);
                };
                if scalars.len() != columns.len() {
                    return Err(BindError::ColumnCount {
                        expected: scalars.len(),
                        got: columns.len(),
                    });
                }
                for ((target, value), column) in scalars.targets.iter_mut().zip(row).zip(&columns) {
                    target.scan_value(value).map_err(|e| scan_error(column, e))?;
                }
                bound.count = 1;
            }
        }
        Ok(bound)
    }

    /// Writes rows returned by a mutation back into the records the
    /// statement was built from. A list keeps its length; rows are matched
    /// to records by primary key when every key column was returned and
    /// every record has a non-zero key, and by position otherwise.
    pub(crate) fn bind_back(
        &mut self,
        rows: RowSet,
        table: &Arc<Table>,
    ) -> Result<usize, BindError> {
        let layout = Layout {
            table: Some(Arc::clone(table)),
            ..Layout::default()
        };
        let RowSet { columns, rows } = rows;
        if rows.is_empty() {
            return Ok(0);
        }
        let plan = ScanPlan::build(&layout, table, &columns)?;
        match self {
            Self::Struct(record) => {
                if let Some(row) = rows.into_iter().next() {
                    plan.scan_row(&mut **record, row, &columns)?;
                }
                Ok(1)
            }
            Self::Slice(list) => {
                let pk_columns: Option<Vec<usize>> = table
                    .pks
                    .iter()
                    .map(|pk| columns.iter().position(|c| *c == pk.name))
                    .collect();
                // Keys still zero are generated by the statement itself and
                // cannot identify their record.
                let keyed = list
                    .records()
                    .iter()
                    .all(|r| table.pks.iter().all(|pk| !pk.has_zero_value(*r)));
                let mut count = 0;
                match pk_columns.filter(|p| !p.is_empty() && keyed) {
                    Some(positions) => {
                        let mut index: HashMap<Vec<ValueKey>, usize> = HashMap::new();
                        for (i, record) in list.records().into_iter().enumerate() {
                            let key = table
                                .pks
                                .iter()
                                .map(|pk| ValueKey::from(&pk.value(record)))
                                .collect();
                            index.entry(key).or_insert(i);
                        }
                        for row in rows {
                            let key: Vec<ValueKey> =
                                positions.iter().map(|&p| ValueKey::from(&row[p])).collect();
                            let Some(record) = index.get(&key).and_then(|&i| list.get_mut(i)) else {
                                continue;
                            };
                            plan.scan_row(record, row, &columns)?;
                            count += 1;
                        }
                    }
                    None => {
                        for (i, row) in rows.into_iter().enumerate() {
                            let Some(record) = list.get_mut(i) else { break };
                            plan.scan_row(record, row, &columns)?;
                            count += 1;
                        }
                    }
                }
                Ok(count)
            }
            Self::Map(_) | Self::Scalars(_) => Err(BindError::Unsupported(
                "returned rows can only be written back into models".to_string(),
            )),
        }
    }

    /// Borrows the bound records, in destination order.
    pub(crate) fn records(&self) -> Vec<&dyn Record> {
        match self {
            Self::Struct(record) => vec![&**record],
            Self::Slice(list) => list.records(),
            Self::Map(_) | Self::Scalars(_) => Vec::new(),
        }
    }

    /// Mutably borrows the bound records, in destination order.
    pub(crate) fn records_mut(&mut self) -> Vec<&mut dyn Record> {
        match self {
            Self::Struct(record) => vec![&mut **record],
            Self::Slice(list) => list.records_mut(),
            Self::Map(_) | Self::Scalars(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use burrow_core::{Model, SqliteDialect};

    use super::*;

    #[derive(Debug, Default, Clone, PartialEq, burrow_derive::Model)]
    struct Item {
        id: i64,
        name: String,
        tags: Vec<String>,
    }

    #[derive(Debug, Default, Clone, burrow_derive::Model)]
    struct Label {
        id: i64,
    }

    fn rows() -> RowSet {
        RowSet::new(["id", "name", "tags"])
            .row(vec![Value::Int(1), Value::Text("a".into()), Value::Text(r#"["x"]"#.into())])
            .row(vec![Value::Int(2), Value::Text("b".into()), Value::Null])
    }

    #[test]
    fn test_struct_takes_first_row() {
        let dialect = SqliteDialect::new();
        let mut item = Item::default();
        let n = Binder::Struct(&mut item).bind(&dialect, rows()).unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            item,
            Item {
                id: 1,
                name: "a".into(),
                tags: vec!["x".into()]
            }
        );
    }

    #[test]
    fn test_slice_is_resized_to_row_count() {
        let dialect = SqliteDialect::new();
        let mut items = vec![Item::default(); 5];
        let n = (&mut items).into_binder().bind(&dialect, rows()).unwrap();
        assert_eq!(n, 2);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].name, "b");
        assert!(items[1].tags.is_empty());
    }

    #[test]
    fn test_unknown_column() {
        let dialect = SqliteDialect::new();
        let mut item = Item::default();
        let rows = RowSet::new(["id", "color"]).row(vec![Value::Int(1), Value::Text("red".into())]);
        let err = Binder::Struct(&mut item).bind(&dialect, rows).unwrap_err();
        assert!(matches!(
            err,
            BindError::UnknownColumn { ref table, ref column }
                if table == "items" && column == "color"
        ));
    }

    #[test]
    fn test_scan_error_names_column() {
        let dialect = SqliteDialect::new();
        let mut item = Item::default();
        let rows = RowSet::new(["id"]).row(vec![Value::Text("seven".into())]);
        let err = Binder::Struct(&mut item).bind(&dialect, rows).unwrap_err();
        assert!(matches!(err, BindError::Scan { ref column, .. } if column == "id"));
    }

    #[test]
    fn test_maps_capture_every_column() {
        let dialect = SqliteDialect::new();
        let mut maps: Vec<Row> = Vec::new();
        let n = (&mut maps).into_binder().bind(&dialect, rows()).unwrap();
        assert_eq!(n, 2);
        assert_eq!(maps[0].keys().collect::<Vec<_>>(), vec!["id", "name", "tags"]);
        assert_eq!(maps[1]["name"], Value::Text("b".into()));
        assert!((&mut maps).into_binder().describe(&dialect).unwrap().is_none());
    }

    #[test]
    fn test_scalars_by_position() {
        let dialect = SqliteDialect::new();
        let (mut id, mut name) = (0_i64, String::new());
        let n = Scalars::new()
            .push(&mut id)
            .push(&mut name)
            .into_binder()
            .bind(
                &dialect,
                RowSet::new(["a", "b"]).row(vec![Value::Int(9), Value::Text("z".into())]),
            )
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!((id, name.as_str()), (9, "z"));

        let mut only = 0_i64;
        let err = Scalars::new()
            .push(&mut only)
            .into_binder()
            .bind(&dialect, rows())
            .unwrap_err();
        assert!(matches!(err, BindError::ColumnCount { expected: 1, got: 3 }));
    }

    #[test]
    fn test_boxed_records_check_type() {
        let mut list = BoxedRecords::new(Item::info());
        list.get_or_push(1).set_field(&[0], Value::Int(4)).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(1).unwrap().field_value(&[0]), Value::Int(4));

        let err = list.push(Box::new(Label::default())).unwrap_err();
        assert!(matches!(err, ScanError::WrongRecordType { .. }));

        let mut items: Vec<Item> = Vec::new();
        RecordList::push(&mut items, list.into_inner().remove(1)).unwrap();
        assert_eq!(items[0].id, 4);
    }
}
