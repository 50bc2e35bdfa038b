//! Static model descriptors and the dynamic record interface.
//!
//! `#[derive(Model)]` implements [`Model`] and [`Record`] for a struct. The
//! catalog reads the descriptor once; the binder and the association loader
//! then reach fields through index paths, without runtime reflection.

use std::any::{Any, TypeId};
use std::error::Error as StdError;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::ScanError;
use crate::types::FieldType;
use crate::value::{Row, Value};

/// Error returned by scan hooks.
pub type HookError = Box<dyn StdError + Send + Sync>;

/// A struct mapped to a table.
pub trait Model: Record + Default + Clone {
    /// Describes the struct and its fields.
    fn definition() -> ModelDef;

    /// Type identity and constructors, used as the catalog key.
    #[must_use]
    fn info() -> ModelInfo {
        ModelInfo::of::<Self>()
    }
}

/// Object-safe access to a model value.
///
/// Index paths address fields in declaration order; a path longer than one
/// element descends into embedded structs.
pub trait Record: Any + Send + Sync {
    fn model_info(&self) -> ModelInfo;

    /// Returns the value of the column at `index`, or NULL for an unknown
    /// path.
    fn field_value(&self, index: &[usize]) -> Value;

    /// Converts and stores a scanned value.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] when the value does not fit the field or the
    /// path is unknown.
    fn set_field(&mut self, index: &[usize], value: Value) -> Result<(), ScanError>;

    fn relation(&self, index: &[usize]) -> Option<RelationRef<'_>>;

    fn relation_mut(&mut self, index: &[usize]) -> Option<RelationMut<'_>>;

    /// Called before a row is scanned into the record.
    ///
    /// # Errors
    ///
    /// An error aborts binding.
    fn before_scan(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    /// Called after a row was scanned into the record.
    ///
    /// # Errors
    ///
    /// An error aborts binding.
    fn after_scan(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    fn clone_record(&self) -> Box<dyn Record>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Materialization hooks, wired into [`Record`] by `#[burrow(hooks)]`.
pub trait ScanHooks {
    /// # Errors
    ///
    /// An error aborts binding.
    fn before_scan(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    /// # Errors
    ///
    /// An error aborts binding.
    fn after_scan(&mut self) -> Result<(), HookError> {
        Ok(())
    }
}

/// Type identity of a model plus function pointers to describe and
/// construct it.
#[derive(Clone, Copy)]
pub struct ModelInfo {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub definition: fn() -> ModelDef,
    pub new: fn() -> Box<dyn Record>,
}

impl ModelInfo {
    #[must_use]
    pub fn of<T: Model>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            definition: T::definition,
            new: new_record::<T>,
        }
    }

    /// Creates a zero-valued record of this model.
    #[must_use]
    pub fn new_record(&self) -> Box<dyn Record> {
        (self.new)()
    }

    /// Returns true when the record is an instance of this model.
    #[must_use]
    pub fn is(&self, record: &dyn Record) -> bool {
        record.as_any().type_id() == self.type_id
    }
}

fn new_record<T: Model>() -> Box<dyn Record> {
    Box::new(T::default())
}

impl fmt::Debug for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelInfo").field(&self.type_name).finish()
    }
}

impl PartialEq for ModelInfo {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ModelInfo {}

impl Hash for ModelInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

/// Static description of a model: its name, struct tag and fields in
/// declaration order.
#[derive(Debug, Clone)]
pub struct ModelDef {
    pub name: &'static str,
    pub tag: &'static str,
    pub fields: Vec<FieldDef>,
}

/// One declared field.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: &'static str,
    pub tag: &'static str,
    pub kind: FieldDefKind,
}

#[derive(Debug, Clone)]
pub enum FieldDefKind {
    Column(FieldType),
    Relation { target: ModelInfo, many: bool },
    Embed(ModelInfo),
}

impl ModelDef {
    #[must_use]
    pub const fn new(name: &'static str, tag: &'static str) -> Self {
        Self {
            name,
            tag,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn column(mut self, name: &'static str, tag: &'static str, ty: FieldType) -> Self {
        self.fields.push(FieldDef {
            name,
            tag,
            kind: FieldDefKind::Column(ty),
        });
        self
    }

    #[must_use]
    pub fn relation(
        mut self,
        name: &'static str,
        tag: &'static str,
        target: ModelInfo,
        many: bool,
    ) -> Self {
        self.fields.push(FieldDef {
            name,
            tag,
            kind: FieldDefKind::Relation { target, many },
        });
        self
    }

    #[must_use]
    pub fn embed(mut self, name: &'static str, tag: &'static str, info: ModelInfo) -> Self {
        self.fields.push(FieldDef {
            name,
            tag,
            kind: FieldDefKind::Embed(info),
        });
        self
    }
}

/// Shared view of a relation field.
pub enum RelationRef<'a> {
    One(Option<&'a dyn Record>),
    Many(&'a dyn RecordList),
}

/// Mutable view of a relation field.
pub enum RelationMut<'a> {
    One(&'a mut dyn OneSlot),
    Many(&'a mut dyn RecordList),
}

/// A to-one relation field, `Option<Box<T>>`.
pub trait OneSlot: Send + Sync {
    fn get(&self) -> Option<&dyn Record>;

    fn get_mut(&mut self) -> Option<&mut dyn Record>;

    /// Returns the related record, creating a zero value first if needed.
    fn get_or_insert(&mut self) -> &mut dyn Record;

    /// Stores a record of the target type.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::WrongRecordType`] for any other type.
    fn set(&mut self, record: Box<dyn Record>) -> Result<(), ScanError>;

    fn clear(&mut self);
}

/// A growable list of records of one model.
pub trait RecordList: Send + Sync {
    fn element_info(&self) -> ModelInfo;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, i: usize) -> Option<&dyn Record>;

    fn get_mut(&mut self, i: usize) -> Option<&mut dyn Record>;

    /// Borrows every element, in order.
    fn records(&self) -> Vec<&dyn Record>;

    /// Mutably borrows every element, in order.
    fn records_mut(&mut self) -> Vec<&mut dyn Record>;

    /// Returns the `i`-th element, appending zero values up to it.
    fn get_or_push(&mut self, i: usize) -> &mut dyn Record;

    fn truncate(&mut self, len: usize);

    fn clear(&mut self) {
        self.truncate(0);
    }

    /// Appends a record of the element type.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::WrongRecordType`] for any other type.
    fn push(&mut self, record: Box<dyn Record>) -> Result<(), ScanError>;
}

fn downcast<T: Model>(record: Box<dyn Record>) -> Result<T, ScanError> {
    let found = record.model_info().type_name;
    record
        .into_any()
        .downcast::<T>()
        .map(|b| *b)
        .map_err(|_| ScanError::WrongRecordType {
            expected: std::any::type_name::<T>(),
            found,
        })
}

impl<T: Model> RecordList for Vec<T> {
    fn element_info(&self) -> ModelInfo {
        T::info()
    }

    fn len(&self) -> usize {
        Self::len(self)
    }

    fn get(&self, i: usize) -> Option<&dyn Record> {
        self.as_slice().get(i).map(|r| r as &dyn Record)
    }

    fn get_mut(&mut self, i: usize) -> Option<&mut dyn Record> {
        self.as_mut_slice().get_mut(i).map(|r| r as &mut dyn Record)
    }

    fn records(&self) -> Vec<&dyn Record> {
        self.iter().map(|r| r as &dyn Record).collect()
    }

    fn records_mut(&mut self) -> Vec<&mut dyn Record> {
        self.iter_mut().map(|r| r as &mut dyn Record).collect()
    }

    fn get_or_push(&mut self, i: usize) -> &mut dyn Record {
        if i >= Self::len(self) {
            self.resize_with(i + 1, T::default);
        }
        &mut self[i]
    }

    fn truncate(&mut self, len: usize) {
        Self::truncate(self, len);
    }

    fn push(&mut self, record: Box<dyn Record>) -> Result<(), ScanError> {
        Self::push(self, downcast::<T>(record)?);
        Ok(())
    }
}

impl<T: Model> OneSlot for Option<Box<T>> {
    fn get(&self) -> Option<&dyn Record> {
        self.as_deref().map(|r| r as &dyn Record)
    }

    fn get_mut(&mut self) -> Option<&mut dyn Record> {
        self.as_deref_mut().map(|r| r as &mut dyn Record)
    }

    fn get_or_insert(&mut self) -> &mut dyn Record {
        &mut **self.get_or_insert_with(Box::default)
    }

    fn set(&mut self, record: Box<dyn Record>) -> Result<(), ScanError> {
        *self = Some(Box::new(downcast::<T>(record)?));
        Ok(())
    }

    fn clear(&mut self) {
        *self = None;
    }
}

/// A field type usable as a relation: `Option<Box<T>>` for to-one
/// relations, `Vec<T>` for to-many ones.
pub trait RelationValue: Send + Sync {
    fn target() -> ModelInfo;

    fn is_many() -> bool;

    fn as_relation_ref(&self) -> RelationRef<'_>;

    fn as_relation_mut(&mut self) -> RelationMut<'_>;
}

impl<T: Model> RelationValue for Option<Box<T>> {
    fn target() -> ModelInfo {
        T::info()
    }

    fn is_many() -> bool {
        false
    }

    fn as_relation_ref(&self) -> RelationRef<'_> {
        RelationRef::One(OneSlot::get(self))
    }

    fn as_relation_mut(&mut self) -> RelationMut<'_> {
        RelationMut::One(self)
    }
}

impl<T: Model> RelationValue for Vec<T> {
    fn target() -> ModelInfo {
        T::info()
    }

    fn is_many() -> bool {
        true
    }

    fn as_relation_ref(&self) -> RelationRef<'_> {
        RelationRef::Many(self)
    }

    fn as_relation_mut(&mut self) -> RelationMut<'_> {
        RelationMut::Many(self)
    }
}

/// Where scanned rows go.
pub enum Destination<'a> {
    /// A single record; only the first row is scanned.
    Record(&'a mut dyn Record),
    /// A list resized to the row count.
    List(&'a mut dyn RecordList),
    /// The first row as a column map.
    Row(&'a mut Row),
    /// Every row as a column map.
    Rows(&'a mut Vec<Row>),
}

/// Classifies a value as a scan destination.
pub trait IntoDestination<'a> {
    fn into_destination(self) -> Destination<'a>;
}

impl<'a, T: Model> IntoDestination<'a> for &'a mut T {
    fn into_destination(self) -> Destination<'a> {
        Destination::Record(self)
    }
}

impl<'a, T: Model> IntoDestination<'a> for &'a mut Vec<T> {
    fn into_destination(self) -> Destination<'a> {
        Destination::List(self)
    }
}

impl<'a> IntoDestination<'a> for &'a mut Row {
    fn into_destination(self) -> Destination<'a> {
        Destination::Row(self)
    }
}

impl<'a> IntoDestination<'a> for &'a mut Vec<Row> {
    fn into_destination(self) -> Destination<'a> {
        Destination::Rows(self)
    }
}
