//! Schema catalog: tables, fields and relations derived from models.

mod field;
mod record;
mod relation;
mod table;
mod tables;
mod tag;

pub use field::Field;
pub use record::{
    Destination, FieldDef, FieldDefKind, HookError, IntoDestination, Model, ModelDef, ModelInfo,
    OneSlot, Record, RecordList, RelationMut, RelationRef, RelationValue, ScanHooks,
};
pub use relation::{ManyToMany, Polymorphic, Relation, RelationKind};
pub use table::Table;
pub use tables::{Relations, Tables};
pub use tag::Tag;
