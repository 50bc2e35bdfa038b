//! The per-dialect schema catalog.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;

use super::record::ModelInfo;
use super::relation::Relation;
use super::table::Table;
use crate::dialect::Dialect;
use crate::error::Result;

/// Relations of one table keyed by name, in declaration order.
pub type Relations = IndexMap<String, Arc<Relation>>;

/// Memo of tables and relations keyed by model type.
///
/// Tables are built without looking at relation targets, and relations are
/// resolved in a second, separate step. Cyclic model graphs therefore
/// terminate: by the time a relation refers back to its own table, that
/// table is already published. Published entries are never replaced.
#[derive(Default)]
pub struct Tables {
    tables: RwLock<HashMap<TypeId, Arc<Table>>>,
    by_name: RwLock<HashMap<String, ModelInfo>>,
    relations: RwLock<HashMap<TypeId, Arc<Relations>>>,
}

impl Tables {
    /// Returns the table of `info`, building it on a miss.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`](crate::SchemaError) when the model
    /// definition is invalid. Failures are not cached.
    pub fn get(&self, dialect: &dyn Dialect, info: ModelInfo) -> Result<Arc<Table>> {
        if let Some(table) = self.read_table(info.type_id) {
            return Ok(table);
        }
        let table = Arc::new(Table::build(dialect, info)?);
        let table = Arc::clone(
            self.tables
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(info.type_id)
                .or_insert(table),
        );
        self.by_name
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(table.name.clone())
            .or_insert(info);
        Ok(table)
    }

    /// Builds the table of `info` ahead of use.
    ///
    /// Many-to-many relations find their bridge table by name, so bridge
    /// models must be registered before the relation is loaded.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`](crate::SchemaError) when the model
    /// definition is invalid.
    pub fn register(&self, dialect: &dyn Dialect, info: ModelInfo) -> Result<Arc<Table>> {
        let table = self.get(dialect, info)?;
        tracing::trace!(table = %table.name, "registered model");
        Ok(table)
    }

    /// Looks up a built table by its SQL name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<ModelInfo> {
        self.by_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    /// Returns the resolved relations of `table`.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`](crate::SchemaError) when any declared
    /// relation cannot be resolved.
    pub fn relations(&self, dialect: &dyn Dialect, table: &Arc<Table>) -> Result<Arc<Relations>> {
        let key = table.info.type_id;
        if let Some(relations) = self
            .relations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(relations));
        }

        let mut relations = Relations::with_capacity(table.relation_defs.len());
        for def in &table.relation_defs {
            let relation = Relation::resolve(dialect, table, def)?;
            relations.insert(def.name.clone(), Arc::new(relation));
        }
        Ok(Arc::clone(
            self.relations
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(key)
                .or_insert_with(|| Arc::new(relations)),
        ))
    }

    /// Number of tables built so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_table(&self, key: TypeId) -> Option<Arc<Table>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }
}

impl fmt::Debug for Tables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&str> = tables.values().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("Tables").field("tables", &names).finish()
    }
}
