//! Table metadata derived from a model definition.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use heck::ToSnakeCase;

use super::field::Field;
use super::record::{FieldDefKind, ModelInfo};
use super::tag::Tag;
use crate::dialect::Dialect;
use crate::error::{Result, SchemaError};
use crate::types::{FieldKind, FieldType};

const STRUCT_OPTIONS: &[&str] = &["table", "alias", "select"];

const COLUMN_OPTIONS: &[&str] = &[
    "pk",
    "autoincrement",
    "nullzero",
    "notnull",
    "unique",
    "default",
    "type",
    "soft_delete",
    "scanonly",
];

const RELATION_OPTIONS: &[&str] = &["rel", "join", "polymorphic", "m2m"];

const EMBED_OPTIONS: &[&str] = &["embed"];

/// A relation field as declared, resolved lazily by the catalog.
#[derive(Debug, Clone)]
pub(crate) struct RelationDef {
    pub name: String,
    pub index: Vec<usize>,
    pub target: ModelInfo,
    pub many: bool,
    pub tag: Tag,
    pub raw_tag: &'static str,
}

/// Catalog metadata for one model type.
///
/// Built once per dialect and never mutated afterwards.
#[derive(Debug)]
pub struct Table {
    pub info: ModelInfo,
    /// Model name as declared.
    pub type_name: &'static str,
    /// Table name.
    pub name: String,
    /// Quoted table name.
    pub sql_name: String,
    /// Quoted name used in FROM clauses of SELECT statements, which may
    /// differ from `sql_name` when `select:` names a view.
    pub sql_name_for_select: String,
    /// Default alias.
    pub alias: String,
    /// Quoted default alias.
    pub sql_alias: String,
    /// Selectable columns in declaration order.
    pub fields: Vec<Arc<Field>>,
    pub pks: Vec<Arc<Field>>,
    /// Selectable columns that are not part of the primary key.
    pub data_fields: Vec<Arc<Field>>,
    pub soft_delete_field: Option<Arc<Field>>,
    field_map: HashMap<String, Arc<Field>>,
    pub(crate) relation_defs: Vec<RelationDef>,
}

impl Table {
    /// Builds the table of `info` for `dialect`.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] for malformed tags, duplicate columns,
    /// recursive embedding and invalid soft-delete markers.
    pub fn build(dialect: &dyn Dialect, info: ModelInfo) -> Result<Self> {
        let def = (info.definition)();
        let tag =
            Tag::parse(def.tag).map_err(|e| SchemaError::malformed(def.name, "*", def.tag, e))?;
        if let Some(option) = tag.unknown_option(STRUCT_OPTIONS) {
            return Err(SchemaError::malformed(
                def.name,
                "*",
                def.tag,
                format!("unknown option {option:?}"),
            ));
        }

        let snake = def.name.to_snake_case();
        let name = tag
            .value("table")
            .map(str::to_string)
            .or_else(|| tag.name.clone())
            .unwrap_or_else(|| pluralizer::pluralize(&snake, 2, false));
        let alias = tag.value("alias").map_or(snake, str::to_string);
        let select = tag.value("select").map(str::to_string);

        let mut builder = Builder {
            dialect,
            model: def.name,
            fields: Vec::new(),
            relation_defs: Vec::new(),
            stack: vec![info.type_id],
        };
        builder.collect(info, &[], "", "")?;
        let Builder {
            mut fields,
            relation_defs,
            ..
        } = builder;

        if !fields.iter().any(|f| f.is_pk) {
            if let Some(id) = fields
                .iter_mut()
                .find(|f| f.name == "id" && f.field_type.kind.is_integer())
            {
                id.is_pk = true;
                id.auto_increment = true;
                id.not_null = true;
            }
        }

        let mut field_map = HashMap::with_capacity(fields.len());
        let mut soft_delete_field = None;
        let fields: Vec<Arc<Field>> = fields.into_iter().map(Arc::new).collect();
        for field in &fields {
            if field_map.insert(field.name.clone(), Arc::clone(field)).is_some() {
                return Err(SchemaError::DuplicateColumn {
                    table: name,
                    column: field.name.clone(),
                });
            }
            if field.soft_delete {
                let nullable = field.field_type.nullable || field.null_zero;
                if field.field_type.kind != FieldKind::Timestamp || !nullable {
                    return Err(SchemaError::InvalidSoftDelete {
                        table: name,
                        field: field.field_name.clone(),
                    });
                }
                soft_delete_field = Some(Arc::clone(field));
            }
        }

        let selectable: Vec<Arc<Field>> = fields.iter().filter(|f| !f.scan_only).cloned().collect();
        let pks = selectable.iter().filter(|f| f.is_pk).cloned().collect();
        let data_fields = selectable.iter().filter(|f| !f.is_pk).cloned().collect();

        tracing::trace!(
            model = def.name,
            table = %name,
            columns = selectable.len(),
            relations = relation_defs.len(),
            dialect = dialect.name(),
            "built table"
        );

        Ok(Self {
            info,
            type_name: def.name,
            sql_name: dialect.quote_identifier(&name),
            sql_name_for_select: dialect.quote_identifier(select.as_deref().unwrap_or(&name)),
            sql_alias: dialect.quote_identifier(&alias),
            name,
            alias,
            fields: selectable,
            pks,
            data_fields,
            soft_delete_field,
            field_map,
            relation_defs,
        })
    }

    /// Looks up a column by name, including scan-only columns.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Arc<Field>> {
        self.field_map.get(name)
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field_map.contains_key(name)
    }

    /// Fails unless the table declares a primary key.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingPrimaryKey`].
    pub fn check_pks(&self) -> Result<()> {
        if self.pks.is_empty() {
            return Err(SchemaError::MissingPrimaryKey {
                table: self.type_name.to_string(),
            });
        }
        Ok(())
    }

    /// Names of the declared relations, in declaration order.
    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relation_defs.iter().map(|r| r.name.as_str())
    }

    /// Returns true when the table has a soft-delete marker.
    #[must_use]
    pub const fn has_soft_delete(&self) -> bool {
        self.soft_delete_field.is_some()
    }
}

struct Builder<'a> {
    dialect: &'a dyn Dialect,
    model: &'static str,
    fields: Vec<Field>,
    relation_defs: Vec<RelationDef>,
    stack: Vec<TypeId>,
}

impl Builder<'_> {
    fn collect(
        &mut self,
        info: ModelInfo,
        index: &[usize],
        prefix: &str,
        path: &str,
    ) -> Result<()> {
        let def = (info.definition)();
        let model = self.model;
        for (i, field) in def.fields.iter().enumerate() {
            let mut index = index.to_vec();
            index.push(i);
            let field_name = format!("{path}{}", field.name);
            let malformed =
                |reason: String| SchemaError::malformed(model, &field_name, field.tag, reason);
            let tag = Tag::parse(field.tag).map_err(&malformed)?;

            match &field.kind {
                FieldDefKind::Column(ty) => {
                    if let Some(option) = tag.unknown_option(COLUMN_OPTIONS) {
                        return Err(malformed(format!("unknown column option {option:?}")));
                    }
                    let column = tag.name.clone().unwrap_or_else(|| field.name.to_snake_case());
                    let column =
                        self.column(ty, &tag, format!("{prefix}{column}"), field_name, index);
                    self.fields.push(column);
                }
                FieldDefKind::Relation { target, many } => {
                    if let Some(option) = tag.unknown_option(RELATION_OPTIONS) {
                        return Err(malformed(format!("unknown relation option {option:?}")));
                    }
                    self.relation_defs.push(RelationDef {
                        name: tag.name.clone().unwrap_or_else(|| field.name.to_snake_case()),
                        index,
                        target: *target,
                        many: *many,
                        tag,
                        raw_tag: field.tag,
                    });
                }
                FieldDefKind::Embed(inner) => {
                    if let Some(option) = tag.unknown_option(EMBED_OPTIONS) {
                        return Err(malformed(format!("unknown embed option {option:?}")));
                    }
                    if self.stack.contains(&inner.type_id) {
                        return Err(SchemaError::RecursiveEmbed {
                            model: model.to_string(),
                            field: field_name,
                        });
                    }
                    let inner_prefix =
                        format!("{prefix}{}", tag.value("embed").unwrap_or_default());
                    self.stack.push(inner.type_id);
                    self.collect(*inner, &index, &inner_prefix, &format!("{field_name}."))?;
                    self.stack.pop();
                }
            }
        }
        Ok(())
    }

    fn column(
        &self,
        ty: &FieldType,
        tag: &Tag,
        name: String,
        field_name: String,
        index: Vec<usize>,
    ) -> Field {
        let is_pk = tag.has("pk");
        let user_sql_type = tag.value("type").map(str::to_string);
        Field {
            sql_name: self.dialect.quote_identifier(&name),
            sql_type: user_sql_type
                .clone()
                .unwrap_or_else(|| self.dialect.sql_type(ty)),
            append: self.dialect.appender(ty),
            scan: self.dialect.scanner(ty),
            field_type: ty.clone(),
            user_sql_type,
            default: tag.value("default").map(str::to_string),
            is_pk,
            auto_increment: tag.has("autoincrement"),
            null_zero: tag.has("nullzero"),
            not_null: is_pk || tag.has("notnull"),
            unique: tag.has("unique"),
            scan_only: tag.has("scanonly"),
            soft_delete: tag.has("soft_delete"),
            field_name,
            name,
            index,
        }
    }
}
