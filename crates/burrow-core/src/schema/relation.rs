//! Relation metadata and its resolution against the catalog.

use std::fmt;
use std::sync::Arc;

use super::field::Field;
use super::table::{RelationDef, Table};
use crate::dialect::Dialect;
use crate::error::{Result, SchemaError};

/// Kind of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
    ManyToMany,
}

impl RelationKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "belongs-to" => Some(Self::BelongsTo),
            "has-one" => Some(Self::HasOne),
            "has-many" => Some(Self::HasMany),
            _ => None,
        }
    }

    /// Returns true when the relation is loaded with a JOIN in the owning
    /// statement.
    #[must_use]
    pub const fn is_to_one(self) -> bool {
        matches!(self, Self::BelongsTo | Self::HasOne)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BelongsTo => "belongs-to",
            Self::HasOne => "has-one",
            Self::HasMany => "has-many",
            Self::ManyToMany => "m2m",
        })
    }
}

/// Discriminator restricting a polymorphic relation.
#[derive(Debug, Clone)]
pub struct Polymorphic {
    /// Column on the joined table holding the owner type.
    pub field: Arc<Field>,
    /// Value selecting rows owned by the base table.
    pub value: String,
}

/// Bridge table of a many-to-many relation.
#[derive(Debug, Clone)]
pub struct ManyToMany {
    pub table: Arc<Table>,
    /// Bridge columns referencing the base table keys.
    pub base_fields: Vec<Arc<Field>>,
    /// Bridge columns referencing the joined table keys.
    pub join_fields: Vec<Arc<Field>>,
}

/// A resolved relation between two tables.
///
/// `base_fields[i]` on the base table corresponds to `join_fields[i]` on
/// the joined table. For many-to-many relations these are the key columns
/// of both sides and the bridge maps between them.
#[derive(Debug, Clone)]
pub struct Relation {
    pub kind: RelationKind,
    pub name: String,
    /// Index path of the relation field inside the base model.
    pub index: Vec<usize>,
    pub base_table: Arc<Table>,
    pub join_table: Arc<Table>,
    pub base_fields: Vec<Arc<Field>>,
    pub join_fields: Vec<Arc<Field>>,
    pub polymorphic: Option<Polymorphic>,
    pub m2m: Option<ManyToMany>,
}

impl Relation {
    pub(crate) fn resolve(
        dialect: &dyn Dialect,
        base: &Arc<Table>,
        def: &RelationDef,
    ) -> Result<Self> {
        let unresolved =
            |reason: String| SchemaError::unresolved(base.type_name, &def.name, reason);
        let join = dialect.table(def.target)?;

        if let Some(bridge) = def.tag.value("m2m") {
            if !def.many {
                return Err(unresolved("m2m relations need a Vec field".to_string()));
            }
            return Self::resolve_m2m(dialect, base, join, def, bridge);
        }

        let kind = match def.tag.value("rel") {
            Some(rel) => RelationKind::parse(rel).ok_or_else(|| {
                SchemaError::malformed(
                    base.type_name,
                    &def.name,
                    def.raw_tag,
                    format!("unknown relation kind {rel:?}"),
                )
            })?,
            None => return Err(unresolved("missing rel option".to_string())),
        };
        if kind.is_to_one() == def.many {
            return Err(unresolved(format!(
                "{kind} relations need {} field",
                if def.many { "an Option<Box<_>>" } else { "a Vec" }
            )));
        }

        let pairs = join_pairs(base.type_name, def)?;
        let (base_fields, join_fields) = if pairs.is_empty() {
            default_keys(kind, base, &join, &def.name).map_err(&unresolved)?
        } else {
            lookup_pairs(base, &join, &pairs).map_err(&unresolved)?
        };
        if base_fields.is_empty() {
            return Err(unresolved("no join columns".to_string()));
        }

        let polymorphic = if def.tag.has("polymorphic") {
            if kind == RelationKind::BelongsTo {
                return Err(unresolved("belongs-to relations cannot be polymorphic".to_string()));
            }
            Some(polymorphic(base, &join, def, &join_fields).map_err(&unresolved)?)
        } else {
            None
        };

        tracing::trace!(table = base.type_name, relation = %def.name, %kind, "resolved relation");

        Ok(Self {
            kind,
            name: def.name.clone(),
            index: def.index.clone(),
            base_table: Arc::clone(base),
            join_table: join,
            base_fields,
            join_fields,
            polymorphic,
            m2m: None,
        })
    }

    fn resolve_m2m(
        dialect: &dyn Dialect,
        base: &Arc<Table>,
        join: Arc<Table>,
        def: &RelationDef,
        bridge_name: &str,
    ) -> Result<Self> {
        let unresolved =
            |reason: String| SchemaError::unresolved(base.type_name, &def.name, reason);
        let info = dialect
            .registry()
            .tables()
            .by_name(bridge_name)
            .ok_or_else(|| SchemaError::UnregisteredBridge {
                table: base.type_name.to_string(),
                relation: def.name.clone(),
                bridge: bridge_name.to_string(),
            })?;
        let bridge = dialect.table(info)?;
        let bridge_relations = dialect.relations(&bridge)?;

        // `join:base_rel=join_rel` picks bridge relations by name, which
        // self-referencing bridges need.
        let named = join_pairs(base.type_name, def)?;
        let (to_base, to_join) = if let Some((b, j)) = named.first() {
            let by_name = |name: &str| {
                bridge_relations
                    .get(name)
                    .cloned()
                    .ok_or_else(|| {
                        unresolved(format!("bridge {bridge_name} has no relation {name:?}"))
                    })
            };
            (by_name(b)?, by_name(j)?)
        } else {
            let to_base = bridge_relations
                .values()
                .find(|r| r.kind == RelationKind::BelongsTo && r.join_table.info == base.info)
                .cloned()
                .ok_or_else(|| {
                    unresolved(format!("bridge {bridge_name} has no belongs-to {}", base.type_name))
                })?;
            let to_join = bridge_relations
                .values()
                .find(|r| {
                    r.kind == RelationKind::BelongsTo
                        && r.join_table.info == join.info
                        && r.name != to_base.name
                })
                .cloned()
                .ok_or_else(|| {
                    unresolved(format!("bridge {bridge_name} has no belongs-to {}", join.type_name))
                })?;
            (to_base, to_join)
        };

        tracing::trace!(
            table = base.type_name,
            relation = %def.name,
            bridge = bridge_name,
            "resolved m2m relation"
        );

        Ok(Self {
            kind: RelationKind::ManyToMany,
            name: def.name.clone(),
            index: def.index.clone(),
            base_table: Arc::clone(base),
            join_table: join,
            base_fields: to_base.join_fields.clone(),
            join_fields: to_join.join_fields.clone(),
            polymorphic: None,
            m2m: Some(ManyToMany {
                table: bridge,
                base_fields: to_base.base_fields.clone(),
                join_fields: to_join.base_fields.clone(),
            }),
        })
    }

    /// Returns true for belongs-to and has-one relations.
    #[must_use]
    pub fn is_to_one(&self) -> bool {
        self.kind.is_to_one()
    }
}

fn join_pairs(model: &str, def: &RelationDef) -> Result<Vec<(String, String)>> {
    def.tag
        .values("join")
        .map(|pair| {
            pair.split_once('=')
                .map(|(b, j)| (b.trim().to_string(), j.trim().to_string()))
                .ok_or_else(|| {
                    SchemaError::malformed(
                        model,
                        &def.name,
                        def.raw_tag,
                        format!("join {pair:?} must be BASE=JOIN"),
                    )
                })
        })
        .collect()
}

type Keys = (Vec<Arc<Field>>, Vec<Arc<Field>>);

fn default_keys(
    kind: RelationKind,
    base: &Table,
    join: &Table,
    name: &str,
) -> std::result::Result<Keys, String> {
    let mut base_fields = Vec::new();
    let mut join_fields = Vec::new();
    match kind {
        RelationKind::BelongsTo => {
            for pk in &join.pks {
                let column = format!("{name}_{}", pk.name);
                base_fields.push(find(base, &column)?);
                join_fields.push(Arc::clone(pk));
            }
        }
        _ => {
            for pk in &base.pks {
                let column = format!("{}_{}", base.alias, pk.name);
                base_fields.push(Arc::clone(pk));
                join_fields.push(find(join, &column)?);
            }
        }
    }
    Ok((base_fields, join_fields))
}

fn lookup_pairs(
    base: &Table,
    join: &Table,
    pairs: &[(String, String)],
) -> std::result::Result<Keys, String> {
    let mut base_fields = Vec::with_capacity(pairs.len());
    let mut join_fields = Vec::with_capacity(pairs.len());
    for (b, j) in pairs {
        base_fields.push(find(base, b)?);
        join_fields.push(find(join, j)?);
    }
    Ok((base_fields, join_fields))
}

fn find(table: &Table, column: &str) -> std::result::Result<Arc<Field>, String> {
    table
        .field(column)
        .cloned()
        .ok_or_else(|| format!("{} does not have column {column:?}", table.type_name))
}

fn polymorphic(
    base: &Table,
    join: &Table,
    def: &RelationDef,
    join_fields: &[Arc<Field>],
) -> std::result::Result<Polymorphic, String> {
    let key = join_fields
        .last()
        .ok_or_else(|| "polymorphic relation without join columns".to_string())?;
    let prefix = key.name.strip_suffix("id").unwrap_or(&key.name);
    let column = format!("{prefix}type");
    let field = find(join, &column)?;
    let value = def
        .tag
        .value("polymorphic")
        .map_or_else(|| base.alias.clone(), str::to_string);
    Ok(Polymorphic { field, value })
}
