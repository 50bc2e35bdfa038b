//! Error types for schema resolution, value scanning and query building.

use thiserror::Error;

/// Errors raised while deriving table metadata from a model definition.
///
/// Schema errors are deterministic: resolving the same model again yields
/// the same error, so callers should never retry them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A struct or field tag could not be parsed.
    #[error("malformed tag on {model}.{field}: {reason} (tag: {tag:?})")]
    MalformedTag {
        /// Model type name.
        model: String,
        /// Field name, or `*` for the struct-level tag.
        field: String,
        /// The raw tag text.
        tag: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Two fields map to the same SQL column.
    #[error("{table} has more than one field mapped to column {column:?}")]
    DuplicateColumn { table: String, column: String },

    /// The requested relation is not declared on the table.
    #[error("{table} does not have relation {relation:?}")]
    UnknownRelation { table: String, relation: String },

    /// A declared relation cannot be resolved against its target.
    #[error("relation {table}.{relation} cannot be resolved: {reason}")]
    UnresolvedRelation {
        table: String,
        relation: String,
        reason: String,
    },

    /// An operation needs a primary key but the table declares none.
    #[error("{table} does not have primary keys")]
    MissingPrimaryKey { table: String },

    /// The soft-delete marker is not a nullable timestamp.
    #[error("soft-delete marker {table}.{field} must be a nullable timestamp")]
    InvalidSoftDelete { table: String, field: String },

    /// A many-to-many bridge table was never registered.
    #[error("m2m bridge table {bridge:?} used by {table}.{relation} is not registered")]
    UnregisteredBridge {
        table: String,
        relation: String,
        bridge: String,
    },

    /// An embedded struct embeds itself, directly or indirectly.
    #[error("{model} embeds itself through field {field}")]
    RecursiveEmbed { model: String, field: String },
}

impl SchemaError {
    pub(crate) fn malformed(
        model: &str,
        field: &str,
        tag: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedTag {
            model: model.to_string(),
            field: field.to_string(),
            tag: tag.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unresolved(table: &str, relation: &str, reason: impl Into<String>) -> Self {
        Self::UnresolvedRelation {
            table: table.to_string(),
            relation: relation.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while converting a driver value into a field value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// The driver value has a type the target cannot represent.
    #[error("cannot scan {found} into {target}")]
    Incompatible {
        target: &'static str,
        found: &'static str,
    },

    /// A numeric value does not fit the narrower target type.
    #[error("value {value} is out of range for {target}")]
    OutOfRange { target: &'static str, value: String },

    /// A text value could not be parsed into the target type.
    #[error("cannot parse {input:?} as {target}: {reason}")]
    Parse {
        target: &'static str,
        input: String,
        reason: String,
    },

    /// The generated accessor has no field at the given index path.
    #[error("{model} has no field at index {index:?}")]
    UnknownField {
        model: &'static str,
        index: Vec<usize>,
    },

    /// A related record had an unexpected concrete type.
    #[error("expected a {expected} record, got {found}")]
    WrongRecordType {
        expected: &'static str,
        found: &'static str,
    },
}

/// Structural errors found while rendering a statement, before any SQL is
/// sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// UPDATE or DELETE without WHERE and without a primary-key predicate.
    #[error("{statement} queries require at least one WHERE predicate or where_pk()")]
    UnsafeMutation { statement: &'static str },

    /// The statement needs a table and none was given.
    #[error("{statement} query has no table; use model(), model_type() or table()")]
    MissingTable { statement: &'static str },

    /// Single-column statements were given the wrong number of columns.
    #[error("{statement} query requires exactly one column, got {count}")]
    ColumnCount {
        statement: &'static str,
        count: usize,
    },

    /// A query fragment has more `?` markers than arguments.
    #[error("not enough arguments for {query:?}: {given} given")]
    MissingArgument { query: String, given: usize },

    /// A `?Name` argument has no meaning in the current context.
    #[error("unknown named argument ?{name} in {query:?}")]
    UnknownNamedArgument { query: String, name: String },

    /// A column name does not exist on the bound table.
    #[error("{table} does not have column {column:?}")]
    UnknownColumn { table: String, column: String },

    /// The destination cannot be used for this statement.
    #[error("{statement} query: {reason}")]
    Unsupported {
        statement: &'static str,
        reason: String,
    },
}

/// Result alias for catalog operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
