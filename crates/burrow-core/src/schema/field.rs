//! Column metadata.

use crate::dialect::{AppendFn, ScanFn};
use crate::error::ScanError;
use crate::formatter::Formatter;
use crate::schema::Record;
use crate::types::FieldType;
use crate::value::Value;

/// A column of a table, with its codec functions bound.
#[derive(Debug, Clone)]
pub struct Field {
    /// Rust path of the field, dotted through embedded structs.
    pub field_name: String,
    /// Column name.
    pub name: String,
    /// Quoted column name.
    pub sql_name: String,
    /// Index path inside the model.
    pub index: Vec<usize>,
    pub field_type: FieldType,
    pub sql_type: String,
    /// Explicit SQL type from the `type:` option.
    pub user_sql_type: Option<String>,
    pub default: Option<String>,
    pub is_pk: bool,
    pub auto_increment: bool,
    pub null_zero: bool,
    pub not_null: bool,
    pub unique: bool,
    pub scan_only: bool,
    pub soft_delete: bool,
    pub(crate) append: AppendFn,
    pub(crate) scan: ScanFn,
}

impl Field {
    /// Reads the field from a record.
    #[must_use]
    pub fn value(&self, record: &dyn Record) -> Value {
        record.field_value(&self.index)
    }

    /// Returns true when the field holds the zero value of its type.
    #[must_use]
    pub fn has_zero_value(&self, record: &dyn Record) -> bool {
        self.value(record).is_zero()
    }

    /// Appends the field of `record`.
    pub fn append_value(&self, f: &Formatter<'_>, b: &mut String, record: &dyn Record) {
        self.append(f, b, &self.value(record));
    }

    /// Appends a value through this field's codec. Zero values of
    /// `nullzero` fields render as NULL.
    pub fn append(&self, f: &Formatter<'_>, b: &mut String, value: &Value) {
        if self.null_zero && value.is_zero() {
            f.append_with(b, self.append, &Value::Null);
        } else {
            f.append_with(b, self.append, value);
        }
    }

    /// Normalizes a driver value without storing it.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] when the scan function rejects the value.
    pub fn scan(&self, value: Value) -> Result<Value, ScanError> {
        (self.scan)(&self.field_type, value)
    }

    /// Scans a driver value into the field of `record`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] when the value cannot be converted.
    pub fn scan_value(&self, record: &mut dyn Record, value: Value) -> Result<(), ScanError> {
        let value = self.scan(value)?;
        record.set_field(&self.index, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Dialect, SqliteDialect};
    use crate::types::FieldKind;

    fn field(dialect: &dyn Dialect, kind: FieldKind, null_zero: bool) -> Field {
        let field_type = FieldType::new(kind);
        Field {
            field_name: "name".to_string(),
            name: "name".to_string(),
            sql_name: "\"name\"".to_string(),
            index: vec![0],
            sql_type: dialect.sql_type(&field_type),
            append: dialect.appender(&field_type),
            scan: dialect.scanner(&field_type),
            field_type,
            user_sql_type: None,
            default: None,
            is_pk: false,
            auto_increment: false,
            null_zero,
            not_null: false,
            unique: false,
            scan_only: false,
            soft_delete: false,
        }
    }

    #[test]
    fn test_nullzero_renders_null() {
        let dialect = SqliteDialect::new();
        let f = Formatter::new(&dialect);
        let nz = field(&dialect, FieldKind::String, true);
        let mut b = String::new();
        nz.append(&f, &mut b, &Value::Text(String::new()));
        assert_eq!(b, "NULL");

        let plain = field(&dialect, FieldKind::String, false);
        let mut b = String::new();
        plain.append(&f, &mut b, &Value::Text(String::new()));
        assert_eq!(b, "''");
    }

    #[test]
    fn test_scan_normalizes() {
        let dialect = SqliteDialect::new();
        let emails = field(&dialect, FieldKind::Array(Box::new(FieldKind::String)), false);
        assert_eq!(
            emails.scan(Value::Text(r#"["a@b"]"#.into())),
            Ok(Value::Array(vec![Value::Text("a@b".into())]))
        );
    }
}
