//! Decoded SQL values and conversions to and from Rust field types.
//!
//! A [`Value`] is what a field holds once it leaves the struct: the append
//! functions of a dialect render it as SQL text, and the scan functions turn
//! driver output back into one before [`FromValue`] narrows it into the
//! field's own type.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ScanError;

/// A decoded SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Unsigned integer value that may not fit an `i64`.
    UInt(u64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary value.
    Bytes(Vec<u8>),
    /// Point in time, always normalized to UTC.
    Timestamp(DateTime<Utc>),
    /// Homogeneous collection, rendered as an array or JSON literal.
    Array(Vec<Value>),
    /// Arbitrary JSON document.
    Json(serde_json::Value),
}

impl Value {
    /// Short name of the variant, used in error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Timestamp(_) => "timestamp",
            Self::Array(_) => "array",
            Self::Json(_) => "json",
        }
    }

    /// Returns true for NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true when the value equals the zero value of its kind.
    ///
    /// Used by `nullzero` fields and by zero-skipping inserts and updates.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(b) => !b,
            Self::Int(n) => *n == 0,
            Self::UInt(n) => *n == 0,
            Self::Float(f) => *f == 0.0,
            Self::Text(s) => s.is_empty(),
            Self::Bytes(b) => b.is_empty(),
            Self::Timestamp(t) => *t == DateTime::<Utc>::default(),
            Self::Array(a) => a.is_empty(),
            Self::Json(j) => j.is_null(),
        }
    }

    fn to_i128(&self, target: &'static str) -> Result<i128, ScanError> {
        match self {
            Self::Null => Ok(0),
            Self::Bool(b) => Ok(i128::from(*b)),
            Self::Int(n) => Ok(i128::from(*n)),
            Self::UInt(n) => Ok(i128::from(*n)),
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(f) if f.is_finite() && f.fract() == 0.0 => Ok(*f as i128),
            Self::Float(f) => Err(ScanError::OutOfRange {
                target,
                value: f.to_string(),
            }),
            Self::Text(s) => s.trim().parse::<i128>().map_err(|e| ScanError::Parse {
                target,
                input: s.clone(),
                reason: e.to_string(),
            }),
            other => Err(ScanError::Incompatible {
                target,
                found: other.kind_name(),
            }),
        }
    }

    fn to_f64(&self, target: &'static str) -> Result<f64, ScanError> {
        match self {
            Self::Null => Ok(0.0),
            Self::Float(f) => Ok(*f),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(n) => Ok(*n as f64),
            #[allow(clippy::cast_precision_loss)]
            Self::UInt(n) => Ok(*n as f64),
            Self::Text(s) => s.trim().parse::<f64>().map_err(|e| ScanError::Parse {
                target,
                input: s.clone(),
                reason: e.to_string(),
            }),
            other => Err(ScanError::Incompatible {
                target,
                found: other.kind_name(),
            }),
        }
    }
}

/// A result row as an ordered column map.
pub type Row = IndexMap<String, Value>;

/// Converts a field into a [`Value`].
pub trait ToValue {
    /// Returns the decoded value of `self`.
    fn to_value(&self) -> Value;
}

/// Converts a scanned [`Value`] into a field type.
///
/// NULL converts to the zero value of non-optional types.
pub trait FromValue: Sized {
    /// Converts `value`, narrowing numbers with a range check.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] when the value cannot be represented.
    fn from_value(value: Value) -> Result<Self, ScanError>;
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        Ok(value)
    }
}

macro_rules! impl_signed {
    ($($ty:ty),*) => {$(
        impl ToValue for $ty {
            fn to_value(&self) -> Value {
                Value::Int(i64::from(*self))
            }
        }

        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self, ScanError> {
                let n = value.to_i128(stringify!($ty))?;
                <$ty>::try_from(n).map_err(|_| ScanError::OutOfRange {
                    target: stringify!($ty),
                    value: n.to_string(),
                })
            }
        }
    )*};
}

macro_rules! impl_unsigned {
    ($($ty:ty),*) => {$(
        impl ToValue for $ty {
            fn to_value(&self) -> Value {
                Value::UInt(u64::from(*self))
            }
        }

        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self, ScanError> {
                let n = value.to_i128(stringify!($ty))?;
                <$ty>::try_from(n).map_err(|_| ScanError::OutOfRange {
                    target: stringify!($ty),
                    value: n.to_string(),
                })
            }
        }
    )*};
}

impl_signed!(i8, i16, i32, i64);
impl_unsigned!(u8, u16, u32, u64);

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        value.to_f64("f64")
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }
}

impl FromValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: Value) -> Result<Self, ScanError> {
        value.to_f64("f32").map(|f| f as Self)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(b),
            Value::Int(n) => Ok(n != 0),
            Value::UInt(n) => Ok(n != 0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "1" | "y" | "yes" | "on" => Ok(true),
                "f" | "false" | "0" | "n" | "no" | "off" | "" => Ok(false),
                _ => Err(ScanError::Parse {
                    target: "bool",
                    input: s,
                    reason: "not a boolean literal".to_string(),
                }),
            },
            other => Err(ScanError::Incompatible {
                target: "bool",
                found: other.kind_name(),
            }),
        }
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Text(s) => Ok(s),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Int(n) => Ok(n.to_string()),
            Value::UInt(n) => Ok(n.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Timestamp(t) => Ok(t.to_rfc3339()),
            Value::Json(j) => Ok(j.to_string()),
            Value::Bytes(b) => Self::from_utf8(b).map_err(|e| ScanError::Parse {
                target: "String",
                input: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                reason: e.to_string(),
            }),
            Value::Array(_) => Err(ScanError::Incompatible {
                target: "String",
                found: "array",
            }),
        }
    }
}

impl ToValue for [u8] {
    fn to_value(&self) -> Value {
        Value::Bytes(self.to_vec())
    }
}

impl ToValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Bytes(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            other => Err(ScanError::Incompatible {
                target: "Vec<u8>",
                found: other.kind_name(),
            }),
        }
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Timestamp(t) => Ok(t),
            Value::Text(s) => parse_timestamp(&s),
            Value::Int(secs) => Utc.timestamp_opt(secs, 0).single().ok_or(ScanError::OutOfRange {
                target: "DateTime<Utc>",
                value: secs.to_string(),
            }),
            other => Err(ScanError::Incompatible {
                target: "DateTime<Utc>",
                found: other.kind_name(),
            }),
        }
    }
}

/// Parses the timestamp text forms produced by the supported backends.
///
/// # Errors
///
/// Returns [`ScanError::Parse`] when no known format matches.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, ScanError> {
    let s = input.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"] {
        if let Ok(t) = DateTime::parse_from_str(s, fmt) {
            return Ok(t.with_timezone(&Utc));
        }
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(t.and_utc());
        }
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d.and_time(chrono::NaiveTime::default()).and_utc());
    }
    Err(ScanError::Parse {
        target: "DateTime<Utc>",
        input: input.to_string(),
        reason: "unrecognized timestamp format".to_string(),
    })
}

impl ToValue for serde_json::Value {
    fn to_value(&self) -> Value {
        Value::Json(self.clone())
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Json(j) => Ok(j),
            Value::Text(s) => serde_json::from_str(&s).map_err(|e| ScanError::Parse {
                target: "json",
                input: s,
                reason: e.to_string(),
            }),
            Value::Bytes(b) => serde_json::from_slice(&b).map_err(|e| ScanError::Parse {
                target: "json",
                input: String::from_utf8_lossy(&b).into_owned(),
                reason: e.to_string(),
            }),
            other => Ok(value_to_json(&other)),
        }
    }
}

/// Converts a decoded value into a JSON document.
#[must_use]
pub fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as J;
    match value {
        Value::Null => J::Null,
        Value::Bool(b) => J::Bool(*b),
        Value::Int(n) => J::from(*n),
        Value::UInt(n) => J::from(*n),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(J::Null, J::Number),
        Value::Text(s) => J::String(s.clone()),
        Value::Bytes(b) => J::String(String::from_utf8_lossy(b).into_owned()),
        Value::Timestamp(t) => J::String(t.to_rfc3339()),
        Value::Array(items) => J::Array(items.iter().map(value_to_json).collect()),
        Value::Json(j) => j.clone(),
    }
}

/// Converts a JSON document into a decoded value.
#[must_use]
pub fn json_to_value(json: serde_json::Value) -> Value {
    use serde_json::Value as J;
    match json {
        J::Null => Value::Null,
        J::Bool(b) => Value::Bool(b),
        J::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_u64().map(Value::UInt))
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        J::String(s) => Value::Text(s),
        J::Array(items) => Value::Array(items.into_iter().map(json_to_value).collect()),
        obj @ J::Object(_) => Value::Json(obj),
    }
}

macro_rules! impl_array {
    ($($ty:ty),*) => {$(
        impl ToValue for Vec<$ty> {
            fn to_value(&self) -> Value {
                Value::Array(self.iter().map(ToValue::to_value).collect())
            }
        }

        impl FromValue for Vec<$ty> {
            fn from_value(value: Value) -> Result<Self, ScanError> {
                match value {
                    Value::Null => Ok(Self::new()),
                    Value::Array(items) => items.into_iter().map(<$ty>::from_value).collect(),
                    Value::Json(serde_json::Value::Array(items)) => items
                        .into_iter()
                        .map(|item| <$ty>::from_value(json_to_value(item)))
                        .collect(),
                    other => Err(ScanError::Incompatible {
                        target: concat!("Vec<", stringify!($ty), ">"),
                        found: other.kind_name(),
                    }),
                }
            }
        }
    )*};
}

impl_array!(String, i16, i32, i64, f32, f64, bool);

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, ToValue::to_value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Stores any serde-compatible type as a JSON column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize> ToValue for Json<T> {
    fn to_value(&self) -> Value {
        match serde_json::to_value(&self.0) {
            Ok(json) => Value::Json(json),
            Err(err) => {
                tracing::warn!(error = %err, "value cannot be encoded as JSON, storing NULL");
                Value::Null
            }
        }
    }
}

impl<T: DeserializeOwned + Default> FromValue for Json<T> {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        let json = match value {
            Value::Null => return Ok(Self(T::default())),
            other => serde_json::Value::from_value(other)?,
        };
        if json.is_null() {
            return Ok(Self(T::default()));
        }
        serde_json::from_value(json.clone())
            .map(Json)
            .map_err(|e| ScanError::Parse {
                target: std::any::type_name::<T>(),
                input: json.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Hashable identity of a decoded value.
///
/// Two values get the same key when they decode to the same thing, no
/// matter how they were produced: `Int(1)` and `UInt(1)` are equal,
/// `-0.0` and `0.0` are equal, timestamps compare by instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Null,
    Bool(bool),
    Int(i128),
    Float(u64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(i64, u32),
    Array(Vec<ValueKey>),
    Json(String),
}

impl From<&Value> for ValueKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(n) => Self::Int(i128::from(*n)),
            Value::UInt(n) => Self::Int(i128::from(*n)),
            Value::Float(f) => Self::Float(normalize_float(*f).to_bits()),
            Value::Text(s) => Self::Text(s.clone()),
            Value::Bytes(b) => Self::Bytes(b.clone()),
            Value::Timestamp(t) => Self::Timestamp(t.timestamp(), t.timestamp_subsec_nanos()),
            Value::Array(items) => Self::Array(items.iter().map(Self::from).collect()),
            Value::Json(j) => Self::Json(j.to_string()),
        }
    }
}

fn normalize_float(f: f64) -> f64 {
    if f == 0.0 {
        0.0
    } else if f.is_nan() {
        f64::NAN
    } else {
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_narrowing() {
        assert_eq!(i8::from_value(Value::Int(-5)), Ok(-5));
        assert!(matches!(
            i8::from_value(Value::Int(300)),
            Err(ScanError::OutOfRange { target: "i8", .. })
        ));
        assert!(matches!(
            u32::from_value(Value::Int(-1)),
            Err(ScanError::OutOfRange { target: "u32", .. })
        ));
        assert_eq!(u64::from_value(Value::UInt(u64::MAX)), Ok(u64::MAX));
        assert_eq!(i64::from_value(Value::Text(" 42 ".into())), Ok(42));
        assert_eq!(i32::from_value(Value::Float(7.0)), Ok(7));
    }

    #[test]
    fn test_null_scans_to_zero_value() {
        assert_eq!(i64::from_value(Value::Null), Ok(0));
        assert_eq!(String::from_value(Value::Null), Ok(String::new()));
        assert_eq!(bool::from_value(Value::Null), Ok(false));
        assert_eq!(Vec::<String>::from_value(Value::Null), Ok(Vec::new()));
        assert_eq!(Option::<i64>::from_value(Value::Null), Ok(None));
    }

    #[test]
    fn test_bool_from_text_and_int() {
        assert_eq!(bool::from_value(Value::Text("t".into())), Ok(true));
        assert_eq!(bool::from_value(Value::Int(0)), Ok(false));
        assert!(bool::from_value(Value::Text("maybe".into())).is_err());
    }

    #[test]
    fn test_incompatible_value() {
        let err = i64::from_value(Value::Bytes(vec![1])).unwrap_err();
        assert_eq!(err.to_string(), "cannot scan bytes into i64");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        for input in [
            "2024-03-01 12:30:00+00:00",
            "2024-03-01 12:30:00.000000+00:00",
            "2024-03-01 14:30:00+02:00",
            "2024-03-01T12:30:00Z",
            "2024-03-01 12:30:00",
        ] {
            assert_eq!(parse_timestamp(input), Ok(expected), "{input}");
        }
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_array_from_json() {
        let value = Value::Json(serde_json::json!(["a", "b"]));
        assert_eq!(
            Vec::<String>::from_value(value),
            Ok(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_json_wrapper() {
        let value = Json(vec![1, 2, 3]).to_value();
        assert_eq!(value, Value::Json(serde_json::json!([1, 2, 3])));
        let back = Json::<Vec<i32>>::from_value(Value::Text("[4,5]".into())).unwrap();
        assert_eq!(back.0, vec![4, 5]);
    }

    #[test]
    fn test_value_key_decoded_equality() {
        assert_eq!(ValueKey::from(&Value::Int(1)), ValueKey::from(&Value::UInt(1)));
        assert_eq!(
            ValueKey::from(&Value::Float(-0.0)),
            ValueKey::from(&Value::Float(0.0))
        );
        assert_ne!(
            ValueKey::from(&Value::Int(1)),
            ValueKey::from(&Value::Text("1".into()))
        );
    }

    #[test]
    fn test_is_zero() {
        assert!(Value::Int(0).is_zero());
        assert!(Value::Text(String::new()).is_zero());
        assert!(Value::Timestamp(DateTime::<Utc>::default()).is_zero());
        assert!(!Value::Bool(true).is_zero());
    }
}
