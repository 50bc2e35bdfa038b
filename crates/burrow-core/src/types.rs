//! Type descriptors for model fields.
//!
//! A [`FieldType`] is the identity under which the dialect resolves and
//! memoizes SQL types and append/scan functions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::value::{FromValue, Json, ToValue};

/// Kind of a field's Rust type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    Bytes,
    Timestamp,
    Json,
    /// Collection of the inner kind.
    Array(Box<FieldKind>),
    /// User type identified by name, resolved through dialect overrides.
    Custom(&'static str),
}

impl FieldKind {
    /// Returns true for every integer width.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::UInt8
                | Self::UInt16
                | Self::UInt32
                | Self::UInt64
        )
    }

    /// Parses the names accepted in configuration files.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "bool" => Self::Bool,
            "i8" | "int8" => Self::Int8,
            "i16" | "int16" => Self::Int16,
            "i32" | "int32" => Self::Int32,
            "i64" | "int64" => Self::Int64,
            "u8" | "uint8" => Self::UInt8,
            "u16" | "uint16" => Self::UInt16,
            "u32" | "uint32" => Self::UInt32,
            "u64" | "uint64" => Self::UInt64,
            "f32" | "float32" => Self::Float32,
            "f64" | "float64" => Self::Float64,
            "string" => Self::String,
            "bytes" => Self::Bytes,
            "timestamp" => Self::Timestamp,
            "json" => Self::Json,
            _ => {
                let inner = name.strip_prefix("array:")?;
                return Self::from_name(inner).map(|k| Self::Array(Box::new(k)));
            }
        };
        Some(kind)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array(inner) => write!(f, "array:{inner}"),
            Self::Custom(name) => f.write_str(name),
            other => {
                let name = match other {
                    Self::Bool => "bool",
                    Self::Int8 => "int8",
                    Self::Int16 => "int16",
                    Self::Int32 => "int32",
                    Self::Int64 => "int64",
                    Self::UInt8 => "uint8",
                    Self::UInt16 => "uint16",
                    Self::UInt32 => "uint32",
                    Self::UInt64 => "uint64",
                    Self::Float32 => "float32",
                    Self::Float64 => "float64",
                    Self::String => "string",
                    Self::Bytes => "bytes",
                    Self::Timestamp => "timestamp",
                    _ => "json",
                };
                f.write_str(name)
            }
        }
    }
}

/// Kind plus nullability of a field type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub kind: FieldKind,
    pub nullable: bool,
}

impl FieldType {
    /// Creates a non-nullable field type.
    #[must_use]
    pub const fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    /// Returns the same type marked nullable.
    #[must_use]
    pub fn into_nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }
}

/// A Rust type that can be stored in a column.
///
/// Implemented for primitives, strings, bytes, timestamps, JSON and a few
/// collections. Implement it for a newtype with [`FieldKind::Custom`] and
/// register dialect overrides to give it its own encoding.
pub trait SqlType: ToValue + FromValue {
    /// Describes the type for SQL type discovery and codec resolution.
    fn field_type() -> FieldType;
}

macro_rules! impl_sql_type {
    ($($ty:ty => $kind:expr),* $(,)?) => {$(
        impl SqlType for $ty {
            fn field_type() -> FieldType {
                FieldType::new($kind)
            }
        }
    )*};
}

impl_sql_type! {
    bool => FieldKind::Bool,
    i8 => FieldKind::Int8,
    i16 => FieldKind::Int16,
    i32 => FieldKind::Int32,
    i64 => FieldKind::Int64,
    u8 => FieldKind::UInt8,
    u16 => FieldKind::UInt16,
    u32 => FieldKind::UInt32,
    u64 => FieldKind::UInt64,
    f32 => FieldKind::Float32,
    f64 => FieldKind::Float64,
    String => FieldKind::String,
    Vec<u8> => FieldKind::Bytes,
    DateTime<Utc> => FieldKind::Timestamp,
    serde_json::Value => FieldKind::Json,
    Vec<String> => FieldKind::Array(Box::new(FieldKind::String)),
    Vec<i16> => FieldKind::Array(Box::new(FieldKind::Int16)),
    Vec<i32> => FieldKind::Array(Box::new(FieldKind::Int32)),
    Vec<i64> => FieldKind::Array(Box::new(FieldKind::Int64)),
    Vec<f32> => FieldKind::Array(Box::new(FieldKind::Float32)),
    Vec<f64> => FieldKind::Array(Box::new(FieldKind::Float64)),
    Vec<bool> => FieldKind::Array(Box::new(FieldKind::Bool)),
}

impl<T: SqlType> SqlType for Option<T> {
    fn field_type() -> FieldType {
        T::field_type().into_nullable()
    }
}

impl<T: Serialize + DeserializeOwned + Default> SqlType for Json<T> {
    fn field_type() -> FieldType {
        FieldType::new(FieldKind::Json)
    }
}
