//! Scan functions: normalize driver values for a field kind.
//!
//! Drivers hand back whatever the backend stores (SQLite returns JSON
//! arrays as text, PostgreSQL returns arrays in their text form). A scan
//! function turns that into the [`Value`] shape the field's
//! [`FromValue`](crate::value::FromValue) impl expects; numeric narrowing and
//! NULL handling happen there.

use crate::error::ScanError;
use crate::types::{FieldKind, FieldType};
use crate::value::{json_to_value, parse_timestamp, Value};

/// Normalizes one driver value for the given field type.
pub type ScanFn = fn(&FieldType, Value) -> Result<Value, ScanError>;

/// Resolves the portable scan function for a field type.
#[must_use]
pub fn scanner(ty: &FieldType) -> ScanFn {
    match ty.kind {
        FieldKind::Array(_) => scan_json_array,
        FieldKind::Json => scan_json,
        FieldKind::Timestamp => scan_timestamp,
        _ => scan_identity,
    }
}

/// Passes the driver value through unchanged.
#[allow(clippy::unnecessary_wraps)]
pub fn scan_identity(_ty: &FieldType, value: Value) -> Result<Value, ScanError> {
    Ok(value)
}

/// Parses timestamps stored as text.
pub fn scan_timestamp(_ty: &FieldType, value: Value) -> Result<Value, ScanError> {
    match value {
        Value::Text(s) => parse_timestamp(&s).map(Value::Timestamp),
        other => Ok(other),
    }
}

/// Parses JSON documents stored as text or bytes.
pub fn scan_json(_ty: &FieldType, value: Value) -> Result<Value, ScanError> {
    match value {
        Value::Text(s) => serde_json::from_str(&s)
            .map(Value::Json)
            .map_err(|e| ScanError::Parse {
                target: "json",
                input: s,
                reason: e.to_string(),
            }),
        Value::Bytes(b) => serde_json::from_slice(&b)
            .map(Value::Json)
            .map_err(|e| ScanError::Parse {
                target: "json",
                input: String::from_utf8_lossy(&b).into_owned(),
                reason: e.to_string(),
            }),
        other => Ok(other),
    }
}

/// Parses collections stored as JSON array text.
pub fn scan_json_array(_ty: &FieldType, value: Value) -> Result<Value, ScanError> {
    let json = match value {
        Value::Text(s) => serde_json::from_str::<serde_json::Value>(&s).map_err(|e| {
            ScanError::Parse {
                target: "array",
                input: s.clone(),
                reason: e.to_string(),
            }
        })?,
        Value::Bytes(b) => serde_json::from_slice::<serde_json::Value>(&b).map_err(|e| {
            ScanError::Parse {
                target: "array",
                input: String::from_utf8_lossy(&b).into_owned(),
                reason: e.to_string(),
            }
        })?,
        Value::Json(json) => json,
        other => return Ok(other),
    };
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Array(items) => {
            Ok(Value::Array(items.into_iter().map(json_to_value).collect()))
        }
        other => Err(ScanError::Parse {
            target: "array",
            input: other.to_string(),
            reason: "expected a JSON array".to_string(),
        }),
    }
}

/// Parses PostgreSQL array text such as `{1,"a b",NULL}`.
pub fn scan_pg_array(_ty: &FieldType, value: Value) -> Result<Value, ScanError> {
    match value {
        Value::Text(s) => parse_pg_array(&s),
        Value::Bytes(b) => parse_pg_array(&String::from_utf8_lossy(&b)),
        other => Ok(other),
    }
}

/// Decodes PostgreSQL `\x..` bytea text.
pub fn scan_bytea(_ty: &FieldType, value: Value) -> Result<Value, ScanError> {
    match value {
        Value::Text(s) => match s.strip_prefix("\\x") {
            Some(hex) => decode_hex(hex).map(Value::Bytes),
            None => Ok(Value::Bytes(s.into_bytes())),
        },
        other => Ok(other),
    }
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, ScanError> {
    let err = || ScanError::Parse {
        target: "bytes",
        input: hex.to_string(),
        reason: "invalid hex".to_string(),
    };
    if hex.len() % 2 != 0 {
        return Err(err());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2).ok_or_else(err)?, 16).map_err(|_| err()))
        .collect()
}

/// Parses the text form of a (possibly nested) PostgreSQL array.
///
/// Elements come back as [`Value::Text`] (or NULL); element conversion is
/// left to the field's `FromValue` impl.
///
/// # Errors
///
/// Returns [`ScanError::Parse`] on malformed input.
pub fn parse_pg_array(input: &str) -> Result<Value, ScanError> {
    let mut parser = PgArrayParser {
        input,
        chars: input.char_indices().peekable(),
    };
    let value = parser.array()?;
    if parser.chars.next().is_some() {
        return Err(parser.error("trailing characters after array"));
    }
    Ok(value)
}

struct PgArrayParser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl PgArrayParser<'_> {
    fn error(&self, reason: &str) -> ScanError {
        ScanError::Parse {
            target: "array",
            input: self.input.to_string(),
            reason: reason.to_string(),
        }
    }

    fn array(&mut self) -> Result<Value, ScanError> {
        if self.chars.next().map(|(_, c)| c) != Some('{') {
            return Err(self.error("expected '{'"));
        }
        let mut items = Vec::new();
        if self.chars.peek().map(|(_, c)| *c) == Some('}') {
            self.chars.next();
            return Ok(Value::Array(items));
        }
        loop {
            let item = match self.chars.peek().map(|(_, c)| *c) {
                Some('{') => self.array()?,
                Some('"') => self.quoted()?,
                Some(_) => self.bare()?,
                None => return Err(self.error("unterminated array")),
            };
            items.push(item);
            match self.chars.next().map(|(_, c)| c) {
                Some(',') => {}
                Some('}') => return Ok(Value::Array(items)),
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn quoted(&mut self) -> Result<Value, ScanError> {
        self.chars.next();
        let mut s = String::new();
        loop {
            match self.chars.next().map(|(_, c)| c) {
                Some('"') => return Ok(Value::Text(s)),
                Some('\\') => match self.chars.next() {
                    Some((_, c)) => s.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) => s.push(c),
                None => return Err(self.error("unterminated quoted element")),
            }
        }
    }

    fn bare(&mut self) -> Result<Value, ScanError> {
        let mut s = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c == ',' || c == '}' {
                break;
            }
            s.push(c);
            self.chars.next();
        }
        let s = s.trim();
        if s.is_empty() {
            return Err(self.error("empty element"));
        }
        if s.eq_ignore_ascii_case("NULL") {
            Ok(Value::Null)
        } else {
            Ok(Value::Text(s.to_string()))
        }
    }
}
