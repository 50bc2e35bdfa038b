//! Append functions: render decoded values as SQL literal text.
//!
//! Every caller-supplied value passes through one of these before it
//! reaches a statement. They are plain functions so that dialects and user
//! overrides can be stored as [`AppendFn`] pointers and memoized.

use chrono::{DateTime, Utc};

use crate::formatter::Formatter;
use crate::value::{value_to_json, Value};

/// Renders one value into the statement buffer.
pub type AppendFn = fn(&Formatter<'_>, &mut String, &Value);

/// Timestamp layout with a numeric offset, used by PostgreSQL and SQLite.
pub const TIME_FORMAT_OFFSET: &str = "%Y-%m-%d %H:%M:%S%.6f%:z";

/// Timestamp layout without an offset, used by MySQL (values are UTC).
pub const TIME_FORMAT_NAIVE: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub fn append_null(b: &mut String) {
    b.push_str("NULL");
}

pub fn append_bool(b: &mut String, v: bool) {
    b.push_str(if v { "TRUE" } else { "FALSE" });
}

/// Appends a single-quoted string, doubling quotes and dropping NUL bytes.
pub fn append_string(b: &mut String, s: &str) {
    b.reserve(s.len() + 2);
    b.push('\'');
    for c in s.chars() {
        match c {
            '\0' => {}
            '\'' => b.push_str("''"),
            c => b.push(c),
        }
    }
    b.push('\'');
}

/// Like [`append_string`] but also escapes backslashes, for backends that
/// treat them as escape characters inside literals.
pub fn append_string_escaped(b: &mut String, s: &str) {
    b.reserve(s.len() + 2);
    b.push('\'');
    for c in s.chars() {
        match c {
            '\0' => {}
            '\'' => b.push_str("''"),
            '\\' => b.push_str("\\\\"),
            c => b.push(c),
        }
    }
    b.push('\'');
}

/// Appends `X'..'` hex blob syntax.
pub fn append_hex_bytes(b: &mut String, bytes: &[u8]) {
    b.push_str("X'");
    push_hex(b, bytes);
    b.push('\'');
}

/// Appends PostgreSQL `'\x..'` bytea syntax.
pub fn append_bytea(b: &mut String, bytes: &[u8]) {
    b.push_str("'\\x");
    push_hex(b, bytes);
    b.push('\'');
}

fn push_hex(b: &mut String, bytes: &[u8]) {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    for byte in bytes {
        b.push(char::from(DIGITS[usize::from(byte >> 4)]));
        b.push(char::from(DIGITS[usize::from(byte & 0x0f)]));
    }
}

/// Appends a finite float; non-finite values have no portable literal and
/// render as NULL.
pub fn append_float(b: &mut String, f: f64) {
    if f.is_finite() {
        b.push_str(&f.to_string());
    } else {
        append_null(b);
    }
}

/// Appends a float using PostgreSQL's quoted spellings for NaN and infinities.
pub fn append_float_pg(b: &mut String, f: f64) {
    if f.is_nan() {
        b.push_str("'NaN'");
    } else if f.is_infinite() {
        b.push_str(if f > 0.0 { "'Infinity'" } else { "'-Infinity'" });
    } else {
        b.push_str(&f.to_string());
    }
}

/// Appends a quoted timestamp in the given chrono layout.
pub fn append_time(b: &mut String, t: &DateTime<Utc>, layout: &str) {
    b.push('\'');
    b.push_str(&t.format(layout).to_string());
    b.push('\'');
}

/// Default appender: dispatches on the value variant through the dialect.
pub fn append_value(f: &Formatter<'_>, b: &mut String, value: &Value) {
    let dialect = f.dialect();
    match value {
        Value::Null => append_null(b),
        Value::Bool(v) => append_bool(b, *v),
        Value::Int(n) => b.push_str(&n.to_string()),
        Value::UInt(n) => b.push_str(&n.to_string()),
        Value::Float(x) => dialect.append_float(b, *x),
        Value::Text(s) => dialect.append_string(b, s),
        Value::Bytes(bytes) => dialect.append_bytes(b, bytes),
        Value::Timestamp(t) => dialect.append_time(b, t),
        Value::Array(items) => dialect.append_array(f, b, items),
        Value::Json(json) => dialect.append_json(b, json),
    }
}

/// Appender for JSON columns: anything that is not NULL is encoded as a
/// JSON document.
pub fn append_json_field(f: &Formatter<'_>, b: &mut String, value: &Value) {
    match value {
        Value::Null => append_null(b),
        Value::Json(json) => f.dialect().append_json(b, json),
        other => f.dialect().append_json(b, &value_to_json(other)),
    }
}

/// Appender for collection columns.
pub fn append_array_field(f: &Formatter<'_>, b: &mut String, value: &Value) {
    match value {
        Value::Array(items) => f.dialect().append_array(f, b, items),
        other => append_value(f, b, other),
    }
}

/// Renders a collection as a quoted JSON array, for backends without a
/// native array type.
pub fn append_json_array(f: &Formatter<'_>, b: &mut String, items: &[Value]) {
    let json = value_to_json(&Value::Array(items.to_vec()));
    f.dialect().append_string(b, &json.to_string());
}

/// Renders a collection as a PostgreSQL array literal such as
/// `'{"a","b,c"}'`.
pub fn append_pg_array(_f: &Formatter<'_>, b: &mut String, items: &[Value]) {
    b.push('\'');
    pg_array_body(b, items);
    b.push('\'');
}

fn pg_array_body(b: &mut String, items: &[Value]) {
    b.push('{');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            b.push(',');
        }
        pg_array_element(b, item);
    }
    b.push('}');
}

fn pg_array_element(b: &mut String, item: &Value) {
    match item {
        Value::Null => b.push_str("NULL"),
        Value::Bool(v) => b.push(if *v { 't' } else { 'f' }),
        Value::Int(n) => b.push_str(&n.to_string()),
        Value::UInt(n) => b.push_str(&n.to_string()),
        Value::Float(x) if x.is_nan() => b.push_str("NaN"),
        Value::Float(x) if x.is_infinite() => {
            b.push_str(if *x > 0.0 { "Infinity" } else { "-Infinity" });
        }
        Value::Float(x) => b.push_str(&x.to_string()),
        Value::Text(s) => pg_array_string(b, s),
        Value::Bytes(bytes) => {
            let mut hex = String::from("\\x");
            push_hex(&mut hex, bytes);
            pg_array_string(b, &hex);
        }
        Value::Timestamp(t) => pg_array_string(b, &t.format(TIME_FORMAT_OFFSET).to_string()),
        Value::Array(inner) => pg_array_body(b, inner),
        Value::Json(json) => pg_array_string(b, &json.to_string()),
    }
}

/// Quotes one array element. The whole literal sits inside single quotes,
/// so `'` is doubled as well.
fn pg_array_string(b: &mut String, s: &str) {
    b.push('"');
    for c in s.chars() {
        match c {
            '\0' => {}
            '\'' => b.push_str("''"),
            '"' => b.push_str("\\\""),
            '\\' => b.push_str("\\\\"),
            c => b.push(c),
        }
    }
    b.push('"');
}
