//! Statement formatter and user query fragments.
//!
//! A [`Formatter`] carries the dialect and the rendering mode. In literal
//! mode every value is encoded inline through the dialect's append
//! functions; in template mode values are replaced by positional
//! placeholders and collected so they can be handed to a driver.

use std::cell::RefCell;
use std::fmt;

use crate::dialect::{append, AppendFn, Dialect};
use crate::error::BuildError;
use crate::value::{ToValue, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Literal,
    Template,
}

/// Renders values and identifiers for one statement.
///
/// Not `Sync`: create one per rendering and drop it before awaiting.
pub struct Formatter<'a> {
    dialect: &'a dyn Dialect,
    mode: Mode,
    args: RefCell<Vec<Value>>,
}

impl<'a> Formatter<'a> {
    /// Creates a formatter that inlines every value as a literal.
    #[must_use]
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self {
            dialect,
            mode: Mode::Literal,
            args: RefCell::new(Vec::new()),
        }
    }

    /// Creates a formatter that renders placeholders and collects values.
    #[must_use]
    pub fn placeholders(dialect: &'a dyn Dialect) -> Self {
        Self {
            mode: Mode::Template,
            ..Self::new(dialect)
        }
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    /// Returns true when values render as placeholders.
    #[must_use]
    pub fn is_template(&self) -> bool {
        self.mode == Mode::Template
    }

    /// Appends a value with the dialect's default encoding.
    pub fn append_value(&self, b: &mut String, value: &Value) {
        self.append_with(b, append::append_value, value);
    }

    /// Appends a value with a resolved field appender.
    pub fn append_with(&self, b: &mut String, append: AppendFn, value: &Value) {
        if self.is_template() {
            let mut args = self.args.borrow_mut();
            args.push(value.clone());
            self.dialect.append_placeholder(b, args.len());
        } else {
            append(self, b, value);
        }
    }

    /// Appends a quoted identifier.
    pub fn append_ident(&self, b: &mut String, ident: &str) {
        self.dialect.append_ident(b, ident);
    }

    /// Takes the values collected in template mode.
    #[must_use]
    pub fn take_args(&self) -> Vec<Value> {
        self.args.take()
    }
}

impl fmt::Debug for Formatter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formatter")
            .field("dialect", &self.dialect.name())
            .field("mode", &self.mode)
            .field("args", &self.args.borrow().len())
            .finish()
    }
}

/// One argument of a user query fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Encoded through the value codec.
    Value(Value),
    /// Quoted as an identifier.
    Ident(String),
    /// Appended verbatim. Never pass user input here.
    Safe(String),
    /// Comma-joined list of encoded values.
    In(Vec<Value>),
}

impl Arg {
    fn append(&self, f: &Formatter<'_>, b: &mut String) {
        match self {
            Self::Value(value) => f.append_value(b, value),
            Self::Ident(ident) => f.append_ident(b, ident),
            Self::Safe(sql) => b.push_str(sql),
            Self::In(values) if values.is_empty() => b.push_str("NULL"),
            Self::In(values) => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        b.push_str(", ");
                    }
                    f.append_value(b, value);
                }
            }
        }
    }
}

/// Converts something into a fragment argument.
pub trait ToArg {
    fn to_arg(&self) -> Arg;
}

impl<T: ToValue + ?Sized> ToArg for T {
    fn to_arg(&self) -> Arg {
        Arg::Value(self.to_value())
    }
}

/// Renders its content as a quoted identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident<S>(pub S);

impl<S: AsRef<str>> ToArg for Ident<S> {
    fn to_arg(&self) -> Arg {
        Arg::Ident(self.0.as_ref().to_string())
    }
}

/// Renders its content verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Safe<S>(pub S);

impl<S: AsRef<str>> ToArg for Safe<S> {
    fn to_arg(&self) -> Arg {
        Arg::Safe(self.0.as_ref().to_string())
    }
}

/// Renders a list as comma-separated values, for `x IN (?)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct In<T>(pub T);

impl<T: ToValue> ToArg for In<Vec<T>> {
    fn to_arg(&self) -> Arg {
        Arg::In(self.0.iter().map(ToValue::to_value).collect())
    }
}

impl<T: ToValue> ToArg for In<&[T]> {
    fn to_arg(&self) -> Arg {
        Arg::In(self.0.iter().map(ToValue::to_value).collect())
    }
}

impl ToArg for Arg {
    fn to_arg(&self) -> Arg {
        self.clone()
    }
}

/// Resolves `?Name` arguments.
pub trait ArgAppender {
    /// Appends the argument `name`, returning false when it is unknown.
    fn append_named_arg(&self, f: &Formatter<'_>, b: &mut String, name: &str) -> bool;
}

/// A SQL fragment with `?` markers and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryWithArgs {
    pub query: String,
    pub args: Vec<Arg>,
}

impl QueryWithArgs {
    /// Captures a fragment and converts its arguments.
    #[must_use]
    pub fn new(query: impl Into<String>, args: &[&dyn ToArg]) -> Self {
        Self {
            query: query.into(),
            args: args.iter().map(|a| a.to_arg()).collect(),
        }
    }

    /// A fragment without arguments.
    #[must_use]
    pub fn raw(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            args: Vec::new(),
        }
    }

    /// A fragment that renders one quoted identifier.
    #[must_use]
    pub fn ident(ident: impl Into<String>) -> Self {
        Self {
            query: "?".to_string(),
            args: vec![Arg::Ident(ident.into())],
        }
    }

    /// Appends the fragment, substituting arguments.
    ///
    /// `?` consumes the next positional argument, `?N` the N-th one and
    /// `?Name` is looked up on `named`. `\?` is a literal question mark.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingArgument`] when `?` markers outnumber
    /// arguments and [`BuildError::UnknownNamedArgument`] when `named`
    /// cannot resolve a name.
    pub fn append_query(
        &self,
        f: &Formatter<'_>,
        b: &mut String,
        named: Option<&dyn ArgAppender>,
    ) -> Result<(), BuildError> {
        if self.args.is_empty() && named.is_none() {
            b.push_str(&self.query);
            return Ok(());
        }

        let mut next = 0;
        let mut chars = self.query.char_indices().peekable();
        while let Some((start, c)) = chars.next() {
            match c {
                '\\' if chars.peek().map(|&(_, c)| c) == Some('?') => {
                    chars.next();
                    b.push('?');
                }
                '?' => {
                    let mut end = start + 1;
                    while let Some(&(i, c)) = chars.peek() {
                        if !(c.is_ascii_alphanumeric() || c == '_') {
                            break;
                        }
                        end = i + c.len_utf8();
                        chars.next();
                    }
                    let name = &self.query[start + 1..end];
                    if name.is_empty() {
                        let arg = self.args.get(next).ok_or_else(|| self.missing())?;
                        arg.append(f, b);
                        next += 1;
                    } else if let Ok(index) = name.parse::<usize>() {
                        self.args.get(index).ok_or_else(|| self.missing())?.append(f, b);
                    } else if !named.is_some_and(|n| n.append_named_arg(f, b, name)) {
                        return Err(BuildError::UnknownNamedArgument {
                            query: self.query.clone(),
                            name: name.to_string(),
                        });
                    }
                }
                c => b.push(c),
            }
        }
        Ok(())
    }

    fn missing(&self) -> BuildError {
        BuildError::MissingArgument {
            query: self.query.clone(),
            given: self.args.len(),
        }
    }
}

/// Builds a [`QueryWithArgs`] from a query and any number of arguments.
///
/// ```ignore
/// let q = fragment!("? = ?", Ident("user.name"), "bun");
/// ```
#[macro_export]
macro_rules! fragment {
    ($query:expr $(, $arg:expr)* $(,)?) => {
        $crate::QueryWithArgs::new($query, &[$(&$arg as &dyn $crate::ToArg),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MysqlDialect, PgDialect};

    fn render(f: &Formatter<'_>, q: &QueryWithArgs) -> Result<String, BuildError> {
        let mut b = String::new();
        q.append_query(f, &mut b, None)?;
        Ok(b)
    }

    #[test]
    fn test_positional_args() {
        let dialect = PgDialect::new();
        let f = Formatter::new(&dialect);
        let q = QueryWithArgs::new("? = ? AND ?", &[&Ident("user.name"), &"it's", &Safe("TRUE")]);
        assert_eq!(render(&f, &q).unwrap(), r#""user"."name" = 'it''s' AND TRUE"#);
    }

    #[test]
    fn test_indexed_and_in_args() {
        let dialect = MysqlDialect::new();
        let f = Formatter::new(&dialect);
        let q = QueryWithArgs::new("?1 IN (?0)", &[&In(vec![1, 2, 3]), &Ident("id")]);
        assert_eq!(render(&f, &q).unwrap(), "`id` IN (1, 2, 3)");

        let empty: Vec<i64> = Vec::new();
        let q = QueryWithArgs::new("id IN (?)", &[&In(empty)]);
        assert_eq!(render(&f, &q).unwrap(), "id IN (NULL)");
    }

    #[test]
    fn test_missing_argument() {
        let dialect = PgDialect::new();
        let f = Formatter::new(&dialect);
        let q = QueryWithArgs::new("a = ? AND b = ?", &[&1]);
        assert_eq!(
            render(&f, &q),
            Err(BuildError::MissingArgument {
                query: "a = ? AND b = ?".to_string(),
                given: 1,
            })
        );
    }

    #[test]
    fn test_unknown_named_argument() {
        let dialect = PgDialect::new();
        let f = Formatter::new(&dialect);
        let q = QueryWithArgs::new("?TableAlias.id = ?", &[&1]);
        assert!(matches!(
            render(&f, &q),
            Err(BuildError::UnknownNamedArgument { name, .. }) if name == "TableAlias"
        ));
    }

    #[test]
    fn test_verbatim_without_args() {
        let dialect = PgDialect::new();
        let f = Formatter::new(&dialect);
        let q = QueryWithArgs::raw("data ? 'key'");
        assert_eq!(render(&f, &q).unwrap(), "data ? 'key'");
    }

    #[test]
    fn test_escaped_marker() {
        let dialect = PgDialect::new();
        let f = Formatter::new(&dialect);
        let q = crate::fragment!("data \\? ? AND id = ?", "key", 7);
        assert_eq!(render(&f, &q).unwrap(), "data ? 'key' AND id = 7");
    }

    #[test]
    fn test_template_mode_collects_args() {
        let dialect = PgDialect::new();
        let f = Formatter::placeholders(&dialect);
        let q = QueryWithArgs::new("name = ? AND id IN (?)", &[&"bun", &In(vec![1_i64, 2])]);
        assert_eq!(render(&f, &q).unwrap(), "name = $1 AND id IN ($2, $3)");
        assert_eq!(
            f.take_args(),
            vec![Value::Text("bun".into()), Value::Int(1), Value::Int(2)]
        );
    }
}
