//! Parser for the `#[burrow("...")]` tag mini-language.
//!
//! A tag is a comma-separated list. The first token, when it has no `:`,
//! is a name; every other token is an option, either `key` or
//! `key:value`. Values wrapped in single quotes may contain commas, and a
//! doubled quote inside them stands for one quote. `default` values are SQL
//! expressions and keep their quotes.

/// A parsed tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    pub name: Option<String>,
    pub options: Vec<(String, Option<String>)>,
}

impl Tag {
    /// Parses a tag string.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem for unterminated quotes and
    /// empty option keys.
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut tag = Self::default();
        for (i, token) in split(input)?.into_iter().enumerate() {
            match token.split_once(':') {
                None if i == 0 => {
                    let name = token.trim();
                    if !name.is_empty() {
                        tag.name = Some(unquote(name));
                    }
                }
                None => {
                    let key = token.trim();
                    if key.is_empty() {
                        return Err("empty option".to_string());
                    }
                    tag.options.push((key.to_string(), None));
                }
                Some((key, value)) => {
                    let key = key.trim();
                    if key.is_empty() {
                        return Err(format!("option value {value:?} has no key"));
                    }
                    let value = value.trim();
                    let value = if key == "default" {
                        value.to_string()
                    } else {
                        unquote(value)
                    };
                    tag.options.push((key.to_string(), Some(value)));
                }
            }
        }
        Ok(tag)
    }

    /// Returns true when the option is present, with or without a value.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.options.iter().any(|(k, _)| k == key)
    }

    /// Returns the value of the first occurrence of an option.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Returns the values of every occurrence of an option.
    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.options
            .iter()
            .filter(move |(k, _)| k == key)
            .filter_map(|(_, v)| v.as_deref())
    }

    /// Returns the first option whose key is not in `allowed`.
    #[must_use]
    pub fn unknown_option(&self, allowed: &[&str]) -> Option<&str> {
        self.options
            .iter()
            .map(|(k, _)| k.as_str())
            .find(|k| !allowed.contains(k))
    }
}

fn split(input: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' if quoted && chars.peek() == Some(&'\'') => {
                chars.next();
                current.push_str("''");
            }
            '\'' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => tokens.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    if quoted {
        return Err(format!("unterminated quote in {input:?}"));
    }
    if !input.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

fn unquote(s: &str) -> String {
    match s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => s.to_string(),
    }
}
