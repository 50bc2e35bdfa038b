//! Configuration loaded from JSON or the environment.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use burrow_core::{Dialect, DialectOptions, FieldKind, MysqlDialect, PgDialect, SqliteDialect};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::hook::QueryLogger;

/// Prefix of the environment variables read by [`Config::from_env`].
pub const ENV_PREFIX: &str = "BURROW_";

/// SQL dialect selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectName {
    #[serde(alias = "pg")]
    Postgres,
    Mysql,
    #[default]
    Sqlite,
}

impl FromStr for DialectName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(Error::Config(format!("unknown dialect {other:?}"))),
        }
    }
}

impl fmt::Display for DialectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
        })
    }
}

/// Settings for [`Db::from_config`](crate::Db::from_config).
///
/// ```json
/// {
///   "dialect": "postgres",
///   "query_timeout_ms": 5000,
///   "sql_types": { "string": "TEXT" },
///   "log_queries": true,
///   "slow_query_ms": 200
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub dialect: DialectName,
    /// Default deadline of every round trip.
    pub query_timeout_ms: Option<u64>,
    /// Field kind name to SQL type, e.g. `"string": "TEXT"`.
    pub sql_types: BTreeMap<String, String>,
    /// Installs a [`QueryLogger`].
    pub log_queries: bool,
    /// Slow-query threshold of the logger.
    pub slow_query_ms: Option<u64>,
}

impl Config {
    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed JSON or unknown keys.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reads `BURROW_*` environment variables.
    ///
    /// - `BURROW_DIALECT`: `postgres`, `mysql` or `sqlite`
    /// - `BURROW_QUERY_TIMEOUT_MS`, `BURROW_SLOW_QUERY_MS`: milliseconds
    /// - `BURROW_LOG_QUERIES`: `true`/`1` to enable
    /// - `BURROW_SQL_TYPES`: `kind=TYPE` pairs separated by `;`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unparsable values.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Same as [`Config::from_env`] over an explicit variable list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unparsable values.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in vars {
            let Some(key) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match key {
                "DIALECT" => config.dialect = value.parse()?,
                "QUERY_TIMEOUT_MS" => config.query_timeout_ms = Some(parse_ms(key, value)?),
                "SLOW_QUERY_MS" => config.slow_query_ms = Some(parse_ms(key, value)?),
                "LOG_QUERIES" => config.log_queries = matches!(value, "1" | "true" | "yes" | "on"),
                "SQL_TYPES" => {
                    for pair in value.split(';').filter(|p| !p.trim().is_empty()) {
                        let (kind, sql_type) = pair.split_once('=').ok_or_else(|| {
                            Error::Config(format!(
                                "{ENV_PREFIX}SQL_TYPES entry {pair:?} must be kind=TYPE"
                            ))
                        })?;
                        config
                            .sql_types
                            .insert(kind.trim().to_string(), sql_type.trim().to_string());
                    }
                }
                _ => tracing::debug!(variable = %key, "ignoring unknown config variable"),
            }
        }
        Ok(config)
    }

    /// Converts `sql_types` into dialect overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown field kind.
    pub fn dialect_options(&self) -> Result<DialectOptions> {
        let mut options = DialectOptions::new();
        for (name, sql_type) in &self.sql_types {
            let kind = FieldKind::from_name(name)
                .ok_or_else(|| Error::Config(format!("unknown field kind {name:?} in sql_types")))?;
            options = options.sql_type(kind, sql_type.clone());
        }
        Ok(options)
    }

    /// Builds the configured dialect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown field kind.
    pub fn build_dialect(&self) -> Result<Arc<dyn Dialect>> {
        let options = self.dialect_options()?;
        Ok(match self.dialect {
            DialectName::Postgres => Arc::new(PgDialect::with_options(options)),
            DialectName::Mysql => Arc::new(MysqlDialect::with_options(options)),
            DialectName::Sqlite => Arc::new(SqliteDialect::with_options(options)),
        })
    }

    #[must_use]
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    /// The logger to install, if query logging is enabled.
    #[must_use]
    pub fn logger(&self) -> Option<QueryLogger> {
        if !self.log_queries {
            return None;
        }
        let logger = QueryLogger::new();
        Some(match self.slow_query_ms {
            Some(ms) => logger.slow_threshold(Duration::from_millis(ms)),
            None => logger,
        })
    }
}

fn parse_ms(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|e| Error::Config(format!("{ENV_PREFIX}{key}={value:?}: {e}")))
}
