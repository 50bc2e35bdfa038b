//! Generic SQL dialect.

use super::{Dialect, DialectOptions, Feature, Registry};

/// A generic SQL dialect using ANSI SQL standards.
#[derive(Debug, Default)]
pub struct GenericDialect {
    registry: Registry,
}

impl GenericDialect {
    /// Creates a new generic dialect.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generic dialect with type and codec overrides.
    #[must_use]
    pub fn with_options(options: DialectOptions) -> Self {
        Self {
            registry: Registry::new(options),
        }
    }
}

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn features(&self) -> Feature {
        Feature::RETURNING
    }

    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn as_dyn(&self) -> &dyn Dialect {
        self
    }
}
