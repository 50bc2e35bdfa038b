//! Optional SQL capabilities a dialect may support.

use std::fmt;
use std::ops::BitOr;

/// A set of dialect features.
///
/// The query builders consult it to pick clause variants, e.g. `CASCADE`
/// is only emitted when [`Feature::TABLE_CASCADE`] is present.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Feature(u32);

impl Feature {
    /// `RETURNING` clause on INSERT, UPDATE and DELETE.
    pub const RETURNING: Self = Self(1);
    /// `DEFAULT` keyword inside a VALUES list.
    pub const DEFAULT_PLACEHOLDER: Self = Self(1 << 1);
    /// `::type` casts.
    pub const DOUBLE_COLON_CAST: Self = Self(1 << 2);
    /// `VALUES ROW(...)` syntax.
    pub const VALUES_ROW: Self = Self(1 << 3);
    /// UPDATE over several tables.
    pub const UPDATE_MULTI_TABLE: Self = Self(1 << 4);
    /// `INSERT INTO table AS alias`.
    pub const INSERT_TABLE_ALIAS: Self = Self(1 << 5);
    /// `AUTO_INCREMENT` column attribute.
    pub const AUTO_INCREMENT: Self = Self(1 << 6);
    /// `DROP TABLE ... CASCADE`.
    pub const TABLE_CASCADE: Self = Self(1 << 7);
    /// `GENERATED BY DEFAULT AS IDENTITY` columns.
    pub const TABLE_IDENTITY: Self = Self(1 << 8);
    /// `TRUNCATE TABLE`.
    pub const TABLE_TRUNCATE: Self = Self(1 << 9);
    /// `ON DUPLICATE KEY UPDATE`.
    pub const ON_DUPLICATE_KEY: Self = Self(1 << 10);
    /// `ON CONFLICT ...`.
    pub const INSERT_ON_CONFLICT: Self = Self(1 << 11);

    const NAMES: [(Self, &'static str); 12] = [
        (Self::RETURNING, "RETURNING"),
        (Self::DEFAULT_PLACEHOLDER, "DEFAULT_PLACEHOLDER"),
        (Self::DOUBLE_COLON_CAST, "DOUBLE_COLON_CAST"),
        (Self::VALUES_ROW, "VALUES_ROW"),
        (Self::UPDATE_MULTI_TABLE, "UPDATE_MULTI_TABLE"),
        (Self::INSERT_TABLE_ALIAS, "INSERT_TABLE_ALIAS"),
        (Self::AUTO_INCREMENT, "AUTO_INCREMENT"),
        (Self::TABLE_CASCADE, "TABLE_CASCADE"),
        (Self::TABLE_IDENTITY, "TABLE_IDENTITY"),
        (Self::TABLE_TRUNCATE, "TABLE_TRUNCATE"),
        (Self::ON_DUPLICATE_KEY, "ON_DUPLICATE_KEY"),
        (Self::INSERT_ON_CONFLICT, "INSERT_ON_CONFLICT"),
    ];

    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns true if every feature in `other` is present.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the set with `other` removed.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for Feature {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Feature({})", names.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_set() {
        let set = Feature::RETURNING | Feature::TABLE_CASCADE;
        assert!(set.contains(Feature::RETURNING));
        assert!(set.contains(Feature::RETURNING | Feature::TABLE_CASCADE));
        assert!(!set.contains(Feature::AUTO_INCREMENT));
        assert!(!set.without(Feature::RETURNING).contains(Feature::RETURNING));
        assert_eq!(format!("{set:?}"), "Feature(RETURNING | TABLE_CASCADE)");
    }
}
