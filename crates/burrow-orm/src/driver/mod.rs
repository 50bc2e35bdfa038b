//! Connection adapters.

pub mod sqlite;
