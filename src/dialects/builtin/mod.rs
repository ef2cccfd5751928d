//! Built-in vendor records.
//!
//! Each vendor is a TOML record; specializations only carry what differs
//! from their parent.

use crate::dialects::base::{DialectDescriptor, DialectError};

const BUILTIN: &[(&str, &str)] = &[
    ("generic", include_str!("generic.toml")),
    ("postgresql", include_str!("postgresql.toml")),
    ("greenplum", include_str!("greenplum.toml")),
    ("redshift", include_str!("redshift.toml")),
    ("mysql", include_str!("mysql.toml")),
    ("mariadb", include_str!("mariadb.toml")),
    ("oracle", include_str!("oracle.toml")),
    ("mssql", include_str!("mssql.toml")),
    ("sqlite", include_str!("sqlite.toml")),
];

/// Parse every built-in descriptor, parents before children
pub fn descriptors() -> Result<Vec<DialectDescriptor>, DialectError> {
    BUILTIN
        .iter()
        .map(|(name, source)| {
            DialectDescriptor::from_toml(source).map_err(|e| {
                DialectError::InvalidDescriptor(format!("built-in dialect '{}': {}", name, e))
            })
        })
        .collect()
}
