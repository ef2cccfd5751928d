//! Named data source lookup.
//!
//! The engine only depends on [`NamedDataSourceProvider`]; where the names
//! come from is up to the implementation.

use crate::dialects::connection::substitute_env;
use crate::executor::{ConnectionError, ConnectionManager};
use log::{debug, warn};
use odbc_api::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a named data source is provided
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    /// Looked up by name in a naming directory
    #[default]
    Directory,
    /// Served from a named connection pool
    Pooled,
}

impl fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceKind::Directory => f.write_str("directory"),
            DataSourceKind::Pooled => f.write_str("pooled"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NamingError {
    #[error("Data source not found: {0}")]
    DataSourceNotFound(String),

    #[error("Data source '{name}' is {actual}, not {expected}")]
    WrongKind {
        name: String,
        expected: DataSourceKind,
        actual: DataSourceKind,
    },

    #[error("Lookup of data source '{name}' failed: {reason}")]
    Lookup { name: String, reason: String },
}

/// A resolved data source, ready to open connections
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceHandle {
    pub name: String,
    pub kind: DataSourceKind,
    pub vendor: Option<String>,
    pub connection_string: String,
    pub max_size: Option<u32>,
}

impl DataSourceHandle {
    pub fn connect(&self, manager: &ConnectionManager) -> Result<Connection<'static>, ConnectionError> {
        debug!("Opening connection from {} data source '{}'", self.kind, self.name);
        manager.connect(&self.connection_string)
    }
}

pub trait NamedDataSourceProvider: Send + Sync {
    /// Directory lookup by name
    fn get_named_data_source(&self, name: &str) -> Result<DataSourceHandle, NamingError> {
        self.get_named_data_source_typed(name, DataSourceKind::Directory)
    }

    fn get_named_data_source_typed(
        &self,
        name: &str,
        kind: DataSourceKind,
    ) -> Result<DataSourceHandle, NamingError>;
}

/// One `[datasources.<name>]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    #[serde(default)]
    pub kind: DataSourceKind,

    #[serde(default)]
    pub vendor: Option<String>,

    pub connection_string: String,

    /// Pool size for pooled entries
    #[serde(default)]
    pub max_size: Option<u32>,
}

/// Provider backed by the `[datasources]` configuration table
#[derive(Debug, Clone, Default)]
pub struct ConfiguredDataSources {
    entries: BTreeMap<String, DataSourceConfig>,
}

impl ConfiguredDataSources {
    pub fn new(entries: BTreeMap<String, DataSourceConfig>) -> Self {
        Self { entries }
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

impl NamedDataSourceProvider for ConfiguredDataSources {
    fn get_named_data_source_typed(
        &self,
        name: &str,
        kind: DataSourceKind,
    ) -> Result<DataSourceHandle, NamingError> {
        debug!("Looking up {} data source '{}'", kind, name);
        let entry = self.entries.get(name).ok_or_else(|| {
            warn!("Data source '{}' is not configured", name);
            NamingError::DataSourceNotFound(name.to_string())
        })?;

        if entry.kind != kind {
            return Err(NamingError::WrongKind {
                name: name.to_string(),
                expected: kind,
                actual: entry.kind,
            });
        }

        let connection_string = substitute_env(&entry.connection_string);
        if connection_string.contains("${") {
            return Err(NamingError::Lookup {
                name: name.to_string(),
                reason: format!("unresolved variable in '{}'", entry.connection_string),
            });
        }

        Ok(DataSourceHandle {
            name: name.to_string(),
            kind,
            vendor: entry.vendor.clone(),
            connection_string,
            max_size: match kind {
                DataSourceKind::Pooled => Some(entry.max_size.unwrap_or(8)),
                DataSourceKind::Directory => None,
            },
        })
    }
}
