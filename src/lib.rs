//! Pluggable database dialects over ODBC: vendor descriptors with
//! inheritance, connection strings and probes, named data sources,
//! SRID translation and geometry wire formats.

pub mod catalog;
pub mod cli;
pub mod datasource;
pub mod dialects;
pub mod executor;
pub mod logger;
pub mod model;
pub mod probe;
pub mod spatial;
