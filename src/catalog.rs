//! Browsable catalog and schema structure built from driver metadata.

use crate::executor::ConnectionError;
use log::debug;
use serde::Serialize;

/// One row of ODBC table metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub table: String,
}

impl TableRow {
    pub fn new(catalog: Option<&str>, schema: Option<&str>, table: &str) -> Self {
        Self {
            catalog: catalog.map(str::to_string),
            schema: schema.map(str::to_string),
            table: table.to_string(),
        }
    }
}

/// Anything that can list the tables of a database
pub trait MetadataSource {
    fn table_rows(&mut self) -> Result<Vec<TableRow>, ConnectionError>;
}

/// A catalog and the names it contains, in vendor order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSet {
    name: String,
    items: Vec<String>,
}

/// A schema and the names it contains, in vendor order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaSet {
    name: String,
    items: Vec<String>,
}

impl CatalogSet {
    pub fn new(name: impl Into<String>, items: Vec<String>) -> Self {
        Self { name: name.into(), items }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }
}

impl SchemaSet {
    pub fn new(name: impl Into<String>, items: Vec<String>) -> Self {
        Self { name: name.into(), items }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }
}

/// Group `(container, item)` pairs keeping first-appearance order
fn group<'r, I>(pairs: I) -> Vec<(String, Vec<String>)>
where
    I: Iterator<Item = (&'r str, &'r str)>,
{
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for (container, item) in pairs {
        match groups.iter_mut().find(|(name, _)| name == container) {
            Some((_, items)) => items.push(item.to_string()),
            None => groups.push((container.to_string(), vec![item.to_string()])),
        }
    }
    groups
}

/// Catalogs with their schemas, or their tables when the row has no schema
pub fn catalogs(rows: &[TableRow]) -> Vec<CatalogSet> {
    let pairs = rows.iter().filter_map(|row| {
        let catalog = row.catalog.as_deref()?;
        let item = row.schema.as_deref().unwrap_or(&row.table);
        Some((catalog, item))
    });
    let sets: Vec<CatalogSet> = group(pairs)
        .into_iter()
        .map(|(name, items)| CatalogSet::new(name, items))
        .collect();
    debug!("Grouped {} rows into {} catalogs", rows.len(), sets.len());
    sets
}

/// Schemas with their tables
pub fn schemas(rows: &[TableRow]) -> Vec<SchemaSet> {
    let pairs = rows
        .iter()
        .filter_map(|row| Some((row.schema.as_deref()?, row.table.as_str())));
    let sets: Vec<SchemaSet> = group(pairs)
        .into_iter()
        .map(|(name, items)| SchemaSet::new(name, items))
        .collect();
    debug!("Grouped {} rows into {} schemas", rows.len(), sets.len());
    sets
}

/// Read the table metadata once and group it both ways
pub fn browse(source: &mut dyn MetadataSource) -> Result<(Vec<CatalogSet>, Vec<SchemaSet>), ConnectionError> {
    let rows = source.table_rows()?;
    Ok((catalogs(&rows), schemas(&rows)))
}
