use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Port value meaning "this vendor has no port" (file based or DSN only)
pub const PORT_NOT_APPLICABLE: i32 = -1;

/// Option value that marks an option as deliberately empty
pub const EMPTY_OPTION: &str = "EMPTY";

/// How a connection reaches the database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    /// Driver connection string assembled from host/port/database
    #[default]
    Native,
    /// Pre-configured ODBC data source name
    Odbc,
    /// Named data source looked up through the data source resolver
    Jndi,
}

impl AccessType {
    pub const ALL: [AccessType; 3] = [AccessType::Native, AccessType::Odbc, AccessType::Jndi];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Native => "native",
            AccessType::Odbc => "odbc",
            AccessType::Jndi => "jndi",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = DialectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccessType::ALL
            .into_iter()
            .find(|access| access.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DialectError::InvalidDescriptor(format!("unknown access type '{}'", s)))
    }
}

/// Vendor wire format for geometry columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryEncoding {
    /// PostGIS extended WKB
    Ewkb,
    /// MySQL internal format: SRID prefix + WKB
    Mysql,
    /// GeoPackage binary header + WKB
    Gpkg,
}

/// Vendor record as written in a dialect TOML file.
///
/// Every field except `vendor_key` is optional. Unset scalars and flags are
/// inherited from the `parent` chain when the registry resolves the record.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DialectDescriptor {
    pub vendor_key: String,

    /// Vendor this record specializes
    #[serde(default)]
    pub parent: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub aliases: Vec<String>,

    #[serde(default)]
    pub default_port: Option<i32>,

    #[serde(default)]
    pub reserved_words: Vec<String>,

    /// Regex patterns matched against lowercased connection strings (not inherited)
    #[serde(default)]
    pub connection_patterns: Vec<String>,

    #[serde(default)]
    pub access_types: Option<Vec<AccessType>>,

    /// ODBC driver name used for native access
    #[serde(default)]
    pub driver: Option<String>,

    /// Trivial statement used by the connection probe
    #[serde(default)]
    pub probe_statement: Option<String>,

    #[serde(default)]
    pub capabilities: BTreeMap<String, bool>,

    /// Option maps keyed by access type name
    #[serde(default)]
    pub default_options: BTreeMap<String, BTreeMap<String, String>>,

    #[serde(default)]
    pub sql: SqlOverrides,

    #[serde(default)]
    pub attributes: AttributeOverrides,

    #[serde(default)]
    pub spatial: SpatialOverrides,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SqlOverrides {
    pub start_quote: Option<String>,
    pub end_quote: Option<String>,
    pub option_indicator: Option<String>,
    pub option_separator: Option<String>,
    pub option_value_separator: Option<String>,
}

/// Connection string attribute names for each connection field
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AttributeOverrides {
    pub host: Option<String>,
    pub port: Option<String>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpatialOverrides {
    pub geometry_encoding: Option<GeometryEncoding>,
    pub srid_to_vendor_sql: Option<String>,
    pub srid_to_neutral_sql: Option<String>,
}

impl DialectDescriptor {
    pub fn new(vendor_key: impl Into<String>) -> Self {
        Self {
            vendor_key: vendor_key.into(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_port(mut self, port: i32) -> Self {
        self.default_port = Some(port);
        self
    }

    pub fn with_reserved_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_words.extend(words.into_iter().map(Into::into));
        self
    }

    pub fn with_capability(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.capabilities.insert(name.into(), enabled);
        self
    }

    pub fn with_option(mut self, access: AccessType, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_options
            .entry(access.as_str().to_string())
            .or_default()
            .insert(name.into(), value.into());
        self
    }

    /// Parse a descriptor from TOML text
    pub fn from_toml(source: &str) -> Result<Self, DialectError> {
        let descriptor: DialectDescriptor =
            toml::from_str(source).map_err(|e| DialectError::InvalidDescriptor(e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Structural checks that do not need the rest of the registry
    pub fn validate(&self) -> Result<(), DialectError> {
        if self.vendor_key.trim().is_empty() {
            return Err(DialectError::InvalidDescriptor("vendor_key must not be empty".to_string()));
        }
        for access in self.default_options.keys() {
            access.parse::<AccessType>().map_err(|_| {
                DialectError::InvalidDescriptor(format!(
                    "dialect '{}' declares options for unknown access type '{}'",
                    self.vendor_key, access
                ))
            })?;
        }
        for pattern in &self.connection_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                DialectError::InvalidDescriptor(format!(
                    "dialect '{}' has invalid connection pattern '{}': {}",
                    self.vendor_key, pattern, e
                ))
            })?;
        }
        Ok(())
    }
}

/// Quoting and option syntax of a resolved dialect
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlSyntax {
    pub start_quote: String,
    pub end_quote: String,
    pub option_indicator: String,
    pub option_separator: String,
    pub option_value_separator: String,
}

impl Default for SqlSyntax {
    fn default() -> Self {
        Self {
            start_quote: "\"".to_string(),
            end_quote: "\"".to_string(),
            option_indicator: ";".to_string(),
            option_separator: ";".to_string(),
            option_value_separator: "=".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeKeys {
    pub host: String,
    pub port: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for AttributeKeys {
    fn default() -> Self {
        Self {
            host: "Server".to_string(),
            port: "Port".to_string(),
            database: "Database".to_string(),
            user: "UID".to_string(),
            password: "PWD".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpatialSettings {
    pub geometry_encoding: Option<GeometryEncoding>,
    pub srid_to_vendor_sql: Option<String>,
    pub srid_to_neutral_sql: Option<String>,
}

/// Fully merged dialect produced by the registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dialect {
    pub vendor_key: String,
    /// Vendor keys from this dialect up to the root of its override chain
    pub lineage: Vec<String>,
    pub description: String,
    pub default_port: i32,
    /// Stored uppercased
    pub reserved_words: BTreeSet<String>,
    pub access_types: Vec<AccessType>,
    pub driver: Option<String>,
    pub probe_statement: Option<String>,
    pub capabilities: BTreeMap<String, bool>,
    pub default_options: BTreeMap<String, BTreeMap<String, String>>,
    pub sql: SqlSyntax,
    pub attributes: AttributeKeys,
    pub spatial: SpatialSettings,
}

impl Dialect {
    pub fn name(&self) -> &str {
        &self.vendor_key
    }

    /// True when `vendor` is this dialect or one of its ancestors
    pub fn descends_from(&self, vendor: &str) -> bool {
        self.lineage.iter().any(|key| key == vendor)
    }

    pub fn is_reserved_word(&self, word: &str) -> bool {
        self.reserved_words.contains(&word.to_uppercase())
    }

    /// Capability flag; undeclared capabilities are `false`
    pub fn capability(&self, name: &str) -> bool {
        self.capabilities.get(name).copied().unwrap_or(false)
    }

    pub fn supports_access(&self, access: AccessType) -> bool {
        self.access_types.contains(&access)
    }

    pub fn default_options(&self, access: AccessType) -> BTreeMap<String, String> {
        self.default_options
            .get(access.as_str())
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_default_port(&self) -> bool {
        self.default_port != PORT_NOT_APPLICABLE
    }

    /// Wrap an identifier in the dialect's quotes, doubling embedded end quotes
    pub fn quote_identifier(&self, identifier: &str) -> String {
        let end = &self.sql.end_quote;
        let escaped = identifier.replace(end.as_str(), &format!("{}{}", end, end));
        format!("{}{}{}", self.sql.start_quote, escaped, end)
    }

    /// Quote a field name only when the database would otherwise misread it
    pub fn quote_field(&self, field: &str) -> String {
        if field.is_empty() || self.is_quoted(field) {
            return field.to_string();
        }
        if self.is_reserved_word(field) || needs_quoting(field) {
            self.quote_identifier(field)
        } else {
            field.to_string()
        }
    }

    fn is_quoted(&self, field: &str) -> bool {
        field.len() >= self.sql.start_quote.len() + self.sql.end_quote.len()
            && field.starts_with(self.sql.start_quote.as_str())
            && field.ends_with(self.sql.end_quote.as_str())
    }

    /// A string literal safe for inline SQL
    pub fn quote_sql_string(&self, value: &str) -> String {
        let escaped = value
            .replace('\'', "''")
            .replace('\n', "\\n")
            .replace('\r', "\\r");
        format!("'{}'", escaped)
    }

    pub fn schema_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema.filter(|s| !s.is_empty()) {
            Some(schema) => format!("{}.{}", self.quote_field(schema), self.quote_field(table)),
            None => self.quote_field(table),
        }
    }
}

fn needs_quoting(field: &str) -> bool {
    let starts_with_digit = field.chars().next().is_some_and(|c| c.is_ascii_digit());
    starts_with_digit || field.chars().any(|c| !(c.is_ascii_alphanumeric() || c == '_'))
}

/// Error types for dialect operations
#[derive(Debug, thiserror::Error)]
pub enum DialectError {
    #[error("Unknown vendor: {0}")]
    UnknownVendor(String),

    #[error("Vendor key already registered: {0}")]
    DuplicateVendorKey(String),

    #[error("Cyclic dialect override: {}", .0.join(" -> "))]
    CyclicDialectOverride(Vec<String>),

    #[error("Invalid dialect descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Multiple dialects detected: {0:?}")]
    Ambiguous(Vec<String>),

    #[error("No dialect matches connection string")]
    NotDetected,

    #[error("Dialect '{vendor}' does not support {access} access")]
    UnsupportedAccess { vendor: String, access: AccessType },

    #[error("Failed to read dialect file '{0}': {1}")]
    FileRead(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dialect {
        Dialect {
            vendor_key: "sample".to_string(),
            lineage: vec!["sample".to_string(), "generic".to_string()],
            description: "Sample".to_string(),
            default_port: 1234,
            reserved_words: ["SELECT", "ORDER"].iter().map(|s| s.to_string()).collect(),
            access_types: vec![AccessType::Native],
            driver: None,
            probe_statement: Some("SELECT 1".to_string()),
            capabilities: BTreeMap::from([("supports_schemas".to_string(), true)]),
            default_options: BTreeMap::new(),
            sql: SqlSyntax::default(),
            attributes: AttributeKeys::default(),
            spatial: SpatialSettings::default(),
        }
    }

    #[test]
    fn test_reserved_words_are_case_insensitive() {
        let dialect = sample();
        assert!(dialect.is_reserved_word("select"));
        assert!(dialect.is_reserved_word("Order"));
        assert!(!dialect.is_reserved_word("customer"));
    }

    #[test]
    fn test_quote_field_only_when_needed() {
        let dialect = sample();
        assert_eq!(dialect.quote_field("customer_id"), "customer_id");
        assert_eq!(dialect.quote_field("order"), "\"order\"");
        assert_eq!(dialect.quote_field("first name"), "\"first name\"");
        assert_eq!(dialect.quote_field("1st"), "\"1st\"");
        assert_eq!(dialect.quote_field("\"already\""), "\"already\"");
    }

    #[test]
    fn test_quote_identifier_escapes_end_quote() {
        let dialect = sample();
        assert_eq!(dialect.quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_quote_sql_string() {
        let dialect = sample();
        assert_eq!(dialect.quote_sql_string("it's\nhere"), "'it''s\\nhere'");
    }

    #[test]
    fn test_schema_table() {
        let dialect = sample();
        assert_eq!(dialect.schema_table(Some("sales"), "order"), "sales.\"order\"");
        assert_eq!(dialect.schema_table(None, "orders"), "orders");
        assert_eq!(dialect.schema_table(Some(""), "orders"), "orders");
    }

    #[test]
    fn test_undeclared_capability_is_false() {
        let dialect = sample();
        assert!(dialect.capability("supports_schemas"));
        assert!(!dialect.capability("supports_sequences"));
    }

    #[test]
    fn test_access_type_parse() {
        assert_eq!("ODBC".parse::<AccessType>().unwrap(), AccessType::Odbc);
        assert!("oci".parse::<AccessType>().is_err());
    }

    #[test]
    fn test_descriptor_from_toml() {
        let descriptor = DialectDescriptor::from_toml(
            r#"
vendor_key = "custom"
parent = "postgresql"
reserved_words = ["WINDOW"]

[capabilities]
supports_sequences = false

[default_options.native]
sslmode = "require"
"#,
        )
        .unwrap();
        assert_eq!(descriptor.parent.as_deref(), Some("postgresql"));
        assert_eq!(descriptor.default_port, None);
        assert_eq!(descriptor.capabilities.get("supports_sequences"), Some(&false));
    }

    #[test]
    fn test_descriptor_rejects_unknown_access_options() {
        let result = DialectDescriptor::from_toml(
            r#"
vendor_key = "custom"
[default_options.oci]
x = "y"
"#,
        );
        assert!(matches!(result, Err(DialectError::InvalidDescriptor(_))));
    }
}
