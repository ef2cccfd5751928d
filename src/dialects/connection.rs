use crate::datasource::DataSourceKind;
use crate::dialects::base::{AccessType, Dialect, DialectError, EMPTY_OPTION};
use log::{debug, warn};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Everything needed to reach one database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    /// Display name of the connection
    #[serde(default)]
    pub name: String,

    pub vendor: String,

    #[serde(default = "default_access")]
    pub access: AccessType,

    #[serde(default)]
    pub host: Option<String>,

    /// Falls back to the dialect default port when unset
    #[serde(default)]
    pub port: Option<String>,

    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// ODBC data source name for `odbc` access
    #[serde(default)]
    pub dsn: Option<String>,

    /// Named data source for `jndi` access
    #[serde(default)]
    pub datasource: Option<String>,

    /// Whether the named data source is a directory entry or a pool
    #[serde(default)]
    pub datasource_kind: DataSourceKind,

    /// Options keyed `vendor.option`
    #[serde(default)]
    pub extra_options: BTreeMap<String, String>,
}

fn default_access() -> AccessType {
    AccessType::Native
}

impl ConnectionSpec {
    pub fn new(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            access: AccessType::Native,
            ..Default::default()
        }
    }

    /// Add an option for `vendor` (the connection's vendor or one of its ancestors)
    pub fn add_extra_option(&mut self, vendor: &str, option: &str, value: &str) {
        self.extra_options
            .insert(format!("{}.{}", vendor, option), value.to_string());
    }

    /// Scope string used to key per-target caches
    pub fn target(&self) -> String {
        match self.access {
            AccessType::Jndi => format!("jndi:{}", self.datasource.as_deref().unwrap_or_default()),
            AccessType::Odbc => format!("dsn:{}", self.dsn.as_deref().unwrap_or_default()),
            AccessType::Native => format!(
                "{}:{}/{}",
                self.host.as_deref().unwrap_or_default(),
                self.port.as_deref().unwrap_or_default(),
                self.database.as_deref().unwrap_or_default()
            ),
        }
    }

    /// Port to connect to: the explicit one or the dialect default
    pub fn effective_port(&self, dialect: &Dialect) -> Option<String> {
        match self.port.as_deref().map(substitute_env).filter(|p| !p.is_empty()) {
            Some(port) => Some(port),
            None if dialect.has_default_port() => Some(dialect.default_port.to_string()),
            None => None,
        }
    }

    /// Options that apply to this connection: dialect defaults for the
    /// access type, then extra options of this vendor or any ancestor.
    pub fn effective_options(&self, dialect: &Dialect) -> BTreeMap<String, String> {
        let mut options = dialect.default_options(self.access);

        // Ancestors first so the most specific vendor wins a shared option
        for vendor in dialect.lineage.iter().rev() {
            for (key, value) in &self.extra_options {
                let Some((option_vendor, option)) = key.split_once('.') else {
                    debug!("Ignoring extra option without vendor prefix: {}", key);
                    continue;
                };
                if option_vendor == vendor {
                    options.insert(option.to_string(), value.clone());
                }
            }
        }

        for key in self.extra_options.keys() {
            if let Some((option_vendor, _)) = key.split_once('.') {
                if !dialect.descends_from(option_vendor) {
                    debug!("Extra option '{}' does not apply to dialect '{}'", key, dialect.vendor_key);
                }
            }
        }

        options.retain(|_, value| !value.is_empty() && value != EMPTY_OPTION);
        options
            .into_iter()
            .map(|(key, value)| (substitute_env(&key), substitute_env(&value)))
            .collect()
    }

    /// Build the ODBC connection string for native or DSN access
    pub fn connection_string(&self, dialect: &Dialect) -> Result<String, DialectError> {
        if !dialect.supports_access(self.access) {
            return Err(DialectError::UnsupportedAccess {
                vendor: dialect.vendor_key.clone(),
                access: self.access,
            });
        }

        let keys = &dialect.attributes;
        let mut parts: Vec<String> = Vec::new();

        match self.access {
            AccessType::Native => {
                let driver = dialect.driver.as_deref().ok_or_else(|| {
                    DialectError::InvalidDescriptor(format!(
                        "dialect '{}' declares no ODBC driver for native access",
                        dialect.vendor_key
                    ))
                })?;
                parts.push(format!("Driver={{{}}}", driver));
                push_attribute(&mut parts, &keys.host, self.host.as_deref());
                if let Some(port) = self.effective_port(dialect) {
                    parts.push(format!("{}={}", keys.port, port));
                }
                push_attribute(&mut parts, &keys.database, self.database.as_deref());
            }
            AccessType::Odbc => {
                let dsn = self.dsn.as_deref().or(self.database.as_deref()).ok_or_else(|| {
                    DialectError::InvalidDescriptor("odbc access needs a DSN".to_string())
                })?;
                parts.push(format!("DSN={}", substitute_env(dsn)));
            }
            AccessType::Jndi => {
                warn!("Connection '{}' uses a named data source; resolve it first", self.name);
                return Err(DialectError::UnsupportedAccess {
                    vendor: dialect.vendor_key.clone(),
                    access: self.access,
                });
            }
        }

        push_attribute(&mut parts, &keys.user, self.username.as_deref());
        push_attribute(&mut parts, &keys.password, self.password.as_deref());

        let base = parts.join(";");
        Ok(append_options(&base, &self.effective_options(dialect), dialect))
    }
}

fn push_attribute(parts: &mut Vec<String>, key: &str, value: Option<&str>) {
    if let Some(value) = value.map(substitute_env).filter(|v| !v.is_empty()) {
        parts.push(format!("{}={}", key, value));
    }
}

/// Append options using the dialect's indicator and separators
pub fn append_options(base: &str, options: &BTreeMap<String, String>, dialect: &Dialect) -> String {
    let syntax = &dialect.sql;
    let mut result = base.to_string();
    for (index, (name, value)) in options.iter().enumerate() {
        if index == 0 && !base.contains(syntax.option_value_separator.as_str()) {
            result.push_str(&syntax.option_indicator);
        } else {
            result.push_str(&syntax.option_separator);
        }
        result.push_str(name);
        result.push_str(&syntax.option_value_separator);
        result.push_str(value);
    }
    result
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.]*)\}").expect("valid pattern"))
}

/// Replace `${NAME}` with the environment value; unknown names stay as written
pub fn substitute_env(value: &str) -> String {
    env_pattern()
        .replace_all(value, |caps: &Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialects::{DialectDescriptor, DialectRegistry};
    use std::sync::Arc;

    fn registry() -> DialectRegistry {
        DialectRegistry::with_builtins().unwrap()
    }

    fn dialect(key: &str) -> Arc<Dialect> {
        registry().resolve(key).unwrap()
    }

    #[test]
    fn test_native_connection_string_uses_default_port() {
        let mut spec = ConnectionSpec::new("postgresql");
        spec.host = Some("db.local".to_string());
        spec.database = Some("sales".to_string());
        spec.username = Some("etl".to_string());

        let conn = spec.connection_string(&dialect("postgresql")).unwrap();
        assert_eq!(
            conn,
            "Driver={PostgreSQL Unicode};Server=db.local;Port=5432;Database=sales;UID=etl;sslmode=prefer"
        );
    }

    #[test]
    fn test_ancestor_options_apply_to_descendant() {
        let mut spec = ConnectionSpec::new("greenplum");
        spec.host = Some("gp".to_string());
        spec.add_extra_option("postgresql", "sslmode", "disable");
        spec.add_extra_option("greenplum", "ApplicationName", "etl");
        spec.add_extra_option("mysql", "OPTION", "3");

        let options = spec.effective_options(&dialect("greenplum"));
        assert_eq!(options.get("sslmode").map(String::as_str), Some("disable"));
        assert_eq!(options.get("ApplicationName").map(String::as_str), Some("etl"));
        assert!(!options.contains_key("OPTION"));
    }

    #[test]
    fn test_most_specific_vendor_option_wins() {
        let mut spec = ConnectionSpec::new("greenplum");
        spec.add_extra_option("postgresql", "sslmode", "disable");
        spec.add_extra_option("greenplum", "sslmode", "verify-full");
        let options = spec.effective_options(&dialect("greenplum"));
        assert_eq!(options.get("sslmode").map(String::as_str), Some("verify-full"));
    }

    #[test]
    fn test_empty_options_are_skipped() {
        let mut spec = ConnectionSpec::new("postgresql");
        spec.add_extra_option("postgresql", "sslmode", EMPTY_OPTION);
        spec.add_extra_option("postgresql", "connect_timeout", "");
        assert!(spec.effective_options(&dialect("postgresql")).is_empty());
    }

    #[test]
    fn test_no_port_when_not_applicable() {
        let mut spec = ConnectionSpec::new("sqlite");
        spec.database = Some("/data/world.gpkg".to_string());
        let conn = spec.connection_string(&dialect("sqlite")).unwrap();
        assert_eq!(conn, "Driver={SQLite3};Database=/data/world.gpkg");
    }

    #[test]
    fn test_dsn_access() {
        let mut spec = ConnectionSpec::new("mysql");
        spec.access = AccessType::Odbc;
        spec.dsn = Some("warehouse".to_string());
        spec.username = Some("root".to_string());
        let conn = spec.connection_string(&dialect("mysql")).unwrap();
        assert!(conn.starts_with("DSN=warehouse;UID=root"));
    }

    #[test]
    fn test_unsupported_access_rejected() {
        let mut spec = ConnectionSpec::new("sqlite");
        spec.access = AccessType::Jndi;
        let result = spec.connection_string(&dialect("sqlite"));
        assert!(matches!(result, Err(DialectError::UnsupportedAccess { .. })));
    }

    #[test]
    fn test_option_indicator_used_when_base_has_no_values() {
        let mut registry = DialectRegistry::new();
        let mut descriptor = DialectDescriptor::new("urlish");
        descriptor.sql.option_indicator = Some("?".to_string());
        descriptor.sql.option_separator = Some("&".to_string());
        registry.register(descriptor).unwrap();
        let dialect = registry.resolve("urlish").unwrap();

        let options = BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        assert_eq!(append_options("db://host/x", &options, &dialect), "db://host/x?a=1&b=2");
        assert_eq!(append_options("k=v", &options, &dialect), "k=v&a=1&b=2");
    }

    #[test]
    fn test_substitute_env_leaves_unknown() {
        assert_eq!(
            substitute_env("${DBDIALECT_SURELY_UNSET_VAR}/x"),
            "${DBDIALECT_SURELY_UNSET_VAR}/x"
        );
        let path = std::env::var("PATH").unwrap_or_default();
        assert_eq!(substitute_env("${PATH}"), path);
    }
}
