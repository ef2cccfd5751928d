use crate::dialects::base::{
    AccessType, AttributeKeys, Dialect, DialectDescriptor, DialectError, SpatialSettings, SqlSyntax,
    PORT_NOT_APPLICABLE,
};
use log::{debug, warn};
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Central registry for all available database dialects
pub struct DialectRegistry {
    descriptors: HashMap<String, DialectDescriptor>,
    aliases: HashMap<String, String>, // alias -> vendor_key mapping
    resolved: RwLock<HashMap<String, Arc<Dialect>>>,
}

impl DialectRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
            aliases: HashMap::new(),
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Registry holding every built-in vendor
    pub fn with_builtins() -> Result<Self, DialectError> {
        let mut registry = Self::new();
        for descriptor in crate::dialects::builtin::descriptors()? {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Register a vendor descriptor.
    ///
    /// Parents do not have to be registered yet; a missing parent only
    /// surfaces when the child is resolved. A descriptor that would close a
    /// parent cycle is rejected here.
    pub fn register(&mut self, descriptor: DialectDescriptor) -> Result<(), DialectError> {
        descriptor.validate()?;
        let key = descriptor.vendor_key.clone();
        debug!("Registering dialect: {}", key);

        if self.canonical_key(&key).is_some() {
            return Err(DialectError::DuplicateVendorKey(key));
        }
        for alias in &descriptor.aliases {
            if alias == &key || self.canonical_key(alias).is_some() {
                return Err(DialectError::DuplicateVendorKey(alias.clone()));
            }
        }

        self.check_for_cycle(&descriptor)?;

        for alias in &descriptor.aliases {
            self.aliases.insert(alias.clone(), key.clone());
        }
        self.descriptors.insert(key, descriptor);
        Ok(())
    }

    /// Parse a TOML descriptor file and register it
    pub fn register_file(&mut self, path: &Path) -> Result<String, DialectError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| DialectError::FileRead(path.display().to_string(), e.to_string()))?;
        let descriptor = DialectDescriptor::from_toml(&source)?;
        let key = descriptor.vendor_key.clone();
        self.register(descriptor)?;
        Ok(key)
    }

    fn check_for_cycle(&self, descriptor: &DialectDescriptor) -> Result<(), DialectError> {
        let mut path = vec![descriptor.vendor_key.clone()];
        let mut seen: HashSet<String> = HashSet::from([descriptor.vendor_key.clone()]);
        let mut parent = descriptor.parent.clone();

        while let Some(name) = parent {
            // The new descriptor's aliases are not in the alias table yet
            let key = if descriptor.aliases.contains(&name) {
                descriptor.vendor_key.clone()
            } else {
                self.canonical_key(&name).map(str::to_string).unwrap_or(name)
            };
            path.push(key.clone());
            if !seen.insert(key.clone()) {
                return Err(DialectError::CyclicDialectOverride(path));
            }
            parent = self.descriptors.get(&key).and_then(|d| d.parent.clone());
        }
        Ok(())
    }

    /// Map a vendor key or alias to the registered vendor key
    pub fn canonical_key(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.descriptors.get_key_value(name) {
            return Some(key.as_str());
        }
        self.aliases.get(name).map(String::as_str)
    }

    pub fn descriptor(&self, name: &str) -> Option<&DialectDescriptor> {
        self.canonical_key(name).and_then(|key| self.descriptors.get(key))
    }

    /// Resolve a vendor key (or alias) to its fully merged dialect
    pub fn resolve(&self, name: &str) -> Result<Arc<Dialect>, DialectError> {
        let key = self
            .canonical_key(name)
            .ok_or_else(|| DialectError::UnknownVendor(name.to_string()))?;

        if let Some(dialect) = self.cache_read().get(key) {
            return Ok(dialect.clone());
        }

        let chain = self.chain(key)?;
        let merged = Arc::new(merge_chain(&chain));

        // First publication wins so concurrent resolvers share one value
        let mut cache = self
            .resolved
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let published = cache.entry(key.to_string()).or_insert(merged);
        Ok(published.clone())
    }

    fn cache_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Dialect>>> {
        self.resolved.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Descriptors from `key` up to the root, child first
    fn chain(&self, key: &str) -> Result<Vec<&DialectDescriptor>, DialectError> {
        let mut chain = Vec::new();
        let mut path: Vec<String> = Vec::new();
        let mut current = Some(key.to_string());

        while let Some(name) = current {
            let canonical = self.canonical_key(&name).ok_or_else(|| {
                DialectError::UnknownVendor(match path.last() {
                    Some(child) => format!("{} (parent of {})", name, child),
                    None => name.clone(),
                })
            })?;
            if path.iter().any(|seen| seen == canonical) {
                path.push(canonical.to_string());
                return Err(DialectError::CyclicDialectOverride(path));
            }
            path.push(canonical.to_string());

            let descriptor = &self.descriptors[canonical];
            chain.push(descriptor);
            current = descriptor.parent.clone();
        }
        Ok(chain)
    }

    /// Detect the dialect of a connection string from declared patterns
    pub fn detect(&self, connection_string: &str) -> Result<Arc<Dialect>, DialectError> {
        let lowered = connection_string.to_lowercase();
        debug!("Detecting dialect for connection string (length: {})", connection_string.len());

        let mut matches: Vec<(&str, usize)> = Vec::new();
        for (key, descriptor) in &self.descriptors {
            let best = descriptor
                .connection_patterns
                .iter()
                .filter_map(|pattern| Regex::new(pattern).ok())
                .filter_map(|re| re.find(&lowered).map(|m| m.as_str().len()))
                .max();
            if let Some(length) = best {
                debug!("Dialect '{}' matched with pattern length {}", key, length);
                matches.push((key.as_str(), length));
            }
        }

        // Longest match is the most specific one
        matches.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        match matches.as_slice() {
            [] => {
                warn!("No dialect detected for connection string");
                Err(DialectError::NotDetected)
            }
            [(first, len), (_, next_len), ..] if len == next_len => {
                let names = matches
                    .iter()
                    .filter(|(_, l)| l == len)
                    .map(|(name, _)| name.to_string())
                    .collect();
                debug!("Detection ambiguous, best candidate was {}", first);
                Err(DialectError::Ambiguous(names))
            }
            [(first, _), ..] => self.resolve(first),
        }
    }

    /// List all registered vendor keys, sorted
    pub fn list_dialects(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.descriptors.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Get all aliases for a dialect
    pub fn get_aliases(&self, vendor_key: &str) -> Vec<String> {
        let mut aliases: Vec<String> = self
            .aliases
            .iter()
            .filter(|(_, key)| *key == vendor_key)
            .map(|(alias, _)| alias.clone())
            .collect();
        aliases.sort();
        aliases
    }
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fold a child-first chain from the root down, the child winning each key
pub fn merge_chain(chain: &[&DialectDescriptor]) -> Dialect {
    let lineage: Vec<String> = chain.iter().map(|d| d.vendor_key.clone()).collect();
    let mut dialect = Dialect {
        vendor_key: lineage.first().cloned().unwrap_or_default(),
        lineage,
        description: String::new(),
        default_port: PORT_NOT_APPLICABLE,
        reserved_words: BTreeSet::new(),
        access_types: AccessType::ALL.to_vec(),
        driver: None,
        probe_statement: None,
        capabilities: Default::default(),
        default_options: Default::default(),
        sql: SqlSyntax::default(),
        attributes: AttributeKeys::default(),
        spatial: SpatialSettings::default(),
    };

    for descriptor in chain.iter().rev() {
        dialect
            .reserved_words
            .extend(descriptor.reserved_words.iter().map(|w| w.to_uppercase()));
        for (name, enabled) in &descriptor.capabilities {
            dialect.capabilities.insert(name.clone(), *enabled);
        }
        for (access, options) in &descriptor.default_options {
            let merged = dialect.default_options.entry(access.clone()).or_default();
            for (name, value) in options {
                merged.insert(name.clone(), value.clone());
            }
        }

        override_with(&mut dialect.description, &descriptor.description);
        if let Some(port) = descriptor.default_port {
            dialect.default_port = port;
        }
        if let Some(access_types) = &descriptor.access_types {
            dialect.access_types = access_types.clone();
        }
        if descriptor.driver.is_some() {
            dialect.driver = descriptor.driver.clone();
        }
        if descriptor.probe_statement.is_some() {
            dialect.probe_statement = descriptor.probe_statement.clone();
        }

        let sql = &descriptor.sql;
        override_with(&mut dialect.sql.start_quote, &sql.start_quote);
        override_with(&mut dialect.sql.end_quote, &sql.end_quote);
        override_with(&mut dialect.sql.option_indicator, &sql.option_indicator);
        override_with(&mut dialect.sql.option_separator, &sql.option_separator);
        override_with(&mut dialect.sql.option_value_separator, &sql.option_value_separator);

        let attributes = &descriptor.attributes;
        override_with(&mut dialect.attributes.host, &attributes.host);
        override_with(&mut dialect.attributes.port, &attributes.port);
        override_with(&mut dialect.attributes.database, &attributes.database);
        override_with(&mut dialect.attributes.user, &attributes.user);
        override_with(&mut dialect.attributes.password, &attributes.password);

        let spatial = &descriptor.spatial;
        if spatial.geometry_encoding.is_some() {
            dialect.spatial.geometry_encoding = spatial.geometry_encoding;
        }
        if spatial.srid_to_vendor_sql.is_some() {
            dialect.spatial.srid_to_vendor_sql = spatial.srid_to_vendor_sql.clone();
        }
        if spatial.srid_to_neutral_sql.is_some() {
            dialect.spatial.srid_to_neutral_sql = spatial.srid_to_neutral_sql.clone();
        }
    }

    if dialect.description.is_empty() {
        dialect.description = dialect.vendor_key.clone();
    }
    dialect
}

fn override_with(target: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}
