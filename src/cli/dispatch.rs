use crate::catalog;
use crate::cli::args::{Cli, Commands, ConnectionArgs, OutputFormat};
use crate::datasource::{DataSourceHandle, NamedDataSourceProvider, NamingError};
use crate::dialects::{AccessType, ConnectionSpec, Dialect, DialectError, DialectRegistry};
use crate::executor::{ConnectionError, ConnectionManager, DatabaseExecutor};
use crate::logger::setup_logger;
use crate::model::{Config, ConfigError};
use crate::probe::{ConnectionTester, Connector, UnavailableConnector};
use crate::spatial::{ConnectionIdentity, SpatialCacheRegistry, SpatialError, SqlSridLookup, SridLookup};
use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Dialect(#[from] DialectError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Spatial(#[from] SpatialError),

    #[error("Invalid arguments: {0}")]
    Usage(String),

    #[error("Failed to render output: {0}")]
    Render(String),

    #[error("Connection test failed")]
    TestFailed,
}

pub fn handle(cli: Cli) {
    let loaded = Config::load(cli.config.as_deref(), cli.env.as_deref());
    let logging = loaded.as_ref().map(|c| c.logging.clone()).unwrap_or_default();
    setup_logger(cli.verbose, &logging);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    debug!("Loaded configuration: {:?}", config);

    if let Err(e) = run(cli.command, &config) {
        match e {
            // The report was already printed
            CommandError::TestFailed => {}
            other => error!("{}", other),
        }
        std::process::exit(1);
    }
}

pub fn run(command: Commands, config: &Config) -> Result<(), CommandError> {
    match command {
        Commands::Dialects => {
            info!("Running DIALECTS command");
            let registry = build_registry(config)?;
            for line in dialect_listing(&registry)? {
                println!("{}", line);
            }
        }

        Commands::Show { vendor, format } => {
            info!("Running SHOW command");
            let registry = build_registry(config)?;
            let dialect = registry.resolve(&vendor)?;
            match format {
                OutputFormat::Text => print!("{}", describe_dialect(&dialect)),
                OutputFormat::Toml => {
                    let text = toml::to_string_pretty(dialect.as_ref())
                        .map_err(|e| CommandError::Render(e.to_string()))?;
                    print!("{}", text);
                }
            }
        }

        Commands::Detect { connection_string } => {
            info!("Running DETECT command");
            let registry = build_registry(config)?;
            let dialect = registry.detect(&connection_string)?;
            println!("{}", dialect.vendor_key);
        }

        Commands::ConnString { connection } => {
            info!("Running CONN-STRING command");
            let registry = build_registry(config)?;
            let spec = connection_spec(&connection, config)?;
            let dialect = registry.resolve(&spec.vendor)?;
            println!("{}", resolve_connection_string(&spec, &dialect, config)?);
        }

        Commands::Test {
            connection,
            timeout,
            format,
        } => {
            info!("Running TEST command");
            let registry = build_registry(config)?;
            let spec = connection_spec(&connection, config)?;
            let data_sources = config.data_sources();

            let connector: Arc<dyn Connector> = match ConnectionManager::new() {
                Ok(manager) => Arc::new(manager),
                Err(e) => {
                    warn!("ODBC environment unavailable: {}", e);
                    Arc::new(UnavailableConnector::new(e.to_string()))
                }
            };
            let mut tester = ConnectionTester::new(&registry, connector).with_data_sources(&data_sources);
            let timeout = match timeout {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => config.probe.timeout(),
            };
            if let Some(timeout) = timeout {
                tester = tester.with_timeout(timeout);
            }

            let report = tester.test(&spec)?;
            match format {
                OutputFormat::Text => print!("{}", report.report_text()),
                OutputFormat::Toml => {
                    let text = toml::to_string_pretty(&report)
                        .map_err(|e| CommandError::Render(e.to_string()))?;
                    print!("{}", text);
                }
            }
            if !report.success() {
                return Err(CommandError::TestFailed);
            }
        }

        Commands::Srid {
            connection,
            neutral,
            vendor_srid,
        } => {
            info!("Running SRID command");
            let registry = build_registry(config)?;
            let spec = connection_spec(&connection, config)?;
            let dialect = registry.resolve(&spec.vendor)?;

            let manager = ConnectionManager::new()?;
            let executor = open_executor(&spec, &dialect, config, &manager)?;
            let lookup = SqlSridLookup::for_dialect(&dialect, Box::new(executor))?;
            let caches = SpatialCacheRegistry::new();
            let identity = ConnectionIdentity::new(dialect.vendor_key.clone(), spec.target());
            let cache = caches.cache_for(&identity);

            match (neutral, vendor_srid) {
                (Some(neutral), _) => {
                    let vendor = cache.to_vendor_srid(neutral, |srid| lookup.vendor_srid(srid))?;
                    println!("{} -> {}", neutral, vendor);
                }
                (None, Some(vendor)) => {
                    let neutral = cache.to_neutral_srid(vendor, |srid| lookup.neutral_srid(srid))?;
                    println!("{} -> {}", vendor, neutral);
                }
                (None, None) => {
                    return Err(CommandError::Usage("pass --neutral or --vendor-srid".to_string()));
                }
            }
            caches.close(&identity);
        }

        Commands::Catalog { connection } => {
            info!("Running CATALOG command");
            let registry = build_registry(config)?;
            let spec = connection_spec(&connection, config)?;
            let dialect = registry.resolve(&spec.vendor)?;

            let manager = ConnectionManager::new()?;
            let mut executor = open_executor(&spec, &dialect, config, &manager)?;
            let (catalogs, schemas) = catalog::browse(&mut executor)?;

            if dialect.capability("supports_catalogs") {
                for set in &catalogs {
                    println!("catalog {} ({} entries)", set.name(), set.items().len());
                }
            }
            for set in &schemas {
                println!("schema {}", set.name());
                for item in set.items() {
                    println!("  {}", item);
                }
            }
        }

        Commands::Config { output, env } => {
            info!("Running CONFIG command");
            debug!("Output path: {}", output);

            Config::generate_default_config(&output)?;
            info!("Generated default configuration file: {}", output);
            if let Some(env_name) = env {
                let env_path = format!("config/{}.toml", env_name);
                std::fs::create_dir_all("config")
                    .map_err(|e| ConfigError::FileWrite("config".to_string(), e.to_string()))?;
                Config::generate_default_config(&env_path)?;
                info!("Generated environment configuration file: {}", env_path);
            }
        }
    }
    Ok(())
}

/// Built-in dialects plus the configured plugin descriptors
pub fn build_registry(config: &Config) -> Result<DialectRegistry, DialectError> {
    let mut registry = DialectRegistry::with_builtins()?;
    for path in &config.dialects.plugin_paths {
        let key = registry.register_file(Path::new(path))?;
        info!("Registered plugin dialect '{}' from {}", key, path);
    }
    Ok(registry)
}

fn dialect_listing(registry: &DialectRegistry) -> Result<Vec<String>, DialectError> {
    let mut lines = Vec::new();
    for key in registry.list_dialects() {
        let dialect = registry.resolve(&key)?;
        let mut line = format!("{:<12} {}", key, dialect.description);
        if let Some(parent) = dialect.lineage.get(1) {
            line.push_str(&format!(" [extends {}]", parent));
        }
        let aliases = registry.get_aliases(&key);
        if !aliases.is_empty() {
            line.push_str(&format!(" (aliases: {})", aliases.join(", ")));
        }
        lines.push(line);
    }
    Ok(lines)
}

fn describe_dialect(dialect: &Dialect) -> String {
    let access: Vec<&str> = dialect.access_types.iter().map(|a| a.as_str()).collect();
    let port = if dialect.has_default_port() {
        dialect.default_port.to_string()
    } else {
        "n/a".to_string()
    };
    let encoding = dialect
        .spatial
        .geometry_encoding
        .map(|e| format!("{:?}", e).to_lowercase())
        .unwrap_or_else(|| "none".to_string());

    let mut text = String::new();
    text.push_str(&format!("Vendor         : {}\n", dialect.vendor_key));
    text.push_str(&format!("Description    : {}\n", dialect.description));
    text.push_str(&format!("Lineage        : {}\n", dialect.lineage.join(" -> ")));
    text.push_str(&format!("Default port   : {}\n", port));
    text.push_str(&format!("Driver         : {}\n", dialect.driver.as_deref().unwrap_or("none")));
    text.push_str(&format!("Probe          : {}\n", dialect.probe_statement.as_deref().unwrap_or("open only")));
    text.push_str(&format!("Access         : {}\n", access.join(", ")));
    text.push_str(&format!("Quotes         : {}{}\n", dialect.sql.start_quote, dialect.sql.end_quote));
    text.push_str(&format!("Geometry       : {}\n", encoding));
    text.push_str(&format!("Reserved words : {}\n", dialect.reserved_words.len()));
    text.push_str("Capabilities   :\n");
    for (name, enabled) in &dialect.capabilities {
        text.push_str(&format!("  {} = {}\n", name, enabled));
    }
    text
}

/// Config `[connection]` (or the default vendor) overlaid with command line flags
pub fn connection_spec(args: &ConnectionArgs, config: &Config) -> Result<ConnectionSpec, CommandError> {
    let mut spec = config
        .connection
        .clone()
        .unwrap_or_else(|| ConnectionSpec::new(config.dialects.default_vendor.clone()));

    if let Some(vendor) = &args.vendor {
        spec.vendor = vendor.clone();
    }
    if let Some(access) = args.access {
        spec.access = access;
    }
    let overlay = [
        (&mut spec.host, &args.host),
        (&mut spec.port, &args.port),
        (&mut spec.database, &args.database),
        (&mut spec.username, &args.user),
        (&mut spec.password, &args.password),
        (&mut spec.dsn, &args.dsn),
        (&mut spec.datasource, &args.datasource),
    ];
    for (field, value) in overlay {
        if value.is_some() {
            field.clone_from(value);
        }
    }
    if let Some(kind) = args.datasource_kind {
        spec.datasource_kind = kind;
    }

    for option in &args.options {
        let (key, value) = option
            .split_once('=')
            .ok_or_else(|| CommandError::Usage(format!("option '{}' is not vendor.option=value", option)))?;
        let (vendor, name) = key
            .split_once('.')
            .ok_or_else(|| CommandError::Usage(format!("option '{}' has no vendor prefix", key)))?;
        spec.add_extra_option(vendor, name, value);
    }

    Ok(spec)
}

/// Open a connection for any access type; jndi goes through the named data source
fn open_executor(
    spec: &ConnectionSpec,
    dialect: &Dialect,
    config: &Config,
    manager: &ConnectionManager,
) -> Result<DatabaseExecutor<'static>, CommandError> {
    let connection = match spec.access {
        AccessType::Jndi => data_source_handle(spec, dialect, config)?.connect(manager)?,
        AccessType::Native | AccessType::Odbc => manager.connect(&spec.connection_string(dialect)?)?,
    };
    Ok(DatabaseExecutor::new(connection))
}

fn data_source_handle(
    spec: &ConnectionSpec,
    dialect: &Dialect,
    config: &Config,
) -> Result<DataSourceHandle, CommandError> {
    if !dialect.supports_access(AccessType::Jndi) {
        return Err(DialectError::UnsupportedAccess {
            vendor: dialect.vendor_key.clone(),
            access: AccessType::Jndi,
        }
        .into());
    }
    let name = spec
        .datasource
        .as_deref()
        .ok_or_else(|| CommandError::Usage("jndi access needs --datasource".to_string()))?;
    Ok(config
        .data_sources()
        .get_named_data_source_typed(name, spec.datasource_kind)?)
}

/// Connection string for any access type, looking up named data sources for jndi
fn resolve_connection_string(
    spec: &ConnectionSpec,
    dialect: &Dialect,
    config: &Config,
) -> Result<String, CommandError> {
    match spec.access {
        AccessType::Jndi => Ok(data_source_handle(spec, dialect, config)?.connection_string),
        AccessType::Native | AccessType::Odbc => Ok(spec.connection_string(dialect)?),
    }
}
