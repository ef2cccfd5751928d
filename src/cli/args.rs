use crate::datasource::DataSourceKind;
use crate::dialects::AccessType;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// CLI entry point for dbdialect
#[derive(Parser, Debug)]
#[command(
    name = "dbdialect",
    version,
    about = "Database dialect registry, connection probes and SRID lookups over ODBC"
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Environment (loads config/{env}.toml)
    #[arg(long, global = true)]
    pub env: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Toml,
}

/// Connection parameters; unset values come from the `[connection]` config section
#[derive(Args, Debug, Default, Clone)]
pub struct ConnectionArgs {
    /// Vendor key or alias
    #[arg(long)]
    pub vendor: Option<String>,

    /// How to reach the database
    #[arg(long, value_parser = parse_access)]
    pub access: Option<AccessType>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<String>,

    #[arg(long)]
    pub database: Option<String>,

    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    /// ODBC data source name for odbc access
    #[arg(long)]
    pub dsn: Option<String>,

    /// Named data source for jndi access
    #[arg(long)]
    pub datasource: Option<String>,

    /// Kind of the named data source (directory or pooled)
    #[arg(long, value_enum)]
    pub datasource_kind: Option<DataSourceKind>,

    /// Extra option as vendor.option=value (repeatable)
    #[arg(long = "option", value_name = "VENDOR.OPTION=VALUE")]
    pub options: Vec<String>,
}

fn parse_access(value: &str) -> Result<AccessType, String> {
    value.parse().map_err(|e: crate::dialects::DialectError| e.to_string())
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered dialects
    Dialects,

    /// Show the merged settings of one dialect
    Show {
        /// Vendor key or alias
        vendor: String,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Find the dialect for a connection string
    Detect {
        connection_string: String,
    },

    /// Print the ODBC connection string for a connection
    ConnString {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Open a connection and run the dialect's probe statement
    Test {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Seconds before giving up; overrides [probe] timeout_secs
        #[arg(long)]
        timeout: Option<u64>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Translate an SRID through the database's spatial reference table
    Srid {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Neutral (EPSG) SRID to translate to the vendor SRID
        #[arg(long, conflicts_with = "vendor_srid", required_unless_present = "vendor_srid")]
        neutral: Option<i32>,

        /// Vendor SRID to translate to the neutral SRID
        #[arg(long)]
        vendor_srid: Option<i32>,
    },

    /// List catalogs and schemas of a database
    Catalog {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Generate configuration file
    Config {
        /// Output path for config file
        #[arg(long, default_value = "config.toml")]
        output: String,

        /// Create environment-specific config
        #[arg(long)]
        env: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_help() {
        let result = Cli::try_parse_from(["dbdialect", "--help"]);
        assert!(result.is_err()); // Help exits with error
    }

    #[test]
    fn test_cli_version() {
        let result = Cli::try_parse_from(["dbdialect", "--version"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_show_command_defaults() {
        let cli = Cli::try_parse_from(["dbdialect", "show", "postgresql"]).unwrap();
        match cli.command {
            Commands::Show { vendor, format } => {
                assert_eq!(vendor, "postgresql");
                assert_eq!(format, OutputFormat::Text);
            }
            _ => panic!("Expected Show command"),
        }
    }

    #[test]
    fn test_conn_string_with_flags() {
        let cli = Cli::try_parse_from([
            "dbdialect",
            "conn-string",
            "--vendor",
            "mysql",
            "--access",
            "odbc",
            "--dsn",
            "sales",
            "--option",
            "mysql.charset=utf8mb4",
            "--option",
            "generic.Timeout=5",
        ])
        .unwrap();

        match cli.command {
            Commands::ConnString { connection } => {
                assert_eq!(connection.vendor.as_deref(), Some("mysql"));
                assert_eq!(connection.access, Some(AccessType::Odbc));
                assert_eq!(connection.dsn.as_deref(), Some("sales"));
                assert_eq!(connection.options.len(), 2);
            }
            _ => panic!("Expected ConnString command"),
        }
    }

    #[test]
    fn test_datasource_kind_flag() {
        let cli = Cli::try_parse_from([
            "dbdialect",
            "test",
            "--access",
            "jndi",
            "--datasource",
            "orders",
            "--datasource-kind",
            "pooled",
        ])
        .unwrap();

        match cli.command {
            Commands::Test { connection, .. } => {
                assert_eq!(connection.access, Some(AccessType::Jndi));
                assert_eq!(connection.datasource_kind, Some(DataSourceKind::Pooled));
            }
            _ => panic!("Expected Test command"),
        }

        let result = Cli::try_parse_from(["dbdialect", "test", "--datasource-kind", "cached"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_access_rejected() {
        let result = Cli::try_parse_from(["dbdialect", "conn-string", "--access", "carrier-pigeon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_test_command_flags() {
        let cli = Cli::try_parse_from([
            "dbdialect",
            "test",
            "--vendor",
            "oracle",
            "--timeout",
            "3",
            "--format",
            "toml",
        ])
        .unwrap();

        match cli.command {
            Commands::Test { connection, timeout, format } => {
                assert_eq!(connection.vendor.as_deref(), Some("oracle"));
                assert_eq!(timeout, Some(3));
                assert_eq!(format, OutputFormat::Toml);
            }
            _ => panic!("Expected Test command"),
        }
    }

    #[test]
    fn test_srid_needs_exactly_one_direction() {
        assert!(Cli::try_parse_from(["dbdialect", "srid"]).is_err());
        assert!(Cli::try_parse_from(["dbdialect", "srid", "--neutral", "4326", "--vendor-srid", "8307"]).is_err());
        let cli = Cli::try_parse_from(["dbdialect", "srid", "--neutral", "4326"]).unwrap();
        assert!(matches!(cli.command, Commands::Srid { neutral: Some(4326), vendor_srid: None, .. }));
    }

    #[test]
    fn test_config_command_defaults() {
        let cli = Cli::try_parse_from(["dbdialect", "config"]).unwrap();
        match cli.command {
            Commands::Config { output, env } => {
                assert_eq!(output, "config.toml");
                assert_eq!(env, None);
            }
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "dbdialect",
            "--config",
            "custom-config.toml",
            "--env",
            "production",
            "-v",
            "dialects",
        ])
        .unwrap();

        assert_eq!(cli.config, Some("custom-config.toml".to_string()));
        assert_eq!(cli.env, Some("production".to_string()));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Dialects));
    }

    #[test]
    fn test_missing_required_subcommand() {
        let result = Cli::try_parse_from(["dbdialect"]);
        assert!(result.is_err());
    }
}
