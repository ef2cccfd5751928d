use crate::model::config::LoggingConfig;
use env_logger::{Builder, Target, WriteStyle};
use log::{Level, LevelFilter};
use std::env;
use std::io::Write;

/// Log to stderr so command output on stdout stays machine readable.
///
/// `--verbose` forces debug; otherwise the configured level applies and
/// `RUST_LOG` overrides both.
pub fn setup_logger(verbose: bool, config: &LoggingConfig) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        config.level.parse().unwrap_or(LevelFilter::Info)
    };

    let mut builder = Builder::new();
    builder.filter(None, level);
    builder.target(Target::Stderr);
    builder.write_style(if config.colored {
        WriteStyle::Auto
    } else {
        WriteStyle::Never
    });

    builder.format(|buf, record| {
        let emoji = match record.level() {
            Level::Error => "❌ ",
            Level::Warn => "⚠️  ",
            Level::Info => "",
            Level::Debug => "",
            Level::Trace => "",
        };
        writeln!(buf, "{}{}", emoji, record.args())
    });

    if env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    }

    // A second initialisation (tests) keeps the first logger
    let _ = builder.try_init();
}
