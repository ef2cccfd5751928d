#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Returns a configured Command for `dbdialect`
pub fn dbdialect_cmd() -> Command {
    Command::cargo_bin("dbdialect").expect("Binary not found")
}

/// Temp dir holding a plugin descriptor and a config.toml registering it
pub fn setup_plugin_workspace() -> (TempDir, PathBuf) {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let plugin_path = temp_dir.path().join("teradata.toml");

    fs::write(
        &plugin_path,
        r#"
vendor_key = "teradata"
parent = "generic"
description = "Teradata"
aliases = ["td"]
default_port = 1025
driver = "Teradata Database ODBC Driver 17.20"
probe_statement = "SELECT 1"
connection_patterns = ["teradata"]
reserved_words = ["SAMPLE", "QUALIFY"]

[capabilities]
supports_sequences = false

[attributes]
host = "DBCName"
"#,
    )
    .unwrap();

    fs::write(
        temp_dir.path().join("config.toml"),
        format!(
            "[dialects]\nplugin_paths = [{:?}]\n",
            plugin_path.to_str().unwrap()
        ),
    )
    .unwrap();

    (temp_dir, plugin_path)
}
