mod common;
use common::{dbdialect_cmd, setup_plugin_workspace};
use predicates::prelude::*;
use serial_test::serial;
use tempfile::tempdir;

#[test]
#[serial]
fn test_dialects_lists_builtins() {
    let temp_dir = tempdir().unwrap();

    dbdialect_cmd()
        .arg("dialects")
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("postgresql"))
        .stdout(predicate::str::contains("greenplum"))
        .stdout(predicate::str::contains("[extends postgresql]"))
        .stdout(predicate::str::contains("aliases: geopackage, gpkg"));
}

#[test]
#[serial]
fn test_plugin_dialect_is_registered() {
    let (temp_dir, _) = setup_plugin_workspace();

    dbdialect_cmd()
        .arg("dialects")
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("teradata"))
        .stdout(predicate::str::contains("aliases: td"));

    dbdialect_cmd()
        .args(["show", "td"])
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Lineage        : teradata -> generic"))
        .stdout(predicate::str::contains("Default port   : 1025"));
}

#[test]
#[serial]
fn test_show_override_as_toml() {
    let temp_dir = tempdir().unwrap();

    dbdialect_cmd()
        .args(["show", "greenplum", "--format", "toml"])
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("vendor_key = \"greenplum\""))
        .stdout(predicate::str::contains("default_port = 5432"))
        .stdout(predicate::str::contains("supports_batch_error_handling = false"))
        .stdout(predicate::str::contains("\"ERRORS\""));
}

#[test]
#[serial]
fn test_show_unknown_vendor_fails() {
    let temp_dir = tempdir().unwrap();

    dbdialect_cmd()
        .args(["show", "informix"])
        .current_dir(&temp_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown vendor: informix"));
}

#[test]
#[serial]
fn test_detect_from_connection_string() {
    let temp_dir = tempdir().unwrap();

    dbdialect_cmd()
        .args(["detect", "Driver={Amazon Redshift (x64)};Server=cluster;Database=dev"])
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(predicate::str::diff("redshift\n"));

    dbdialect_cmd()
        .args(["detect", "Driver={Unknown};Server=x"])
        .current_dir(&temp_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No dialect matches"));
}

#[test]
#[serial]
fn test_conn_string_native() {
    let temp_dir = tempdir().unwrap();

    dbdialect_cmd()
        .args([
            "conn-string",
            "--vendor",
            "pg",
            "--host",
            "db.local",
            "--database",
            "sales",
            "--user",
            "etl",
            "--option",
            "postgresql.sslmode=prefer",
        ])
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(predicate::str::diff(
            "Driver={PostgreSQL Unicode};Server=db.local;Port=5432;Database=sales;UID=etl;sslmode=prefer\n",
        ));
}

#[test]
#[serial]
fn test_conn_string_inherits_ancestor_options() {
    let temp_dir = tempdir().unwrap();

    // Greenplum descends from postgresql, so postgresql options apply
    dbdialect_cmd()
        .args([
            "conn-string",
            "--vendor",
            "greenplum",
            "--host",
            "gp",
            "--option",
            "postgresql.sslmode=require",
            "--option",
            "mysql.charset=utf8mb4",
        ])
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("sslmode=require"))
        .stdout(predicate::str::contains("charset").not());
}

#[test]
#[serial]
fn test_conn_string_from_config_section() {
    let temp_dir = tempdir().unwrap();
    std::fs::write(
        temp_dir.path().join("config.toml"),
        r#"
[connection]
name = "legacy"
vendor = "mysql"
access = "odbc"
dsn = "inventory"
"#,
    )
    .unwrap();

    dbdialect_cmd()
        .arg("conn-string")
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("DSN=inventory"));
}

#[test]
#[serial]
fn test_conn_string_unsupported_access() {
    let temp_dir = tempdir().unwrap();

    dbdialect_cmd()
        .args(["conn-string", "--vendor", "sqlite", "--access", "jndi", "--datasource", "x"])
        .current_dir(&temp_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not support jndi access"));
}

#[test]
#[serial]
fn test_conn_string_through_named_data_source() {
    let temp_dir = tempdir().unwrap();
    std::fs::write(
        temp_dir.path().join("config.toml"),
        r#"
[datasources.reporting]
vendor = "postgresql"
connection_string = "DSN=reporting;UID=viewer"
"#,
    )
    .unwrap();

    dbdialect_cmd()
        .args(["conn-string", "--vendor", "postgresql", "--access", "jndi", "--datasource", "reporting"])
        .current_dir(&temp_dir)
        .assert()
        .success()
        .stdout(predicate::str::diff("DSN=reporting;UID=viewer\n"));

    dbdialect_cmd()
        .args(["conn-string", "--vendor", "postgresql", "--access", "jndi", "--datasource", "nope"])
        .current_dir(&temp_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Data source not found: nope"));
}
