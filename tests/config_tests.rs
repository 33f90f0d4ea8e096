//! Config loading, TOML parsing, and env var override tests.
//!
//! Some tests are `#[ignore]` (they chdir or set env vars and conflict in parallel).
//! Run them with: `cargo test --test config_tests -- --ignored --test-threads=1`

use ruleflow::config::StoreBackend;
use ruleflow::Config;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(temp: &TempDir, name: &str, content: &str) -> String {
    let path = temp.path().join(name);
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

// Default Configuration Tests
#[test]
fn test_config_default_engine() {
    let config = Config::default();
    assert_eq!(config.engine.stage, "dev");
    assert_eq!(config.engine.service, "ruleflow");
    assert_eq!(config.engine.utc_offset_minutes, 0);
    assert_eq!(config.engine.rules_path, PathBuf::from("./rules.json"));
    assert!(config.engine.catalog_path.is_none());
    assert!(config.engine.directory_path.is_none());
}

#[test]
fn test_config_default_store() {
    let config = Config::default();
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.store.retention_secs, 86_400);
    assert_eq!(config.store.reap_interval_secs, 60);
}

#[test]
fn test_config_default_http() {
    let config = Config::default();
    assert_eq!(config.http.max_body_bytes, 1_048_576);
}

// TOML File Parsing Tests
#[test]
fn test_load_config_from_file() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        &temp,
        "ruleflow.toml",
        r#"
[engine]
stage = "prod"
service = "connect"
utc_offset_minutes = 600
mobile_prefixes = ["+614", "04"]
rules_path = "/etc/ruleflow/rules.json"
catalog_path = "/etc/ruleflow/catalog.json"

[store]
backend = "file"
data_dir = "/var/lib/ruleflow"
retention_secs = 3600
max_batch_size = 10

[cache]
rule_set_ttl_secs = 0

[actions.mocks.prod-connect-balance]
delay_ms = 250
output = { Balance = "1200" }

[actions.mocks.prod-connect-broken]
error = "backend unavailable"

[logging]
level = "debug"
format = "json"

[http]
host = "0.0.0.0"
port = 9090
cors_origins = ["https://agent.example.com"]
"#,
    );

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.engine.qualify_function("balance"), "prod-connect-balance");
    assert_eq!(config.engine.utc_offset_minutes, 600);
    assert_eq!(config.engine.mobile_prefixes, vec!["+614", "04"]);
    assert_eq!(
        config.engine.catalog_path,
        Some(PathBuf::from("/etc/ruleflow/catalog.json"))
    );
    assert_eq!(config.store.backend, StoreBackend::File);
    assert_eq!(config.store.max_batch_size, 10);
    assert_eq!(config.cache.rule_set_ttl_secs, 0);
    assert_eq!(config.actions.mocks.len(), 2);
    assert_eq!(config.actions.mocks["prod-connect-balance"].delay_ms, 250);
    assert_eq!(
        config.actions.mocks["prod-connect-broken"].error.as_deref(),
        Some("backend unavailable")
    );
    assert_eq!(config.logging.format, "json");
    assert_eq!(config.http.port, 9090);
    assert_eq!(config.http.cors_origins.len(), 1);
}

#[test]
fn test_missing_sections_use_defaults() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "partial.toml", "[http]\nport = 7000\n");

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.http.port, 7000);
    assert_eq!(config.http.host, "127.0.0.1");
    assert_eq!(config.engine.stage, "dev");
    assert_eq!(config.cache.rule_set_ttl_secs, 60);
}

#[test]
fn test_invalid_backend_rejected() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "bad.toml", "[store]\nbackend = \"dynamo\"\n");

    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_missing_file_yields_defaults() {
    let config = Config::from_file("/nonexistent/ruleflow.toml").unwrap();
    assert_eq!(config.engine.service, "ruleflow");
}

#[test]
#[ignore = "Requires --test-threads=1 due to env var mutation"]
fn test_env_overrides_file() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "ruleflow.toml", "[store]\nbackend = \"file\"\n");

    env::set_var("RULEFLOW_STORE__BACKEND", "memory");
    env::set_var("RULEFLOW_CACHE__RULE_SET_TTL_SECS", "5");
    let config = Config::from_file(&path);
    env::remove_var("RULEFLOW_STORE__BACKEND");
    env::remove_var("RULEFLOW_CACHE__RULE_SET_TTL_SECS");

    let config = config.unwrap();
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.cache.rule_set_ttl_secs, 5);
}

#[test]
#[ignore = "Requires --test-threads=1 due to directory change"]
fn test_local_file_overrides_base() {
    let temp = TempDir::new().unwrap();
    write_config(&temp, "ruleflow.toml", "[engine]\nstage = \"test\"\nservice = \"base\"\n");
    write_config(&temp, "ruleflow.local.toml", "[engine]\nservice = \"local\"\n");

    let original_dir = env::current_dir().unwrap();
    env::set_current_dir(temp.path()).unwrap();
    let config = Config::load();
    env::set_current_dir(original_dir).unwrap();

    let config = config.unwrap();
    assert_eq!(config.engine.stage, "test");
    assert_eq!(config.engine.service, "local");
}
