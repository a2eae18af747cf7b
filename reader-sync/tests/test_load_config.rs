use reader_sync::load_config::{load_config, CliConfig};
use reader_sync_core::config::{parse_cutoff, SyncConfig};
use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

fn set_credentials() {
    env::set_var("READWISE_TOKEN", "rw-token");
    env::set_var("CAPACITIES_TOKEN", "cap-token");
    env::set_var("CAPACITIES_SPACE_ID", "space-1");
    env::remove_var("READWISE_BASE_URL");
    env::remove_var("CAPACITIES_BASE_URL");
}

fn load_yaml(yaml: &str) -> anyhow::Result<CliConfig> {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), yaml).unwrap();
    load_config(Some(config_file.path()))
}

#[test]
#[serial]
fn defaults_apply_without_a_config_file() {
    set_credentials();

    let config = load_config(None).expect("Config should load from env alone");

    assert_eq!(config.sync, SyncConfig::default());
    assert_eq!(config.ledger_path, PathBuf::from("processed_ids.txt"));
    assert_eq!(config.request_interval, Duration::from_secs(3));
    assert_eq!(config.requests_per_minute, 15);
    assert_eq!(config.readwise_base_url, "https://readwise.io");
    assert_eq!(config.capacities_base_url, "https://api.capacities.io");
    assert_eq!(config.credentials.readwise_token, "rw-token");
    assert_eq!(config.credentials.capacities_space_id, "space-1");
}

#[test]
#[serial]
fn file_values_override_defaults() {
    set_credentials();
    let config = load_yaml(
        r#"
articles_per_run: 12
updated_after: "2025-01-31"
default_tags: [inbox]
ledger_path: ./state/ids.txt
request_interval_secs: 0
requests_per_minute: 0
readwise_base_url: "http://localhost:9999/"
"#,
    )
    .expect("Config should load");

    assert_eq!(config.sync.articles_per_run, 12);
    assert_eq!(config.sync.updated_after, parse_cutoff("2025-01-31").unwrap());
    assert_eq!(config.sync.default_tags, vec!["inbox"]);
    assert_eq!(config.ledger_path, PathBuf::from("./state/ids.txt"));
    assert_eq!(config.request_interval, Duration::ZERO);
    assert_eq!(config.requests_per_minute, 0);
    assert_eq!(config.readwise_base_url, "http://localhost:9999/");
}

#[test]
#[serial]
fn environment_base_url_wins_over_file() {
    set_credentials();
    env::set_var("CAPACITIES_BASE_URL", "http://from-env");
    let config = load_yaml("capacities_base_url: http://from-file\n").unwrap();
    env::remove_var("CAPACITIES_BASE_URL");

    assert_eq!(config.capacities_base_url, "http://from-env");
}

#[test]
#[serial]
fn empty_file_means_defaults() {
    set_credentials();
    let config = load_yaml("").unwrap();
    assert_eq!(config.sync, SyncConfig::default());
}

#[test]
#[serial]
fn missing_credentials_are_reported_by_name() {
    set_credentials();
    env::remove_var("CAPACITIES_TOKEN");

    let err = load_config(None).unwrap_err();
    assert!(err.to_string().contains("CAPACITIES_TOKEN"), "got: {err}");

    env::set_var("CAPACITIES_TOKEN", "   ");
    let err = load_config(None).unwrap_err();
    assert!(err.to_string().contains("CAPACITIES_TOKEN"), "blank counts as missing, got: {err}");
}

#[test]
#[serial]
fn invalid_yaml_is_a_parse_error() {
    set_credentials();
    let err = load_yaml("not-yaml: [:::").unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[test]
#[serial]
fn unknown_keys_are_rejected() {
    set_credentials();
    let err = load_yaml("artciles_per_run: 3\n").unwrap_err();
    assert!(err.to_string().contains("YAML"), "got: {err}");
}

#[test]
#[serial]
fn bad_cutoff_date_fails() {
    set_credentials();
    let err = load_yaml("updated_after: yesterday\n").unwrap_err();
    assert!(format!("{err:#}").contains("yesterday"), "got: {err:#}");
}

#[test]
#[serial]
fn zero_batch_fails() {
    set_credentials();
    assert!(load_yaml("articles_per_run: 0\n").is_err());
}

#[test]
#[serial]
fn missing_config_file_fails() {
    set_credentials();
    let err = load_config(Some(std::path::Path::new("/definitely/not/here.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
#[serial]
fn credentials_debug_redacts_tokens() {
    set_credentials();
    let config = load_config(None).unwrap();
    let debug = format!("{:?}", config.credentials);
    assert!(!debug.contains("rw-token"));
    assert!(!debug.contains("cap-token"));
    assert!(debug.contains("space-1"));
}
