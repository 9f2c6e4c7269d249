use std::collections::HashMap;
use std::path::PathBuf;

use memories_sync::config::Config;
use memories_sync::error::Error;
use memories_sync::storage::Seed;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn config_loads_required_and_defaults() {
    let config = Config::from_lookup(lookup(&[("MEMORIES_DATA_DIR", "/var/memories")])).unwrap();

    assert_eq!(config.data_dir, PathBuf::from("/var/memories"));
    assert_eq!(config.cache_dir, PathBuf::from("/var/memories/cache"));
    assert!(config.remote_dir.is_none());
    assert!(config.otel_endpoint.is_none());
    assert_eq!(config.log_level, "info");
    assert!(matches!(config.seed(), Seed::Bundled));
}

#[test]
fn config_reads_optional_vars() {
    let config = Config::from_lookup(lookup(&[
        ("MEMORIES_DATA_DIR", "/data"),
        ("MEMORIES_CACHE_DIR", "/tmp/img-cache"),
        ("MEMORIES_REMOTE_DIR", "/mnt/shared"),
        ("MEMORIES_SEED_PATH", "/etc/memories/seed.json"),
        ("OTEL_ENDPOINT", "http://localhost:4317"),
        ("LOG_LEVEL", "debug"),
    ]))
    .unwrap();

    assert_eq!(config.cache_dir, PathBuf::from("/tmp/img-cache"));
    assert_eq!(config.remote_dir, Some(PathBuf::from("/mnt/shared")));
    assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));
    assert_eq!(config.log_level, "debug");
    match config.seed() {
        Seed::File(path) => assert_eq!(path, PathBuf::from("/etc/memories/seed.json")),
        other => panic!("expected file seed, got {other:?}"),
    }
}

#[test]
fn config_fails_without_data_dir() {
    let result = Config::from_lookup(lookup(&[("LOG_LEVEL", "debug")]));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn config_file_resolves_paths_against_its_directory() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("memories.toml");
    std::fs::write(
        &path,
        r#"
[memories]
data_dir = "data"
remote_dir = "/srv/remote"
log_level = "warn"
"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();

    assert_eq!(config.data_dir, tmp.path().join("data"));
    assert_eq!(config.cache_dir, tmp.path().join("data").join("cache"));
    assert_eq!(config.remote_dir, Some(PathBuf::from("/srv/remote")));
    assert_eq!(config.log_level, "warn");
}

#[test]
fn config_file_rejects_unknown_keys() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("memories.toml");
    std::fs::write(&path, "[memories]\ndata_dir = \"d\"\ndatabase_url = \"x\"\n").unwrap();

    assert!(matches!(Config::from_file(&path), Err(Error::Config(_))));
}
