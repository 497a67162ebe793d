/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

use lens::workflow::InstallScope;
use lens::{ClaimStrategy, InstanceMode};
use lensctl::config::{ConfigError, ConfigLoader, Validate, ValidationError};
use lensctl::LensConfig;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("failed to write config");
    path
}

fn clear_env() {
    env::remove_var("LENS_CONFIG");
    env::remove_var("LENS_DATABASE_URL");
    env::remove_var("CHARTS_DIR");
}

#[test]
#[serial]
fn test_load_full_config_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "lens.toml",
        r#"
[instance]
mode = "data"
cluster_name = "east"

[database]
url = "sqlite://east.db"
pool_size = 4

[executor]
batch_size = 25
poll_interval_ms = 500
claim_strategy = "conditional"

[scheduler]
history_retention_days = 3
metrics_listen = "127.0.0.1:9464"

[installer]
namespace = "lens-east"
storage_mode = "external"
scope = "infrastructure"

[installer.external_storage]
postgres_host = "pg.east.internal"
postgres_username = "lens"
postgres_password = "secret"
postgres_db_name = "lens"
opensearch_host = "search.east.internal"
prometheus_read_host = "vmselect.east.internal"
prometheus_write_host = "vminsert.east.internal"
"#,
    );

    let config = ConfigLoader::with_search_paths(Vec::new())
        .load_config(Some(&path))
        .unwrap();

    assert_eq!(config.instance.mode, InstanceMode::Data);
    assert_eq!(config.instance.cluster_name, "east");
    assert_eq!(config.database.pool_size, 4);
    assert_eq!(config.executor.batch_size, 25);
    assert_eq!(config.executor.claim_strategy, ClaimStrategy::Conditional);
    assert_eq!(config.scheduler.history_retention_days, 3);
    assert_eq!(config.installer.namespace, "lens-east");
    assert_eq!(config.installer.scope, InstallScope::Infrastructure);
    let external = config.installer.external_storage.as_ref().unwrap();
    assert_eq!(external.postgres_host, "pg.east.internal");
    assert_eq!(external.postgres_port, None);
    // Unset keys keep their defaults.
    assert_eq!(config.executor.default_timeout_secs, 300);
    assert!(config.scheduler.record_history);
    config.validate().unwrap();
}

#[test]
#[serial]
fn test_env_substitution_in_file() {
    clear_env();
    env::set_var("LENS_TEST_CLUSTER", "west");
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "lens.toml",
        r#"
[instance]
cluster_name = "${LENS_TEST_CLUSTER}"

[installer]
namespace = "${LENS_TEST_NAMESPACE:-primus-lens}"
"#,
    );

    let config = ConfigLoader::with_search_paths(Vec::new())
        .load_config(Some(&path))
        .unwrap();
    assert_eq!(config.instance.cluster_name, "west");
    assert_eq!(config.installer.namespace, "primus-lens");

    env::remove_var("LENS_TEST_CLUSTER");
}

#[test]
#[serial]
fn test_config_env_var_names_the_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "custom.toml", "[executor]\nbatch_size = 3\n");
    env::set_var("LENS_CONFIG", &path);

    let config = ConfigLoader::with_search_paths(Vec::new())
        .load_config(None)
        .unwrap();
    assert_eq!(config.executor.batch_size, 3);

    env::remove_var("LENS_CONFIG");
}

#[test]
#[serial]
fn test_search_path_and_database_override() {
    clear_env();
    let dir = TempDir::new().unwrap();
    write_config(&dir, "lens.toml", "[database]\nurl = \"sqlite://file.db\"\n");
    env::set_var("LENS_DATABASE_URL", "sqlite://override.db");

    let loader = ConfigLoader::with_search_paths(vec![
        dir.path().join("missing.toml"),
        dir.path().join("lens.toml"),
    ]);
    assert_eq!(loader.find_config_file(), Some(dir.path().join("lens.toml")));

    let config = loader.load_config(None).unwrap();
    assert_eq!(config.database.url, "sqlite://override.db");

    env::remove_var("LENS_DATABASE_URL");
}

#[test]
#[serial]
fn test_unsupported_extension_and_bad_toml() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_search_paths(Vec::new());

    let yaml = write_config(&dir, "lens.yaml", "instance: {}\n");
    assert!(matches!(
        loader.load_config(Some(&yaml)),
        Err(ConfigError::UnsupportedFormat { .. })
    ));

    let broken = write_config(&dir, "broken.toml", "[executor\nbatch_size = 1\n");
    assert!(matches!(
        loader.load_config(Some(&broken)),
        Err(ConfigError::TomlParseError(_))
    ));

    let missing = dir.path().join("nope.toml");
    assert!(matches!(
        loader.load_config(Some(&missing)),
        Err(ConfigError::ReadError { .. })
    ));
}

#[test]
fn test_validation_rejects_unknown_database() {
    let mut config = LensConfig::default();
    config.database.url = "mysql://localhost/lens".to_string();
    assert!(matches!(
        config.validate(),
        Err(ValidationError::InvalidDatabaseUrl { .. })
    ));
}

#[test]
fn test_validation_rejects_negative_timeout() {
    let mut config = LensConfig::default();
    config.executor.default_timeout_secs = -1;
    assert!(matches!(
        config.validate(),
        Err(ValidationError::NotPositive {
            field: "executor.default_timeout_secs",
            value: -1
        })
    ));
}
