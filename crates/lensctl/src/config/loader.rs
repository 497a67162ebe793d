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

use crate::config::{ConfigError, LensConfig};
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Overrides `installer.charts_dir`.
pub const CHARTS_DIR_ENV: &str = "CHARTS_DIR";
/// Overrides `database.url`.
pub const DATABASE_URL_ENV: &str = "LENS_DATABASE_URL";
/// Names the config file when `--config` is not given.
pub const CONFIG_ENV: &str = "LENS_CONFIG";

pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths
    pub fn new() -> Self {
        let mut search_paths = vec![PathBuf::from("./lens.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("lens").join("config.toml"));
        }

        search_paths.push(PathBuf::from("/etc/lens/config.toml"));

        Self { search_paths }
    }

    /// Create a config loader with custom search paths
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Loads the explicit file, else `$LENS_CONFIG`, else the first search
    /// path that exists. With nothing found the defaults are used. Environment
    /// overrides are applied last.
    pub fn load_config(&self, config_file: Option<&Path>) -> Result<LensConfig, ConfigError> {
        let config_path = match config_file {
            Some(path) => Some(path.to_path_buf()),
            None => match env::var(CONFIG_ENV) {
                Ok(path) if !path.is_empty() => Some(PathBuf::from(path)),
                _ => self.find_config_file(),
            },
        };

        let mut config = match config_path {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration");
                self.load_config_from_file(&path)?
            }
            None => {
                debug!("No configuration file found, using defaults");
                LensConfig::default()
            }
        };

        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_config_from_file(&self, path: &Path) -> Result<LensConfig, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        let substituted_content = self.substitute_env_vars(&content)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") | None => Ok(toml::from_str::<LensConfig>(&substituted_content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat {
                extension: ext.to_string(),
            }),
        }
    }

    /// Find the first existing configuration file in search paths
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .find(|path| path.is_file())
            .cloned()
    }

    /// Substitutes `${VAR}`, `${VAR:-default}` and `${VAR:?message}`.
    pub fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::EnvSubstitutionError(e.to_string()))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let full_match = &cap[0];
            let var_expr = &cap[1];

            let replacement = self.process_var_expression(var_expr)?;
            result = result.replace(full_match, &replacement);
        }

        Ok(result)
    }

    fn process_var_expression(&self, expr: &str) -> Result<String, ConfigError> {
        if let Some((var_name, default_value)) = expr.split_once(":-") {
            Ok(env::var(var_name).unwrap_or_else(|_| default_value.to_string()))
        } else if let Some((var_name, error_msg)) = expr.split_once(":?") {
            env::var(var_name).map_err(|_| {
                ConfigError::EnvSubstitutionError(format!(
                    "Required environment variable '{}' is not set: {}",
                    var_name, error_msg
                ))
            })
        } else {
            env::var(expr).map_err(|_| {
                ConfigError::EnvSubstitutionError(format!(
                    "Required environment variable '{}' is not set",
                    expr
                ))
            })
        }
    }

    pub fn get_search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_env_overrides(config: &mut LensConfig) {
    if let Ok(dir) = env::var(CHARTS_DIR_ENV) {
        if !dir.is_empty() {
            debug!(charts_dir = %dir, "Chart directory overridden from environment");
            config.installer.charts_dir = PathBuf::from(dir);
        }
    }
    if let Ok(url) = env::var(DATABASE_URL_ENV) {
        if !url.is_empty() {
            config.database.url = url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_env_substitution_with_default() {
        let loader = ConfigLoader::new();
        env::remove_var("LENS_TEST_VAR_DEFAULT");

        let content = "url = \"${LENS_TEST_VAR_DEFAULT:-sqlite://lens.db}\"";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, "url = \"sqlite://lens.db\"");
    }

    #[test]
    #[serial]
    fn test_env_substitution_with_existing_var() {
        let loader = ConfigLoader::new();
        env::set_var("LENS_TEST_VAR", "postgres://db/lens");

        let content = "url = \"${LENS_TEST_VAR:-sqlite://lens.db}\"";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, "url = \"postgres://db/lens\"");

        env::remove_var("LENS_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_env_substitution_custom_error() {
        let loader = ConfigLoader::new();
        env::remove_var("LENS_REQUIRED_VAR");

        let content = "url = \"${LENS_REQUIRED_VAR:?Database URL must be provided}\"";
        let result = loader.substitute_env_vars(content);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Database URL must be provided"));

        assert!(loader.substitute_env_vars("${LENS_REQUIRED_VAR}").is_err());
    }

    #[test]
    #[serial]
    fn test_missing_config_uses_defaults() {
        env::remove_var(CONFIG_ENV);
        env::remove_var(CHARTS_DIR_ENV);
        env::remove_var(DATABASE_URL_ENV);
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::with_search_paths(vec![dir.path().join("lens.toml")]);

        let config = loader.load_config(None).unwrap();
        assert_eq!(config.installer.namespace, "primus-lens");
        assert_eq!(config.executor.batch_size, 10);
    }

    #[test]
    #[serial]
    fn test_charts_dir_env_override() {
        env::remove_var(CONFIG_ENV);
        env::set_var(CHARTS_DIR_ENV, "/opt/charts");
        let loader = ConfigLoader::with_search_paths(Vec::new());

        let config = loader.load_config(None).unwrap();
        assert_eq!(config.installer.charts_dir, PathBuf::from("/opt/charts"));

        env::remove_var(CHARTS_DIR_ENV);
    }
}
