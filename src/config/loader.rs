//! Configuration Loader
//!
//! Environment-aware loading built on the `config` crate: a base YAML file, an
//! optional per-environment YAML overlay and `BULKGEN__`-prefixed environment
//! variables are merged, deserialized into [`BulkgenConfig`] and validated.

use super::error::{ConfigResult, ConfigurationError};
use super::BulkgenConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_CONFIG_FILE: &str = "bulkgen.yaml";
const ENVIRONMENTS_DIR: &str = "environments";
const ENV_PREFIX: &str = "BULKGEN";
const ENV_SEPARATOR: &str = "__";

/// Loaded configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: BulkgenConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that must not touch process-wide environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = environment,
            config_directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::build_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = environment,
            database_enabled = config.database.enabled,
            worker_url = %config.worker.dispatch_url(),
            substitution_mode = ?config.orchestration.substitution_mode,
            "⚙️ Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    fn build_config(config_directory: &Path, environment: &str) -> ConfigResult<BulkgenConfig> {
        let base_path = config_directory.join(BASE_CONFIG_FILE);
        if !base_path.is_file() {
            return Err(ConfigurationError::config_file_not_found(base_path));
        }

        let environment_path = config_directory
            .join(ENVIRONMENTS_DIR)
            .join(format!("{environment}.yaml"));

        let settings = Config::builder()
            .add_source(File::from(base_path.clone()))
            .add_source(File::from(environment_path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::parse_error(base_path.display().to_string(), e))?;

        settings
            .try_deserialize::<BulkgenConfig>()
            .map_err(|e| ConfigurationError::parse_error(base_path.display().to_string(), e))
    }

    /// Environment name from `BULKGEN_ENV`, then `APP_ENV`, defaulting to `development`
    pub fn detect_environment() -> String {
        env::var("BULKGEN_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    pub fn config(&self) -> &BulkgenConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::SubstitutionMode;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &Path, base: &str, overlay: Option<(&str, &str)>) {
        fs::write(dir.join(BASE_CONFIG_FILE), base).unwrap();
        if let Some((environment, contents)) = overlay {
            let env_dir = dir.join(ENVIRONMENTS_DIR);
            fs::create_dir_all(&env_dir).unwrap();
            fs::write(env_dir.join(format!("{environment}.yaml")), contents).unwrap();
        }
    }

    #[test]
    fn test_loads_base_file() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            r#"
worker:
  base_url: "http://worker:9000"
  dispatch_path: "/generate"
retry:
  max_attempts: 5
"#,
            None,
        );

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "staging").unwrap();
        let config = manager.config();

        assert_eq!(config.worker.dispatch_url(), "http://worker:9000/generate");
        assert_eq!(config.retry.max_attempts, 5);
        // Unspecified keys keep their defaults
        assert_eq!(config.retry.multiplier, 2.0);
        assert_eq!(manager.environment(), "staging");
    }

    #[test]
    fn test_environment_overlay_wins() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            r#"
orchestration:
  substitution_mode: worker
  max_rows_per_batch: 100
"#,
            Some((
                "test",
                r#"
orchestration:
  substitution_mode: orchestrator
"#,
            )),
        );

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test").unwrap();

        assert_eq!(
            manager.config().orchestration.substitution_mode,
            SubstitutionMode::Orchestrator
        );
        assert_eq!(manager.config().orchestration.max_rows_per_batch, 100);
    }

    #[test]
    fn test_missing_base_file() {
        let dir = TempDir::new().unwrap();
        let result = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(matches!(
            result,
            Err(ConfigurationError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            r#"
circuit_breakers:
  default_config:
    failure_threshold: 0
    timeout_seconds: 30
    success_threshold: 2
"#,
            None,
        );

        let result = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_repository_config_files_are_valid() {
        let config_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config");
        for environment in ["development", "test", "production"] {
            let manager =
                ConfigManager::load_from_directory_with_env(Some(config_dir.clone()), environment);
            assert!(manager.is_ok(), "{environment}: {:?}", manager.err());
        }
    }
}
