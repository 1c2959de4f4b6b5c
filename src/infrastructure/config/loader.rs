//! Configuration loading for the orchestration core (§6).
//!
//! Precedence (lowest to highest): programmatic defaults, project config
//! file, project-local overrides, environment variables.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;

use crate::domain::models::EngineConfig;

/// Loads and validates `EngineConfig` via a figment precedence chain.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (`Serialized`).
    /// 2. `.scanorc/config.yaml` (project config).
    /// 3. `.scanorc/local.yaml` (project local overrides, optional).
    /// 4. Environment variables (`SCANORC_*` prefix, highest priority).
    pub fn load() -> Result<EngineConfig> {
        let config: EngineConfig = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::file(".scanorc/config.yaml"))
            .merge(Yaml::file(".scanorc/local.yaml"))
            .merge(Env::prefixed("SCANORC_").split("__"))
            .extract()
            .context("failed to extract configuration from figment")?;

        config.validate().context("configuration failed validation")?;
        Ok(config)
    }

    /// Load configuration from a specific file, bypassing the project
    /// config/local/env precedence chain. Used by tests and one-off
    /// tooling invocations.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<EngineConfig> {
        let config: EngineConfig = Figment::new()
            .merge(Serialized::defaults(EngineConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;

        config.validate().context("configuration failed validation")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads_and_validates() {
        let config = EngineConfig::default();
        assert_eq!(config.worker_count, 16);
        assert_eq!(config.logging.level, "info");
        config.validate().expect("default config should be valid");
    }

    #[test]
    fn yaml_overrides_merge_over_defaults() {
        let yaml = r"
worker_count: 32
scheduler_queue_capacity: 8192
logging:
  level: debug
  format: pretty
retry:
  max_retries: 5
  initial_backoff_ms: 250
  max_backoff_ms: 20000
";
        let config: EngineConfig = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert_eq!(config.worker_count, 32);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.retry.max_retries, 5);
        config.validate().expect("overridden config should be valid");
    }

    #[test]
    fn load_from_file_merges_over_defaults() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "worker_count: 4\nlogging:\n  level: debug").unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.logging.level, "debug");
        // Unset fields keep their programmatic default.
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn invalid_config_fails_validation() {
        let yaml = "worker_count: 0\n";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
