//! Configuration for LearnLens
//!
//! Configuration is assembled once at startup from, in increasing priority:
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. `LEARNLENS_*` environment variables (`__` separates sections,
//!    e.g. `LEARNLENS_PREDICTOR__TIMEOUT_MS=5000`)
//! 4. The prediction service's legacy variables `ML_SERVICE_URL`,
//!    `ML_PREDICT_PATH` and `ML_HTTP_TIMEOUT_MS`
//!
//! The resulting [`AppConfig`] is passed by reference to the components that
//! need it; nothing below `main` reads the environment.

use crate::error::{InsightError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment prefix for configuration overrides
const ENV_PREFIX: &str = "LEARNLENS";

/// Upper bound accepted for `history.max_page_size`
const PAGE_SIZE_CEILING: u32 = 1000;

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub predictor: PredictorConfig,
    pub history: HistoryConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the API binds to
    pub addr: SocketAddr,
}

/// Storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Local file path, or a `libsql://` URL for a remote database
    pub url: String,
    /// Auth token for remote databases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// External prediction service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorConfig {
    pub base_url: String,
    pub path: String,
    /// Hard timeout for a single prediction call
    pub timeout_ms: u64,
}

impl PredictorConfig {
    /// Full prediction endpoint URL
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Insight history paging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: ([127, 0, 0, 1], 5000).into(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_path().to_string_lossy().to_string(),
            auth_token: None,
        }
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001".to_string(),
            path: "/predict".to_string(),
            timeout_ms: 8000,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            predictor: PredictorConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

/// Default database location under the user's data directory
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("learnlens")
        .join("learnlens.db")
}

impl AppConfig {
    /// Load configuration: defaults, optional file, then environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&AppConfig::default())?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(
                config::File::from(path.to_path_buf()).format(config::FileFormat::Toml),
            );
        }

        builder = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("predictor.base_url", std::env::var("ML_SERVICE_URL").ok())?
            .set_override_option("predictor.path", std::env::var("ML_PREDICT_PATH").ok())?
            .set_override_option(
                "predictor.timeout_ms",
                std::env::var("ML_HTTP_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.trim().parse::<i64>().ok()),
            )?;

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment overlay)
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str)
            .map_err(|e| InsightError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(InsightError::Config("database.url must not be empty".into()));
        }

        if self.predictor.base_url.trim().is_empty() {
            return Err(InsightError::Config(
                "predictor.base_url must not be empty".into(),
            ));
        }

        if !self.predictor.path.starts_with('/') {
            return Err(InsightError::Config(format!(
                "predictor.path must start with '/', got '{}'",
                self.predictor.path
            )));
        }

        if self.predictor.timeout_ms == 0 {
            return Err(InsightError::Config(
                "predictor.timeout_ms must be greater than 0".into(),
            ));
        }

        if self.history.max_page_size == 0 || self.history.max_page_size > PAGE_SIZE_CEILING {
            return Err(InsightError::Config(format!(
                "history.max_page_size must be between 1 and {}",
                PAGE_SIZE_CEILING
            )));
        }

        if self.history.default_page_size == 0
            || self.history.default_page_size > self.history.max_page_size
        {
            return Err(InsightError::Config(
                "history.default_page_size must be between 1 and history.max_page_size".into(),
            ));
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let toml_str = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const LEGACY_VARS: [&str; 3] = ["ML_SERVICE_URL", "ML_PREDICT_PATH", "ML_HTTP_TIMEOUT_MS"];

    fn clear_env() {
        for var in LEGACY_VARS {
            env::remove_var(var);
        }
        env::remove_var("LEARNLENS_PREDICTOR__TIMEOUT_MS");
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.predictor.timeout_ms, 8000);
        assert_eq!(config.history.default_page_size, 20);
        assert_eq!(config.predictor.endpoint(), "http://127.0.0.1:8001/predict");
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let predictor = PredictorConfig {
            base_url: "http://ml.internal:9000/".into(),
            path: "/v2/predict".into(),
            timeout_ms: 100,
        };
        assert_eq!(predictor.endpoint(), "http://ml.internal:9000/v2/predict");
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = AppConfig::default();
        config.predictor.timeout_ms = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("timeout_ms must be greater than 0"));
    }

    #[test]
    fn test_validate_path_without_slash() {
        let mut config = AppConfig::default();
        config.predictor.path = "predict".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_page_sizes() {
        let mut config = AppConfig::default();
        config.history.default_page_size = 500;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("default_page_size"));

        let mut config = AppConfig::default();
        config.history.max_page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let toml_str = r#"
            [server]
            addr = "0.0.0.0:8080"

            [database]
            url = "/var/lib/learnlens/data.db"

            [predictor]
            base_url = "http://ml:8001"
            path = "/predict"
            timeout_ms = 2500

            [history]
            default_page_size = 10
            max_page_size = 50
        "#;

        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.server.addr.port(), 8080);
        assert_eq!(config.predictor.timeout(), Duration::from_millis(2500));
        assert_eq!(config.history.max_page_size, 50);
        assert!(config.database.auth_token.is_none());
    }

    #[test]
    #[serial]
    fn test_load_file_then_legacy_env() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learnlens.toml");

        let mut file_config = AppConfig::default();
        file_config.database.url = dir.path().join("x.db").to_string_lossy().to_string();
        file_config.predictor.timeout_ms = 1234;
        file_config.to_file(&path).unwrap();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.predictor.timeout_ms, 1234);
        assert_eq!(loaded.database.url, file_config.database.url);

        env::set_var("ML_SERVICE_URL", "http://predictor.test:9999");
        env::set_var("ML_HTTP_TIMEOUT_MS", "750");
        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.predictor.base_url, "http://predictor.test:9999");
        assert_eq!(loaded.predictor.timeout_ms, 750);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_prefixed_env() {
        clear_env();
        env::set_var("LEARNLENS_PREDICTOR__TIMEOUT_MS", "3000");
        let loaded = AppConfig::load(None).unwrap();
        assert_eq!(loaded.predictor.timeout_ms, 3000);
        clear_env();
    }

    #[test]
    fn test_to_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = AppConfig::default();
        config.to_file(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed = AppConfig::from_toml(&contents).unwrap();
        assert_eq!(parsed, config);
    }
}
