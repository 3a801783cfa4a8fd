//! Configuration types for the inspection engine.

use crate::error::{InsightError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Comprehensive configuration, stored as `.insight/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InsightConfig {
    /// AI backend configuration.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Relevance crawler configuration.
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Inspection store configuration.
    #[serde(default)]
    pub inspections: InspectionConfig,

    /// Background analysis configuration.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl InsightConfig {
    /// Load configuration from `config.toml` under the given `.insight` directory.
    ///
    /// A missing file yields the defaults; an unreadable or unparsable file
    /// is a `ConfigError`.
    pub fn load(insight_dir: &Path) -> Result<Self> {
        let path = insight_dir.join("config.toml");
        if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| InsightError::ConfigError(format!("failed to read config: {}", e)))?;
            toml::from_str(&content)
                .map_err(|e| InsightError::ConfigError(format!("failed to parse config: {}", e)))
        } else {
            Ok(InsightConfig::default())
        }
    }

    /// Save configuration to `config.toml` under the given `.insight` directory.
    pub fn save(&self, insight_dir: &Path) -> Result<()> {
        let path = insight_dir.join("config.toml");
        let content = toml::to_string_pretty(self)
            .map_err(|e| InsightError::ConfigError(format!("failed to serialize config: {}", e)))?;
        fs::write(&path, content)
            .map_err(|e| InsightError::ConfigError(format!("failed to write config: {}", e)))?;
        Ok(())
    }
}

/// AI backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Chat-completions API root (default: `https://api.openai.com/v1`).
    pub base_url: String,

    /// Model identifier sent with every request (default: `gpt-4o-mini`).
    pub model: String,

    /// Environment variable holding the API key (default: `OPENAI_API_KEY`).
    /// The key itself is never stored on disk.
    pub api_key_env: String,

    /// Per-request transport timeout in seconds (default: 30).
    pub request_timeout_secs: u64,

    /// Client-side throttle; 0 disables throttling (default: 20).
    pub requests_per_minute: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_secs: 30,
            requests_per_minute: 20,
        }
    }
}

impl BackendConfig {
    /// Returns the request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Minimum interval between requests, or None when throttling is disabled.
    pub fn min_request_interval(&self) -> Option<Duration> {
        if self.requests_per_minute == 0 {
            None
        } else {
            Some(Duration::from_secs_f64(
                60.0 / f64::from(self.requests_per_minute),
            ))
        }
    }

    /// Resolves the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).map_err(|_| {
            InsightError::ConfigError(format!(
                "API key environment variable {} is not set",
                self.api_key_env
            ))
        })
    }
}

/// Relevance crawler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Per-lookup deadline in milliseconds (default: 5000).
    pub timeout_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

impl CrawlerConfig {
    /// Returns the lookup deadline as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Inspection store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionConfig {
    /// Maximum simultaneously tracked inspections before new-inspection
    /// creation cancels the in-flight analysis (default: 5).
    pub max_open: usize,
}

impl Default for InspectionConfig {
    fn default() -> Self {
        Self { max_open: 5 }
    }
}

/// Background analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Worker threads executing background operations (default: 4).
    pub worker_threads: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { worker_threads: 4 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = InsightConfig::default();
        assert_eq!(config.backend.base_url, "https://api.openai.com/v1");
        assert_eq!(config.backend.request_timeout_secs, 30);
        assert_eq!(config.backend.requests_per_minute, 20);
        assert_eq!(config.crawler.timeout_ms, 5000);
        assert_eq!(config.inspections.max_open, 5);
        assert_eq!(config.analysis.worker_threads, 4);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = InsightConfig::load(tmp.path()).unwrap();
        assert_eq!(config.inspections.max_open, 5);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = TempDir::new().unwrap();

        let mut config = InsightConfig::default();
        config.backend.model = "gpt-4o".to_string();
        config.crawler.timeout_ms = 250;
        config.save(tmp.path()).unwrap();

        let loaded = InsightConfig::load(tmp.path()).unwrap();
        assert_eq!(loaded.backend.model, "gpt-4o");
        assert_eq!(loaded.crawler.timeout_ms, 250);
        // Untouched sections keep their defaults.
        assert_eq!(loaded.inspections.max_open, 5);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[crawler]\ntimeout_ms = 100\n",
        )
        .unwrap();

        let loaded = InsightConfig::load(tmp.path()).unwrap();
        assert_eq!(loaded.crawler.timeout_ms, 100);
        assert_eq!(loaded.backend.model, "gpt-4o-mini");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "not valid toml [[[").unwrap();

        let result = InsightConfig::load(tmp.path());
        assert!(matches!(result, Err(InsightError::ConfigError(_))));
    }

    #[test]
    fn test_min_request_interval() {
        let mut backend = BackendConfig::default();
        backend.requests_per_minute = 60;
        assert_eq!(backend.min_request_interval(), Some(Duration::from_secs(1)));

        backend.requests_per_minute = 0;
        assert_eq!(backend.min_request_interval(), None);
    }
}
