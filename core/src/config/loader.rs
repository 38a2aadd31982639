use crate::config::error::{ConfigError, Result};
use crate::retry::{CircuitBreaker, RetryConfig};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Root application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Hosted backend connection
    #[serde(default)]
    pub backend: BackendSettings,

    /// Remote query wrapper and circuit breaker
    #[serde(default)]
    pub retry: RetrySettings,

    /// Bulk upload
    #[serde(default)]
    pub import: ImportSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Project URL; empty selects the in-memory backend.
    #[serde(default)]
    pub url: String,

    /// Public (anon) API key, sent as `apikey` and as the default bearer.
    #[serde(default)]
    pub api_key: String,

    /// Signed-in user's session token; overrides the bearer when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per call, first one included
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Consecutive retryable failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Target collection for uploaded rows
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Uploads above this size are rejected before parsing
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Route each row insert through the retry wrapper
    #[serde(default)]
    pub retry_rows: bool,
}

// Default value functions
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_max_jitter_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_failure_threshold() -> u32 {
    crate::retry::circuit_breaker::DEFAULT_FAILURE_THRESHOLD
}
fn default_cooldown_secs() -> u64 {
    crate::retry::circuit_breaker::DEFAULT_COOLDOWN.as_secs()
}
fn default_collection() -> String {
    "agencies".to_string()
}
fn default_max_upload_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            access_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            max_delay_ms: default_max_delay_ms(),
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            max_upload_bytes: default_max_upload_bytes(),
            retry_rows: false,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay_ms: self.initial_delay_ms,
            max_delay_ms: self.max_delay_ms,
            max_jitter_ms: self.max_jitter_ms,
        }
    }

    /// Breaker shared by every remote call of one process.
    pub fn build_breaker(&self) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::with_params(
            self.failure_threshold,
            Duration::from_secs(self.cooldown_secs),
        ))
    }
}

impl AppConfig {
    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Configuration loader with layered merging support
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration with layered merging:
    /// 1. Start with defaults (from Default implementations)
    /// 2. Merge config file if provided
    /// 3. Override with environment variables (EDUDIR_ prefix)
    pub fn load(&self) -> Result<AppConfig> {
        let mut builder = Config::builder();

        // Layer 1: Defaults
        let defaults_json = serde_json::to_string(&AppConfig::default())?;
        builder = builder.add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        // Layer 2: Config file
        if let Some(ref path) = self.config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            builder = builder.add_source(File::from(path.as_ref()));
        }

        // Layer 3: Environment, e.g. EDUDIR_BACKEND__URL=https://x.example.co
        builder = builder.add_source(
            Environment::with_prefix("EDUDIR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        crate::config::validator::SchemaValidator::new()?.validate(&app_config)?;

        tracing::debug!(
            file = ?self.config_path,
            remote = !app_config.backend.url.is_empty(),
            "configuration loaded"
        );
        Ok(app_config)
    }

    /// Locate the default config file:
    /// 1. Current directory: ./edudir.toml
    /// 2. XDG config: ~/.config/edudir/config.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./edudir.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("edudir").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        None
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<AppConfig> {
        let loader = match Self::find_config_file() {
            Some(config_path) => ConfigLoader::new().with_file(config_path),
            None => ConfigLoader::new(),
        };

        loader.load()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
