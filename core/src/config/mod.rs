//! Layered configuration
//!
//! 1. Defaults (from code)
//! 2. Config file (`--config`, `./edudir.toml`, or `$XDG_CONFIG_HOME/edudir/config.toml`)
//! 3. Environment variables (`EDUDIR_*`, `__` for nesting)
//!
//! ```no_run
//! use edudir_core::config::ConfigLoader;
//!
//! let config = ConfigLoader::load_default()?;
//! let config = ConfigLoader::new().with_file("./edudir.toml").load()?;
//! # Ok::<(), edudir_core::config::ConfigError>(())
//! ```

pub mod error;
pub mod loader;
pub mod validator;

pub use error::{ConfigError, Result};
pub use loader::{AppConfig, BackendSettings, ConfigLoader, ImportSettings, RetrySettings};
pub use validator::SchemaValidator;
