//! Configuration module for the Amqp Rpc crate.
//!
//! Loads settings from files (TOML, YAML, JSON) and overrides them with
//! environment variables, exactly as the reference server this crate was
//! adapted from. All configuration values are validated before use.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::config::ConfigError;
use config::{Config, ConfigError as ExternalConfigError, Environment, File};
use serde::{Deserialize, Serialize};

pub mod client;
pub mod server;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A trait for types that can be validated.
pub trait Validate {
    /// Validates that the configuration is correct.
    fn validate(&self) -> ConfigResult<()>;
}

/// Top-level configuration for the demo binary: the options an embedder
/// would otherwise pass to `RpcServer::new`/`RpcClient::new` directly,
/// plus logging.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Server-side RPC options.
    pub server: server::RpcServerOptions,

    /// Client-side RPC options.
    pub client: client::RpcClientOptions,

    /// Log configuration.
    pub log: LogConfig,
}

impl Validate for AppConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.client.validate()?;
        self.log.validate()?;
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Whether to log in JSON format.
    pub json: bool,

    /// Whether to include source code locations in logs.
    pub source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            source_location: true,
        }
    }
}

impl Validate for LogConfig {
    fn validate(&self) -> ConfigResult<()> {
        match self.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(ConfigError::ValidationError(format!(
                "invalid log level: {}",
                self.level
            ))),
        }
    }
}

/// Configuration loader for the Amqp Rpc demo binary.
#[derive(Debug)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Optional path to the configuration file.
    /// * `env_prefix` - Prefix for environment variables that override configuration values.
    pub fn new<P: AsRef<Path>>(config_path: Option<P>, env_prefix: &str) -> Self {
        Self {
            config_path: config_path.map(|p| p.as_ref().to_path_buf()),
            env_prefix: env_prefix.to_string(),
        }
    }

    /// Loads the configuration from a file and environment variables.
    pub fn load(&self) -> ConfigResult<AppConfig> {
        let mut builder = Config::builder();

        builder = builder.add_source(
            Config::try_from(&AppConfig::default())
                .map_err(|e| ConfigError::ParseError(e.to_string()))?,
        );

        if let Some(path) = &self.config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }

            builder = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => builder.add_source(File::with_name(path.to_str().unwrap())),
                Some("json") => builder.add_source(
                    File::with_name(path.to_str().unwrap()).format(config::FileFormat::Json),
                ),
                Some("yaml" | "yml") => builder.add_source(
                    File::with_name(path.to_str().unwrap()).format(config::FileFormat::Yaml),
                ),
                _ => {
                    return Err(ConfigError::ParseError(format!(
                        "unsupported file extension for: {path:?}"
                    )))
                }
            };
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(|e| match e {
            ExternalConfigError::NotFound(path) => ConfigError::FileNotFound(PathBuf::from(path)),
            ExternalConfigError::PathParse(path) => {
                ConfigError::ParseError(format!("invalid path: {path:?}"))
            }
            ExternalConfigError::FileParse { .. } => {
                ConfigError::ParseError("error parsing config file".to_string())
            }
            ExternalConfigError::Foreign(err) => ConfigError::ParseError(err.to_string()),
            ExternalConfigError::Frozen => {
                ConfigError::ParseError("configuration is frozen".to_string())
            }
            ExternalConfigError::Message(msg) => ConfigError::ParseError(msg),
            ExternalConfigError::Type { .. } => {
                ConfigError::ParseError("type conversion error".to_string())
            }
        })?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        app_config.validate()?;

        Ok(app_config)
    }
}

/// Global configuration accessor.
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    config: Arc<AppConfig>,
}

impl GlobalConfig {
    /// Creates a new global configuration.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Returns a reference to the configuration.
    pub fn get(&self) -> &AppConfig {
        &self.config
    }
}

/// Global configuration slot, set once during startup.
static GLOBAL_CONFIG: once_cell::sync::OnceCell<GlobalConfig> = once_cell::sync::OnceCell::new();

/// Initializes the global configuration. Subsequent calls are ignored.
pub fn init_global_config(config: AppConfig) {
    let _ = GLOBAL_CONFIG.set(GlobalConfig::new(config));
}

/// Initializes the global configuration with defaults, for library
/// consumers that never call [`init_global_config`] explicitly.
pub fn init_default_config() -> ConfigResult<()> {
    let config = AppConfig::default();
    config.validate()?;
    init_global_config(config);
    Ok(())
}

/// Returns a reference to the global configuration.
///
/// # Panics
///
/// Panics if the global configuration has not been initialized.
pub fn get_global_config() -> &'static GlobalConfig {
    GLOBAL_CONFIG
        .get()
        .expect("global configuration not initialized")
}
