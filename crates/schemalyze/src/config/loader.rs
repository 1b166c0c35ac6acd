use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::config::schema::ServiceConfig;
use crate::error::ConfigError;
use crate::pipeline::StageSet;

/// Env var naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SCHEMALYZE_CONFIG";
/// Env var overriding `listenAddress`.
pub const LISTEN_ADDRESS_ENV: &str = "SCHEMALYZE_LISTEN_ADDRESS";

/// Upper bound for `retentionSecs` (one year).
pub const MAX_RETENTION_SECS: u64 = 365 * 24 * 60 * 60;
/// Upper bound for `sweepIntervalSecs` (one day).
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// `<platform config dir>/schemalyze/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("schemalyze").join("config.json"))
}

/// Loads the service configuration the way the server starts up.
///
/// An explicit `SCHEMALYZE_CONFIG` file must exist. Otherwise the default
/// path is used if present, falling back to built-in defaults. Environment
/// overrides are applied last, then the result is validated.
pub fn load_service_config() -> Result<ServiceConfig, ConfigError> {
    let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) => load_config(PathBuf::from(path))?,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => {
                log::info!("Loading configuration from {:?}", path);
                load_config(path)?
            }
            None => {
                log::info!("No configuration file found, using defaults");
                ServiceConfig::default()
            }
        },
    };

    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

pub fn apply_env_overrides(config: &mut ServiceConfig) {
    if let Ok(address) = std::env::var(LISTEN_ADDRESS_ENV) {
        if !address.trim().is_empty() {
            config.listen_address = address.trim().to_string();
        }
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), ConfigError> {
    config
        .listen_address
        .parse::<SocketAddr>()
        .map_err(|e| ConfigError::InvalidAddress {
            address: config.listen_address.clone(),
            reason: e.to_string(),
        })?;

    if config.max_concurrent_jobs == 0 {
        return Err(ConfigError::Validation {
            message: "maxConcurrentJobs must be at least 1".to_string(),
        });
    }

    if config.sweep_interval_secs == 0 || config.sweep_interval_secs > MAX_SWEEP_INTERVAL_SECS {
        return Err(ConfigError::Validation {
            message: format!(
                "sweepIntervalSecs must be between 1 and {}",
                MAX_SWEEP_INTERVAL_SECS
            ),
        });
    }

    if config.retention_secs > MAX_RETENTION_SECS {
        return Err(ConfigError::Validation {
            message: format!("retentionSecs must not exceed {}", MAX_RETENTION_SECS),
        });
    }

    if config.event_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "eventCapacity must be at least 1".to_string(),
        });
    }

    if let Some(origin) = config.allowed_origins.iter().find(|o| o.trim().is_empty()) {
        return Err(ConfigError::Validation {
            message: format!("Invalid allowed origin '{}'", origin),
        });
    }

    let mut names = HashSet::new();
    for stage in &config.stages {
        if !names.insert(stage.name.as_str()) {
            return Err(ConfigError::Validation {
                message: format!("Duplicate retry settings for stage '{}'", stage.name),
            });
        }
        if stage.max_attempts == 0 {
            return Err(ConfigError::Validation {
                message: format!("Stage '{}': maxAttempts must be at least 1", stage.name),
            });
        }
        if stage.initial_backoff_ms > stage.max_backoff_ms {
            return Err(ConfigError::Validation {
                message: format!(
                    "Stage '{}': initialBackoffMs exceeds maxBackoffMs",
                    stage.name
                ),
            });
        }
    }

    Ok(())
}

/// Applies the configured retry policies to `stages`.
pub fn apply_stage_overrides(
    config: &ServiceConfig,
    stages: &mut StageSet,
) -> Result<(), ConfigError> {
    for stage in &config.stages {
        if !stages.set_retry(&stage.name, stage.retry_policy()) {
            return Err(ConfigError::Validation {
                message: format!("Unknown stage '{}' in retry settings", stage.name),
            });
        }
    }
    Ok(())
}
