//! Configuration loading from disk and the process environment.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, InvalidSetting};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<InvalidSetting>),
}

fn join(errors: &[InvalidSetting]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Values supplied on the command line or through environment variables.
/// They take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub secret: Option<String>,
    pub instance: Option<String>,
}

impl Overrides {
    pub fn apply(self, config: &mut ServiceConfig) {
        if let Some(port) = self.port {
            let bind = &mut config.listener.bind_address;
            *bind = match bind.parse::<SocketAddr>() {
                Ok(mut addr) => {
                    addr.set_port(port);
                    addr.to_string()
                }
                Err(_) => format!("0.0.0.0:{port}"),
            };
        }
        if let Some(secret) = self.secret {
            config.auth.secret = secret;
        }
        if let Some(instance) = self.instance {
            config.instance.id = instance;
        }
    }
}

/// Parse a TOML file without validating it.
pub fn read_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Build the effective configuration: file (or defaults), then overrides,
/// then validation.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: Overrides,
) -> Result<ServiceConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => ServiceConfig::default(),
    };
    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}
