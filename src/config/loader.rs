//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::{LegacySettings, MintConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Json(serde_json::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Json(e) => write!(f, "Settings parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from a TOML file, or a legacy `.json` settings file.
///
/// The result is not validated; CLI overrides are applied first and
/// [`validate_config`] runs afterwards.
pub fn read_config(path: &Path) -> Result<MintConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        let legacy: LegacySettings = serde_json::from_str(&content).map_err(ConfigError::Json)?;
        tracing::debug!(path = %path.display(), "Loaded legacy JSON settings");
        Ok(legacy.into())
    } else {
        toml::from_str(&content).map_err(ConfigError::Parse)
    }
}

/// Load and validate configuration.
pub fn load_config(path: &Path) -> Result<MintConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}
