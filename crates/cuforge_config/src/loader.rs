//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::CuforgeConfig;
use std::path::Path;

/// Loads and validates a `cuforge.toml` configuration from a project
/// directory.
pub fn load_config(project_dir: &Path) -> Result<CuforgeConfig, ConfigError> {
    let config_path = project_dir.join("cuforge.toml");
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `cuforge.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<CuforgeConfig, ConfigError> {
    let config: CuforgeConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that configuration values are usable.
fn validate_config(config: &CuforgeConfig) -> Result<(), ConfigError> {
    if let Some(fmt) = &config.kernel.binary_format {
        if !fmt.starts_with('-') {
            return Err(ConfigError::ValidationError(format!(
                "binary_format '{fmt}' must be a compiler flag"
            )));
        }
    }
    if config.kernel.arch == Some(0) {
        return Err(ConfigError::ValidationError(
            "arch must be a nonzero SM generation".to_string(),
        ));
    }
    if config.cache.dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "cache.dir must not be empty".to_string(),
        ));
    }
    Ok(())
}
