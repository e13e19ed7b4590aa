mod schema;
mod validation;

pub use schema::{AttributeOptions, AttributeSpec, Config, FailurePolicy, Options};
pub use validation::validate_config;

use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file used when `--config` is not given, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read configuration at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed configuration in {}: {message}", .path.display())]
    Malformed { path: PathBuf, message: String },

    #[error("invalid configuration in {}:\n  - {}", .path.display(), .errors.join("\n  - "))]
    Schema { path: PathBuf, errors: Vec<String> },
}

/// Document format, chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                ConfigFormat::Yaml
            }
            _ => ConfigFormat::Json,
        }
    }
}

/// Load and validate configuration from a file
///
/// # Errors
///
/// Returns an error if:
/// - The config file does not exist
/// - The config file cannot be read
/// - The file is not well-formed JSON or YAML
/// - The document does not have the shape of a [`Config`]
/// - The attribute list violates the schema (see [`validate_config`])
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let document = parse_document(&content, ConfigFormat::from_path(path)).map_err(|message| {
        ConfigError::Malformed {
            path: path.to_path_buf(),
            message,
        }
    })?;

    let config: Config = serde_json::from_value(document).map_err(|e| ConfigError::Schema {
        path: path.to_path_buf(),
        errors: vec![e.to_string()],
    })?;

    validate_config(&config).map_err(|errors| ConfigError::Schema {
        path: path.to_path_buf(),
        errors,
    })?;

    tracing::debug!(
        path = %path.display(),
        attributes = config.attributes.len(),
        "Loaded configuration"
    );

    Ok(config)
}

/// Parse the raw document, checking syntax only
pub fn parse_document(content: &str, format: ConfigFormat) -> Result<Value, String> {
    match format {
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        ConfigFormat::Yaml => serde_saphyr::from_str(content).map_err(|e| e.to_string()),
    }
}
