use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use page_harvest::config::load_config;
///
/// let config = load_config(Path::new("scraper_config.toml")).unwrap();
/// println!("Batch size: {}", config.scraper.batch_size);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Loads the configuration, falling back to built-in defaults
///
/// When no file exists at `path`, the defaults are written there so they can
/// be edited for the next run. A file that exists but fails to parse or
/// validate is still an error.
///
/// # Returns
///
/// * `Ok((Config, bool))` - The configuration, and whether defaults were used
/// * `Err(ConfigError)` - The file exists but is invalid, or defaults could
///   not be written
pub fn load_or_default(path: &Path) -> Result<(Config, bool), ConfigError> {
    if path.exists() {
        return Ok((load_config(path)?, false));
    }

    tracing::warn!(
        "Config file {} not found, using defaults",
        path.display()
    );
    let config = Config::default();
    write_config(&config, path)?;
    Ok((config, true))
}

/// Writes a configuration as TOML
pub fn write_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Computes a SHA-256 fingerprint of the effective configuration
///
/// The hash is taken over the canonical TOML serialization, so two files that
/// differ only in comments or key order produce the same fingerprint. It is
/// stored in every checkpoint to detect a resume under changed settings.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash
/// * `Err(ConfigError)` - The config could not be serialized
pub fn compute_config_hash(config: &Config) -> Result<String, ConfigError> {
    let canonical = toml::to_string(config)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
