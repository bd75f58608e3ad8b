use crate::config::types::{Config, OutputConfig, ScraperConfig};
use crate::ConfigError;

/// Upper bound on concurrent fetches in one batch
const MAX_BATCH_SIZE: usize = 1000;

/// Upper bound on the spacing between two request issues, in seconds
const MAX_RATE_LIMIT_SECONDS: f64 = 3600.0;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scraper_config(&config.scraper)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates fetch, retry and extraction settings
fn validate_scraper_config(config: &ScraperConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 || config.batch_size > MAX_BATCH_SIZE {
        return Err(ConfigError::Validation(format!(
            "batch_size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, config.batch_size
        )));
    }

    if config.timeout_seconds < 1 {
        return Err(ConfigError::Validation(
            "timeout_seconds must be >= 1".to_string(),
        ));
    }

    if config.checkpoint_frequency < 1 {
        return Err(ConfigError::Validation(
            "checkpoint_frequency must be >= 1".to_string(),
        ));
    }

    if !config.rate_limit_seconds.is_finite() || config.rate_limit_seconds < 0.0 {
        return Err(ConfigError::Validation(format!(
            "rate_limit_seconds must be a non-negative number, got {}",
            config.rate_limit_seconds
        )));
    }

    if config.rate_limit_seconds > MAX_RATE_LIMIT_SECONDS {
        return Err(ConfigError::Validation(format!(
            "rate_limit_seconds must be at most {}, got {}",
            MAX_RATE_LIMIT_SECONDS, config.rate_limit_seconds
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    // Used verbatim inside CSS selectors
    for (name, value) in [
        ("content_container", &config.content_container),
        ("category_container", &config.category_container),
    ] {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::Validation(format!(
                "{} must contain only letters, digits, '-' and '_', got '{}'",
                name, value
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.checkpoint_path.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
