use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Browser-like user agent sent when the config does not override it
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Main configuration structure for Page-Harvest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Fetch, retry and extraction behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScraperConfig {
    /// Retries allowed for a transient failure (timeouts, 5xx, connection errors)
    pub max_retries: u32,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,

    /// Number of items fetched concurrently in one batch
    pub batch_size: usize,

    /// Minimum length of the cleaned text, in characters
    pub min_content_length: usize,

    /// Completed items between two periodic checkpoints
    pub checkpoint_frequency: u64,

    /// Minimum delay between two fetch issues, in seconds
    pub rate_limit_seconds: f64,

    /// User-Agent header for every request
    pub user_agent: String,

    /// Element id of the main content region
    pub content_container: String,

    /// Class of the element holding category links
    pub category_container: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_seconds: 30,
            batch_size: 10,
            min_content_length: 100,
            checkpoint_frequency: 50,
            rate_limit_seconds: 1.0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            content_container: "mw-content-text".to_string(),
            category_container: "mw-normal-catlinks".to_string(),
        }
    }
}

impl ScraperConfig {
    /// Per-request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Delay between fetch issues as a `Duration`
    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit_seconds)
    }
}

/// Where progress is persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the JSON checkpoint file
    pub checkpoint_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: "scraper_checkpoint.json".to_string(),
        }
    }
}
