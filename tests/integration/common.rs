//! Shared helpers for the integration tests

use page_harvest::config::Config;
use page_harvest::crawler::RetryPolicy;
use page_harvest::output::OutputRow;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// A page with a content region holding `paragraphs`
pub fn article(title: &str, paragraphs: &[&str]) -> String {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<p>{}</p>", p))
        .collect();
    format!(
        r#"<html><head><title>{}</title></head><body>
        <nav><p>Navigation</p></nav>
        <div id="mw-content-text">{}</div>
        <div class="mw-normal-catlinks"><ul><li><a href="/c">Test pages</a></li></ul></div>
        </body></html>"#,
        title, body
    )
}

/// A page whose text comfortably passes the length check used in these tests
pub fn long_article(title: &str) -> String {
    article(
        title,
        &[
            "This paragraph carries enough words to pass the minimum content length.",
            "A second paragraph makes sure of it.",
        ],
    )
}

/// Config with no rate limit and a checkpoint inside `dir`
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.scraper.rate_limit_seconds = 0.0;
    config.scraper.min_content_length = 50;
    config.scraper.timeout_seconds = 5;
    config.output.checkpoint_path = dir
        .path()
        .join("checkpoint.json")
        .to_string_lossy()
        .into_owned();
    config
}

/// Retry policy with a short backoff so retry tests stay fast
pub fn fast_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries).with_backoff_base(Duration::from_millis(10))
}

/// Item identifiers for `paths` on the mock server
pub fn urls(base: &str, paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| format!("{}{}", base, p)).collect()
}

/// Reads the rows of a CSV output file
pub fn read_csv_rows(path: &Path) -> Vec<OutputRow> {
    csv::Reader::from_path(path)
        .expect("output file readable")
        .deserialize()
        .map(|row| row.expect("row deserializes"))
        .collect()
}
