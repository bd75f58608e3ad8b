//! Checkpoint recovery at pipeline start

use crate::common::{long_article, test_config, urls};
use page_harvest::config::Config;
use page_harvest::output::CsvOutputHandler;
use page_harvest::storage::CheckpointManager;
use page_harvest::Pipeline;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const PATHS: [&str; 3] = ["/a", "/b", "/c"];

/// Runs a full harvest over `PATHS` so a checkpoint exists
async fn completed_run(config: &Config, base: &str, dir: &TempDir) {
    let pipeline = Pipeline::new(config, urls(base, &PATHS), true).await.unwrap();
    let mut output = CsvOutputHandler::open(&dir.path().join("harvest.csv"), false).unwrap();
    pipeline.run(&mut output).await.unwrap();
}

async fn mock_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(long_article("Page")))
        .mount(&server)
        .await;
    server
}

fn rewrite(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
    let mut doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    edit(&mut doc);
    std::fs::write(path, serde_json::to_vec(&doc).unwrap()).unwrap();
}

#[tokio::test]
async fn test_resume_skips_checkpointed_items() {
    let server = mock_server().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    completed_run(&config, &server.uri(), &dir).await;

    let pipeline = Pipeline::new(&config, urls(&server.uri(), &PATHS), true)
        .await
        .unwrap();
    assert!(pipeline.is_resumed());
    assert_eq!(pipeline.pending_items(), 0);
    assert_eq!(pipeline.statistics().snapshot().success_count, 3);
}

#[tokio::test]
async fn test_truncated_checkpoint_starts_over() {
    let server = mock_server().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    completed_run(&config, &server.uri(), &dir).await;

    let path = Path::new(&config.output.checkpoint_path);
    let bytes = std::fs::read(path).unwrap();
    std::fs::write(path, &bytes[..bytes.len() / 2]).unwrap();

    let pipeline = Pipeline::new(&config, urls(&server.uri(), &PATHS), true)
        .await
        .unwrap();
    assert!(!pipeline.is_resumed());
    assert_eq!(pipeline.pending_items(), 3);
}

#[tokio::test]
async fn test_garbage_checkpoint_starts_over() {
    let server = mock_server().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    std::fs::write(&config.output.checkpoint_path, b"\x00\x01 not json").unwrap();

    let pipeline = Pipeline::new(&config, urls(&server.uri(), &PATHS), true)
        .await
        .unwrap();
    assert!(!pipeline.is_resumed());
    assert_eq!(pipeline.pending_items(), 3);
}

#[tokio::test]
async fn test_tampered_checkpoint_is_rejected() {
    let server = mock_server().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    completed_run(&config, &server.uri(), &dir).await;

    let path = Path::new(&config.output.checkpoint_path);
    rewrite(path, |doc| {
        doc["statistics"]["success_count"] = serde_json::json!(99);
    });

    assert!(CheckpointManager::new(path).load().await.unwrap().is_none());

    let pipeline = Pipeline::new(&config, urls(&server.uri(), &PATHS), true)
        .await
        .unwrap();
    assert!(!pipeline.is_resumed());
    assert_eq!(pipeline.pending_items(), 3);
}

#[tokio::test]
async fn test_future_format_version_is_ignored() {
    let server = mock_server().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    completed_run(&config, &server.uri(), &dir).await;

    let path = Path::new(&config.output.checkpoint_path);
    rewrite(path, |doc| {
        doc["version"] = serde_json::json!(99);
    });

    let pipeline = Pipeline::new(&config, urls(&server.uri(), &PATHS), true)
        .await
        .unwrap();
    assert!(!pipeline.is_resumed());
}

#[tokio::test]
async fn test_changed_config_still_resumes() {
    let server = mock_server().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    completed_run(&config, &server.uri(), &dir).await;

    let mut changed = config.clone();
    changed.scraper.user_agent = "Different/2.0".to_string();

    let pipeline = Pipeline::new(&changed, urls(&server.uri(), &PATHS), true)
        .await
        .unwrap();
    assert!(pipeline.is_resumed());
    assert_eq!(pipeline.pending_items(), 0);
}

#[tokio::test]
async fn test_fresh_run_discards_checkpoint() {
    let server = mock_server().await;
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    completed_run(&config, &server.uri(), &dir).await;

    let pipeline = Pipeline::new(&config, urls(&server.uri(), &PATHS), false)
        .await
        .unwrap();
    assert!(!pipeline.is_resumed());
    assert_eq!(pipeline.pending_items(), 3);
    assert!(!Path::new(&config.output.checkpoint_path).exists());
}
