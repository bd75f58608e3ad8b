//! End-to-end runs of the pipeline against a mock server

use crate::common::{article, fast_retries, long_article, read_csv_rows, test_config, urls};
use page_harvest::crawler::harvest;
use page_harvest::output::{open_output, CsvOutputHandler, SqliteOutputHandler};
use page_harvest::{ErrorKind, Pipeline};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_mixed_outcomes_with_retries() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // A: long article, first try
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string(long_article("A")))
        .expect(1)
        .mount(&mock_server)
        .await;

    // B: two server errors, then success
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200).set_body_string(long_article("B")))
        .expect(1)
        .mount(&mock_server)
        .await;

    // C: too short, never retried
    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article("C", &["Too short."])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = test_config(&dir);
    config.scraper.max_retries = 2;
    config.scraper.min_content_length = 50;

    let items = urls(&mock_server.uri(), &["/a", "/b", "/c"]);
    let output_path = dir.path().join("harvest.csv");
    let mut output = CsvOutputHandler::open(&output_path, false).unwrap();

    let outcome = Pipeline::new(&config, items.clone(), true)
        .await
        .unwrap()
        .with_retry_policy(fast_retries(2))
        .run(&mut output)
        .await
        .unwrap();

    assert_eq!(outcome.statistics.success_count, 2);
    assert_eq!(outcome.statistics.failure_count, 1);
    assert_eq!(outcome.statistics.retry_count, 2);
    assert!(outcome.statistics.is_consistent());

    let rows = read_csv_rows(&output_path);
    let ids: Vec<&str> = rows.iter().map(|r| r.identifier.as_str()).collect();
    assert_eq!(ids, items.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(rows[0].error, "");
    assert_eq!(rows[1].error, "");
    assert_eq!(rows[2].error, ErrorKind::TooShort.to_string());
    assert_eq!(rows[0].size_bytes, rows[0].content.len() as u64);
}

#[tokio::test]
async fn test_terminal_errors_are_not_retried() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body><p>No region</p></body></html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = test_config(&dir);
    let pipeline = Pipeline::new(&config, urls(&mock_server.uri(), &["/gone", "/empty"]), true)
        .await
        .unwrap()
        .with_retry_policy(fast_retries(3));

    let output_path = dir.path().join("harvest.csv");
    let mut output = CsvOutputHandler::open(&output_path, false).unwrap();
    let outcome = pipeline.run(&mut output).await.unwrap();

    assert_eq!(outcome.statistics.failure_count, 2);
    assert_eq!(outcome.statistics.retry_count, 0);

    let rows = read_csv_rows(&output_path);
    assert_eq!(rows[0].error, ErrorKind::ClientError(404).to_string());
    assert_eq!(rows[1].error, ErrorKind::NoContent.to_string());
}

#[tokio::test]
async fn test_exhausted_retries_count_as_failure() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let config = test_config(&dir);
    let pipeline = Pipeline::new(&config, urls(&mock_server.uri(), &["/down"]), true)
        .await
        .unwrap()
        .with_retry_policy(fast_retries(2));

    let output_path = dir.path().join("harvest.csv");
    let mut output = CsvOutputHandler::open(&output_path, false).unwrap();
    let outcome = pipeline.run(&mut output).await.unwrap();

    assert_eq!(outcome.statistics.failure_count, 1);
    assert_eq!(outcome.statistics.retry_count, 2);
    assert_eq!(read_csv_rows(&output_path)[0].error, ErrorKind::ServerError(503).to_string());
}

#[tokio::test]
async fn test_timeout_is_classified() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(long_article("Slow"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let mut config = test_config(&dir);
    config.scraper.timeout_seconds = 1;
    config.scraper.max_retries = 0;

    let output_path = dir.path().join("harvest.csv");
    let mut output = CsvOutputHandler::open(&output_path, false).unwrap();
    let outcome = harvest(&config, urls(&mock_server.uri(), &["/slow"]), &mut output, true)
        .await
        .unwrap();

    assert_eq!(outcome.statistics.failure_count, 1);
    assert_eq!(read_csv_rows(&output_path)[0].error, ErrorKind::Timeout.to_string());
}

#[tokio::test]
async fn test_output_order_ignores_latency() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // Earlier items answer slower, so completion order is reversed
    let paths = ["/1", "/2", "/3", "/4", "/5", "/6"];
    for (i, p) in paths.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(*p))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(long_article(p))
                    .set_delay(Duration::from_millis(50 * (paths.len() - i) as u64)),
            )
            .mount(&mock_server)
            .await;
    }

    let mut config = test_config(&dir);
    config.scraper.batch_size = 4;

    let items = urls(&mock_server.uri(), &paths);
    let output_path = dir.path().join("harvest.csv");
    let mut output = CsvOutputHandler::open(&output_path, false).unwrap();
    harvest(&config, items.clone(), &mut output, true).await.unwrap();

    let ids: Vec<String> = read_csv_rows(&output_path)
        .into_iter()
        .map(|r| r.identifier)
        .collect();
    assert_eq!(ids, items);
}

#[tokio::test]
async fn test_resume_never_refetches() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    for p in ["/a", "/b", "/c"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string(long_article(p)))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let config = test_config(&dir);
    let output_path = dir.path().join("harvest.csv");

    let first = Pipeline::new(&config, urls(&mock_server.uri(), &["/a", "/b"]), true)
        .await
        .unwrap();
    let mut output = open_output(&output_path, first.is_resumed()).unwrap();
    first.run(output.as_mut()).await.unwrap();
    drop(output);

    let second = Pipeline::new(&config, urls(&mock_server.uri(), &["/a", "/b", "/c"]), true)
        .await
        .unwrap();
    assert!(second.is_resumed());
    assert_eq!(second.pending_items(), 1);

    let mut output = open_output(&output_path, second.is_resumed()).unwrap();
    let outcome = second.run(output.as_mut()).await.unwrap();
    drop(output);

    assert_eq!(outcome.statistics.success_count, 3);
    assert_eq!(outcome.statistics.processed_identifiers.len(), 3);
    assert_eq!(read_csv_rows(&output_path).len(), 3);
}

#[tokio::test]
async fn test_duplicate_items_fetched_once() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/dup"))
        .respond_with(ResponseTemplate::new(200).set_body_string(long_article("Dup")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = test_config(&dir);
    let output_path = dir.path().join("harvest.csv");
    let mut output = CsvOutputHandler::open(&output_path, false).unwrap();
    let outcome = harvest(
        &config,
        urls(&mock_server.uri(), &["/dup", "/dup", "/dup"]),
        &mut output,
        true,
    )
    .await
    .unwrap();

    assert_eq!(outcome.records_written, 1);
    assert_eq!(outcome.statistics.success_count, 1);
}

#[tokio::test]
async fn test_rate_limit_spaces_requests() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(long_article("Any")))
        .mount(&mock_server)
        .await;

    let mut config = test_config(&dir);
    config.scraper.rate_limit_seconds = 0.2;
    config.scraper.batch_size = 2;

    let output_path = dir.path().join("harvest.csv");
    let mut output = CsvOutputHandler::open(&output_path, false).unwrap();
    let start = Instant::now();
    harvest(
        &config,
        urls(&mock_server.uri(), &["/1", "/2", "/3", "/4"]),
        &mut output,
        true,
    )
    .await
    .unwrap();

    // Four issues need three gaps, across the batch boundary too
    assert!(start.elapsed() >= Duration::from_millis(600));
}

#[tokio::test]
async fn test_sqlite_output() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(long_article("Stored"))
                .insert_header("last-modified", "Wed, 02 Oct 2024 08:00:00 GMT"),
        )
        .mount(&mock_server)
        .await;

    let config = test_config(&dir);
    let output_path = dir.path().join("harvest.db");
    let mut output = open_output(&output_path, false).unwrap();
    harvest(&config, urls(&mock_server.uri(), &["/page"]), output.as_mut(), true)
        .await
        .unwrap();
    drop(output);

    let rows = SqliteOutputHandler::open(&output_path, true).unwrap().rows().unwrap();
    assert_eq!(rows.len(), 1);

    let metadata: serde_json::Value = serde_json::from_str(&rows[0].metadata).unwrap();
    assert_eq!(metadata["title"], "Stored");
    assert_eq!(metadata["last_modified"], "Wed, 02 Oct 2024 08:00:00 GMT");
    assert_eq!(metadata["categories"][0], "Test pages");
    assert!(!rows[0].content.contains("Navigation"));
}
