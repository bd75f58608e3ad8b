//! Graceful shutdown in the middle of a batch

use crate::common::{fast_retries, long_article, read_csv_rows, test_config, urls};
use page_harvest::output::CsvOutputHandler;
use page_harvest::shutdown::ShutdownState;
use page_harvest::storage::CheckpointManager;
use page_harvest::Pipeline;
use std::collections::BTreeSet;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_shutdown_checkpoints_completed_items_only() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    for p in ["/p1", "/p2", "/p6", "/p7"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string(long_article(p)))
            .mount(&mock_server)
            .await;
    }
    for p in ["/p3", "/p4", "/p5"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(long_article(p))
                    .set_delay(Duration::from_millis(800)),
            )
            .mount(&mock_server)
            .await;
    }

    let mut config = test_config(&dir);
    config.scraper.batch_size = 5;

    let items = urls(
        &mock_server.uri(),
        &["/p1", "/p2", "/p3", "/p4", "/p5", "/p6", "/p7"],
    );
    let pipeline = Pipeline::new(&config, items.clone(), true).await.unwrap();
    let live = pipeline.statistics();
    let shutdown = pipeline.shutdown_handle();

    // Ask for shutdown once the two fast items are done
    let trigger = {
        let live = live.clone();
        tokio::spawn(async move {
            while live.snapshot().completed() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            shutdown.request();
        })
    };

    let output_path = dir.path().join("harvest.csv");
    let mut output = CsvOutputHandler::open(&output_path, false).unwrap();
    let outcome = pipeline.run(&mut output).await.unwrap();
    trigger.await.unwrap();

    assert!(outcome.interrupted);
    assert_eq!(outcome.state, ShutdownState::Terminated);
    assert_eq!(outcome.statistics.completed(), 2);

    // The checkpoint holds exactly the items done at the request
    let checkpoint = CheckpointManager::new(&config.output.checkpoint_path)
        .load()
        .await
        .unwrap()
        .expect("checkpoint written on shutdown");
    let expected: BTreeSet<String> = items[..2].iter().cloned().collect();
    assert_eq!(checkpoint.statistics.processed_identifiers, expected);

    // In-flight fetches drained, the next batch never started
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 5);
    assert_eq!(live.snapshot().completed(), 5);

    let rows = read_csv_rows(&output_path);
    let ids: Vec<String> = rows.into_iter().map(|r| r.identifier).collect();
    assert_eq!(ids, items[..2].to_vec());
}

#[tokio::test]
async fn test_resume_after_shutdown_finishes_the_rest() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(long_article("Page")))
        .mount(&mock_server)
        .await;

    let mut config = test_config(&dir);
    config.scraper.batch_size = 2;

    let items = urls(&mock_server.uri(), &["/a", "/b", "/c", "/d"]);
    let output_path = dir.path().join("harvest.csv");

    // Shutdown requested before the first batch
    let first = Pipeline::new(&config, items.clone(), true).await.unwrap();
    first.shutdown_handle().request();
    let mut output = CsvOutputHandler::open(&output_path, false).unwrap();
    let outcome = first.run(&mut output).await.unwrap();
    drop(output);

    assert!(outcome.interrupted);
    assert_eq!(outcome.records_written, 0);
    assert!(mock_server.received_requests().await.unwrap().is_empty());

    let second = Pipeline::new(&config, items.clone(), true).await.unwrap();
    assert!(second.is_resumed());
    assert_eq!(second.pending_items(), 4);

    let mut output = CsvOutputHandler::open(&output_path, true).unwrap();
    let outcome = second.run(&mut output).await.unwrap();
    drop(output);

    assert!(!outcome.interrupted);
    assert_eq!(outcome.state, ShutdownState::Running);
    assert_eq!(outcome.statistics.success_count, 4);
    assert_eq!(read_csv_rows(&output_path).len(), 4);
}

#[tokio::test]
async fn test_shutdown_stops_retries_of_in_flight_item() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(300)))
        .mount(&mock_server)
        .await;

    let config = test_config(&dir);
    let pipeline = Pipeline::new(&config, urls(&mock_server.uri(), &["/flaky"]), true)
        .await
        .unwrap()
        .with_retry_policy(fast_retries(3));
    let live = pipeline.statistics();
    let shutdown = pipeline.shutdown_handle();

    // Ask for shutdown while the first attempt is still in flight
    let trigger = {
        let mock_server = &mock_server;
        async move {
            while mock_server.received_requests().await.unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            shutdown.request();
        }
    };

    let output_path = dir.path().join("harvest.csv");
    let mut output = CsvOutputHandler::open(&output_path, false).unwrap();
    let (outcome, ()) = tokio::join!(pipeline.run(&mut output), trigger);
    let outcome = outcome.unwrap();

    assert!(outcome.interrupted);
    assert_eq!(outcome.statistics.completed(), 0);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);

    let live = live.snapshot();
    assert_eq!(live.retry_count, 0);
    assert_eq!(live.failure_count, 1);
}
