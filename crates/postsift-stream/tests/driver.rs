//! PipelineDriver reconnect and lifecycle behavior

mod common;

use common::{post, MockClassifier, ScriptedConnector, Step};
use postsift_core::{Error, Report};
use postsift_stream::{BackoffConfig, EventFilter, PipelineDriver, ReportConfig, StreamCollector};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

fn driver(connector: &Arc<ScriptedConnector>, backoff: BackoffConfig) -> PipelineDriver {
    PipelineDriver::new(
        connector.clone(),
        StreamCollector::new(EventFilter::accept_all(), ReportConfig::default()),
        backoff,
    )
}

fn fast_backoff(max_attempts: u32) -> BackoffConfig {
    BackoffConfig {
        initial_delay_ms: 100,
        max_delay_ms: 1_000,
        multiplier: 2.0,
        max_attempts,
    }
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_source_error() {
    let connector = Arc::new(ScriptedConnector::new(vec![
        vec![
            Step::Deliver(post(0, "rust before drop")),
            Step::Fail("connection reset".to_string()),
        ],
        vec![Step::Deliver(post(1, "rust after reconnect"))],
    ]));
    let classifier = Arc::new(MockClassifier::new());
    let (mut tx, mut rx) = mpsc::unbounded_channel::<Report>();

    let mut driver = driver(&connector, BackoffConfig::default());
    driver.run_live(classifier.clone(), &mut tx).await.unwrap();

    let mut texts = Vec::new();
    while let Ok(report) = rx.try_recv() {
        texts.push(report.text);
    }
    assert_eq!(texts, vec!["rust before drop", "rust after reconnect"]);
    assert_eq!(driver.reconnects(), 1);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    assert_eq!(connector.closes.load(Ordering::SeqCst), 2);
    assert!(classifier.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));
    let classifier = Arc::new(MockClassifier::new());
    let (mut tx, _rx) = mpsc::unbounded_channel::<Report>();

    let mut driver = driver(&connector, fast_backoff(2));
    let err = driver.run_live(classifier.clone(), &mut tx).await.unwrap_err();

    assert!(err.is_source());
    assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
    assert_eq!(driver.reconnects(), 2);
    assert!(classifier.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_disabled_backoff_never_reconnects() {
    let connector = Arc::new(ScriptedConnector::new(vec![
        vec![Step::Fail("refused".to_string())],
        vec![Step::Deliver(post(0, "rust"))],
    ]));
    let classifier = Arc::new(MockClassifier::new());
    let (mut tx, _rx) = mpsc::unbounded_channel::<Report>();

    let mut driver = driver(&connector, BackoffConfig::disabled());
    let err = driver.run_live(classifier.clone(), &mut tx).await.unwrap_err();

    assert!(err.is_source());
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(driver.reconnects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_attempts_reset_after_productive_connection() {
    let connector = Arc::new(ScriptedConnector::new(vec![
        vec![Step::Deliver(post(0, "one")), Step::Fail("drop".to_string())],
        vec![Step::Deliver(post(1, "two")), Step::Fail("drop".to_string())],
        vec![Step::Deliver(post(2, "three"))],
    ]));
    let classifier = Arc::new(MockClassifier::new());
    let (mut tx, _rx) = mpsc::unbounded_channel::<Report>();

    let mut driver = driver(&connector, fast_backoff(1));
    driver.run_live(classifier.clone(), &mut tx).await.unwrap();

    assert_eq!(driver.reconnects(), 2);
    assert_eq!(classifier.seen(), vec!["one", "two", "three"]);
}

#[tokio::test(start_paused = true)]
async fn test_unproductive_failures_accumulate() {
    let connector = Arc::new(ScriptedConnector::new(vec![
        vec![Step::Fail("drop".to_string())],
        vec![Step::Fail("drop".to_string())],
        vec![Step::Deliver(post(0, "never reached"))],
    ]));
    let classifier = Arc::new(MockClassifier::new());
    let (mut tx, _rx) = mpsc::unbounded_channel::<Report>();

    let mut driver = driver(&connector, fast_backoff(1));
    let err = driver.run_live(classifier.clone(), &mut tx).await.unwrap_err();

    assert!(err.is_source());
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    assert!(classifier.seen().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_classifier_exit_stops_without_reconnect() {
    let connector = Arc::new(ScriptedConnector::new(vec![
        vec![Step::Deliver(post(0, "die")), Step::Deliver(post(1, "rust"))],
        vec![Step::Deliver(post(2, "rust"))],
    ]));
    let classifier = Arc::new(MockClassifier::new());
    let (mut tx, _rx) = mpsc::unbounded_channel::<Report>();

    let mut driver = driver(&connector, BackoffConfig::default());
    let err = driver.run_live(classifier.clone(), &mut tx).await.unwrap_err();

    assert!(matches!(err, Error::SubprocessExit(_)));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    assert!(classifier.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_clean_end_closes_classifier() {
    let connector = Arc::new(ScriptedConnector::new(vec![vec![Step::Deliver(post(
        0, "hello",
    ))]]));
    let classifier = Arc::new(MockClassifier::new());
    let (mut tx, mut rx) = mpsc::unbounded_channel::<Report>();

    let mut driver = driver(&connector, BackoffConfig::default());
    driver.run_live(classifier.clone(), &mut tx).await.unwrap();

    assert!(rx.try_recv().is_err());
    assert_eq!(driver.collector().stats().classified, 1);
    assert!(classifier.is_closed());
}

#[tokio::test]
async fn test_collect_uses_single_connection() {
    let connector = Arc::new(ScriptedConnector::new(vec![vec![
        Step::Deliver(post(0, "a")),
        Step::Deliver(post(1, "b")),
        Step::Deliver(post(2, "c")),
    ]]));

    let mut driver = driver(&connector, BackoffConfig::default());
    let samples = driver.collect(2, "other").await.unwrap();

    assert_eq!(samples.len(), 2);
    assert_eq!(samples[1].post.text, "b");
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_collect_connect_failure_is_returned() {
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));

    let mut driver = driver(&connector, BackoffConfig::default());
    let err = driver.collect(2, "other").await.unwrap_err();

    assert!(err.is_source());
}
