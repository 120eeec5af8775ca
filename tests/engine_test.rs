//! Engine health probing and the startup gate, against a mock engine.

mod common;

use std::time::Duration;

use common::mock_engine;
use sgl_worker::engine::{wait_until_ready, Engine, EngineError, RemoteEngine};
use wiremock::{
    matchers::{method, path},
    Mock, ResponseTemplate,
};

#[tokio::test]
async fn test_check_health_reflects_status() {
    let server = mock_engine().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let engine = RemoteEngine::new(server.uri(), None, reqwest::Client::new());
    assert!(!engine.check_health().await.unwrap());
    assert!(engine.check_health().await.unwrap());
}

#[tokio::test]
async fn test_unreachable_engine_is_not_ready() {
    let engine = RemoteEngine::new("http://127.0.0.1:1", None, reqwest::Client::new());
    assert!(!engine.check_health().await.unwrap());
}

#[tokio::test]
async fn test_wait_until_ready_after_warmup() {
    let server = mock_engine().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let engine = RemoteEngine::new(server.uri(), None, reqwest::Client::new());
    wait_until_ready(&engine, Duration::from_secs(5), Duration::from_millis(10))
        .await
        .unwrap();

    let probes = server.received_requests().await.unwrap();
    assert_eq!(probes.len(), 3);
}

#[tokio::test]
async fn test_wait_until_ready_times_out() {
    let server = mock_engine().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let engine = RemoteEngine::new(server.uri(), None, reqwest::Client::new());
    let err = wait_until_ready(&engine, Duration::from_millis(100), Duration::from_millis(20))
        .await
        .unwrap_err();
    match err {
        EngineError::StartupTimeout { url, .. } => assert_eq!(url, server.uri()),
        other => panic!("expected startup timeout, got {other:?}"),
    }
}
