//! Transfer engine integration tests against mock HTTP servers

use network_speed_tester::{
    NullSink, ProbeTarget, SpeedTestConfig, SpeedTestError, TransferEngine,
};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn test_engine() -> TransferEngine {
    let config = SpeedTestConfig {
        // Keep the synthetic buffer small so upload tests stay cheap
        transfer_buffer_bytes: 16 * 1024,
        ..Default::default()
    };
    TransferEngine::new(&config, Arc::new(NullSink)).unwrap()
}

fn target(server_url: &str, request_path: &str, session: Uuid) -> ProbeTarget {
    ProbeTarget {
        url: format!("{server_url}{request_path}"),
        server: server_url.to_string(),
        session,
    }
}

async fn mount_get(server: &MockServer, request_path: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(request_path))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_batch_aggregates_all_probe_bytes() {
    let server = MockServer::start().await;
    let body = vec![0u8; 100_000];
    for p in ["/one", "/two", "/three"] {
        mount_get(&server, p, ResponseTemplate::new(200).set_body_bytes(body.clone())).await;
    }

    let session = Uuid::new_v4();
    let targets = vec![
        target(&server.uri(), "/one", session),
        target(&server.uri(), "/two", session),
        target(&server.uri(), "/three", session),
    ];

    let engine = test_engine();
    let result = engine.measure_batch(&targets, 3, 0).await.unwrap();
    // Exactly 3 probes settle, each counting its full body
    assert_eq!(result.bytes, 300_000);
    assert!(result.bytes_per_sec() > 0);
}

#[tokio::test]
async fn test_concurrency_cap_is_respected() {
    let server = MockServer::start().await;
    let delay = Duration::from_millis(150);
    for p in ["/one", "/two", "/three"] {
        mount_get(
            &server,
            p,
            ResponseTemplate::new(200)
                .set_body_bytes(vec![1u8; 1000])
                .set_delay(delay),
        )
        .await;
    }

    let session = Uuid::new_v4();
    let targets = vec![
        target(&server.uri(), "/one", session),
        target(&server.uri(), "/two", session),
        target(&server.uri(), "/three", session),
    ];

    let engine = test_engine();
    let result = engine.measure_batch(&targets, 2, 0).await.unwrap();

    // With a cap of 2, the third probe cannot start until a slot frees up,
    // so the batch takes at least two delay periods
    assert!(result.elapsed >= delay * 2, "elapsed = {:?}", result.elapsed);
    assert_eq!(result.bytes, 3000);
}

#[tokio::test]
async fn test_fault_drains_batch_before_surfacing() {
    let server = MockServer::start().await;
    mount_get(&server, "/one", ResponseTemplate::new(200).set_body_bytes(vec![1u8; 512])).await;
    mount_get(&server, "/two", ResponseTemplate::new(500)).await;
    // The probe after the fault must still be dispatched, exactly once
    Mock::given(method("GET"))
        .and(path("/three"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 512]))
        .expect(1)
        .mount(&server)
        .await;

    let session = Uuid::new_v4();
    let targets = vec![
        target(&server.uri(), "/one", session),
        target(&server.uri(), "/two", session),
        target(&server.uri(), "/three", session),
    ];

    // Concurrency 1 forces dispatch order: the fault on /two settles before
    // /three is even started
    let engine = test_engine();
    let err = engine.measure_batch(&targets, 1, 0).await.unwrap_err();

    assert!(matches!(err, SpeedTestError::Batch { .. }));
    let faulted_url = format!("{}/two", server.uri());
    assert_eq!(err.implicated_url(), Some(faulted_url.as_str()));
    // Dropping the server verifies the expect(1) on /three
}

#[tokio::test]
async fn test_non_2xx_is_a_fault() {
    let server = MockServer::start().await;
    mount_get(&server, "/only", ResponseTemplate::new(404)).await;

    let engine = test_engine();
    let targets = vec![target(&server.uri(), "/only", Uuid::new_v4())];
    let err = engine.measure_batch(&targets, 1, 0).await.unwrap_err();
    assert!(err.to_string().contains("/only"));
}

#[tokio::test]
async fn test_upload_counts_declared_size() {
    let server = MockServer::start().await;
    for p in ["/up1", "/up2"] {
        Mock::given(method("POST"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    let session = Uuid::new_v4();
    let targets = vec![
        target(&server.uri(), "/up1", session),
        target(&server.uri(), "/up2", session),
    ];

    let upload_bytes = 48 * 1024;
    let engine = test_engine();
    let result = engine
        .measure_batch(&targets, 2, upload_bytes)
        .await
        .unwrap();
    // Uploads count the declared size, not peer-confirmed bytes
    assert_eq!(result.bytes, 2 * upload_bytes);
}

#[tokio::test]
async fn test_upload_fault_on_rejected_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/up"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let engine = test_engine();
    let targets = vec![target(&server.uri(), "/up", Uuid::new_v4())];
    let err = engine.measure_batch(&targets, 1, 1024).await.unwrap_err();
    assert!(matches!(err, SpeedTestError::Batch { .. }));
}

#[tokio::test]
async fn test_empty_batch_is_zero() {
    let engine = test_engine();
    let result = engine.measure_batch(&[], 5, 0).await.unwrap();
    assert_eq!(result.bytes, 0);
    assert_eq!(result.bytes_per_sec(), 0);
}
