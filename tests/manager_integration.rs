//! End-to-end orchestrator tests against a mock speed service

use async_trait::async_trait;
use network_speed_tester::{
    Milestone, ProgressObserver, Result, SpeedManager, SpeedService, SpeedTestConfig,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Speed service backed by a wiremock server: every logical server name maps
/// to its own path prefix on the one mock socket.
struct MockSpeedService {
    base_url: String,
    servers: Vec<String>,
}

#[async_trait]
impl SpeedService for MockSpeedService {
    fn possible_servers(&self) -> Vec<String> {
        self.servers.clone()
    }

    async fn refresh_possible_servers(&self) -> Result<()> {
        Ok(())
    }

    fn build_probe_url(&self, server: &str, bytes: u64, upload: bool, session: Uuid) -> String {
        let verb = if upload { "upload" } else { "download" };
        format!(
            "{}/{server}/{verb}?bytes={bytes}&session={session}",
            self.base_url
        )
    }

    // Tiny request granularity keeps the mock transfers fast
    fn normalized_size(&self, megabytes: u32) -> u64 {
        megabytes as u64 * 64
    }
}

/// Observer that records every milestone it sees
#[derive(Default)]
struct Recorder {
    milestones: Mutex<Vec<Milestone>>,
}

impl ProgressObserver for Recorder {
    fn on_milestone(&self, milestone: &Milestone) {
        self.milestones.lock().unwrap().push(*milestone);
    }
}

fn test_config() -> SpeedTestConfig {
    SpeedTestConfig {
        transfer_buffer_bytes: 16 * 1024,
        ping_wave_pause: Duration::from_millis(10),
        ban_cooldown: Duration::from_secs(60),
        ..Default::default()
    }
}

async fn mount_download(server: &MockServer, name: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/{name}/download")))
        .respond_with(ResponseTemplate::new(status).set_body_bytes(vec![7u8; 2048]))
        .mount(server)
        .await;
}

async fn mount_upload(server: &MockServer, name: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/{name}/upload")))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

fn manager_for(
    mock: &MockServer,
    servers: &[&str],
    observer: Arc<dyn ProgressObserver>,
) -> SpeedManager {
    let service = Arc::new(MockSpeedService {
        base_url: mock.uri(),
        servers: servers.iter().map(|s| s.to_string()).collect(),
    });
    SpeedManager::with_hooks(
        service,
        test_config(),
        observer,
        Arc::new(network_speed_tester::NullSink),
    )
    .unwrap()
}

#[tokio::test]
async fn test_tiered_download_run_reports_milestones() {
    let mock = MockServer::start().await;
    for name in ["alpha", "beta", "gamma"] {
        mount_download(&mock, name, 200).await;
    }

    let recorder = Arc::new(Recorder::default());
    let manager = manager_for(&mock, &["alpha", "beta", "gamma"], recorder.clone());

    let rate = manager.run_tiered_test(false, true, false).await.unwrap();
    assert!(rate > 0);

    // Fast mock responses mean the probe stage finished under the medium
    // threshold, so both stages ran
    let milestones = recorder.milestones.lock().unwrap();
    assert!(milestones
        .iter()
        .any(|m| matches!(m, Milestone::ProbeStage { .. })));
    assert!(milestones
        .iter()
        .any(|m| matches!(m, Milestone::ConfirmingStage { .. })));
}

#[tokio::test]
async fn test_tiered_upload_run_with_forced_small_tier() {
    let mock = MockServer::start().await;
    for name in ["alpha", "beta"] {
        mount_upload(&mock, name).await;
    }

    let recorder = Arc::new(Recorder::default());
    let manager = manager_for(&mock, &["alpha", "beta"], recorder.clone());

    let rate = manager.run_with_retry(true, true, true).await.unwrap();
    assert!(rate > 0);
}

#[tokio::test]
async fn test_batch_fault_is_attributed_to_the_server() {
    let mock = MockServer::start().await;
    mount_download(&mock, "good", 200).await;
    mount_download(&mock, "bad", 500).await;

    let manager = manager_for(
        &mock,
        &["good", "bad"],
        Arc::new(network_speed_tester::NullObserver),
    );

    let err = manager
        .test_service(false, &network_speed_tester::TierParameters::PROBE, true)
        .await
        .unwrap_err();
    assert_eq!(err.implicated_server(), Some("bad"));
}

#[tokio::test]
async fn test_retry_bans_the_offender_and_recovers() {
    let mock = MockServer::start().await;
    mount_download(&mock, "good", 200).await;
    mount_download(&mock, "bad", 503).await;

    let manager = manager_for(
        &mock,
        &["good", "bad"],
        Arc::new(network_speed_tester::NullObserver),
    );

    // First run implicates "bad"; the retry excludes it and succeeds
    let rate = manager.run_with_retry(false, true, false).await.unwrap();
    assert!(rate > 0);
    assert_eq!(manager.pool().active_ban_count(), 1);
}

#[tokio::test]
async fn test_fault_without_a_server_is_not_retried() {
    struct EmptyService;

    #[async_trait]
    impl SpeedService for EmptyService {
        fn possible_servers(&self) -> Vec<String> {
            Vec::new()
        }
        async fn refresh_possible_servers(&self) -> Result<()> {
            Ok(())
        }
        fn build_probe_url(&self, _: &str, _: u64, _: bool, _: Uuid) -> String {
            String::new()
        }
    }

    let manager = SpeedManager::new(Arc::new(EmptyService), test_config()).unwrap();
    let err = manager.run_with_retry(false, true, false).await.unwrap_err();
    assert!(matches!(
        err,
        network_speed_tester::SpeedTestError::NoServers
    ));
}

#[tokio::test]
async fn test_ping_refresh_ranks_reachable_servers() {
    let mock = MockServer::start().await;
    // The server identity itself points at the mock socket so the latency
    // probe has something to connect to
    let identity = mock.uri();

    let recorder = Arc::new(Recorder::default());
    let service = Arc::new(MockSpeedService {
        base_url: mock.uri(),
        servers: vec![identity],
    });
    let manager = SpeedManager::with_hooks(
        service,
        test_config(),
        recorder.clone(),
        Arc::new(network_speed_tester::NullSink),
    )
    .unwrap();

    let (min_ms, max_ms) = manager.refresh_server_pings().await.unwrap();
    assert!(min_ms <= max_ms);
    assert!(min_ms >= 0.0);

    let milestones = recorder.milestones.lock().unwrap();
    assert!(milestones
        .iter()
        .any(|m| matches!(m, Milestone::PingRefreshed { .. })));
}
