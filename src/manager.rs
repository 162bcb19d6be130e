//! Adaptive test orchestration
//!
//! [`SpeedManager`] composes the server pool, ping prober, and transfer
//! engine around an injected [`SpeedService`]. A run is two stages: a cheap
//! fixed probe stage, then a confirming stage whose size depends on how long
//! the probe stage took — a link too slow to benefit from a bigger sample
//! never pays for one, while fast links get a statistically stabler number.

use crate::{
    config::SpeedTestConfig,
    engine::TransferEngine,
    error::{Result, SpeedTestError},
    ping::PingProber,
    pool::ServerPool,
    service::{DiagnosticSink, NullSink, SpeedService},
    types::{
        Eligibility, Milestone, NullObserver, ProbeTarget, ProgressObserver, ServerRecord,
        TierParameters,
    },
};
use std::{cmp::Ordering, sync::Arc, time::Instant};
use uuid::Uuid;

/// Orchestrates tiered speed tests against one speed service
pub struct SpeedManager {
    config: SpeedTestConfig,
    service: Arc<dyn SpeedService>,
    pool: Arc<ServerPool>,
    prober: PingProber,
    engine: TransferEngine,
    observer: Arc<dyn ProgressObserver>,
    sink: Arc<dyn DiagnosticSink>,
}

impl SpeedManager {
    /// Create a manager with no observer or diagnostics
    pub fn new(service: Arc<dyn SpeedService>, config: SpeedTestConfig) -> Result<Self> {
        Self::with_hooks(service, config, Arc::new(NullObserver), Arc::new(NullSink))
    }

    /// Create a manager with milestone notifications and a diagnostic sink
    pub fn with_hooks(
        service: Arc<dyn SpeedService>,
        config: SpeedTestConfig,
        observer: Arc<dyn ProgressObserver>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(ServerPool::new());
        let prober = PingProber::new(pool.clone(), sink.clone(), config.ping_wave_pause);
        let engine = TransferEngine::new(&config, sink.clone())?;
        Ok(Self {
            config,
            service,
            pool,
            prober,
            engine,
            observer,
            sink,
        })
    }

    /// The pool tracking server health, exposed for caller banning policy
    pub fn pool(&self) -> &ServerPool {
        &self.pool
    }

    /// Pull a fresh server set from the service and mirror it wholesale
    async fn refresh_known_servers(&self) -> Result<()> {
        self.service.refresh_possible_servers().await?;
        let servers = self.service.possible_servers();
        self.sink
            .record(&format!("server list refreshed count={}", servers.len()));
        self.pool.replace_servers(servers);
        Ok(())
    }

    /// Eligible servers, refreshing the known set once when the pool signals
    /// for it. Errors with `NoServers` only if a refresh produced nothing.
    async fn eligible_or_refresh(&self) -> Result<Vec<ServerRecord>> {
        match self.pool.eligible() {
            Eligibility::Eligible(servers) => Ok(servers),
            Eligibility::NeedsRefresh => {
                self.refresh_known_servers().await?;
                match self.pool.eligible() {
                    Eligibility::Eligible(servers) => Ok(servers),
                    Eligibility::NeedsRefresh => Err(SpeedTestError::NoServers),
                }
            }
        }
    }

    /// A ping fault's URL field holds the server identity itself; lift it to
    /// a service fault so the caller's banning policy can act on it
    fn attribute_ping_fault(fault: SpeedTestError) -> SpeedTestError {
        match fault.implicated_url().map(str::to_string) {
            Some(server) => SpeedTestError::service(server, fault),
            None => fault,
        }
    }

    /// Re-rank all eligible servers by latency. Notifies the observer with
    /// the resulting min/max averages.
    pub async fn refresh_server_pings(&self) -> Result<(f64, f64)> {
        let servers = self.eligible_or_refresh().await?;
        let (min_ms, max_ms) = self
            .prober
            .refresh_ranking(&servers, self.config.ping_rounds)
            .await
            .map_err(Self::attribute_ping_fault)?;
        self.observer
            .on_milestone(&Milestone::PingRefreshed { min_ms, max_ms });
        Ok((min_ms, max_ms))
    }

    /// Build one test run's probe batch: the `server_count` lowest-latency
    /// servers, `request_count` URLs round-robined across them, all under
    /// one session token.
    fn build_targets(
        &self,
        servers: &[ServerRecord],
        tier: &TierParameters,
        bytes_per_request: u64,
        upload: bool,
    ) -> Vec<ProbeTarget> {
        let session = Uuid::new_v4();
        let mut ranked = servers.to_vec();
        ranked.sort_by(|a, b| {
            a.ping_avg
                .partial_cmp(&b.ping_avg)
                .unwrap_or(Ordering::Equal)
        });
        ranked.truncate(tier.server_count.min(ranked.len()));

        (0..tier.request_count)
            .map(|i| {
                let record = &ranked[i % ranked.len()];
                ProbeTarget {
                    url: self.service.build_probe_url(
                        &record.server,
                        bytes_per_request,
                        upload,
                        session,
                    ),
                    server: record.server.clone(),
                    session,
                }
            })
            .collect()
    }

    /// Map a drained batch fault back to the server whose URL failed
    fn attribute_fault(&self, fault: SpeedTestError, targets: &[ProbeTarget]) -> SpeedTestError {
        let implicated = fault
            .implicated_url()
            .and_then(|url| targets.iter().find(|t| t.url == url))
            .map(|t| t.server.clone());
        match implicated {
            Some(server) => SpeedTestError::service(server, fault),
            None => fault,
        }
    }

    /// Run one batch shaped by `tier` and return its throughput in bytes per
    /// second. Triggers a server-list refresh when nothing is eligible, and
    /// a ping ranking pass unless `skip_ping_refresh` is set.
    pub async fn test_service(
        &self,
        upload: bool,
        tier: &TierParameters,
        skip_ping_refresh: bool,
    ) -> Result<u64> {
        let servers = self.eligible_or_refresh().await?;
        if !skip_ping_refresh {
            self.prober
                .refresh_ranking(&servers, self.config.ping_rounds)
                .await
                .map_err(Self::attribute_ping_fault)?;
        }
        // Re-snapshot so ranking sees the freshest averages
        let servers = self.eligible_or_refresh().await?;

        let bytes_per_request = self.service.normalized_size(tier.megabytes_per_request);
        let targets = self.build_targets(&servers, tier, bytes_per_request, upload);
        if targets.is_empty() {
            return Err(SpeedTestError::NoServers);
        }

        let upload_bytes = if upload { bytes_per_request } else { 0 };
        match self
            .engine
            .measure_batch(&targets, tier.concurrency, upload_bytes)
            .await
        {
            Ok(result) => Ok(result.bytes_per_sec()),
            Err(fault) => Err(self.attribute_fault(fault, &targets)),
        }
    }

    /// Decide the confirming stage from the probe stage's elapsed time.
    /// `None` means skip the confirming stage and keep the probe result.
    pub fn select_confirming_tier(
        probe_elapsed: std::time::Duration,
        force_small: bool,
        config: &SpeedTestConfig,
    ) -> Option<TierParameters> {
        if probe_elapsed > config.super_slow_threshold {
            return None;
        }
        if force_small || probe_elapsed > config.medium_threshold {
            Some(TierParameters::SMALL)
        } else {
            Some(TierParameters::BIG)
        }
    }

    /// The full adaptive run: probe stage, tier decision, confirming stage.
    /// `force_small_tier` keeps the confirming stage small for links already
    /// known to be slow. Escalation runs exactly once per stage; there are
    /// no internal retries.
    pub async fn run_tiered_test(
        &self,
        upload: bool,
        skip_initial_ping: bool,
        force_small_tier: bool,
    ) -> Result<u64> {
        if !skip_initial_ping {
            self.refresh_server_pings().await?;
        }

        let started = Instant::now();
        let probe_rate = self
            .test_service(upload, &TierParameters::PROBE, true)
            .await?;
        let probe_elapsed = started.elapsed();
        self.observer.on_milestone(&Milestone::ProbeStage {
            bytes_per_sec: probe_rate,
            elapsed: probe_elapsed,
        });
        self.sink.record(&format!(
            "probe stage done elapsed={:.2}s rate={}B/s upload={} force_small={}",
            probe_elapsed.as_secs_f64(),
            probe_rate,
            upload,
            force_small_tier
        ));

        let Some(tier) = Self::select_confirming_tier(probe_elapsed, force_small_tier, &self.config)
        else {
            return Ok(probe_rate);
        };

        let rate = self.test_service(upload, &tier, true).await?;
        self.observer
            .on_milestone(&Milestone::ConfirmingStage { bytes_per_sec: rate });
        Ok(rate)
    }

    /// Tiered run with the bounded recovery policy: on a fault attributed to
    /// a server, ban it for the configured cooldown and re-run the whole
    /// test from scratch, exactly once.
    pub async fn run_with_retry(
        &self,
        upload: bool,
        skip_initial_ping: bool,
        force_small_tier: bool,
    ) -> Result<u64> {
        match self
            .run_tiered_test(upload, skip_initial_ping, force_small_tier)
            .await
        {
            Ok(rate) => Ok(rate),
            Err(fault) => {
                let Some(server) = fault.implicated_server().map(str::to_string) else {
                    return Err(fault);
                };
                self.pool.ban(&server, self.config.ban_cooldown);
                self.sink.record(&format!(
                    "banned server={} cooldown={:?}, retrying",
                    server, self.config.ban_cooldown
                ));
                self.run_tiered_test(upload, skip_initial_ping, force_small_tier)
                    .await
            }
        }
    }
}
