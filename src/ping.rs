//! Latency measurement and ranking
//!
//! One latency probe is a timed TCP connect to the server's service port,
//! after resolving its host. Samples feed the running averages kept by the
//! [`ServerPool`]; ranking runs several fully parallel waves to smooth out
//! single-sample jitter before servers are selected for transfer tests.

use crate::{
    error::{Result, SpeedTestError},
    pool::ServerPool,
    service::DiagnosticSink,
    types::ServerRecord,
};
use std::{
    net::IpAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::net::TcpStream;
use trust_dns_resolver::{
    config::{ResolverConfig, ResolverOpts},
    TokioAsyncResolver,
};
use url::Url;

/// Measures round-trip latency to servers and maintains their running
/// averages through the shared pool.
pub struct PingProber {
    resolver: TokioAsyncResolver,
    pool: Arc<ServerPool>,
    sink: Arc<dyn DiagnosticSink>,
    wave_pause: Duration,
}

impl PingProber {
    pub fn new(
        pool: Arc<ServerPool>,
        sink: Arc<dyn DiagnosticSink>,
        wave_pause: Duration,
    ) -> Self {
        // Prefer the system DNS configuration, fall back to defaults
        let (config, opts) = trust_dns_resolver::system_conf::read_system_conf()
            .unwrap_or_else(|_| (ResolverConfig::default(), ResolverOpts::default()));
        let resolver = TokioAsyncResolver::tokio(config, opts);
        Self {
            resolver,
            pool,
            sink,
            wave_pause,
        }
    }

    /// Resolve a server identity to a connectable address.
    ///
    /// Identities without a scheme are treated as https hosts; IP-literal
    /// hosts skip DNS resolution.
    async fn resolve(&self, server: &str) -> Result<(IpAddr, u16)> {
        let with_scheme = if server.starts_with("http://") || server.starts_with("https://") {
            server.to_string()
        } else {
            format!("https://{server}")
        };

        let url = Url::parse(&with_scheme)
            .map_err(|e| SpeedTestError::probe(server, format!("invalid server identity: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| SpeedTestError::probe(server, "server identity has no host"))?;
        let port = url.port_or_known_default().unwrap_or(443);

        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok((ip, port));
        }

        let lookup = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| SpeedTestError::probe(server, format!("DNS resolution failed: {e}")))?;
        let ip = lookup
            .iter()
            .next()
            .ok_or_else(|| SpeedTestError::probe(server, "no addresses resolved"))?;
        Ok((ip, port))
    }

    /// Send one latency probe to `server` and fold the sample into its
    /// running average. Returns the sample in milliseconds.
    ///
    /// Never bans; that is the caller's policy decision. Must not be invoked
    /// concurrently for the same server within one wave.
    pub async fn measure(&self, server: &str) -> Result<f64> {
        let (ip, port) = self.resolve(server).await?;

        let started = Instant::now();
        let stream = TcpStream::connect((ip, port))
            .await
            .map_err(|e| SpeedTestError::probe(server, format!("latency probe failed: {e}")))?;
        let sample_ms = started.elapsed().as_secs_f64() * 1000.0;
        drop(stream);

        self.pool.record_ping(server, sample_ms);
        Ok(sample_ms)
    }

    /// One fully parallel wave of latency probes across all servers.
    /// The wave drains completely before the first fault is surfaced.
    async fn wave(&self, servers: &[ServerRecord]) -> Result<()> {
        let probes = servers.iter().map(|record| self.measure(&record.server));
        let settled = futures::future::join_all(probes).await;
        for outcome in settled {
            outcome?;
        }
        Ok(())
    }

    /// Reset every server's ping statistics, then run `rounds` waves of
    /// parallel probes with a fixed pause between waves after the first.
    /// Returns the minimum and maximum final running average.
    pub async fn refresh_ranking(
        &self,
        servers: &[ServerRecord],
        rounds: u32,
    ) -> Result<(f64, f64)> {
        if servers.is_empty() {
            return Err(SpeedTestError::NoServers);
        }

        self.pool.reset_ping_stats();
        for round in 0..rounds.max(1) {
            if round > 0 {
                tokio::time::sleep(self.wave_pause).await;
            }
            self.wave(servers).await?;
        }

        let measured: Vec<ServerRecord> = self
            .pool
            .known_servers()
            .into_iter()
            .filter(|record| servers.iter().any(|s| s.server == record.server))
            .collect();
        let mut averages = measured.iter().map(|r| r.ping_avg);
        let first = averages
            .next()
            .ok_or_else(|| SpeedTestError::internal("measured servers vanished from pool"))?;
        let (min, max) = averages.fold((first, first), |(min, max), avg| {
            (min.min(avg), max.max(avg))
        });

        self.sink.record(&format!(
            "ping ranking done servers={} rounds={} min={:.1}ms max={:.1}ms",
            measured.len(),
            rounds,
            min,
            max
        ));
        Ok((min, max))
    }
}
