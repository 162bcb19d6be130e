//! Bounded-concurrency transfer executor
//!
//! Runs a batch of HTTP probes under a concurrency cap and reports the
//! aggregate bytes moved over the batch's wall-clock span. The join is
//! wait-for-any: whichever active probe settles first frees its slot, so
//! faster servers naturally absorb more of the batch.
//!
//! Failure drain guarantee: a settled fault never aborts the batch. Every
//! pending target is still dispatched and every dispatched probe awaited;
//! only once the batch has fully drained is the first fault surfaced,
//! tagged with the offending URL. No probe is ever orphaned in flight and
//! every server gets evaluated once per batch.

use crate::{
    config::SpeedTestConfig,
    error::{Result, SpeedTestError},
    payload::SyntheticPayloadSource,
    service::DiagnosticSink,
    types::{BatchResult, ProbeTarget},
};
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::{header, Client};
use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

/// Executes probe batches and measures aggregate throughput
pub struct TransferEngine {
    client: Client,
    payload: SyntheticPayloadSource,
    probe_timeout: Duration,
    sink: Arc<dyn DiagnosticSink>,
}

impl TransferEngine {
    /// Build an engine from the run configuration. Compression is disabled
    /// so raw wire bytes are counted, and the User-Agent is pinned to a
    /// browser string so test backends serve their normal payloads.
    pub fn new(config: &SpeedTestConfig, sink: Arc<dyn DiagnosticSink>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .no_zstd()
            .build()
            .map_err(|e| SpeedTestError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            payload: SyntheticPayloadSource::new(config.transfer_buffer_bytes),
            probe_timeout: config.probe_timeout,
            sink,
        })
    }

    /// Run every target under the concurrency cap and aggregate the bytes
    /// moved. `upload_bytes` of zero means download probes; non-zero means
    /// upload probes of that declared size.
    pub async fn measure_batch(
        &self,
        targets: &[ProbeTarget],
        concurrency: usize,
        upload_bytes: u64,
    ) -> Result<BatchResult> {
        let concurrency = concurrency.max(1);
        self.sink.record(&format!(
            "transfer batch starting targets={} concurrency={} upload_bytes={}",
            targets.len(),
            concurrency,
            upload_bytes
        ));

        let started = Instant::now();
        let mut pending: VecDeque<&ProbeTarget> = targets.iter().collect();
        let mut active = FuturesUnordered::new();
        let mut total_bytes = 0u64;
        let mut first_fault: Option<SpeedTestError> = None;

        while !pending.is_empty() || !active.is_empty() {
            while active.len() < concurrency {
                match pending.pop_front() {
                    Some(target) => active.push(self.run_probe(target, upload_bytes)),
                    None => break,
                }
            }

            // Wait for any active probe to settle, not the oldest
            if let Some(settled) = active.next().await {
                match settled {
                    Ok(bytes) => total_bytes += bytes,
                    Err(fault) => {
                        if first_fault.is_none() {
                            first_fault = Some(fault);
                        }
                    }
                }
            }
        }
        let elapsed = started.elapsed();

        if let Some(fault) = first_fault {
            let url = fault.implicated_url().unwrap_or_default().to_string();
            return Err(SpeedTestError::batch(url, fault));
        }

        let result = BatchResult {
            bytes: total_bytes,
            elapsed,
        };
        self.sink.record(&format!(
            "transfer batch done bytes={} elapsed={:.2}s rate={}B/s",
            result.bytes,
            result.elapsed.as_secs_f64(),
            result.bytes_per_sec()
        ));
        Ok(result)
    }

    /// One probe request/response cycle. Returns the bytes this probe moved.
    async fn run_probe(&self, target: &ProbeTarget, upload_bytes: u64) -> Result<u64> {
        if upload_bytes > 0 {
            self.run_upload(target, upload_bytes).await
        } else {
            self.run_download(target).await
        }
    }

    async fn run_download(&self, target: &ProbeTarget) -> Result<u64> {
        let mut response = self
            .client
            .get(&target.url)
            .send()
            .await
            .map_err(|e| SpeedTestError::probe(&target.url, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeedTestError::probe(
                &target.url,
                format!("HTTP status {status}"),
            ));
        }

        // Soft deadline: checked only between reads. A read already in
        // flight when the deadline passes still has its bytes counted.
        let deadline = Instant::now() + self.probe_timeout;
        let mut total_read = 0u64;
        loop {
            if Instant::now() >= deadline {
                break;
            }
            match response
                .chunk()
                .await
                .map_err(|e| SpeedTestError::probe(&target.url, format!("read failed: {e}")))?
            {
                Some(chunk) => total_read += chunk.len() as u64,
                None => break,
            }
        }
        Ok(total_read)
    }

    async fn run_upload(&self, target: &ProbeTarget, upload_bytes: u64) -> Result<u64> {
        let response = self
            .client
            .post(&target.url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, upload_bytes)
            .body(self.payload.body(upload_bytes))
            .send()
            .await
            .map_err(|e| SpeedTestError::probe(&target.url, format!("upload failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeedTestError::probe(
                &target.url,
                format!("HTTP status {status}"),
            ));
        }

        // Uploads count the declared size: this measures how fast the engine
        // can push bytes out, not how fast the peer received them.
        Ok(upload_bytes)
    }
}
