//! Type definitions and aliases

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

// Re-export commonly used types
pub use crate::error::{Result, SpeedTestError};

/// A known test server and its latency statistics.
///
/// `ping_avg` is the arithmetic mean of all RTT samples taken since the last
/// reset; `ping_checks` counts those samples. Records are replaced wholesale
/// when the speed service refreshes its server list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    /// Server identity (host string, with or without scheme)
    pub server: String,
    /// Number of RTT samples taken since the last reset
    pub ping_checks: u32,
    /// Running average RTT in milliseconds
    pub ping_avg: f64,
}

impl ServerRecord {
    /// Create a record with zeroed ping statistics
    pub fn new<S: Into<String>>(server: S) -> Self {
        Self {
            server: server.into(),
            ping_checks: 0,
            ping_avg: 0.0,
        }
    }
}

/// A fully-built probe URL paired with the server identity it targets.
///
/// The session token is shared by all targets of one test run so repeated
/// runs against the same backend cannot collide on cached URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub url: String,
    pub server: String,
    pub session: Uuid,
}

/// The shape of one test stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierParameters {
    /// Number of distinct servers to spread requests across
    pub server_count: usize,
    /// Total number of probe requests in the batch
    pub request_count: usize,
    /// Concurrency cap for the batch
    pub concurrency: usize,
    /// Logical per-request size before backend normalization
    pub megabytes_per_request: u32,
}

impl TierParameters {
    /// Cheap initial probe stage
    pub const PROBE: Self = Self {
        server_count: 2,
        request_count: 3,
        concurrency: 5,
        megabytes_per_request: 2,
    };

    /// Confirming stage for fast links
    pub const BIG: Self = Self {
        server_count: 3,
        request_count: 10,
        concurrency: 5,
        megabytes_per_request: 25,
    };

    /// Confirming stage for slow links
    pub const SMALL: Self = Self {
        server_count: 3,
        request_count: 5,
        concurrency: 3,
        megabytes_per_request: 10,
    };
}

/// Aggregate result of one batch of probes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Total bytes moved across all settled probes
    pub bytes: u64,
    /// Wall clock from first dispatch to last settlement
    pub elapsed: Duration,
}

impl BatchResult {
    /// Aggregate throughput, truncated to integer bytes per second
    pub fn bytes_per_sec(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        (self.bytes as f64 / secs) as u64
    }
}

/// Outcome of a server eligibility query
#[derive(Debug, Clone, PartialEq)]
pub enum Eligibility {
    /// Servers currently allowed to be tested
    Eligible(Vec<ServerRecord>),
    /// No eligible servers; the caller should repopulate the known server
    /// set. Distinguished from an empty set by design: any bans on the known
    /// set have just been cleared so a refresh gets a clean slate.
    NeedsRefresh,
}

/// A completed measurement milestone, for display updates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Milestone {
    /// A ping ranking pass finished
    PingRefreshed { min_ms: f64, max_ms: f64 },
    /// The cheap probe stage finished
    ProbeStage {
        bytes_per_sec: u64,
        elapsed: Duration,
    },
    /// The confirming stage finished
    ConfirmingStage { bytes_per_sec: u64 },
}

/// Notification callback for measurement milestones.
///
/// Fire-and-forget: implementations must not block.
pub trait ProgressObserver: Send + Sync {
    fn on_milestone(&self, _milestone: &Milestone) {}
}

/// Observer that ignores all milestones
#[derive(Debug, Default)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {}
