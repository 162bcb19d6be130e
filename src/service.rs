//! External collaborator interfaces
//!
//! The crate is a measurement engine only. Where the test servers come from,
//! how probe URLs are built for a given backend, and where diagnostics end
//! up are all injected through the traits here.

use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use uuid::Uuid;

/// A backend that knows about speed test servers and their URL scheme.
///
/// Implementations own the server identity lifetime; the engine only mirrors
/// the current set and keys its ban list by identity string.
#[async_trait]
pub trait SpeedService: Send + Sync {
    /// Current known server identities. May be empty before the first
    /// refresh.
    fn possible_servers(&self) -> Vec<String>;

    /// Replace the known server set wholesale. Idempotent to call
    /// repeatedly.
    async fn refresh_possible_servers(&self) -> Result<()>;

    /// Deterministic probe URL construction. `session` must be shared across
    /// all targets of one test run so repeated runs against the same backend
    /// cannot collide on cached URLs.
    fn build_probe_url(
        &self,
        server: &str,
        bytes_per_request: u64,
        upload: bool,
        session: Uuid,
    ) -> String;

    /// Map a logical test size to a byte count appropriate to this backend's
    /// request granularity. The default is a plain MiB conversion.
    fn normalized_size(&self, megabytes: u32) -> u64 {
        megabytes as u64 * 1024 * 1024
    }
}

/// Optional sink for short diagnostic strings.
///
/// Peripheral instrumentation only; implementations must not become a
/// synchronization dependency of the measurement path.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, _message: &str) {}
}

/// Sink that discards everything
#[derive(Debug, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {}

/// Sink that buffers timestamped entries in memory. Useful in tests and for
/// hosts that drain diagnostics on their own schedule.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain all buffered entries
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, message: &str) {
        let stamped = format!("{} {}", Utc::now().format("%H:%M:%S%.3f"), message);
        self.entries.lock().unwrap().push(stamped);
    }
}
