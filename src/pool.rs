//! Server pool: known servers, ping statistics, and temporary bans
//!
//! Decides which servers may currently be tested. All state lives behind a
//! single mutex held only for short scans, never across network I/O; the
//! ping prober measures RTTs outside the lock and records samples through
//! [`ServerPool::record_ping`].

use crate::types::{Eligibility, ServerRecord};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Temporary exclusion of a server, with an expiry.
/// At most one active entry per server identity.
#[derive(Debug, Clone)]
struct BanEntry {
    server: String,
    expires: Instant,
}

#[derive(Debug, Default)]
struct PoolState {
    servers: Vec<ServerRecord>,
    bans: Vec<BanEntry>,
}

/// Tracks known servers, their latency statistics, and misbehaving-server
/// bans. Server identity lifetime belongs to the speed service collaborator;
/// the pool only mirrors the known set and keys bans by identity string.
#[derive(Debug, Default)]
pub struct ServerPool {
    state: Mutex<PoolState>,
}

impl ServerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the known server set wholesale, zeroing ping statistics.
    /// Called after the speed service refreshes its server list.
    pub fn replace_servers<I, S>(&self, servers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.lock().unwrap();
        state.servers = servers.into_iter().map(ServerRecord::new).collect();
    }

    /// Cloned snapshot of the known server records
    pub fn known_servers(&self) -> Vec<ServerRecord> {
        self.state.lock().unwrap().servers.clone()
    }

    /// Whether any servers are known at all
    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().servers.is_empty()
    }

    /// Ban a server for `duration`. Idempotent: an existing ban's expiry is
    /// replaced by `now + duration`, never stacked.
    pub fn ban(&self, server: &str, duration: Duration) {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        state
            .bans
            .retain(|ban| ban.expires > now && ban.server != server);
        state.bans.push(BanEntry {
            server: server.to_string(),
            expires: now + duration,
        });
    }

    /// The servers currently allowed to be tested.
    ///
    /// Expired bans are purged lazily on every call. If every known server
    /// is banned, the whole known set is considered unusable: bans
    /// referencing known servers are cleared (so a caller-triggered refresh
    /// gets a clean slate) and [`Eligibility::NeedsRefresh`] is returned.
    /// An empty known set returns the needs-refresh signal directly. Bans
    /// referencing servers outside the known set survive the clear.
    pub fn eligible(&self) -> Eligibility {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        state.bans.retain(|ban| ban.expires > now);

        if state.servers.is_empty() {
            return Eligibility::NeedsRefresh;
        }

        let PoolState { servers, bans } = &mut *state;
        let allowed: Vec<ServerRecord> = servers
            .iter()
            .filter(|record| !bans.iter().any(|ban| ban.server == record.server))
            .cloned()
            .collect();

        if allowed.is_empty() {
            bans.retain(|ban| !servers.iter().any(|record| record.server == ban.server));
            return Eligibility::NeedsRefresh;
        }

        Eligibility::Eligible(allowed)
    }

    /// Reset every record's running average and sample count to zero
    pub fn reset_ping_stats(&self) {
        let mut state = self.state.lock().unwrap();
        for record in &mut state.servers {
            record.ping_checks = 0;
            record.ping_avg = 0.0;
        }
    }

    /// Fold one RTT sample into a server's running average:
    /// `avg = (sample + avg * checks) / (checks + 1)`.
    ///
    /// Unknown identities are ignored (the set may have been replaced
    /// between the probe and the recording).
    pub fn record_ping(&self, server: &str, sample_ms: f64) {
        let mut state = self.state.lock().unwrap();
        if let Some(record) = state.servers.iter_mut().find(|r| r.server == server) {
            let total = sample_ms + record.ping_avg * record.ping_checks as f64;
            record.ping_checks += 1;
            record.ping_avg = total / record.ping_checks as f64;
        }
    }

    /// Minimum and maximum running average across all known servers
    pub fn ping_range(&self) -> Option<(f64, f64)> {
        let state = self.state.lock().unwrap();
        let mut averages = state.servers.iter().map(|r| r.ping_avg);
        let first = averages.next()?;
        let (min, max) = averages.fold((first, first), |(min, max), avg| {
            (min.min(avg), max.max(avg))
        });
        Some((min, max))
    }

    /// Number of unexpired bans, for diagnostics
    pub fn active_ban_count(&self) -> usize {
        let now = Instant::now();
        self.state
            .lock()
            .unwrap()
            .bans
            .iter()
            .filter(|ban| ban.expires > now)
            .count()
    }
}
