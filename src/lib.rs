//! Network Speed Tester
//!
//! An adaptive network bandwidth and latency measurement engine. Probes a
//! pool of remote test servers over HTTP, scales the test size to observed
//! conditions (a cheap probe stage decides whether a big, small, or no
//! confirming stage runs), and temporarily bans misbehaving servers so a
//! flaky backend never needs operator intervention.
//!
//! The engine is host-agnostic: the server catalog and URL scheme come from
//! an injected [`SpeedService`], progress lands in an injected
//! [`ProgressObserver`], and diagnostics in an optional [`DiagnosticSink`].

pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod payload;
pub mod ping;
pub mod pool;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::SpeedTestConfig;
pub use engine::TransferEngine;
pub use error::{Result, SpeedTestError};
pub use manager::SpeedManager;
pub use payload::SyntheticPayloadSource;
pub use ping::PingProber;
pub use pool::ServerPool;
pub use service::{DiagnosticSink, MemorySink, NullSink, SpeedService};
pub use types::{
    BatchResult, Eligibility, Milestone, NullObserver, ProbeTarget, ProgressObserver,
    ServerRecord, TierParameters,
};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
