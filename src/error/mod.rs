//! Error handling for the network speed tester

use thiserror::Error;

/// Custom error types for the network speed tester
#[derive(Error, Debug)]
pub enum SpeedTestError {
    /// A single probe (ping or transfer) failed
    #[error("Probe failure for {url}: {message}")]
    Probe { url: String, message: String },

    /// A transfer batch failed after fully draining; wraps the first probe fault
    #[error("Transfer batch failed at {url}")]
    Batch {
        url: String,
        #[source]
        source: Box<SpeedTestError>,
    },

    /// A test run failed, attributed to the implicated server
    #[error("Speed test failure for server {server}")]
    Service {
        server: String,
        #[source]
        source: Box<SpeedTestError>,
    },

    /// No test servers are known and a refresh did not produce any
    #[error("No test servers available")]
    NoServers,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience result type alias
pub type Result<T> = std::result::Result<T, SpeedTestError>;

impl SpeedTestError {
    /// Create a new probe error for the given URL
    pub fn probe<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::Probe {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Wrap a probe fault into a batch-level error
    pub fn batch<U: Into<String>>(url: U, source: SpeedTestError) -> Self {
        Self::Batch {
            url: url.into(),
            source: Box::new(source),
        }
    }

    /// Attribute a batch fault to a server identity
    pub fn service<S: Into<String>>(server: S, source: SpeedTestError) -> Self {
        Self::Service {
            server: server.into(),
            source: Box::new(source),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// The URL implicated by this error, if any
    pub fn implicated_url(&self) -> Option<&str> {
        match self {
            Self::Probe { url, .. } | Self::Batch { url, .. } => Some(url),
            Self::Service { source, .. } => source.implicated_url(),
            _ => None,
        }
    }

    /// The server identity implicated by this error, if any
    pub fn implicated_server(&self) -> Option<&str> {
        match self {
            Self::Service { server, .. } => Some(server),
            _ => None,
        }
    }

    /// Get error category for diagnostics
    pub fn category(&self) -> &'static str {
        match self {
            Self::Probe { .. } => "PROBE",
            Self::Batch { .. } => "BATCH",
            Self::Service { .. } => "SERVICE",
            Self::NoServers => "NO_SERVERS",
            Self::Config(_) => "CONFIG",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Check if error is recoverable (banning the implicated server and
    /// re-running may succeed)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Probe { .. } | Self::Batch { .. } | Self::Service { .. } => true,
            Self::NoServers | Self::Config(_) | Self::Internal(_) => false,
        }
    }
}
