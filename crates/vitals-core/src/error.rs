//! Error handling for the vitals telemetry engine
//!
//! Three families of failure exist and none of them is fatal to the process:
//! malformed lines are dropped, transport hiccups are retried by the listener
//! loop, and recorder I/O failures are reported to whoever asked for the write.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vitals engine operations
pub type VitalsResult<T> = Result<T, VitalsError>;

/// Rejection reasons produced by the line classifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Line was empty or whitespace only
    #[error("empty line")]
    EmptyLine,

    /// Vitals record did not carry exactly two fields
    #[error("vitals record expects 2 fields, found {found}")]
    FieldCount {
        /// Number of comma-separated fields seen after the prefix
        found: usize,
    },

    /// Vitals field was not an integer
    #[error("invalid integer field '{field}'")]
    InvalidInteger {
        /// Offending field text
        field: String,
    },

    /// Line was neither a vitals record nor a finite decimal number
    #[error("invalid ECG sample '{line}'")]
    InvalidSample {
        /// Offending line text
        line: String,
    },
}

/// Transient network failures observed by a telemetry transport
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// No data arrived within the receive timeout
    #[error("receive timed out")]
    Timeout,

    /// Socket could not be bound to the requested address
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested local address
        addr: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Socket-level receive failure
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed before a response was read
    #[error("request to {url} failed: {reason}")]
    Request {
        /// Requested endpoint
        url: String,
        /// Client error description
        reason: String,
    },

    /// Device answered with a non-success status
    #[error("unexpected HTTP status {status} from {url}")]
    Status {
        /// Requested endpoint
        url: String,
        /// Returned status code
        status: u16,
    },
}

/// Error type for all vitals engine operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VitalsError {
    /// Malformed telemetry line
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Network transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Session file could not be opened or written
    #[error("session file I/O failed for {}: {source}", path.display())]
    IoFailure {
        /// Session file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A recording session is already open
    #[error("a recording session is already active ({})", path.display())]
    SessionAlreadyActive {
        /// Path of the session that is still open
        path: PathBuf,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration issue
        reason: String,
    },

    /// Internal channel closed before the request was answered
    #[error("{channel} channel closed")]
    ChannelClosed {
        /// Channel name
        channel: &'static str,
    },
}

impl VitalsError {
    /// Wrap an I/O error raised while touching the session file
    pub fn io_failure(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VitalsError::IoFailure {
            path: path.into(),
            source,
        }
    }

    /// Build a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        VitalsError::InvalidConfig {
            reason: reason.into(),
        }
    }
}
