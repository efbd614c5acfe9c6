//! Typed error types for PV access.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// PV read error conditions, categorized by type.
///
/// Use [`PvError::is_retryable()`] to classify transient vs permanent failures.
/// The gateway never surfaces these to checks; they become "value unknown".
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum PvError {
    // -- Connection --
    /// The channel did not connect before the timeout elapsed.
    #[error("channel connect timed out: {pv} ({timeout:?})")]
    ConnectTimeout {
        /// The PV that was requested.
        pv: String,
        /// The configured timeout that elapsed.
        timeout: Duration,
    },

    /// The read tool could not be started.
    #[error("failed to run {program}")]
    Spawn {
        /// The program that was invoked.
        program: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    // -- Read --
    /// The channel connected but the read failed.
    #[error("read failed for {pv}: {details}")]
    ReadFailed {
        /// The PV that was requested.
        pv: String,
        /// Text reported by the read tool.
        details: String,
    },

    /// The value source has no entry for this PV.
    #[error("no value for {0}")]
    NotFound(String),

    // -- Snapshot --
    /// A snapshot file could not be read.
    #[error("cannot read snapshot {path}")]
    SnapshotIo {
        /// The snapshot file path.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A snapshot file is not a JSON object of PV values.
    #[error("invalid snapshot {path}: {details}")]
    SnapshotFormat {
        /// The snapshot file path.
        path: PathBuf,
        /// What was wrong with the content.
        details: String,
    },

    // -- Retry --
    /// All retry attempts have been exhausted.
    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        /// Total number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        last_error: Box<PvError>,
    },

    // -- Configuration --
    /// An invalid configuration was provided.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PvError {
    /// Returns `true` if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PvError::ConnectTimeout { .. } | PvError::ReadFailed { .. }
        )
    }
}

/// Failure to decode a compressed JSON payload.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The raw value is not valid hex.
    #[error("payload is not hex: {0}")]
    Hex(#[from] hex::FromHexError),
    /// The bytes are not a zlib stream.
    #[error("payload is not zlib-compressed: {0}")]
    Inflate(#[source] io::Error),
    /// Compressing a payload failed.
    #[error("cannot compress payload: {0}")]
    Deflate(#[source] io::Error),
    /// The inflated bytes are not UTF-8.
    #[error("payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    /// The text is not the expected JSON shape.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
