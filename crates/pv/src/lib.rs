//! PV gateway: read named values from an instrument control system.
//!
//! Values come from a [`ValueSource`] (the `caget` tool, a JSON snapshot, or
//! an in-memory map). [`PvGateway`] layers the block server's queries on top
//! and maps every read or decode failure to "unknown" so callers can skip
//! checks for instruments that are switched off.
mod caget;
mod config;
pub mod decode;
mod error;
mod gateway;
mod retry;
mod snapshot;

pub use caget::CagetSource;
pub use config::{DEFAULT_MAX_ARRAY_BYTES, PvConfig, RetryConfig};
pub use error::{DecodeError, PvError};
pub use gateway::{InstrumentRecord, InterestLevel, PvGateway};
pub use retry::RetrySource;
pub use snapshot::{MapSource, SnapshotSource};

use std::sync::Arc;

// ── Traits ──────────────────────────────────────────────────────────────

/// Read the raw text value of a fully-qualified PV name.
///
/// Implementations are shared across worker threads.
pub trait ValueSource: Send + Sync {
    /// Read one value. Timeouts and disconnections are errors.
    fn read(&self, pv: &str) -> Result<String, PvError>;
}

impl<S: ValueSource + ?Sized> ValueSource for Arc<S> {
    fn read(&self, pv: &str) -> Result<String, PvError> {
        (**self).read(pv)
    }
}

/// Build the live Channel Access source with retry applied.
pub fn live_source(config: &PvConfig) -> Arc<dyn ValueSource> {
    Arc::new(RetrySource::new(
        CagetSource::new(config.timeout).with_max_array_bytes(config.max_array_bytes),
        config.retry.clone(),
    ))
}
