//! Offline value sources.

use std::collections::BTreeMap;
use std::path::Path;

use crate::{PvError, ValueSource};

/// An in-memory map of PV name to raw value.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: BTreeMap<String, String>,
}

impl MapSource {
    /// Create an empty source; every read is [`PvError::NotFound`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a value (builder pattern).
    pub fn with(mut self, pv: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(pv, value);
        self
    }

    /// Add or replace a value.
    pub fn insert(&mut self, pv: impl Into<String>, value: impl Into<String>) {
        self.values.insert(pv.into(), value.into());
    }

    /// Number of PVs held.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no PVs are held.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ValueSource for MapSource {
    fn read(&self, pv: &str) -> Result<String, PvError> {
        self.values
            .get(pv)
            .cloned()
            .ok_or_else(|| PvError::NotFound(pv.to_string()))
    }
}

/// Values captured to a JSON file: `{"IN:DEMO:CS:VERSION:SVN:REV": "15.0.0", ...}`.
///
/// Scalar JSON values are stored as their text; `null` entries are treated as
/// disconnected PVs.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    map: MapSource,
}

impl SnapshotSource {
    /// Load a snapshot file.
    pub fn load(path: &Path) -> Result<Self, PvError> {
        let text = std::fs::read_to_string(path).map_err(|source| PvError::SnapshotIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self, PvError> {
        let format_err = |details: String| PvError::SnapshotFormat {
            path: path.to_path_buf(),
            details,
        };
        let doc: serde_json::Value =
            serde_json::from_str(text).map_err(|e| format_err(e.to_string()))?;
        let serde_json::Value::Object(entries) = doc else {
            return Err(format_err("top level must be an object".into()));
        };

        let mut map = MapSource::new();
        for (pv, value) in entries {
            match value {
                serde_json::Value::Null => {}
                serde_json::Value::String(s) => map.insert(pv, s),
                serde_json::Value::Number(n) => map.insert(pv, n.to_string()),
                serde_json::Value::Bool(b) => map.insert(pv, if b { "1" } else { "0" }),
                _ => return Err(format_err(format!("value of {pv} must be a scalar"))),
            }
        }
        tracing::debug!(path = %path.display(), pvs = map.len(), "loaded PV snapshot");
        Ok(Self { map })
    }
}

impl ValueSource for SnapshotSource {
    fn read(&self, pv: &str) -> Result<String, PvError> {
        self.map.read(pv)
    }
}
