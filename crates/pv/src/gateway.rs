//! Block server queries over a [`ValueSource`].

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ValueSource;
use crate::decode::decode_json;

/// One entry of `CS:INSTLIST`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentRecord {
    /// Instrument name, e.g. `LARMOR`.
    pub name: String,
    /// Network host name, also the configuration branch name.
    #[serde(rename = "hostName")]
    pub host_name: String,
    /// PV prefix, e.g. `IN:LARMOR:`.
    #[serde(rename = "pvPrefix")]
    pub pv_prefix: String,
}

/// Operator-assigned importance tier of a PV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestLevel {
    /// Shown prominently.
    High,
    /// Medium interest.
    Medium,
    /// Low interest.
    Low,
    /// Facility-level PVs.
    Facility,
}

impl InterestLevel {
    /// Every tier, in the order they are queried.
    pub const ALL: [InterestLevel; 4] = [
        InterestLevel::High,
        InterestLevel::Medium,
        InterestLevel::Low,
        InterestLevel::Facility,
    ];

    /// Name used in the `CS:BLOCKSERVER:PVS:INTEREST:<tier>` PV.
    pub fn as_str(self) -> &'static str {
        match self {
            InterestLevel::High => "HIGH",
            InterestLevel::Medium => "MEDIUM",
            InterestLevel::Low => "LOW",
            InterestLevel::Facility => "FACILITY",
        }
    }
}

/// Reads PVs relative to one instrument's prefix.
///
/// Never fails: unreachable or undecodable values are `None` (or empty).
#[derive(Clone)]
pub struct PvGateway {
    source: Arc<dyn ValueSource>,
    prefix: String,
}

impl std::fmt::Debug for PvGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PvGateway")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl PvGateway {
    /// A gateway with no prefix, as used for `CS:INSTLIST`.
    pub fn new(source: Arc<dyn ValueSource>) -> Self {
        Self {
            source,
            prefix: String::new(),
        }
    }

    /// A gateway sharing this source, reading under `prefix`.
    pub fn for_instrument(&self, prefix: impl Into<String>) -> Self {
        Self {
            source: Arc::clone(&self.source),
            prefix: prefix.into(),
        }
    }

    /// The PV prefix prepended to every name.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Read `<prefix><name>`, or `None` if it cannot be read.
    pub fn get_value(&self, name: &str) -> Option<String> {
        let pv = format!("{}{name}", self.prefix);
        match self.source.read(&pv) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(pv = %pv, error = %e, "PV unavailable");
                None
            }
        }
    }

    /// Read a value and parse it as a number.
    pub fn get_number(&self, name: &str) -> Option<f64> {
        self.get_value(name)?.trim().parse().ok()
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        let raw = self.get_value(name)?;
        match decode_json(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(pv = %format!("{}{name}", self.prefix), error = %e, "cannot decode PV payload");
                None
            }
        }
    }

    /// Instruments listed in `CS:INSTLIST`; empty when unavailable.
    pub fn get_inst_list(&self) -> Vec<InstrumentRecord> {
        self.get_json("CS:INSTLIST").unwrap_or_default()
    }

    /// IOCs the block server knows about, or `None` when unavailable.
    pub fn get_valid_iocs(&self) -> Option<BTreeSet<String>> {
        self.get_json::<serde_json::Map<String, serde_json::Value>>("CS:BLOCKSERVER:IOCS")
            .map(|iocs| iocs.into_iter().map(|(name, _)| name).collect())
    }

    /// IOCs users may not stop, or `None` when unavailable.
    pub fn get_protected_iocs(&self) -> Option<BTreeSet<String>> {
        self.get_json::<Vec<String>>("CS:BLOCKSERVER:IOCS_NOT_TO_STOP")
            .map(|iocs| iocs.into_iter().collect())
    }

    /// PV names in one interest tier; empty when unavailable.
    pub fn get_pvs_by_interest(&self, level: InterestLevel) -> Vec<String> {
        let name = format!("CS:BLOCKSERVER:PVS:INTEREST:{}", level.as_str());
        let rows: Vec<Vec<serde_json::Value>> = self.get_json(&name).unwrap_or_default();
        rows.into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|first| match first {
                serde_json::Value::String(pv) => Some(pv),
                _ => None,
            })
            .collect()
    }

    /// Union of every interest tier.
    pub fn get_interesting_pvs(&self) -> BTreeSet<String> {
        InterestLevel::ALL
            .into_iter()
            .flat_map(|level| self.get_pvs_by_interest(level))
            .collect()
    }

    /// The server's release version string.
    pub fn get_version_string(&self) -> Option<String> {
        self.get_value("CS:VERSION:SVN:REV")
    }
}
