//! Layered run settings.
//!
//! Defaults, then an optional TOML file, then `INSTCHECK_*` environment
//! variables (nested keys split on `__`). The legacy `DISABLE_CHECK_INST`
//! variable, a JSON list of instrument names, is merged into
//! `excluded_instruments` last.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use instcheck_pv::{DEFAULT_MAX_ARRAY_BYTES, PvConfig};
use serde::{Deserialize, Serialize};

use crate::gui::{DEFAULT_OPIS_PACKAGE, GuiRefScheme};

/// Prefix of environment variables that override settings.
pub const ENV_PREFIX: &str = "INSTCHECK_";

/// Legacy variable listing instruments to leave out of a run.
pub const DISABLE_CHECK_INST: &str = "DISABLE_CHECK_INST";

/// Errors while loading settings.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The requested settings file does not exist.
    #[error("settings file {} not found", .0.display())]
    MissingFile(PathBuf),

    /// A layer could not be parsed or has the wrong shape.
    #[error(transparent)]
    Extract(#[from] Box<figment::Error>),

    /// A value is out of range.
    #[error("invalid setting {key}: {reason}")]
    Invalid {
        /// Setting name.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// An IOC allowed to stay in simulation mode in one component on one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimModeExemption {
    /// Instrument name.
    pub instrument: String,
    /// Component name.
    pub component: String,
    /// IOC name.
    pub ioc: String,
}

/// Everything a run can be tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Instruments left out of a run entirely.
    pub excluded_instruments: Vec<String>,
    /// OPI package directory holding `resources/opi_info.xml`.
    pub gui_opis_package: String,
    /// How a release maps to a GUI ref.
    pub gui_ref_scheme: GuiRefScheme,
    /// Reject globals lines without an `IOC__` prefix.
    pub require_globals_ioc_prefix: bool,
    /// Longest allowed block name.
    pub block_name_max_len: usize,
    /// Instruments whose block names may exceed the limit.
    pub block_name_length_exempt: Vec<String>,
    /// Run the checks that read motor, DAE and other live values.
    pub live_diagnostics: bool,
    /// Per-read PV timeout in seconds.
    pub pv_timeout_secs: f64,
    /// Attempts per PV read, including the first.
    pub pv_retry_attempts: u32,
    /// `EPICS_CA_MAX_ARRAY_BYTES` given to every `caget`.
    pub ca_max_array_bytes: u64,
    /// Limit for any single git command, in seconds.
    pub git_timeout_secs: u64,
    /// Workers reading the motor grid.
    pub motor_workers: usize,
    /// Workers probing hosts in the consistency scan.
    pub host_workers: usize,
    /// Check name (or family, or `*.`-rooted pattern) to instruments it is skipped on.
    pub skips: BTreeMap<String, Vec<String>>,
    /// IOCs allowed to remain in simulation mode.
    pub sim_mode_exemptions: Vec<SimModeExemption>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

const MERCURY_OUT_OF_DATE: [&str; 8] = [
    "LARMOR", "ZOOM", "IRIS", "SANDALS", "GEM", "MAPS", "OSIRIS", "LET",
];

impl Default for Settings {
    fn default() -> Self {
        let skips = BTreeMap::from([
            ("configurations.motor-macros".to_string(), names(&["DEMO"])),
            ("components.motor-macros".to_string(), names(&["DEMO", "SANS2D"])),
            ("configurations.sim-mode".to_string(), names(&["DEMO", "SANS2D"])),
            ("components.sim-mode".to_string(), names(&["DEMO"])),
            ("*.macro-rule".to_string(), names(&["SELAB", "DEMO"])),
            ("*.macro-rule:MERCURY_01".to_string(), names(&MERCURY_OUT_OF_DATE)),
            ("*.macro-rule:MERCURY_02".to_string(), names(&MERCURY_OUT_OF_DATE)),
            ("*.interesting-block-pvs".to_string(), names(&["DETMON"])),
            ("synoptic.targets".to_string(), names(&["DEMO"])),
            ("synoptic.types".to_string(), names(&["DEMO"])),
            ("version.matches-server".to_string(), names(&["DEMO"])),
        ]);
        Self {
            log_level: "info".to_string(),
            excluded_instruments: Vec::new(),
            gui_opis_package: DEFAULT_OPIS_PACKAGE.to_string(),
            gui_ref_scheme: GuiRefScheme::default(),
            require_globals_ioc_prefix: false,
            block_name_max_len: 25,
            block_name_length_exempt: Vec::new(),
            live_diagnostics: true,
            pv_timeout_secs: 5.0,
            pv_retry_attempts: 1,
            ca_max_array_bytes: DEFAULT_MAX_ARRAY_BYTES,
            git_timeout_secs: 600,
            motor_workers: 16,
            host_workers: 8,
            skips,
            sim_mode_exemptions: vec![SimModeExemption {
                instrument: "EMU".to_string(),
                component: "EMU_base".to_string(),
                ioc: "KEPCO_04".to_string(),
            }],
        }
    }
}

impl Settings {
    /// Load from defaults, `config_path` and the process environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = Self::extract(Self::figment(config_path)?)?;
        settings.merge_disabled_instruments(std::env::var(DISABLE_CHECK_INST).ok().as_deref());
        settings.validate()?;
        Ok(settings)
    }

    /// The layered provider chain, without `DISABLE_CHECK_INST`.
    pub fn figment(config_path: Option<&Path>) -> Result<Figment, SettingsError> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = config_path {
            if !path.is_file() {
                return Err(SettingsError::MissingFile(path.to_path_buf()));
            }
            figment = figment.merge(Toml::file(path));
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Deserialize settings from a provider chain.
    pub fn extract(figment: Figment) -> Result<Self, SettingsError> {
        figment.extract().map_err(|e| SettingsError::from(Box::new(e)))
    }

    /// Add the instruments of a `DISABLE_CHECK_INST` value.
    ///
    /// A value that is not a JSON list of strings is ignored.
    pub fn merge_disabled_instruments(&mut self, raw: Option<&str>) {
        let Some(raw) = raw else {
            return;
        };
        match serde_json::from_str::<Vec<String>>(raw) {
            Ok(names) => {
                for name in names {
                    if !self.excluded_instruments.contains(&name) {
                        self.excluded_instruments.push(name);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(value = raw, error = %e, "ignoring malformed DISABLE_CHECK_INST");
            }
        }
    }

    /// Reject values no run could use.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.motor_workers == 0 {
            return Err(SettingsError::Invalid {
                key: "motor_workers",
                reason: "must be at least 1".into(),
            });
        }
        if self.host_workers == 0 {
            return Err(SettingsError::Invalid {
                key: "host_workers",
                reason: "must be at least 1".into(),
            });
        }
        if !(self.pv_timeout_secs.is_finite() && self.pv_timeout_secs > 0.0) {
            return Err(SettingsError::Invalid {
                key: "pv_timeout_secs",
                reason: format!("{} is not a positive number of seconds", self.pv_timeout_secs),
            });
        }
        if self.pv_retry_attempts == 0 {
            return Err(SettingsError::Invalid {
                key: "pv_retry_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.ca_max_array_bytes == 0 {
            return Err(SettingsError::Invalid {
                key: "ca_max_array_bytes",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Whether `instrument` is left out of runs.
    pub fn is_excluded(&self, instrument: &str) -> bool {
        self.excluded_instruments.iter().any(|i| i == instrument)
    }

    /// Whether `check` is skipped on `instrument`.
    ///
    /// A skip key matches the full check name, the name without its
    /// `:<parameter>` suffix, or either form with the leading root replaced
    /// by `*`.
    pub fn is_skipped(&self, check: &str, instrument: &str) -> bool {
        skip_keys(check).iter().any(|key| {
            self.skips
                .get(key)
                .is_some_and(|instruments| instruments.iter().any(|i| i == instrument))
        })
    }

    /// Whether `ioc` in `component` may stay in simulation mode on `instrument`.
    pub fn sim_mode_exempt(&self, instrument: &str, component: &str, ioc: &str) -> bool {
        self.sim_mode_exemptions
            .iter()
            .any(|e| e.instrument == instrument && e.component == component && e.ioc == ioc)
    }

    /// PV access settings.
    pub fn pv_config(&self) -> PvConfig {
        PvConfig::new(
            Duration::from_secs_f64(self.pv_timeout_secs),
            self.pv_retry_attempts,
        )
        .with_max_array_bytes(self.ca_max_array_bytes)
    }

    /// Limit for a single git command.
    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }
}

fn skip_keys(check: &str) -> Vec<String> {
    let family = check.split_once(':').map_or(check, |(family, _)| family);
    let mut keys = vec![check.to_string(), family.to_string()];
    if let Some((_, rest)) = check.split_once('.') {
        keys.push(format!("*.{rest}"));
        if let Some((_, family_rest)) = family.split_once('.') {
            keys.push(format!("*.{family_rest}"));
        }
    }
    keys.dedup();
    keys
}
