use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use instcheck_pv::{InstrumentRecord, PvGateway};

use crate::config::{ConfigRoot, ConfigTree};
use crate::globals::Globals;
use crate::settings::Settings;
use crate::synoptic::Synoptics;
use crate::version::VersionFile;

/// Everything the checks of one instrument read.
///
/// Built before the suite runs and never mutated by a check, so two
/// instruments can be validated side by side.
#[derive(Debug, Clone)]
pub struct InstrumentContext {
    /// The instrument under test.
    pub instrument: InstrumentRecord,
    /// Working copy of the configuration repository.
    pub config_repo: PathBuf,
    /// Working copy of the GUI repository, when synoptics can be checked.
    pub gui_repo: Option<PathBuf>,
    /// IOCs the block server knows; `None` when the server is unreachable.
    pub valid_iocs: Option<BTreeSet<String>>,
    /// IOCs users may not stop; `None` when the server is unreachable.
    pub protected_iocs: Option<BTreeSet<String>>,
    /// Union of every interest tier; empty when unavailable.
    pub interesting_pvs: BTreeSet<String>,
    /// Version the server reports.
    pub server_version: Option<String>,
    /// GUI ref checked out for this instrument, once synchronized.
    pub gui_release: Option<String>,
    /// Run settings.
    pub settings: Arc<Settings>,
    /// Gateway scoped to the instrument prefix, for live diagnostics.
    pub live: Option<PvGateway>,
}

impl InstrumentContext {
    /// A context with no server data: every remote-dependent check skips.
    pub fn offline(
        instrument: InstrumentRecord,
        config_repo: impl Into<PathBuf>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            instrument,
            config_repo: config_repo.into(),
            gui_repo: None,
            valid_iocs: None,
            protected_iocs: None,
            interesting_pvs: BTreeSet::new(),
            server_version: None,
            gui_release: None,
            settings,
            live: None,
        }
    }

    /// Query the server for everything the checks need.
    ///
    /// `gateway` may be unprefixed; it is rescoped to the instrument.
    pub fn bind(
        instrument: InstrumentRecord,
        config_repo: impl Into<PathBuf>,
        gui_repo: Option<PathBuf>,
        gateway: &PvGateway,
        settings: Arc<Settings>,
    ) -> Self {
        let pv = gateway.for_instrument(instrument.pv_prefix.clone());
        let valid_iocs = pv.get_valid_iocs();
        let protected_iocs = pv.get_protected_iocs();
        let interesting_pvs = pv.get_interesting_pvs();
        let server_version = pv.get_version_string();
        tracing::info!(
            instrument = %instrument.name,
            prefix = %instrument.pv_prefix,
            valid_iocs = valid_iocs.as_ref().map(BTreeSet::len),
            protected_iocs = protected_iocs.as_ref().map(BTreeSet::len),
            interesting_pvs = interesting_pvs.len(),
            server_version = server_version.as_deref(),
            "context bound"
        );
        Self {
            gui_repo,
            valid_iocs,
            protected_iocs,
            interesting_pvs,
            server_version,
            live: Some(pv),
            ..Self::offline(instrument, config_repo, settings)
        }
    }

    /// Set the GUI working copy (builder pattern).
    pub fn with_gui_repo(mut self, gui_repo: impl Into<PathBuf>) -> Self {
        self.gui_repo = Some(gui_repo.into());
        self
    }

    /// Instrument name.
    pub fn name(&self) -> &str {
        &self.instrument.name
    }

    /// True when none of the server queries answered.
    pub fn appears_offline(&self) -> bool {
        self.server_version.is_none() && self.valid_iocs.is_none()
    }

    pub(super) fn tree(&self, root: ConfigRoot) -> ConfigTree {
        ConfigTree::new(&self.config_repo, root)
    }

    pub(super) fn globals(&self) -> Globals {
        Globals::new(&self.config_repo)
            .with_required_ioc_prefix(self.settings.require_globals_ioc_prefix)
    }

    pub(super) fn synoptics(&self) -> Synoptics {
        Synoptics::new(&self.config_repo)
    }

    pub(super) fn version_file(&self) -> VersionFile {
        VersionFile::new(&self.config_repo)
    }
}
