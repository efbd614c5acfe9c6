//! Per-instrument phases and the aggregate run.
//!
//! Each instrument is bound to the server, its repositories are synchronized,
//! its directories enumerated and the suite executed. A failing phase marks
//! that instrument failed; the run always moves on to the next one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use instcheck_diagnostics::{Diagnostic, codes};
use instcheck_git::GitRepo;
use instcheck_pv::{InstrumentRecord, PvGateway};
use serde::Serialize;

use crate::ConfigError;
use crate::config::{ConfigRoot, ConfigTree};
use crate::gui::sync_gui_to_release;
use crate::settings::Settings;
use crate::synoptic::Synoptics;
use crate::validate::{CheckResult, InstrumentContext, Outcome, build_suite, execute};
use crate::version::VersionFile;

/// Errors that stop a run before any instrument is checked.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// `CS:INSTLIST` was empty or unreadable.
    #[error("no instruments found; the instrument list PV is probably unavailable")]
    NoInstruments,

    /// Requested instruments are not in the instrument list.
    #[error("instruments not in the instrument list: {}", .0.join(", "))]
    UnknownInstruments(Vec<String>),
}

/// Counts of block PVs outside the interesting set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NonInterestingCounts {
    /// Across every configuration.
    pub configurations: usize,
    /// Across every component.
    pub components: usize,
}

/// Everything that happened for one instrument.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentReport {
    /// Instrument name.
    pub instrument: String,
    /// Set when binding, synchronizing or enumerating failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_failure: Option<Diagnostic>,
    /// Every evaluated case, in suite order.
    pub results: Vec<CheckResult>,
    /// Block PVs nobody marked interesting.
    pub non_interesting_block_pvs: NonInterestingCounts,
}

impl InstrumentReport {
    fn phase_failed(instrument: &str, diagnostic: Diagnostic) -> Self {
        tracing::warn!(
            instrument = instrument,
            code = %diagnostic.id,
            message = %diagnostic.message,
            "phase failed"
        );
        Self {
            instrument: instrument.to_string(),
            phase_failure: Some(diagnostic),
            results: Vec::new(),
            non_interesting_block_pvs: NonInterestingCounts::default(),
        }
    }

    fn from_results(instrument: &str, results: Vec<CheckResult>) -> Self {
        let count = |check: &str| -> usize {
            results
                .iter()
                .filter(|r| r.check == check)
                .flat_map(|r| r.outcome.diagnostics())
                .filter(|d| d.id == codes::NON_INTERESTING_BLOCK_PVS)
                .filter_map(|d| d.context_value("count")?.parse::<usize>().ok())
                .sum()
        };
        let non_interesting_block_pvs = NonInterestingCounts {
            configurations: count("configurations.interesting-block-pvs"),
            components: count("components.interesting-block-pvs"),
        };
        Self {
            instrument: instrument.to_string(),
            phase_failure: None,
            results,
            non_interesting_block_pvs,
        }
    }

    /// True when every phase succeeded and no check failed.
    pub fn success(&self) -> bool {
        self.phase_failure.is_none() && !self.results.iter().any(|r| r.outcome.is_failure())
    }

    /// Number of results for which `pred` holds.
    pub fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// Results that failed the run.
    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| r.outcome.is_failure())
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// One report per checked instrument.
    pub instruments: Vec<InstrumentReport>,
    /// Instruments left out by settings; neither pass nor fail.
    pub excluded: Vec<String>,
}

impl RunSummary {
    /// True when every checked instrument succeeded.
    pub fn success(&self) -> bool {
        self.instruments.iter().all(InstrumentReport::success)
    }

    /// Non-interesting block PV counts over every instrument.
    pub fn total_non_interesting(&self) -> NonInterestingCounts {
        self.instruments
            .iter()
            .fold(NonInterestingCounts::default(), |acc, r| NonInterestingCounts {
                configurations: acc.configurations + r.non_interesting_block_pvs.configurations,
                components: acc.components + r.non_interesting_block_pvs.components,
            })
    }
}

/// Directories and synoptic files to instantiate the suite over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    /// Configuration names.
    pub configurations: Vec<String>,
    /// Component names.
    pub components: Vec<String>,
    /// Synoptic file names.
    pub synoptics: Vec<String>,
}

/// List what the suite runs over. A missing synoptics directory is an error.
pub fn enumerate(config_repo: &Path) -> Result<Enumeration, ConfigError> {
    Ok(Enumeration {
        configurations: ConfigTree::new(config_repo, ConfigRoot::Configurations)
            .list_configurations()?,
        components: ConfigTree::new(config_repo, ConfigRoot::Components)
            .list_configurations()?,
        synoptics: Synoptics::new(config_repo).list_synoptic_files()?,
    })
}

/// Enumerate and execute against an already prepared working copy.
pub fn check_instrument(ctx: &InstrumentContext) -> InstrumentReport {
    let found = match enumerate(&ctx.config_repo) {
        Ok(found) => found,
        Err(e) => {
            return InstrumentReport::phase_failed(
                ctx.name(),
                Diagnostic::error(
                    codes::ENUMERATION_FAILED,
                    format!("cannot list configurations of {}: {e}", ctx.name()),
                ),
            );
        }
    };
    tracing::info!(
        instrument = ctx.name(),
        configurations = found.configurations.len(),
        components = found.components.len(),
        synoptics = found.synoptics.len(),
        "enumerated"
    );
    let cases = build_suite(&found.configurations, &found.components, &found.synoptics);
    InstrumentReport::from_results(ctx.name(), execute(ctx, &cases))
}

/// Drives the phases over a set of instruments.
#[derive(Debug)]
pub struct Runner {
    settings: Arc<Settings>,
    gateway: PvGateway,
    config_repo: PathBuf,
    gui_repo: PathBuf,
}

impl Runner {
    /// A runner over the given working copies.
    pub fn new(
        settings: Arc<Settings>,
        gateway: PvGateway,
        config_repo: impl Into<PathBuf>,
        gui_repo: impl Into<PathBuf>,
    ) -> Self {
        Self {
            settings,
            gateway,
            config_repo: config_repo.into(),
            gui_repo: gui_repo.into(),
        }
    }

    /// Instruments from `CS:INSTLIST`, optionally restricted to `names`.
    pub fn select_instruments(
        &self,
        names: Option<&[String]>,
    ) -> Result<Vec<InstrumentRecord>, RunError> {
        select_instruments(&self.gateway, names)
    }

    /// Check every instrument in turn, leaving out excluded ones.
    pub fn run_all(&self, instruments: &[InstrumentRecord]) -> RunSummary {
        let mut summary = RunSummary::default();
        for instrument in instruments {
            if self.settings.is_excluded(&instrument.name) {
                tracing::info!(instrument = %instrument.name, "excluded from this run");
                summary.excluded.push(instrument.name.clone());
                continue;
            }
            summary.instruments.push(self.run_instrument(instrument));
        }
        tracing::info!(
            checked = summary.instruments.len(),
            excluded = summary.excluded.len(),
            success = summary.success(),
            "run finished"
        );
        summary
    }

    /// Bind, synchronize, enumerate and execute for one instrument.
    pub fn run_instrument(&self, instrument: &InstrumentRecord) -> InstrumentReport {
        let span = tracing::info_span!("instrument", name = %instrument.name);
        let _enter = span.enter();

        let mut ctx = InstrumentContext::bind(
            instrument.clone(),
            &self.config_repo,
            Some(self.gui_repo.clone()),
            &self.gateway,
            Arc::clone(&self.settings),
        );
        match self.sync(instrument) {
            Ok(release) => ctx.gui_release = release,
            Err(failure) => return InstrumentReport::phase_failed(&instrument.name, failure),
        }
        check_instrument(&ctx)
    }

    /// Check out the instrument's branch, then the GUI release it uses.
    ///
    /// Returns the GUI ref, or `None` when the repository has no version file.
    fn sync(&self, instrument: &InstrumentRecord) -> Result<Option<String>, Diagnostic> {
        let timeout = self.settings.git_timeout();
        let config = GitRepo::new(&self.config_repo).with_timeout(timeout);
        if !config.update_branch(&instrument.host_name, false) {
            return Err(Diagnostic::error(
                codes::SYNC_FAILED,
                format!(
                    "couldn't check out branch {} of the configuration repository",
                    instrument.host_name
                ),
            )
            .with_context(BTreeMap::from([(
                "branch".to_string(),
                instrument.host_name.clone(),
            )])));
        }

        let version_file = VersionFile::new(&self.config_repo);
        if !version_file.exists() {
            tracing::warn!(
                instrument = %instrument.name,
                "no version file; synoptic checks will be skipped"
            );
            return Ok(None);
        }
        let gui_failed = |reason: String| {
            Diagnostic::error(
                codes::GUI_SYNC_FAILED,
                format!(
                    "couldn't synchronize the GUI repository for {}: {reason}",
                    instrument.name
                ),
            )
        };
        let version = version_file.read().map_err(|e| gui_failed(e.to_string()))?;
        let gui = GitRepo::new(&self.gui_repo).with_timeout(timeout);
        sync_gui_to_release(&gui, &version, self.settings.gui_ref_scheme)
            .map(Some)
            .map_err(|e| {
                gui_failed(e.to_string())
                    .with_context(BTreeMap::from([("version".to_string(), version.clone())]))
            })
    }
}

/// Instruments from the gateway's `CS:INSTLIST`, optionally restricted to `names`.
pub fn select_instruments(
    gateway: &PvGateway,
    names: Option<&[String]>,
) -> Result<Vec<InstrumentRecord>, RunError> {
    let all = gateway.get_inst_list();
    if all.is_empty() {
        return Err(RunError::NoInstruments);
    }
    let Some(names) = names else {
        return Ok(all);
    };
    let unknown: Vec<String> = names
        .iter()
        .filter(|n| !all.iter().any(|i| &i.name == *n))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(RunError::UnknownInstruments(unknown));
    }
    Ok(all.into_iter().filter(|i| names.contains(&i.name)).collect())
}
