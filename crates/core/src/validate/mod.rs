//! Table-driven checks over one instrument's configuration repository.
//!
//! [`build_suite`] turns the enumerated configurations, components and
//! synoptics into a flat list of [`Case`]s; [`execute`] drives every case
//! through one dispatcher. Checks never abort the run: unreadable or
//! malformed files become failed outcomes and unavailable external data
//! becomes a skip.

use std::collections::BTreeMap;
use std::fmt;

use instcheck_diagnostics::{Diagnostic, LineIndex, Severity, codes};
use serde::Serialize;

use crate::ConfigError;
use crate::config::ConfigRoot;

/// Shorthand for building a `BTreeMap<String, String>` context from key-value pairs.
///
/// ```ignore
/// ctx!("configuration" => name, "ioc" => ioc)
/// ```
macro_rules! ctx {
    ($($k:expr => $v:expr),+ $(,)?) => {
        BTreeMap::from([$(($k.into(), $v.into())),+])
    };
}

mod blocks;
mod context;
mod files;
mod globals;
mod iocs;
mod live;
mod rules;
mod scripting;
mod synoptic;
mod version;

pub use context::InstrumentContext;
pub use iocs::{MOTOR_FAMILIES, motor_iocs};
pub use rules::{MACRO_RULES, MacroRule};

// ── Outcomes ────────────────────────────────────────────────────────────────

/// What a check was applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum Subject {
    /// The instrument as a whole.
    Instrument,
    /// One configuration directory.
    Configuration(String),
    /// One component directory.
    Component(String),
    /// One synoptic file.
    Synoptic(String),
}

impl Subject {
    /// Subject for a directory under `root`.
    pub fn for_root(root: ConfigRoot, name: &str) -> Self {
        match root {
            ConfigRoot::Components => Subject::Component(name.to_string()),
            ConfigRoot::Configurations | ConfigRoot::Devices => {
                Subject::Configuration(name.to_string())
            }
        }
    }

    /// Name of the directory or file, if the subject has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Subject::Instrument => None,
            Subject::Configuration(n) | Subject::Component(n) | Subject::Synoptic(n) => Some(n),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Instrument => write!(f, "instrument"),
            Subject::Configuration(n) => write!(f, "configuration {n}"),
            Subject::Component(n) => write!(f, "component {n}"),
            Subject::Synoptic(n) => write!(f, "synoptic {n}"),
        }
    }
}

/// Result of one check on one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum Outcome {
    /// Nothing to report.
    Passed,
    /// Only warnings; the run still succeeds.
    Warned(Vec<Diagnostic>),
    /// At least one error.
    Failed(Vec<Diagnostic>),
    /// Not evaluated, with the reason.
    Skipped(String),
}

impl Outcome {
    /// Passed when empty, failed when any diagnostic is an error, warned otherwise.
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        if diagnostics.is_empty() {
            Outcome::Passed
        } else if diagnostics.iter().any(|d| d.severity == Severity::Error) {
            Outcome::Failed(diagnostics)
        } else {
            Outcome::Warned(diagnostics)
        }
    }

    /// A skip with `reason`.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Outcome::Skipped(reason.into())
    }

    /// A single failing diagnostic.
    pub fn failed(diagnostic: Diagnostic) -> Self {
        Outcome::Failed(vec![diagnostic])
    }

    /// Whether this outcome fails the run.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// Whether the check was not evaluated.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }

    /// Diagnostics carried by the outcome; empty for passes and skips.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Outcome::Warned(d) | Outcome::Failed(d) => d,
            Outcome::Passed | Outcome::Skipped(_) => &[],
        }
    }

    /// Lowercase status word.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::Warned(_) => "warned",
            Outcome::Failed(_) => "failed",
            Outcome::Skipped(_) => "skipped",
        }
    }
}

/// One evaluated case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    /// Check name, e.g. `components.valid-iocs`.
    pub check: String,
    /// What it was applied to.
    pub subject: Subject,
    /// How it went.
    #[serde(flatten)]
    pub outcome: Outcome,
}

// ── Checks ──────────────────────────────────────────────────────────────────

/// Every check the suite knows.
///
/// Variants carrying a [`ConfigRoot`] run once per directory under that root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// At least one configuration exists.
    ConfigurationsExist,
    /// The `_base` component exists.
    BasePresent,
    /// Every IOC is known to the block server.
    ValidIocs(ConfigRoot),
    /// No protected IOC outside `_base`.
    ProtectedIocs(ConfigRoot),
    /// No IOC repeats across a configuration and its components.
    UniqueIocs,
    /// No block repeats across a configuration and its components.
    UniqueBlocks,
    /// Block names are short enough.
    BlockNameLength(ConfigRoot),
    /// Only known files in the directory.
    AllowedFiles(ConfigRoot),
    /// Every required file is present.
    RequiredFiles(ConfigRoot),
    /// Every XML file parses.
    WellFormedXml(ConfigRoot),
    /// Motor controller number and comms macros appear together.
    MotorMacros(ConfigRoot),
    /// No IOC in simulation mode.
    SimMode(ConfigRoot),
    /// One row of [`MACRO_RULES`], by index.
    MacroRule(ConfigRoot, usize),
    /// Count of block PVs outside the interesting set.
    InterestingBlockPvs(ConfigRoot),
    /// Every globals line parses.
    GlobalsSyntax,
    /// At most one globals file in the repository.
    GlobalsSingleFile,
    /// Motor macro pairing in globals.
    GlobalsMotorMacros,
    /// No simulation macro set in globals.
    GlobalsSimMode,
    /// `config_version.txt` exists.
    VersionFileExists,
    /// At most one version file in the repository.
    VersionSingleFile,
    /// Repository version matches the server.
    VersionMatchesServer,
    /// `Python/init_<inst>.py` is present and unique.
    ScriptingInitFile,
    /// `Python/inst` or `Python/inst.py` exists.
    ScriptingInstDirectory,
    /// `Python/inst/__init__.py` matches `origin/master`.
    ScriptingInstInitUnchanged,
    /// Synoptic targets are known to the GUI.
    SynopticTargets,
    /// Synoptic component types are known to the GUI.
    SynopticTypes,
    /// Every synoptic PV has an address.
    SynopticPvAddresses,
    /// Beckhoff axes have a non-zero retry delay.
    LiveBeckhoffDelay,
    /// Closed-loop Galil axes have a non-zero encoder sync tolerance.
    LiveGalilSyncTolerance,
    /// The DAE run number is not close to running out of digits.
    LiveRunNumberHeadroom,
}

impl Check {
    /// Dotted name used in reports and skip lists.
    pub fn name(&self) -> String {
        let root = |r: &ConfigRoot| r.dir_name();
        match self {
            Check::ConfigurationsExist => "configurations.exist".into(),
            Check::BasePresent => "components.base-present".into(),
            Check::ValidIocs(r) => format!("{}.valid-iocs", root(r)),
            Check::ProtectedIocs(r) => format!("{}.protected-iocs", root(r)),
            Check::UniqueIocs => "configurations.unique-iocs".into(),
            Check::UniqueBlocks => "configurations.unique-blocks".into(),
            Check::BlockNameLength(r) => format!("{}.block-name-length", root(r)),
            Check::AllowedFiles(r) => format!("{}.allowed-files", root(r)),
            Check::RequiredFiles(r) => format!("{}.required-files", root(r)),
            Check::WellFormedXml(r) => format!("{}.well-formed-xml", root(r)),
            Check::MotorMacros(r) => format!("{}.motor-macros", root(r)),
            Check::SimMode(r) => format!("{}.sim-mode", root(r)),
            Check::MacroRule(r, i) => match MACRO_RULES.get(*i) {
                Some(rule) => format!("{}.macro-rule:{}", root(r), rule.ioc),
                None => format!("{}.macro-rule", root(r)),
            },
            Check::InterestingBlockPvs(r) => format!("{}.interesting-block-pvs", root(r)),
            Check::GlobalsSyntax => "globals.syntax".into(),
            Check::GlobalsSingleFile => "globals.single-file".into(),
            Check::GlobalsMotorMacros => "globals.motor-macros".into(),
            Check::GlobalsSimMode => "globals.sim-mode".into(),
            Check::VersionFileExists => "version.file-exists".into(),
            Check::VersionSingleFile => "version.single-file".into(),
            Check::VersionMatchesServer => "version.matches-server".into(),
            Check::ScriptingInitFile => "scripting.init-file".into(),
            Check::ScriptingInstDirectory => "scripting.inst-directory".into(),
            Check::ScriptingInstInitUnchanged => "scripting.inst-init-unchanged".into(),
            Check::SynopticTargets => "synoptic.targets".into(),
            Check::SynopticTypes => "synoptic.types".into(),
            Check::SynopticPvAddresses => "synoptic.pv-addresses".into(),
            Check::LiveBeckhoffDelay => "live.beckhoff-delay".into(),
            Check::LiveGalilSyncTolerance => "live.galil-sync-tolerance".into(),
            Check::LiveRunNumberHeadroom => "live.run-number-headroom".into(),
        }
    }
}

/// A check bound to its subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Case {
    /// What to run.
    pub check: Check,
    /// What to run it on.
    pub subject: Subject,
}

impl Case {
    fn new(check: Check, subject: Subject) -> Self {
        Self { check, subject }
    }
}

const SINGLE_CHECKS: [Check; 17] = [
    Check::ConfigurationsExist,
    Check::BasePresent,
    Check::GlobalsSyntax,
    Check::GlobalsSingleFile,
    Check::GlobalsMotorMacros,
    Check::GlobalsSimMode,
    Check::VersionFileExists,
    Check::VersionSingleFile,
    Check::VersionMatchesServer,
    Check::ScriptingInitFile,
    Check::ScriptingInstDirectory,
    Check::ScriptingInstInitUnchanged,
    Check::InterestingBlockPvs(ConfigRoot::Configurations),
    Check::InterestingBlockPvs(ConfigRoot::Components),
    Check::LiveBeckhoffDelay,
    Check::LiveGalilSyncTolerance,
    Check::LiveRunNumberHeadroom,
];

fn directory_checks(root: ConfigRoot) -> Vec<Check> {
    let mut checks = vec![Check::ValidIocs(root), Check::ProtectedIocs(root)];
    if root == ConfigRoot::Configurations {
        checks.extend([Check::UniqueIocs, Check::UniqueBlocks]);
    }
    checks.extend([
        Check::BlockNameLength(root),
        Check::AllowedFiles(root),
        Check::RequiredFiles(root),
        Check::WellFormedXml(root),
        Check::MotorMacros(root),
        Check::SimMode(root),
    ]);
    checks.extend((0..MACRO_RULES.len()).map(|i| Check::MacroRule(root, i)));
    checks
}

const SYNOPTIC_CHECKS: [Check; 3] = [
    Check::SynopticTargets,
    Check::SynopticTypes,
    Check::SynopticPvAddresses,
];

/// Instantiate the suite for the enumerated directories and synoptic files.
///
/// Instrument-wide checks come first, then each configuration, each
/// component and each synoptic in the order given.
pub fn build_suite(configs: &[String], components: &[String], synoptics: &[String]) -> Vec<Case> {
    let mut cases: Vec<Case> = SINGLE_CHECKS
        .iter()
        .map(|&check| Case::new(check, Subject::Instrument))
        .collect();
    for (root, names) in [
        (ConfigRoot::Configurations, configs),
        (ConfigRoot::Components, components),
    ] {
        let checks = directory_checks(root);
        for name in names {
            cases.extend(
                checks
                    .iter()
                    .map(|&check| Case::new(check, Subject::for_root(root, name))),
            );
        }
    }
    for file in synoptics {
        cases.extend(
            SYNOPTIC_CHECKS
                .iter()
                .map(|&check| Case::new(check, Subject::Synoptic(file.clone()))),
        );
    }
    cases
}

/// Evaluate every case in order.
///
/// A case whose name is listed for this instrument in the skip table is
/// reported as skipped without running.
pub fn execute(ctx: &InstrumentContext, cases: &[Case]) -> Vec<CheckResult> {
    let results: Vec<CheckResult> = cases
        .iter()
        .map(|case| {
            let check = case.check.name();
            let outcome = if ctx.settings.is_skipped(&check, ctx.name()) {
                Outcome::skipped(format!("{check} is not run on {}", ctx.name()))
            } else {
                run_case(ctx, case)
            };
            tracing::debug!(
                instrument = ctx.name(),
                check = %check,
                subject = %case.subject,
                outcome = outcome.label(),
                "check finished"
            );
            CheckResult {
                check,
                subject: case.subject.clone(),
                outcome,
            }
        })
        .collect();
    let failed = results.iter().filter(|r| r.outcome.is_failure()).count();
    tracing::info!(
        instrument = ctx.name(),
        cases = results.len(),
        failed,
        "checks executed"
    );
    results
}

fn run_case(ctx: &InstrumentContext, case: &Case) -> Outcome {
    let name = case.subject.name().unwrap_or_default();
    match case.check {
        Check::ConfigurationsExist => files::configurations_exist(ctx),
        Check::BasePresent => files::base_present(ctx),
        Check::ValidIocs(root) => iocs::valid_iocs(ctx, root, name),
        Check::ProtectedIocs(root) => iocs::protected_iocs(ctx, root, name),
        Check::UniqueIocs => iocs::unique_iocs(ctx, name),
        Check::UniqueBlocks => blocks::unique_blocks(ctx, name),
        Check::BlockNameLength(root) => blocks::block_name_length(ctx, root, name),
        Check::AllowedFiles(root) => files::allowed_files(ctx, root, name),
        Check::RequiredFiles(root) => files::required_files(ctx, root, name),
        Check::WellFormedXml(root) => files::well_formed_xml(ctx, root, name),
        Check::MotorMacros(root) => iocs::motor_macros(ctx, root, name),
        Check::SimMode(root) => iocs::sim_mode(ctx, root, name),
        Check::MacroRule(root, index) => match MACRO_RULES.get(index) {
            Some(rule) => rules::apply(ctx, root, name, rule),
            None => Outcome::skipped(format!("no macro rule #{index}")),
        },
        Check::InterestingBlockPvs(root) => blocks::interesting_block_pvs(ctx, root),
        Check::GlobalsSyntax => globals::syntax(ctx),
        Check::GlobalsSingleFile => globals::single_file(ctx),
        Check::GlobalsMotorMacros => globals::motor_macros(ctx),
        Check::GlobalsSimMode => globals::sim_mode(ctx),
        Check::VersionFileExists => version::file_exists(ctx),
        Check::VersionSingleFile => version::single_file(ctx),
        Check::VersionMatchesServer => version::matches_server(ctx),
        Check::ScriptingInitFile => scripting::init_file(ctx),
        Check::ScriptingInstDirectory => scripting::inst_directory(ctx),
        Check::ScriptingInstInitUnchanged => scripting::inst_init_unchanged(ctx),
        Check::SynopticTargets => synoptic::targets(ctx, name),
        Check::SynopticTypes => synoptic::types(ctx, name),
        Check::SynopticPvAddresses => synoptic::pv_addresses(ctx, name),
        Check::LiveBeckhoffDelay => live::beckhoff_delay(ctx),
        Check::LiveGalilSyncTolerance => live::galil_sync_tolerance(ctx),
        Check::LiveRunNumberHeadroom => live::run_number_headroom(ctx),
    }
}

// ── Error mapping ───────────────────────────────────────────────────────────

/// Diagnostic for a repository read or parse failure.
///
/// `text` is the document that failed to parse, when available; XML errors
/// then carry a span covering the offending line.
pub(crate) fn error_diagnostic(err: &ConfigError, text: Option<&str>) -> Diagnostic {
    let code = match err {
        ConfigError::Io { .. } => codes::UNREADABLE_FILE,
        ConfigError::IncompleteSynopticComponent { .. } => codes::SYNOPTIC_MALFORMED,
        _ => codes::MALFORMED_XML,
    };
    let mut diag =
        Diagnostic::error(code, err.to_string()).with_context(ctx!("error" => err.to_string()));
    if let ConfigError::Io { path, .. } = err {
        diag = diag.with_context(ctx!("file" => path.display().to_string()));
    }
    if let (ConfigError::Xml { source, .. }, Some(text)) = (err, text) {
        let row = source.pos().row as usize;
        if let Some(span) = LineIndex::new(text).line_span(text, row.saturating_sub(1)) {
            diag = diag.with_span(span);
        }
    }
    diag
}

/// Failed outcome for a read or parse failure inside `subject_key`.
pub(crate) fn error_outcome(err: &ConfigError, subject_key: &str, subject: &str) -> Outcome {
    Outcome::failed(error_diagnostic(err, None).with_context(ctx!(subject_key => subject)))
}
