//! Instrument configuration repository checker.
//!
//! Parses the configuration, component and device directories of an
//! instrument's configuration repository, its `globals.txt`, synoptics and
//! version file, and checks them against each other and against what the
//! instrument server reports. The main entry points are [`Runner`] for a full
//! run over many instruments and [`check_instrument`] for one checkout.

#![warn(missing_docs)]

/// Configuration, component and device directory parsers.
pub mod config;
/// Host checkouts compared against a reference repository.
pub mod consistency;
/// Repository read errors.
pub mod error;
/// Directory listing and file reading helpers.
pub mod fs_util;
/// The `globals.txt` macro file.
pub mod globals;
/// GUI repository release checkout and OPI catalogue.
pub mod gui;
/// Bounded parallel map.
pub mod pool;
/// Per-instrument phases and run summaries.
pub mod runner;
/// Layered run settings.
pub mod settings;
/// Synoptic documents.
pub mod synoptic;
/// IOC and device screen usage across instruments.
pub mod usage;
/// The check suite.
pub mod validate;
/// Version file and release numbers.
pub mod version;

mod xml;

// ── Convenience re-exports ──────────────────────────────────────────────────
// Flat imports for the most common entry points. The full module paths
// remain available for less common types.

// Errors
pub use error::ConfigError;

// Parsers
pub use config::{ConfigRoot, ConfigTree};
pub use globals::Globals;
pub use synoptic::Synoptics;
pub use version::{Release, VersionFile};

// Validation
pub use validate::{Case, Check, CheckResult, InstrumentContext, Outcome, Subject, build_suite, execute};

// Runner
pub use runner::{InstrumentReport, RunError, RunSummary, Runner, check_instrument, enumerate};

// Settings
pub use settings::{Settings, SettingsError};

// Diagnostics (re-exported from the diagnostics crate)
pub use instcheck_diagnostics::{Diagnostic, Severity, Span, codes};
