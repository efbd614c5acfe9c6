//! The instrument scripting directory, `Python/`, when the repository has one.

use std::collections::BTreeMap;
use std::path::PathBuf;

use instcheck_diagnostics::{Diagnostic, codes};
use instcheck_git::GitRepo;

use super::{InstrumentContext, Outcome, error_diagnostic};
use crate::fs_util;

/// Branch `inst/__init__.py` must match.
const REFERENCE_BRANCH: &str = "origin/master";

fn python_dir(ctx: &InstrumentContext) -> PathBuf {
    ctx.config_repo.join("Python")
}

fn inst_dir(ctx: &InstrumentContext) -> PathBuf {
    python_dir(ctx).join("inst")
}

/// `init_<instrument>.py`, lowercased with dashes as underscores.
fn expected_init_file(instrument: &str) -> String {
    format!("init_{}.py", instrument.to_lowercase().replace('-', "_"))
}

fn no_python_dir(ctx: &InstrumentContext) -> Option<Outcome> {
    (!python_dir(ctx).is_dir()).then(|| Outcome::skipped("Python directory not present"))
}

pub(super) fn init_file(ctx: &InstrumentContext) -> Outcome {
    if let Some(skip) = no_python_dir(ctx) {
        return skip;
    }
    let dir = python_dir(ctx);
    let init_files: Vec<String> = match fs_util::list_contents(&dir) {
        Ok(contents) => contents
            .into_iter()
            .filter(|f| f.starts_with("init_") && f.ends_with(".py"))
            .collect(),
        Err(e) => return Outcome::failed(error_diagnostic(&e, None)),
    };
    let expected = expected_init_file(ctx.name());
    let mut diagnostics = Vec::new();
    if !init_files.contains(&expected) {
        diagnostics.push(
            Diagnostic::error(
                codes::SCRIPT_INIT_MISSING,
                format!("instrument init file {expected} not found"),
            )
            .with_context(ctx!("file" => dir.join(&expected).display().to_string())),
        );
    }
    if init_files.len() > 1 {
        diagnostics.push(
            Diagnostic::error(
                codes::SCRIPT_INIT_NOT_UNIQUE,
                format!("expected exactly one init file, found {}", init_files.join(", ")),
            )
            .with_context(ctx!("count" => init_files.len().to_string())),
        );
    }
    Outcome::from_diagnostics(diagnostics)
}

pub(super) fn inst_directory(ctx: &InstrumentContext) -> Outcome {
    if let Some(skip) = no_python_dir(ctx) {
        return skip;
    }
    let dir = inst_dir(ctx);
    if dir.is_dir() || python_dir(ctx).join("inst.py").is_file() {
        return Outcome::Passed;
    }
    Outcome::failed(
        Diagnostic::error(
            codes::INST_SCRIPTS_MISSING,
            "instrument scripts directory/file is missing",
        )
        .with_context(ctx!("file" => dir.display().to_string())),
    )
}

pub(super) fn inst_init_unchanged(ctx: &InstrumentContext) -> Outcome {
    if let Some(skip) = no_python_dir(ctx) {
        return skip;
    }
    let dir = inst_dir(ctx);
    if !dir.is_dir() {
        return Outcome::skipped("instrument scripts directory missing");
    }
    let init = dir.join("__init__.py");
    let file = init.display().to_string();
    if !init.is_file() {
        return Outcome::failed(
            Diagnostic::error(codes::INST_INIT_MODIFIED, "inst init file missing")
                .with_context(ctx!("file" => file)),
        );
    }
    let repo = GitRepo::new(&ctx.config_repo).with_timeout(ctx.settings.git_timeout());
    match repo.diff_against(REFERENCE_BRANCH, &init) {
        Ok(diff) if diff.is_empty() => Outcome::Passed,
        Ok(diff) => Outcome::failed(
            Diagnostic::error(
                codes::INST_INIT_MODIFIED,
                format!("inst/__init__.py had contents which differed from the one on {REFERENCE_BRANCH}"),
            )
            .with_context(ctx!("file" => file, "diff" => diff)),
        ),
        Err(e) => Outcome::failed(
            Diagnostic::error(
                codes::INST_INIT_MODIFIED,
                format!("cannot compare inst/__init__.py with {REFERENCE_BRANCH}: {e}"),
            )
            .with_context(ctx!("file" => file, "error" => e.to_string())),
        ),
    }
}
