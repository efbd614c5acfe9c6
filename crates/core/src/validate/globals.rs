//! Checks over `configurations/globals.txt`.

use std::collections::BTreeMap;

use instcheck_diagnostics::{Diagnostic, LineIndex, codes};

use super::iocs::{motor_iocs, motor_macros_mismatch};
use super::{InstrumentContext, Outcome};
use crate::fs_util;
use crate::globals::{GLOBALS_FILE, SIM_MODE_MACROS};

pub(super) fn syntax(ctx: &InstrumentContext) -> Outcome {
    let globals = ctx.globals();
    if !globals.file_exists() {
        return Outcome::skipped("globals file does not exist");
    }
    let path = globals.path();
    let text = match fs_util::read_text(&path) {
        Ok(text) => text,
        Err(e) => return Outcome::failed(super::error_diagnostic(&e, None)),
    };
    let index = LineIndex::new(&text);
    let diagnostics = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !globals.check_syntax(line))
        .map(|(i, line)| {
            let mut diag = Diagnostic::error(
                codes::GLOBALS_SYNTAX,
                format!("invalid syntax on line {}. Line contents was: {line}", i + 1),
            )
            .with_context(ctx!(
                "file" => path.display().to_string(),
                "line" => (i + 1).to_string(),
            ));
            if let Some(span) = index.line_span(&text, i) {
                diag = diag.with_span(span);
            }
            diag
        })
        .collect();
    Outcome::from_diagnostics(diagnostics)
}

pub(super) fn single_file(ctx: &InstrumentContext) -> Outcome {
    let globals = ctx.globals();
    let expected = usize::from(globals.file_exists());
    let found = globals.count_globals_files();
    if found == expected {
        return Outcome::Passed;
    }
    Outcome::failed(
        Diagnostic::error(
            codes::EXTRA_GLOBALS_FILES,
            format!("extra {GLOBALS_FILE} files in repository: found {found}, expected {expected}"),
        )
        .with_context(ctx!("count" => found.to_string())),
    )
}

pub(super) fn motor_macros(ctx: &InstrumentContext) -> Outcome {
    let globals = ctx.globals();
    if !globals.file_exists() {
        return Outcome::skipped("globals file does not exist");
    }
    let diagnostics = motor_iocs()
        .into_iter()
        .filter(|ioc| motor_macros_mismatch(&globals.get_macros(ioc)))
        .map(|ioc| {
            Diagnostic::error(
                codes::GLOBALS_MOTOR_MACROS_MISMATCH,
                format!("only one of comms setting and motor controller number was defined for {ioc} in globals"),
            )
            .with_context(ctx!("file" => globals.path().display().to_string(), "ioc" => ioc))
        })
        .collect();
    Outcome::from_diagnostics(diagnostics)
}

pub(super) fn sim_mode(ctx: &InstrumentContext) -> Outcome {
    let globals = ctx.globals();
    if !globals.is_any_ioc_in_sim_mode() {
        return Outcome::Passed;
    }
    let diagnostics = globals
        .definitions()
        .into_iter()
        .filter(|d| SIM_MODE_MACROS.contains(&d.name.as_str()) && d.value == "1")
        .map(|d| {
            let ioc = d.ioc.as_deref().unwrap_or("every IOC");
            Diagnostic::error(
                codes::GLOBALS_SIM_MODE,
                format!("{} is set in globals for {ioc}", d.name),
            )
            .with_context(ctx!(
                "file" => globals.path().display().to_string(),
                "macro" => d.name.as_str(),
                "ioc" => ioc,
            ))
        })
        .collect();
    Outcome::from_diagnostics(diagnostics)
}
