//! Directory shape: presence of configurations and the files inside each one.

use std::collections::BTreeMap;

use instcheck_diagnostics::{Diagnostic, codes};

use super::{InstrumentContext, Outcome, error_diagnostic, error_outcome};
use crate::config::{ALLOWED_FILES, BASE_COMPONENT, BLOCK_GW_PVLIST, ConfigRoot, REQUIRED_FILES};
use crate::{fs_util, xml};

pub(super) fn configurations_exist(ctx: &InstrumentContext) -> Outcome {
    let tree = ctx.tree(ConfigRoot::Configurations);
    match tree.list_configurations() {
        Ok(names) if names.is_empty() => Outcome::failed(
            Diagnostic::error(
                codes::NO_CONFIGURATIONS,
                format!("no configurations found in {}", tree.directory().display()),
            )
            .with_context(ctx!("file" => tree.directory().display().to_string())),
        ),
        Ok(_) => Outcome::Passed,
        Err(e) => Outcome::failed(error_diagnostic(&e, None)),
    }
}

pub(super) fn base_present(ctx: &InstrumentContext) -> Outcome {
    let dir = ctx.tree(ConfigRoot::Components).config_dir(BASE_COMPONENT);
    if dir.is_dir() {
        Outcome::Passed
    } else {
        Outcome::failed(
            Diagnostic::error(
                codes::BASE_COMPONENT_MISSING,
                format!("component {BASE_COMPONENT} is missing"),
            )
            .with_context(ctx!("file" => dir.display().to_string())),
        )
    }
}

pub(super) fn allowed_files(ctx: &InstrumentContext, root: ConfigRoot, name: &str) -> Outcome {
    let dir = ctx.tree(root).config_dir(name);
    let contents = match fs_util::list_contents(&dir) {
        Ok(contents) => contents,
        Err(e) => return error_outcome(&e, root.noun(), name),
    };
    let diagnostics = contents
        .into_iter()
        .filter(|file| !ALLOWED_FILES.contains(&file.as_str()))
        .map(|file| {
            Diagnostic::error(
                codes::UNEXPECTED_FILE,
                format!(
                    "{} {name} contained unexpected files in its directory ({file})",
                    capitalize(root.noun())
                ),
            )
            .with_context(ctx!(
                root.noun() => name,
                "file" => dir.join(&file).display().to_string(),
            ))
        })
        .collect();
    Outcome::from_diagnostics(diagnostics)
}

pub(super) fn required_files(ctx: &InstrumentContext, root: ConfigRoot, name: &str) -> Outcome {
    let dir = ctx.tree(root).config_dir(name);
    let contents = match fs_util::list_contents(&dir) {
        Ok(contents) => contents,
        Err(e) => return error_outcome(&e, root.noun(), name),
    };
    let diagnostics = REQUIRED_FILES
        .iter()
        .filter(|required| !contents.iter().any(|f| f == *required))
        .map(|required| {
            Diagnostic::error(
                codes::REQUIRED_FILE_MISSING,
                format!(
                    "{} {name} did not contain the required config file {required}",
                    capitalize(root.noun())
                ),
            )
            .with_context(ctx!(root.noun() => name, "missing" => *required))
        })
        .collect();
    Outcome::from_diagnostics(diagnostics)
}

/// Every file but the gateway PV list must parse as XML.
pub(super) fn well_formed_xml(ctx: &InstrumentContext, root: ConfigRoot, name: &str) -> Outcome {
    let dir = ctx.tree(root).config_dir(name);
    let contents = match fs_util::list_contents(&dir) {
        Ok(contents) => contents,
        Err(e) => return error_outcome(&e, root.noun(), name),
    };
    let mut diagnostics = Vec::new();
    for file in contents.iter().filter(|f| f.as_str() != BLOCK_GW_PVLIST) {
        let path = dir.join(file);
        let text = match fs_util::read_text(&path) {
            Ok(text) => text,
            Err(e) => {
                diagnostics.push(error_diagnostic(&e, None).with_context(ctx!(root.noun() => name)));
                continue;
            }
        };
        if let Err(e) = xml::parse(file, &text) {
            diagnostics.push(
                error_diagnostic(&e, Some(&text)).with_context(ctx!(
                    root.noun() => name,
                    "file" => path.display().to_string(),
                )),
            );
        }
    }
    Outcome::from_diagnostics(diagnostics)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
