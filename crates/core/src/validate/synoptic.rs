use std::collections::BTreeMap;

use instcheck_diagnostics::{Diagnostic, codes};

use super::{InstrumentContext, Outcome, error_diagnostic};
use crate::gui::OpiInfo;
use crate::synoptic::{get_pv_addresses, get_type_target_pairs, target_should_be_ignored, type_should_be_ignored};

fn gui_release_unknown(ctx: &InstrumentContext) -> Option<Outcome> {
    (!ctx.version_file().exists())
        .then(|| Outcome::skipped("can't determine which version of the GUI is being used"))
}

fn parse_failure(ctx: &InstrumentContext, file: &str, err: &crate::ConfigError, text: Option<&str>) -> Outcome {
    let path = ctx.synoptics().directory().join(file);
    Outcome::failed(
        error_diagnostic(err, text)
            .with_context(ctx!("synoptic" => file, "file" => path.display().to_string())),
    )
}

/// Type/target pairs of a synoptic and the GUI catalogue, or the outcome to report.
fn pairs_and_catalogue(ctx: &InstrumentContext, file: &str) -> Result<(Vec<(String, String)>, OpiInfo), Outcome> {
    if let Some(skip) = gui_release_unknown(ctx) {
        return Err(skip);
    }
    let Some(gui_repo) = &ctx.gui_repo else {
        return Err(Outcome::skipped("no GUI repository to read opi_info.xml from"));
    };
    let info = OpiInfo::load(gui_repo, &ctx.settings.gui_opis_package)
        .map_err(|e| Outcome::failed(error_diagnostic(&e, None)))?;
    let text = ctx
        .synoptics()
        .get_xml(file)
        .map_err(|e| parse_failure(ctx, file, &e, None))?;
    let pairs = get_type_target_pairs(&text).map_err(|e| parse_failure(ctx, file, &e, Some(&text)))?;
    Ok((pairs, info))
}

pub(super) fn targets(ctx: &InstrumentContext, file: &str) -> Outcome {
    let (pairs, info) = match pairs_and_catalogue(ctx, file) {
        Ok(found) => found,
        Err(outcome) => return outcome,
    };
    Outcome::from_diagnostics(
        pairs
            .iter()
            .filter(|(_, target)| !target_should_be_ignored(target))
            .filter(|(_, target)| !info.valid_targets().contains(target))
            .map(|(_, target)| {
                Diagnostic::error(
                    codes::SYNOPTIC_UNKNOWN_TARGET,
                    format!("in synoptic {file}, component target '{target}' was unknown"),
                )
                .with_context(ctx!("synoptic" => file, "target" => target.as_str()))
            })
            .collect(),
    )
}

pub(super) fn types(ctx: &InstrumentContext, file: &str) -> Outcome {
    let (pairs, info) = match pairs_and_catalogue(ctx, file) {
        Ok(found) => found,
        Err(outcome) => return outcome,
    };
    Outcome::from_diagnostics(
        pairs
            .iter()
            .filter(|(kind, _)| !type_should_be_ignored(kind))
            .filter(|(kind, _)| !info.valid_types().contains(kind))
            .map(|(kind, _)| {
                Diagnostic::error(
                    codes::SYNOPTIC_UNKNOWN_TYPE,
                    format!("in synoptic {file}, component type '{kind}' was unknown"),
                )
                .with_context(ctx!("synoptic" => file, "type" => kind.as_str()))
            })
            .collect(),
    )
}

pub(super) fn pv_addresses(ctx: &InstrumentContext, file: &str) -> Outcome {
    if let Some(skip) = gui_release_unknown(ctx) {
        return skip;
    }
    let text = match ctx.synoptics().get_xml(file) {
        Ok(text) => text,
        Err(e) => return parse_failure(ctx, file, &e, None),
    };
    let addresses = match get_pv_addresses(&text) {
        Ok(addresses) => addresses,
        Err(e) => return parse_failure(ctx, file, &e, Some(&text)),
    };
    let invalid: Vec<&str> = addresses
        .iter()
        .filter(|(_, address)| address.is_none())
        .map(|(name, _)| name.as_str())
        .collect();
    if invalid.is_empty() {
        return Outcome::Passed;
    }
    Outcome::failed(
        Diagnostic::error(
            codes::SYNOPTIC_EMPTY_ADDRESS,
            format!(
                "synoptic {file} contains the following PV names with no associated address:\n    {}",
                invalid.join("\n    ")
            ),
        )
        .with_context(ctx!("synoptic" => file, "pvs" => invalid.join(", "))),
    )
}
