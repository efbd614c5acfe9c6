//! IOC membership, uniqueness, motor macro pairing and simulation mode.

use std::collections::{BTreeMap, BTreeSet};

use instcheck_diagnostics::{Diagnostic, codes};

use super::{InstrumentContext, Outcome, error_outcome};
use crate::ConfigError;
use crate::config::{BASE_COMPONENT, ConfigRoot, IocEntry, get_ioc_entries, get_iocs};

/// IOC families driven by the motor record.
pub const MOTOR_FAMILIES: [&str; 4] = ["GALIL", "MCLENNAN", "LINMOT", "SM300"];

/// Controller number macro of a motor IOC.
const CONTROLLER_MACRO: &str = "MTRCTRL";

/// Communication macros of a motor IOC; any one of them counts.
const COMMS_MACROS: [&str; 2] = ["PORT", "GALILADDR"];

/// `GALIL_01` to `SM300_10`.
pub fn motor_iocs() -> Vec<String> {
    MOTOR_FAMILIES
        .iter()
        .flat_map(|family| (1..=10).map(move |i| format!("{family}_{i:02}")))
        .collect()
}

/// True when exactly one of the controller number and a comms macro is defined.
pub(super) fn motor_macros_mismatch(macros: &BTreeMap<String, String>) -> bool {
    let controller = macros.contains_key(CONTROLLER_MACRO);
    let comms = COMMS_MACROS.iter().any(|m| macros.contains_key(*m));
    controller != comms
}

pub(super) fn entries(
    ctx: &InstrumentContext,
    root: ConfigRoot,
    name: &str,
) -> Result<Vec<IocEntry>, ConfigError> {
    get_ioc_entries(&ctx.tree(root).get_iocs_xml(name)?)
}

fn server_sets_unknown(ctx: &InstrumentContext) -> Option<Outcome> {
    (ctx.valid_iocs.is_none() || ctx.protected_iocs.is_none())
        .then(|| Outcome::skipped("couldn't retrieve valid/protected IOCs from the server"))
}

pub(super) fn valid_iocs(ctx: &InstrumentContext, root: ConfigRoot, name: &str) -> Outcome {
    if let Some(skip) = server_sets_unknown(ctx) {
        return skip;
    }
    let Some(valid) = &ctx.valid_iocs else {
        return Outcome::skipped("valid IOCs unknown");
    };
    let entries = match entries(ctx, root, name) {
        Ok(entries) => entries,
        Err(e) => return error_outcome(&e, root.noun(), name),
    };
    Outcome::from_diagnostics(
        entries
            .iter()
            .filter(|ioc| !valid.contains(&ioc.name))
            .map(|ioc| {
                Diagnostic::error(
                    codes::UNKNOWN_IOC,
                    format!(
                        "{} {name} contained an IOC that the server didn't know about ({})",
                        root.noun(),
                        ioc.name
                    ),
                )
                .with_context(ctx!(root.noun() => name, "ioc" => ioc.name.as_str()))
            })
            .collect(),
    )
}

pub(super) fn protected_iocs(ctx: &InstrumentContext, root: ConfigRoot, name: &str) -> Outcome {
    if let Some(skip) = server_sets_unknown(ctx) {
        return skip;
    }
    let Some(protected) = &ctx.protected_iocs else {
        return Outcome::skipped("protected IOCs unknown");
    };
    if root == ConfigRoot::Components && name == BASE_COMPONENT {
        return Outcome::Passed;
    }
    let entries = match entries(ctx, root, name) {
        Ok(entries) => entries,
        Err(e) => return error_outcome(&e, root.noun(), name),
    };
    Outcome::from_diagnostics(
        entries
            .iter()
            .filter(|ioc| protected.contains(&ioc.name))
            .map(|ioc| {
                Diagnostic::error(
                    codes::PROTECTED_IOC,
                    format!("{} {name} contained a protected IOC ({})", root.noun(), ioc.name),
                )
                .with_context(ctx!(root.noun() => name, "ioc" => ioc.name.as_str()))
            })
            .collect(),
    )
}

/// IOCs of a configuration followed by those of each active component.
fn iocs_with_components(ctx: &InstrumentContext, name: &str) -> Result<Vec<String>, ConfigError> {
    let configs = ctx.tree(ConfigRoot::Configurations);
    let components = ctx.tree(ConfigRoot::Components);
    let mut iocs = get_iocs(&configs.get_iocs_xml(name)?)?;
    for component in configs.get_active_components(name)? {
        iocs.extend(get_iocs(&components.get_iocs_xml(&component)?)?);
    }
    Ok(iocs)
}

pub(super) fn unique_iocs(ctx: &InstrumentContext, name: &str) -> Outcome {
    let iocs = match iocs_with_components(ctx, name) {
        Ok(iocs) => iocs,
        Err(e) => return error_outcome(&e, "configuration", name),
    };
    let mut seen = BTreeSet::new();
    let duplicates: BTreeSet<&str> = iocs
        .iter()
        .filter(|ioc| !seen.insert(ioc.as_str()))
        .map(String::as_str)
        .collect();
    Outcome::from_diagnostics(
        duplicates
            .into_iter()
            .map(|ioc| {
                Diagnostic::error(
                    codes::DUPLICATE_IOC,
                    format!("configuration {name} contained multiple instances of IOC {ioc}"),
                )
                .with_context(ctx!("configuration" => name, "ioc" => ioc))
            })
            .collect(),
    )
}

pub(super) fn motor_macros(ctx: &InstrumentContext, root: ConfigRoot, name: &str) -> Outcome {
    let entries = match entries(ctx, root, name) {
        Ok(entries) => entries,
        Err(e) => return error_outcome(&e, root.noun(), name),
    };
    let motors = motor_iocs();
    Outcome::from_diagnostics(
        motors
            .iter()
            .filter_map(|motor| entries.iter().find(|e| &e.name == motor))
            .filter(|entry| motor_macros_mismatch(&entry.macros))
            .map(|entry| {
                Diagnostic::error(
                    codes::MOTOR_MACROS_MISMATCH,
                    format!(
                        "only one of comms setting and motor controller number was defined in {} in {} {name}",
                        entry.name,
                        root.noun()
                    ),
                )
                .with_context(ctx!(root.noun() => name, "ioc" => entry.name.as_str()))
            })
            .collect(),
    )
}

pub(super) fn sim_mode(ctx: &InstrumentContext, root: ConfigRoot, name: &str) -> Outcome {
    let entries = match entries(ctx, root, name) {
        Ok(entries) => entries,
        Err(e) => return error_outcome(&e, root.noun(), name),
    };
    let mut diagnostics = Vec::new();
    for entry in entries.iter().filter(|e| e.in_sim_mode()) {
        if ctx.settings.sim_mode_exempt(ctx.name(), name, &entry.name) {
            tracing::info!(
                instrument = ctx.name(),
                ioc = %entry.name,
                "ignoring simulation mode of exempt IOC in {} {name}",
                root.noun()
            );
            continue;
        }
        diagnostics.push(
            Diagnostic::error(
                codes::IOC_IN_SIM_MODE,
                format!("simulation mode is active on {} in {} {name}", entry.name, root.noun()),
            )
            .with_context(ctx!(
                root.noun() => name,
                "ioc" => entry.name.as_str(),
                "simlevel" => entry.simlevel.as_deref().unwrap_or_default(),
            )),
        );
    }
    Outcome::from_diagnostics(diagnostics)
}
