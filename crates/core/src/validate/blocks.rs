//! Block names and block PVs.

use std::collections::{BTreeMap, BTreeSet};

use instcheck_diagnostics::{Diagnostic, Severity, codes};

use super::{InstrumentContext, Outcome, error_diagnostic, error_outcome};
use crate::ConfigError;
use crate::config::ConfigRoot;

/// Blocks of a configuration followed by those of each active component.
fn blocks_with_components(ctx: &InstrumentContext, name: &str) -> Result<Vec<String>, ConfigError> {
    let configs = ctx.tree(ConfigRoot::Configurations);
    let components = ctx.tree(ConfigRoot::Components);
    let mut blocks = configs.get_blocks(name)?;
    for component in configs.get_active_components(name)? {
        blocks.extend(components.get_blocks(&component)?);
    }
    Ok(blocks)
}

/// Names that repeat exactly, and groups of distinct names equal ignoring case.
fn duplicate_blocks(blocks: &[String]) -> (BTreeSet<&str>, Vec<BTreeSet<&str>>) {
    let mut seen = BTreeSet::new();
    let exact = blocks
        .iter()
        .filter(|b| !seen.insert(b.as_str()))
        .map(String::as_str)
        .collect();
    let mut by_upper: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for block in blocks {
        by_upper
            .entry(block.to_uppercase())
            .or_default()
            .insert(block.as_str());
    }
    let ignoring_case = by_upper
        .into_values()
        .filter(|variants| variants.len() > 1)
        .collect();
    (exact, ignoring_case)
}

pub(super) fn unique_blocks(ctx: &InstrumentContext, name: &str) -> Outcome {
    let blocks = match blocks_with_components(ctx, name) {
        Ok(blocks) => blocks,
        Err(e) => return error_outcome(&e, "configuration", name),
    };
    let (exact, ignoring_case) = duplicate_blocks(&blocks);
    let mut diagnostics: Vec<Diagnostic> = exact
        .into_iter()
        .map(|block| {
            Diagnostic::error(
                codes::DUPLICATE_BLOCK,
                format!("duplicate block found in {name}: {block}"),
            )
            .with_context(ctx!("configuration" => name, "block" => block))
        })
        .collect();
    diagnostics.extend(ignoring_case.into_iter().map(|variants| {
        let listed = variants.into_iter().collect::<Vec<_>>().join(", ");
        Diagnostic::error(
            codes::DUPLICATE_BLOCK_IGNORING_CASE,
            format!("case insensitive duplicate blocks found in {name}: {listed}"),
        )
        .with_context(ctx!("configuration" => name, "blocks" => listed))
    }));
    Outcome::from_diagnostics(diagnostics)
}

pub(super) fn block_name_length(ctx: &InstrumentContext, root: ConfigRoot, name: &str) -> Outcome {
    if ctx
        .settings
        .block_name_length_exempt
        .iter()
        .any(|i| i == ctx.name())
    {
        return Outcome::skipped(format!("block name length is not enforced on {}", ctx.name()));
    }
    let blocks = match ctx.tree(root).get_blocks(name) {
        Ok(blocks) => blocks,
        Err(e) => return error_outcome(&e, root.noun(), name),
    };
    let max = ctx.settings.block_name_max_len;
    Outcome::from_diagnostics(
        blocks
            .iter()
            .filter(|block| block.chars().count() > max)
            .map(|block| {
                Diagnostic::error(
                    codes::BLOCK_NAME_TOO_LONG,
                    format!(
                        "block {block} in {} {name} is {} characters long; the limit is {max}",
                        root.noun(),
                        block.chars().count()
                    ),
                )
                .with_context(ctx!(root.noun() => name, "block" => block.as_str()))
            })
            .collect(),
    )
}

/// Warn about block PVs no interest tier mentions.
///
/// Never fails: read errors are reported as warnings.
pub(super) fn interesting_block_pvs(ctx: &InstrumentContext, root: ConfigRoot) -> Outcome {
    if ctx.interesting_pvs.is_empty() {
        return Outcome::skipped("no interesting PVs known; instrument is probably off");
    }
    let pvs = match ctx.tree(root).block_pvs_for_all(&ctx.instrument.pv_prefix) {
        Ok(pvs) => pvs,
        Err(e) => {
            let mut diag = error_diagnostic(&e, None);
            diag.severity = Severity::Warn;
            return Outcome::Warned(vec![diag]);
        }
    };
    let missing: Vec<&str> = pvs
        .iter()
        .filter(|pv| !ctx.interesting_pvs.contains(*pv))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        return Outcome::Passed;
    }
    tracing::info!(
        instrument = ctx.name(),
        root = root.dir_name(),
        count = missing.len(),
        "block PVs outside the interesting set"
    );
    Outcome::Warned(vec![
        Diagnostic::from_code(
            codes::NON_INTERESTING_BLOCK_PVS,
            format!(
                "{} block PVs in {} are not marked interesting: {}",
                missing.len(),
                root.dir_name(),
                missing.join(", ")
            ),
        )
        .with_context(ctx!(
            "root" => root.dir_name(),
            "count" => missing.len().to_string(),
        )),
    ])
}
