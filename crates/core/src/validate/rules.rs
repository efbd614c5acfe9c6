//! Macro rules: for a given IOC, at least one macro whose name matches a
//! pattern must be set, and at least one of those must carry a value of the
//! expected shape.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use instcheck_diagnostics::{Diagnostic, codes};
use regex::Regex;

use super::{InstrumentContext, Outcome, error_outcome};
use crate::config::{ConfigRoot, check_if_macros_match_pattern, get_ioc_entries};
use crate::version::is_version_older;

/// One row of the rule table.
#[derive(Debug)]
pub struct MacroRule {
    /// IOC the rule applies to, e.g. `EUROTHRM_03`.
    pub ioc: String,
    /// Human name of the macro family, used in messages.
    pub macro_name: &'static str,
    /// Pattern a macro name must match.
    pub name_pattern: Regex,
    /// Pattern at least one matching macro's value must match.
    pub value_pattern: Regex,
    /// Oldest repository version the rule applies to.
    pub min_version: Option<&'static str>,
}

fn family(
    prefix: &str,
    count: u32,
    macro_name: &'static str,
    name_pattern: &str,
    value_pattern: &str,
    min_version: Option<&'static str>,
) -> impl Iterator<Item = MacroRule> {
    let name_pattern = Regex::new(name_pattern).expect("static regex must compile");
    let value_pattern = Regex::new(value_pattern).expect("static regex must compile");
    let prefix = prefix.to_string();
    (1..=count).map(move |i| MacroRule {
        ioc: format!("{prefix}_{i:02}"),
        macro_name,
        name_pattern: name_pattern.clone(),
        value_pattern: value_pattern.clone(),
        min_version,
    })
}

/// The rule table, one row per IOC.
pub static MACRO_RULES: LazyLock<Vec<MacroRule>> = LazyLock::new(|| {
    family("MCLEN", 3, "AXIS", "^AXIS[1-8]$", "^yes$", None)
        .chain(family("EUROTHRM", 6, "ADDRESS", "^ADDR_([1-9]|10)$", "^[0-9]+$", None))
        .chain(family("LINMOT", 3, "AXIS", "^AXIS[1-8]$", "^yes$", None))
        .chain(family(
            "KHLY2001",
            1,
            "CHANNEL ACTIVATED",
            "^ACTIVATE_CHAN_0[1-9]$",
            "^1$",
            None,
        ))
        .chain(family("NWPRTXPS", 1, "AXIS", "^AXIS[1-4]_ID$", "^.*[.].*$", None))
        .chain(family(
            "MERCURY",
            2,
            "TEMPERATURE/LEVEL/PRESSURE",
            "^(TEMP_[1-4]|LEVEL_[1-2]|PRESSURE_[1-2])$",
            "^.*[.].*$",
            Some("11.0.0"),
        ))
        .collect()
});

/// Apply `rule` to one directory.
///
/// Passes when the IOC is absent. Macros come from the directory's
/// `iocs.xml` and from globals lines prefixed with the IOC name.
pub(super) fn apply(ctx: &InstrumentContext, root: ConfigRoot, name: &str, rule: &MacroRule) -> Outcome {
    if let Some(min) = rule.min_version {
        match ctx.version_file().read_optional() {
            None => {
                return Outcome::skipped(format!(
                    "repository version unknown; rule for {} needs {min} or later",
                    rule.ioc
                ));
            }
            Some(version) if is_version_older(&version, min) => {
                return Outcome::skipped(format!(
                    "rule for {} applies from {min}; repository is at {version}",
                    rule.ioc
                ));
            }
            Some(_) => {}
        }
    }

    let text = match ctx.tree(root).get_iocs_xml(name) {
        Ok(text) => text,
        Err(e) => return error_outcome(&e, root.noun(), name),
    };
    let entries = match get_ioc_entries(&text) {
        Ok(entries) => entries,
        Err(e) => return error_outcome(&e, root.noun(), name),
    };
    let Some(entry) = entries.iter().find(|e| e.name == rule.ioc) else {
        return Outcome::Passed;
    };

    let local = check_if_macros_match_pattern(&entry.macros, &rule.name_pattern, false);
    let global = check_if_macros_match_pattern(
        &ctx.globals().get_macros(&rule.ioc),
        &rule.name_pattern,
        false,
    );
    let context = || -> BTreeMap<String, String> {
        ctx!(root.noun() => name, "ioc" => rule.ioc.as_str(), "macro" => rule.macro_name)
    };
    if local.is_empty() && global.is_empty() {
        return Outcome::failed(
            Diagnostic::error(
                codes::MACRO_NOT_DEFINED,
                format!(
                    "no {} macros found in {} in {} {name}",
                    rule.macro_name,
                    rule.ioc,
                    root.noun()
                ),
            )
            .with_context(context()),
        );
    }

    let local = check_if_macros_match_pattern(&local, &rule.value_pattern, true);
    let global = check_if_macros_match_pattern(&global, &rule.value_pattern, true);
    if local.is_empty() && global.is_empty() {
        return Outcome::failed(
            Diagnostic::error(
                codes::MACRO_VALUE_MISMATCH,
                format!(
                    "at least one {} macro in {} not set in {} {name}",
                    rule.macro_name,
                    rule.ioc,
                    root.noun()
                ),
            )
            .with_context(context()),
        );
    }
    Outcome::Passed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_one_row_per_ioc() {
        assert_eq!(MACRO_RULES.len(), 3 + 6 + 3 + 1 + 1 + 2);
        let iocs: Vec<&str> = MACRO_RULES.iter().map(|r| r.ioc.as_str()).collect();
        assert_eq!(iocs[0], "MCLEN_01");
        assert!(iocs.contains(&"EUROTHRM_06"));
        assert!(iocs.contains(&"KHLY2001_01"));
        assert_eq!(iocs.last(), Some(&"MERCURY_02"));
    }

    #[test]
    fn only_mercury_is_version_gated() {
        for rule in MACRO_RULES.iter() {
            assert_eq!(rule.min_version.is_some(), rule.ioc.starts_with("MERCURY"));
        }
    }

    #[test]
    fn eurotherm_address_patterns() {
        let rule = MACRO_RULES
            .iter()
            .find(|r| r.ioc == "EUROTHRM_01")
            .unwrap();
        assert!(rule.name_pattern.is_match("ADDR_10"));
        assert!(!rule.name_pattern.is_match("ADDR_11"));
        assert!(rule.value_pattern.is_match("42"));
        assert!(!rule.value_pattern.is_match("4a"));
    }
}
