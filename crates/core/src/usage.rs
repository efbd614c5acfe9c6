//! Which IOCs and device screens each instrument's configurations use.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use instcheck_git::GitRepo;
use instcheck_pv::InstrumentRecord;
use serde::Serialize;

use crate::ConfigError;
use crate::config::{ConfigTree, get_device_screens, get_iocs};
use crate::settings::Settings;

/// IOCs and device screens found on one instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstrumentUsage {
    /// Union of the IOCs of every configuration and component.
    pub iocs: BTreeSet<String>,
    /// Device screen keys; empty when the repository has none.
    pub device_screens: BTreeSet<String>,
}

impl InstrumentUsage {
    /// IOCs whose name starts with `prefix`, ignoring case.
    pub fn iocs_matching<'a>(&'a self, prefix: &str) -> impl Iterator<Item = &'a str> {
        let prefix = prefix.to_lowercase();
        self.iocs
            .iter()
            .filter(move |ioc| ioc.to_lowercase().starts_with(&prefix))
            .map(String::as_str)
    }
}

/// Collect usage from the current checkout of `config_repo`.
pub fn collect(config_repo: &Path) -> Result<InstrumentUsage, ConfigError> {
    let mut usage = InstrumentUsage::default();
    for tree in [ConfigTree::configurations(config_repo), ConfigTree::components(config_repo)] {
        for name in tree.list_configurations()? {
            usage.iocs.extend(get_iocs(&tree.get_iocs_xml(&name)?)?);
        }
    }
    let devices = ConfigTree::devices(config_repo);
    usage.device_screens = match devices
        .get_device_screens_xml()
        .and_then(|text| get_device_screens(&text))
    {
        Ok(screens) => screens,
        Err(e) => {
            tracing::debug!(error = %e, "no readable device screens");
            BTreeSet::new()
        }
    };
    Ok(usage)
}

/// Check out each instrument's branch in turn and collect its usage.
///
/// Instruments whose branch cannot be checked out or whose configurations
/// cannot be read are logged and left out.
pub fn survey(
    config_repo: &Path,
    instruments: &[InstrumentRecord],
    settings: &Settings,
) -> BTreeMap<String, InstrumentUsage> {
    let repo = GitRepo::new(config_repo).with_timeout(settings.git_timeout());
    let mut found = BTreeMap::new();
    for instrument in instruments {
        if !repo.update_branch(&instrument.host_name, false) {
            tracing::warn!(instrument = %instrument.name, "branch checkout failed; not surveyed");
            continue;
        }
        match collect(config_repo) {
            Ok(usage) => {
                tracing::info!(
                    instrument = %instrument.name,
                    iocs = usage.iocs.len(),
                    device_screens = usage.device_screens.len(),
                    "surveyed"
                );
                found.insert(instrument.name.clone(), usage);
            }
            Err(e) => tracing::warn!(instrument = %instrument.name, error = %e, "survey failed"),
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn iocs_xml(names: &[&str]) -> String {
        let body: String = names
            .iter()
            .map(|n| format!(r#"<ioc name="{n}" autostart="true" restart="false" simlevel="none"/>"#))
            .collect();
        format!(r#"<iocs xmlns="http://epics.isis.rl.ac.uk/schema/iocs/1.0">{body}</iocs>"#)
    }

    fn write(repo: &Path, rel: &str, text: &str) {
        let path = repo.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn union_over_configurations_and_components() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path();
        write(repo, "configurations/configurations/a/iocs.xml", &iocs_xml(&["GALIL_01", "EUROTHRM_01"]));
        write(repo, "configurations/configurations/b/iocs.xml", &iocs_xml(&["GALIL_01"]));
        write(repo, "configurations/components/_base/iocs.xml", &iocs_xml(&["INSTETC_01"]));

        let usage = collect(repo).unwrap();
        assert_eq!(
            usage.iocs.iter().map(String::as_str).collect::<Vec<_>>(),
            ["EUROTHRM_01", "GALIL_01", "INSTETC_01"]
        );
        assert!(usage.device_screens.is_empty());
        assert_eq!(usage.iocs_matching("galil").collect::<Vec<_>>(), ["GALIL_01"]);
    }

    #[test]
    fn device_screens_are_read_when_present() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "configurations/devices/screens.xml",
            r#"<devices xmlns="http://epics.isis.rl.ac.uk/schema/screens/1.0/">
                <device><key>Fermi chopper</key></device>
                <device><key>Jaws</key></device>
            </devices>"#,
        );
        let usage = collect(dir.path()).unwrap();
        assert_eq!(usage.device_screens.len(), 2);
        assert!(usage.device_screens.contains("Jaws"));
    }

    #[test]
    fn unreadable_iocs_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("configurations/configurations/broken")).unwrap();
        assert!(collect(dir.path()).is_err());
    }
}
