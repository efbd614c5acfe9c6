//! Synoptic screen definitions under `configurations/synoptics`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::xml::{self, SYNOPTIC_NS};
use crate::{ConfigError, fs_util};

/// Component types never checked against the GUI catalogue.
pub const IGNORED_TYPES: [&str; 3] = ["UNKNOWN", "DAE", "BEAMSTOP"];

/// Component target never checked against the GUI catalogue.
pub const IGNORED_TARGET: &str = "NONE";

/// Whether a component type is exempt from catalogue checks.
pub fn type_should_be_ignored(kind: &str) -> bool {
    IGNORED_TYPES.contains(&kind)
}

/// Whether a component target is exempt from catalogue checks.
pub fn target_should_be_ignored(target: &str) -> bool {
    target == IGNORED_TARGET
}

/// The synoptics directory of one repository.
#[derive(Debug, Clone)]
pub struct Synoptics {
    repo: PathBuf,
}

impl Synoptics {
    /// Synoptics of the repository at `repo`.
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    /// `<repo>/configurations/synoptics`
    pub fn directory(&self) -> PathBuf {
        self.repo.join("configurations").join("synoptics")
    }

    /// `.xml` file names in the synoptics directory, sorted.
    ///
    /// Fails if the directory does not exist.
    pub fn list_synoptic_files(&self) -> Result<Vec<String>, ConfigError> {
        Ok(fs_util::list_contents(&self.directory())?
            .into_iter()
            .filter(|name| name.ends_with(".xml"))
            .collect())
    }

    /// Raw contents of one synoptic file.
    pub fn get_xml(&self, file: &str) -> Result<String, ConfigError> {
        fs_util::read_text(&self.directory().join(file))
    }
}

/// `(type, target)` of every component at any depth, in document order.
///
/// A component with a type but no target is structural and skipped. A target
/// without a type is an error.
pub fn get_type_target_pairs(text: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let doc = xml::parse("synoptic", text)?;
    let mut pairs = Vec::new();
    for component in xml::elements(doc.root(), SYNOPTIC_NS, "component") {
        let kind = xml::child_text(component, SYNOPTIC_NS, "type");
        let target = xml::child(component, SYNOPTIC_NS, "target")
            .and_then(|t| xml::child_text(t, SYNOPTIC_NS, "name"));
        match (kind, target) {
            (Some(kind), Some(target)) => pairs.push((kind.to_string(), target.to_string())),
            (Some(_), None) => continue,
            (None, target) => {
                return Err(ConfigError::IncompleteSynopticComponent {
                    name: xml::child_text(component, SYNOPTIC_NS, "name").map(str::to_string),
                    kind: None,
                    target: target.map(str::to_string),
                });
            }
        }
    }
    Ok(pairs)
}

/// Display name to address of every PV. Empty addresses map to `None`.
///
/// When two PVs share a display name the later one wins.
pub fn get_pv_addresses(text: &str) -> Result<BTreeMap<String, Option<String>>, ConfigError> {
    let doc = xml::parse("synoptic", text)?;
    let mut addresses = BTreeMap::new();
    for pv in xml::elements(doc.root(), SYNOPTIC_NS, "pv") {
        let name = xml::required_text(pv, SYNOPTIC_NS, "displayname", "pv")?;
        let address = xml::child_text(pv, SYNOPTIC_NS, "address")
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        addresses.insert(name.to_string(), address);
    }
    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument(components: &str) -> String {
        format!(
            r#"<?xml version="1.0" ?>
<instrument xmlns="{SYNOPTIC_NS}">
    <name>He_Level_Meter</name>
    <components>{components}</components>
</instrument>"#
        )
    }

    const HLG: &str = r#"
        <component>
            <name>Helium Level Meter</name>
            <type>HE_LEVEL_GAUGE</type>
            <target><name>HLG</name></target>
            <pvs/>
            <components/>
        </component>"#;

    #[test]
    fn flat_component() {
        assert_eq!(
            get_type_target_pairs(&instrument(HLG)).unwrap(),
            [("HE_LEVEL_GAUGE".to_string(), "HLG".to_string())]
        );
    }

    #[test]
    fn nested_components_in_pre_order() {
        let xml = instrument(
            r#"
            <component>
                <name>Helium Level Meter</name>
                <type>HE_LEVEL_GAUGE</type>
                <target><name>HLG</name></target>
                <components>
                    <component>
                        <name>Chopper</name>
                        <type>CHOPPER</type>
                        <target><name>Mk3 Chopper</name></target>
                    </component>
                </components>
            </component>
            <component>
                <name>Slits</name>
                <type>SLITS</type>
                <target><name>Jaws 1</name></target>
            </component>"#,
        );
        let pairs = get_type_target_pairs(&xml).unwrap();
        let pairs: Vec<(&str, &str)> = pairs.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        assert_eq!(
            pairs,
            [
                ("HE_LEVEL_GAUGE", "HLG"),
                ("CHOPPER", "Mk3 Chopper"),
                ("SLITS", "Jaws 1")
            ]
        );
    }

    #[test]
    fn type_without_target_is_skipped() {
        let xml = instrument(
            r#"<component><name>Label</name><type>UNKNOWN</type></component>"#,
        );
        assert!(get_type_target_pairs(&xml).unwrap().is_empty());
    }

    #[test]
    fn target_without_type_is_an_error_naming_the_component() {
        let xml = instrument(
            r#"<component><name>Chopper</name><target><name>Mk3 Chopper</name></target></component>"#,
        );
        let err = get_type_target_pairs(&xml).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Chopper"), "{msg}");
        assert!(msg.contains("Mk3 Chopper"), "{msg}");
        assert!(msg.contains("type: could not be extracted"), "{msg}");
    }

    #[test]
    fn pv_addresses_keep_empty_as_none_and_last_duplicate() {
        let xml = format!(
            r#"<instrument xmlns="{SYNOPTIC_NS}"><components><component>
                <name>Temp</name><type>EUROTHERM</type><target><name>NONE</name></target>
                <pvs>
                    <pv><displayname>Setpoint</displayname><address>IN:LARMOR:TEMP:SP</address><pvtype>LOCAL</pvtype></pv>
                    <pv><displayname>Readback</displayname><address/></pv>
                    <pv><displayname>Setpoint</displayname><address>IN:LARMOR:TEMP:SP2</address></pv>
                </pvs>
            </component></components></instrument>"#
        );
        let addresses = get_pv_addresses(&xml).unwrap();
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses["Readback"], None);
        assert_eq!(addresses["Setpoint"].as_deref(), Some("IN:LARMOR:TEMP:SP2"));
    }

    #[test]
    fn ignore_lists() {
        assert!(type_should_be_ignored("DAE"));
        assert!(!type_should_be_ignored("CHOPPER"));
        assert!(target_should_be_ignored("NONE"));
        assert!(!target_should_be_ignored("HLG"));
    }

    #[test]
    fn listing_requires_the_directory() {
        let repo = tempfile::tempdir().unwrap();
        let synoptics = Synoptics::new(repo.path());
        assert!(synoptics.list_synoptic_files().is_err());

        std::fs::create_dir_all(synoptics.directory()).unwrap();
        std::fs::write(synoptics.directory().join("b.xml"), "").unwrap();
        std::fs::write(synoptics.directory().join("a.xml"), "").unwrap();
        std::fs::write(synoptics.directory().join("notes.txt"), "").unwrap();
        assert_eq!(synoptics.list_synoptic_files().unwrap(), ["a.xml", "b.xml"]);
    }
}
