//! Parsers for configuration, component and device directories.
//!
//! One [`ConfigTree`] type serves all three roots; the root only changes
//! which subdirectory of `<repo>/configurations` is read.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;

use crate::xml::{self, BLOCKS_NS, COMPONENTS_NS, DEVICES_NS, IOCS_NS};
use crate::{ConfigError, fs_util};

/// Files every configuration or component directory must contain.
pub const REQUIRED_FILES: [&str; 5] = [
    "blocks.xml",
    "components.xml",
    "groups.xml",
    "iocs.xml",
    "meta.xml",
];

/// The gateway PV list: allowed in a directory but not XML.
pub const BLOCK_GW_PVLIST: &str = "gwblock.pvlist";

/// Files a configuration or component directory may contain.
pub const ALLOWED_FILES: [&str; 8] = [
    "blocks.xml",
    "components.xml",
    "groups.xml",
    "iocs.xml",
    "meta.xml",
    "screens.xml",
    "block_config.xml",
    BLOCK_GW_PVLIST,
];

/// The component every instrument loads; it may hold protected IOCs.
pub const BASE_COMPONENT: &str = "_base";

/// Which subdirectory of `<repo>/configurations` a [`ConfigTree`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigRoot {
    /// `configurations/configurations`
    Configurations,
    /// `configurations/components`
    Components,
    /// `configurations/devices`
    Devices,
}

impl ConfigRoot {
    /// Directory name below `<repo>/configurations`.
    pub fn dir_name(self) -> &'static str {
        match self {
            ConfigRoot::Configurations => "configurations",
            ConfigRoot::Components => "components",
            ConfigRoot::Devices => "devices",
        }
    }

    /// Singular noun used in messages.
    pub fn noun(self) -> &'static str {
        match self {
            ConfigRoot::Configurations => "configuration",
            ConfigRoot::Components => "component",
            ConfigRoot::Devices => "device",
        }
    }
}

/// One `<ioc>` element of `iocs.xml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IocEntry {
    /// IOC name, e.g. `GALIL_01`.
    pub name: String,
    /// Declared macros, name to value.
    pub macros: BTreeMap<String, String>,
    /// The `simlevel` attribute, if present.
    pub simlevel: Option<String>,
}

impl IocEntry {
    /// True when `simlevel` is present and not `none`.
    pub fn in_sim_mode(&self) -> bool {
        self.simlevel.as_deref().is_some_and(|level| level != "none")
    }
}

/// One `<block>` element of `blocks.xml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    /// Block name as shown to users.
    pub name: String,
    /// The PV (optionally with a field) the block reads.
    pub read_pv: Option<String>,
    /// True when `<local>` is `True`; the PV is then relative to the instrument prefix.
    pub local: bool,
}

impl Block {
    /// The block's PV without its field suffix, prefixed when local.
    pub fn pv(&self, pv_prefix: &str) -> Result<String, ConfigError> {
        let read_pv = self.read_pv.as_deref().ok_or(ConfigError::MissingElement {
            element: "read_pv",
            parent: "block",
        })?;
        let pv = strip_field(read_pv);
        Ok(if self.local {
            format!("{pv_prefix}{pv}")
        } else {
            pv.to_string()
        })
    }
}

fn strip_field(pv: &str) -> &str {
    pv.split_once('.').map_or(pv, |(name, _)| name)
}

/// A directory of configurations, components or devices in a repository.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    repo: PathBuf,
    root: ConfigRoot,
}

impl ConfigTree {
    /// A tree rooted at `<repo>/configurations/<root>`.
    pub fn new(repo: impl Into<PathBuf>, root: ConfigRoot) -> Self {
        Self {
            repo: repo.into(),
            root,
        }
    }

    /// Shorthand for [`ConfigRoot::Configurations`].
    pub fn configurations(repo: impl Into<PathBuf>) -> Self {
        Self::new(repo, ConfigRoot::Configurations)
    }

    /// Shorthand for [`ConfigRoot::Components`].
    pub fn components(repo: impl Into<PathBuf>) -> Self {
        Self::new(repo, ConfigRoot::Components)
    }

    /// Shorthand for [`ConfigRoot::Devices`].
    pub fn devices(repo: impl Into<PathBuf>) -> Self {
        Self::new(repo, ConfigRoot::Devices)
    }

    /// Which root this tree reads.
    pub fn root(&self) -> ConfigRoot {
        self.root
    }

    /// The directory holding one subdirectory per configuration.
    pub fn directory(&self) -> PathBuf {
        self.repo.join("configurations").join(self.root.dir_name())
    }

    /// Directory of the named configuration.
    pub fn config_dir(&self, name: &str) -> PathBuf {
        self.directory().join(name)
    }

    /// Configuration names, sorted. A missing root yields an empty list.
    pub fn list_configurations(&self) -> Result<Vec<String>, ConfigError> {
        fs_util::list_directories(&self.directory())
    }

    /// Raw contents of `file` in configuration `name`.
    pub fn read_file(&self, name: &str, file: &str) -> Result<String, ConfigError> {
        fs_util::read_text(&self.config_dir(name).join(file))
    }

    /// Raw `iocs.xml` of a configuration.
    pub fn get_iocs_xml(&self, name: &str) -> Result<String, ConfigError> {
        self.read_file(name, "iocs.xml")
    }

    /// Raw `blocks.xml` of a configuration.
    pub fn get_blocks_xml(&self, name: &str) -> Result<String, ConfigError> {
        self.read_file(name, "blocks.xml")
    }

    /// Raw `components.xml` of a configuration.
    pub fn get_components_xml(&self, name: &str) -> Result<String, ConfigError> {
        self.read_file(name, "components.xml")
    }

    /// Raw `screens.xml` directly under the tree's directory.
    ///
    /// Only meaningful for [`ConfigRoot::Devices`].
    pub fn get_device_screens_xml(&self) -> Result<String, ConfigError> {
        fs_util::read_text(&self.directory().join("screens.xml"))
    }

    /// Components a configuration loads, in document order.
    pub fn get_active_components(&self, name: &str) -> Result<Vec<String>, ConfigError> {
        get_active_components_from_xml(&self.get_components_xml(name)?)
    }

    /// Every block of a configuration, in document order.
    pub fn get_block_entries(&self, name: &str) -> Result<Vec<Block>, ConfigError> {
        get_block_entries(&self.get_blocks_xml(name)?)
    }

    /// Block names of a configuration, in document order.
    pub fn get_blocks(&self, name: &str) -> Result<Vec<String>, ConfigError> {
        Ok(self
            .get_block_entries(name)?
            .into_iter()
            .map(|b| b.name)
            .collect())
    }

    /// PVs the blocks of a configuration point at.
    pub fn get_block_pvs(&self, name: &str, pv_prefix: &str) -> Result<Vec<String>, ConfigError> {
        get_block_pvs_from_xml(pv_prefix, &self.get_blocks_xml(name)?)
    }

    /// Block PVs over every configuration in this tree.
    pub fn block_pvs_for_all(&self, pv_prefix: &str) -> Result<BTreeSet<String>, ConfigError> {
        let mut pvs = BTreeSet::new();
        for name in self.list_configurations()? {
            pvs.extend(self.get_block_pvs(&name, pv_prefix)?);
        }
        Ok(pvs)
    }

    /// Repository the tree belongs to.
    pub fn repo(&self) -> &Path {
        &self.repo
    }
}

// ── IOC documents ───────────────────────────────────────────────────────────

/// Every `<ioc>` of an `iocs.xml` document, in document order.
pub fn get_ioc_entries(text: &str) -> Result<Vec<IocEntry>, ConfigError> {
    let doc = xml::parse("iocs.xml", text)?;
    xml::elements(doc.root(), IOCS_NS, "ioc")
        .map(|ioc| -> Result<IocEntry, ConfigError> {
            let macros = xml::elements(ioc, IOCS_NS, "macro")
                .map(|m| -> Result<(String, String), ConfigError> {
                    Ok((
                        xml::required_attr(m, "name", "macro")?.to_string(),
                        xml::required_attr(m, "value", "macro")?.to_string(),
                    ))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            Ok(IocEntry {
                name: xml::required_attr(ioc, "name", "ioc")?.to_string(),
                macros,
                simlevel: ioc.attribute("simlevel").map(str::to_string),
            })
        })
        .collect()
}

/// IOC names in document order, duplicates preserved.
pub fn get_iocs(text: &str) -> Result<Vec<String>, ConfigError> {
    Ok(get_ioc_entries(text)?.into_iter().map(|e| e.name).collect())
}

/// Macros declared for `ioc`; empty when the IOC is absent.
pub fn get_ioc_macros(text: &str, ioc: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    Ok(get_ioc_entries(text)?
        .into_iter()
        .find(|e| e.name == ioc)
        .map(|e| e.macros)
        .unwrap_or_default())
}

/// Whether `ioc` is in simulation mode. Fails if the IOC is absent.
pub fn get_ioc_in_sim_mode(text: &str, ioc: &str) -> Result<bool, ConfigError> {
    get_ioc_entries(text)?
        .into_iter()
        .find(|e| e.name == ioc)
        .map(|e| e.in_sim_mode())
        .ok_or_else(|| ConfigError::IocNotFound {
            ioc: ioc.to_string(),
        })
}

/// Macros whose name (or value, when `search_for_value`) contains a match for `pattern`.
pub fn check_if_macros_match_pattern(
    macros: &BTreeMap<String, String>,
    pattern: &Regex,
    search_for_value: bool,
) -> BTreeMap<String, String> {
    macros
        .iter()
        .filter(|(name, value)| {
            pattern.is_match(if search_for_value { value } else { name })
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

// ── Component and block documents ───────────────────────────────────────────

/// `name` attributes of every `<component>` in a `components.xml` document.
pub fn get_active_components_from_xml(text: &str) -> Result<Vec<String>, ConfigError> {
    let doc = xml::parse("components.xml", text)?;
    xml::elements(doc.root(), COMPONENTS_NS, "component")
        .map(|c| xml::required_attr(c, "name", "component").map(str::to_string))
        .collect()
}

/// Every `<block>` of a `blocks.xml` document, in document order.
pub fn get_block_entries(text: &str) -> Result<Vec<Block>, ConfigError> {
    let doc = xml::parse("blocks.xml", text)?;
    xml::elements(doc.root(), BLOCKS_NS, "block")
        .map(|block| -> Result<Block, ConfigError> {
            Ok(Block {
                name: xml::required_text(block, BLOCKS_NS, "name", "block")?.to_string(),
                read_pv: xml::child_text(block, BLOCKS_NS, "read_pv").map(str::to_string),
                local: xml::child_text(block, BLOCKS_NS, "local") == Some("True"),
            })
        })
        .collect()
}

/// PVs the blocks point at, field suffix removed, local PVs prefixed.
pub fn get_block_pvs_from_xml(pv_prefix: &str, text: &str) -> Result<Vec<String>, ConfigError> {
    get_block_entries(text)?
        .iter()
        .map(|b| b.pv(pv_prefix))
        .collect()
}

// ── Device screens ──────────────────────────────────────────────────────────

/// The `<key>` of every device in a device screens document.
pub fn get_device_screens(text: &str) -> Result<BTreeSet<String>, ConfigError> {
    let doc = xml::parse("screens.xml", text)?;
    doc.root_element()
        .children()
        .filter(|n| n.is_element())
        .map(|device| xml::required_text(device, DEVICES_NS, "key", "device").map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iocs_doc(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" ?>
<iocs xmlns="{IOCS_NS}" xmlns:ioc="{IOCS_NS}" xmlns:xi="http://www.w3.org/2001/XInclude">{body}</iocs>"#
        )
    }

    const TWO_IOCS: &str = r#"
        <ioc autostart="true" name="SIMPLE_01" restart="false" simlevel="none">
            <macros>
                <macro name="PORT" value="COM1"/>
                <macro name="BAUD" value="9600"/>
            </macros>
            <pvs/><pvsets/>
        </ioc>
        <ioc autostart="true" name="SIMPLE_02" restart="false" simlevel="devsim">
            <macros>
                <macro name="PORT" value="COM2"/>
                <macro name="BAUD" value="19200"/>
            </macros>
            <pvs/><pvsets/>
        </ioc>"#;

    #[test]
    fn iocs_in_document_order() {
        assert!(get_iocs(&iocs_doc("")).unwrap().is_empty());
        assert_eq!(
            get_iocs(&iocs_doc(r#"<ioc name="SIMPLE" simlevel="none"/>"#)).unwrap(),
            ["SIMPLE"]
        );
        assert_eq!(get_iocs(&iocs_doc(TWO_IOCS)).unwrap(), ["SIMPLE_01", "SIMPLE_02"]);
    }

    #[test]
    fn duplicate_iocs_are_preserved() {
        let doc = iocs_doc(r#"<ioc name="A"/><ioc name="B"/><ioc name="A"/>"#);
        assert_eq!(get_iocs(&doc).unwrap(), ["A", "B", "A"]);
    }

    #[test]
    fn macros_of_each_ioc_are_kept_apart() {
        let doc = iocs_doc(TWO_IOCS);
        let first = get_ioc_macros(&doc, "SIMPLE_01").unwrap();
        let second = get_ioc_macros(&doc, "SIMPLE_02").unwrap();
        assert_eq!(
            first,
            BTreeMap::from([("BAUD".into(), "9600".into()), ("PORT".into(), "COM1".into())])
        );
        assert_eq!(
            second,
            BTreeMap::from([("BAUD".into(), "19200".into()), ("PORT".into(), "COM2".into())])
        );
        assert!(get_ioc_macros(&doc, "ABSENT").unwrap().is_empty());
    }

    #[test]
    fn sim_mode_follows_simlevel() {
        let doc = iocs_doc(
            r#"<ioc name="OFF" simlevel="none"/><ioc name="ON" simlevel="true"/><ioc name="BARE"/>"#,
        );
        assert!(!get_ioc_in_sim_mode(&doc, "OFF").unwrap());
        assert!(get_ioc_in_sim_mode(&doc, "ON").unwrap());
        assert!(!get_ioc_in_sim_mode(&doc, "BARE").unwrap());
        assert!(matches!(
            get_ioc_in_sim_mode(&doc, "ABSENT"),
            Err(ConfigError::IocNotFound { ioc }) if ioc == "ABSENT"
        ));
    }

    #[test]
    fn unqualified_iocs_are_not_found() {
        let doc = r#"<iocs><ioc name="SIMPLE"/></iocs>"#;
        assert!(get_iocs(doc).unwrap().is_empty());
    }

    #[test]
    fn name_then_value_filter_equals_combined_filter() {
        let macros = BTreeMap::from([
            ("AXIS1".to_string(), "yes".to_string()),
            ("AXIS2".to_string(), "no".to_string()),
            ("AXIS9".to_string(), "yes".to_string()),
            ("PORT".to_string(), "yes".to_string()),
        ]);
        let name_re = Regex::new("^AXIS[1-8]$").unwrap();
        let value_re = Regex::new("^yes$").unwrap();

        let by_name = check_if_macros_match_pattern(&macros, &name_re, false);
        let composed = check_if_macros_match_pattern(&by_name, &value_re, true);
        let combined: BTreeMap<_, _> = macros
            .iter()
            .filter(|(n, v)| name_re.is_match(n) && value_re.is_match(v))
            .map(|(n, v)| (n.clone(), v.clone()))
            .collect();

        assert_eq!(composed, combined);
        assert_eq!(composed.keys().collect::<Vec<_>>(), ["AXIS1"]);
    }

    #[test]
    fn pattern_search_is_unanchored() {
        let macros = BTreeMap::from([("MY_ADDR_1".to_string(), "x".to_string())]);
        let re = Regex::new("ADDR_1").unwrap();
        assert_eq!(check_if_macros_match_pattern(&macros, &re, false).len(), 1);
    }

    #[test]
    fn block_pvs_strip_fields_and_prefix_local_blocks() {
        let doc = format!(
            r#"<blocks xmlns="{BLOCKS_NS}">
                <block><name>Temp</name><read_pv>TC:TEMP.VAL</read_pv><local>True</local></block>
                <block><name>Beam</name><read_pv>AC:BEAM</read_pv><local>False</local></block>
            </blocks>"#
        );
        assert_eq!(
            get_block_pvs_from_xml("IN:LARMOR:", &doc).unwrap(),
            ["IN:LARMOR:TC:TEMP", "AC:BEAM"]
        );
        let blocks = get_block_entries(&doc).unwrap();
        assert_eq!(blocks[0].name, "Temp");
        assert!(blocks[0].local && !blocks[1].local);
    }

    #[test]
    fn block_without_read_pv_fails_pv_extraction_only() {
        let doc = format!(r#"<blocks xmlns="{BLOCKS_NS}"><block><name>Odd</name></block></blocks>"#);
        assert_eq!(get_block_entries(&doc).unwrap().len(), 1);
        assert!(matches!(
            get_block_pvs_from_xml("IN:X:", &doc),
            Err(ConfigError::MissingElement { element: "read_pv", .. })
        ));
    }

    #[test]
    fn active_components_in_document_order() {
        let doc = format!(
            r#"<components xmlns="{COMPONENTS_NS}"><component name="_base"/><component name="motors"/></components>"#
        );
        assert_eq!(get_active_components_from_xml(&doc).unwrap(), ["_base", "motors"]);
    }

    #[test]
    fn device_screen_keys() {
        let doc = format!(
            r#"<devices xmlns="{DEVICES_NS}">
                <device><key>Eurotherm</key><type>OPI</type></device>
                <device><key>Galil</key></device>
            </devices>"#
        );
        assert_eq!(
            get_device_screens(&doc).unwrap(),
            BTreeSet::from(["Eurotherm".to_string(), "Galil".to_string()])
        );
    }

    #[test]
    fn tree_reads_files_from_its_root() {
        let repo = tempfile::tempdir().unwrap();
        let dir = repo.path().join("configurations/components/motors");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("iocs.xml"), iocs_doc(r#"<ioc name="GALIL_01"/>"#)).unwrap();

        let components = ConfigTree::components(repo.path());
        assert_eq!(components.list_configurations().unwrap(), ["motors"]);
        assert_eq!(
            get_iocs(&components.get_iocs_xml("motors").unwrap()).unwrap(),
            ["GALIL_01"]
        );
        assert!(matches!(
            components.get_blocks_xml("motors"),
            Err(ConfigError::Io { .. })
        ));
        assert!(ConfigTree::configurations(repo.path())
            .list_configurations()
            .unwrap()
            .is_empty());
    }
}
