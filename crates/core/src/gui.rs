//! The GUI repository: release checkout and the `opi_info.xml` catalogue.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use instcheck_git::GitRepo;
use serde::{Deserialize, Serialize};

use crate::version::Release;
use crate::{ConfigError, fs_util, xml};

/// Default OPI package inside `<gui>/base`.
pub const DEFAULT_OPIS_PACKAGE: &str = "uk.ac.stfc.isis.ibex.opis";

/// How a release maps to a GUI repository ref.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuiRefScheme {
    /// Tag `vX.Y.Z`.
    #[default]
    Tag,
    /// Branch `Release_X.Y.Z`, used by older GUI repositories.
    LegacyBranch,
}

impl GuiRefScheme {
    /// Ref name for `release` and whether it is a tag.
    pub fn reference(self, release: &Release) -> (String, bool) {
        match self {
            GuiRefScheme::Tag => (release.tag_name(), true),
            GuiRefScheme::LegacyBranch => (release.branch_name(), false),
        }
    }
}

/// Check out the GUI repository at the ref matching `version`.
///
/// Returns the ref that was checked out.
pub fn sync_gui_to_release(
    gui: &GitRepo,
    version: &str,
    scheme: GuiRefScheme,
) -> Result<String, ConfigError> {
    let release = Release::from_version(version)?;
    let (reference, is_tag) = scheme.reference(&release);
    if !gui.update_branch(&reference, is_tag) {
        return Err(ConfigError::CheckoutFailed {
            repo: gui.path().to_path_buf(),
            reference,
        });
    }
    Ok(reference)
}

/// Location of `opi_info.xml` in a GUI repository.
pub fn opi_info_path(gui_repo: &Path, opis_package: &str) -> PathBuf {
    gui_repo
        .join("base")
        .join(opis_package)
        .join("resources")
        .join("opi_info.xml")
}

/// Synoptic targets and component types the GUI knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpiInfo {
    targets: BTreeSet<String>,
    types: BTreeSet<String>,
}

impl OpiInfo {
    /// Read and parse the catalogue of a GUI checkout.
    pub fn load(gui_repo: &Path, opis_package: &str) -> Result<Self, ConfigError> {
        Self::parse(&fs_util::read_text(&opi_info_path(gui_repo, opis_package))?)
    }

    /// Parse `<entry><key>TARGET</key><value><type>TYPE</type></value></entry>` records.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let doc = xml::parse("opi_info.xml", text)?;
        let mut info = Self::default();
        for entry in doc
            .descendants()
            .filter(|n| n.is_element() && n.has_tag_name("entry"))
        {
            if let Some(target) = xml::local_child(entry, "key").and_then(|k| k.text()) {
                info.targets.insert(target.to_string());
            }
            if let Some(kind) = xml::local_child(entry, "value")
                .and_then(|v| xml::local_child(v, "type"))
                .and_then(|t| t.text())
            {
                info.types.insert(kind.to_string());
            }
        }
        Ok(info)
    }

    /// Every known target name.
    pub fn valid_targets(&self) -> &BTreeSet<String> {
        &self.targets
    }

    /// Every known component type.
    pub fn valid_types(&self) -> &BTreeSet<String> {
        &self.types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPI_INFO: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<descriptions>
    <opis>
        <entry>
            <key>Eurotherm</key>
            <value>
                <type>TEMP_CONTROLLER</type>
                <path>Eurotherms/eurotherm.opi</path>
            </value>
        </entry>
        <entry>
            <key>HLG</key>
            <value><type>HE_LEVEL_GAUGE</type></value>
        </entry>
        <entry>
            <key>Generic</key>
            <value><path>generic.opi</path></value>
        </entry>
    </opis>
</descriptions>"#;

    #[test]
    fn catalogue_targets_and_types() {
        let info = OpiInfo::parse(OPI_INFO).unwrap();
        assert!(info.valid_targets().contains("Eurotherm"));
        assert!(info.valid_targets().contains("Generic"));
        assert_eq!(info.valid_targets().len(), 3);
        assert!(info.valid_types().contains("HE_LEVEL_GAUGE"));
        assert_eq!(info.valid_types().len(), 2);
    }

    #[test]
    fn catalogue_is_loaded_from_the_opis_package() {
        let gui = tempfile::tempdir().unwrap();
        let path = opi_info_path(gui.path(), DEFAULT_OPIS_PACKAGE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, OPI_INFO).unwrap();
        assert!(OpiInfo::load(gui.path(), DEFAULT_OPIS_PACKAGE).is_ok());
        assert!(matches!(
            OpiInfo::load(gui.path(), "other.package"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn schemes_map_to_refs() {
        let release = Release::from_version("12.0.1.abc").unwrap();
        assert_eq!(GuiRefScheme::Tag.reference(&release), ("v12.0.1".to_string(), true));
        assert_eq!(
            GuiRefScheme::LegacyBranch.reference(&release),
            ("Release_12.0.1".to_string(), false)
        );
    }

    #[test]
    fn failed_checkout_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gui = GitRepo::new(dir.path()).with_timeout(std::time::Duration::from_secs(30));
        assert!(matches!(
            sync_gui_to_release(&gui, "12.0.1", GuiRefScheme::Tag),
            Err(ConfigError::CheckoutFailed { reference, .. }) if reference == "v12.0.1"
        ));
        assert!(matches!(
            sync_gui_to_release(&gui, "dev", GuiRefScheme::Tag),
            Err(ConfigError::InvalidVersion { .. })
        ));
    }
}
