//! Shared test helpers for `instcheck_core` integration tests.

#![allow(unreachable_pub)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use instcheck_core::{CheckResult, InstrumentContext, InstrumentReport, Settings, Subject};
use instcheck_pv::InstrumentRecord;
use tempfile::TempDir;

const IOCS_NS: &str = "http://epics.isis.rl.ac.uk/schema/iocs/1.0";
const BLOCKS_NS: &str = "http://epics.isis.rl.ac.uk/schema/blocks/1.0";
const COMPONENTS_NS: &str = "http://epics.isis.rl.ac.uk/schema/components/1.0";

// ─── Document builders ───────────────────────────────────────────────────────

/// `iocs.xml` with the given IOCs and their macros.
#[allow(dead_code)]
pub fn iocs_xml(iocs: &[(&str, &[(&str, &str)])]) -> String {
    let body: String = iocs
        .iter()
        .map(|(name, macros)| {
            let macros: String = macros
                .iter()
                .map(|(k, v)| format!(r#"<macro name="{k}" value="{v}"/>"#))
                .collect();
            format!(
                r#"<ioc autostart="true" name="{name}" restart="false" simlevel="none"><macros>{macros}</macros></ioc>"#
            )
        })
        .collect();
    format!(r#"<?xml version="1.0" ?><iocs xmlns="{IOCS_NS}">{body}</iocs>"#)
}

/// `blocks.xml` with non-local blocks reading `<name>:PV`.
#[allow(dead_code)]
pub fn blocks_xml(blocks: &[&str]) -> String {
    let body: String = blocks
        .iter()
        .map(|b| {
            format!("<block><name>{b}</name><read_pv>IN:TEST:{b}:PV</read_pv><local>False</local></block>")
        })
        .collect();
    format!(r#"<?xml version="1.0" ?><blocks xmlns="{BLOCKS_NS}">{body}</blocks>"#)
}

/// `components.xml` loading the named components.
#[allow(dead_code)]
pub fn components_xml(components: &[&str]) -> String {
    let body: String = components
        .iter()
        .map(|c| format!(r#"<component name="{c}"/>"#))
        .collect();
    format!(r#"<?xml version="1.0" ?><components xmlns="{COMPONENTS_NS}">{body}</components>"#)
}

// ─── Repository fixture ──────────────────────────────────────────────────────

/// A configuration repository in a temporary directory.
pub struct Repo {
    dir: TempDir,
}

#[allow(dead_code)]
impl Repo {
    /// An empty repository with a synoptics directory and `_base` component.
    pub fn new() -> Self {
        let repo = Self {
            dir: tempfile::tempdir().expect("tempdir"),
        };
        fs::create_dir_all(repo.path().join("configurations/synoptics")).expect("mkdir");
        repo.component("_base", &[], &[]);
        repo
    }

    /// Repository root.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `text` at `rel`, creating parent directories.
    pub fn write(&self, rel: &str, text: &str) -> &Self {
        let path = self.path().join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, text).unwrap_or_else(|e| panic!("write {}: {e}", path.display()));
        self
    }

    fn directory(
        &self,
        root: &str,
        name: &str,
        iocs: &[(&str, &[(&str, &str)])],
        blocks: &[&str],
        components: &[&str],
    ) -> &Self {
        let dir = format!("configurations/{root}/{name}");
        self.write(&format!("{dir}/iocs.xml"), &iocs_xml(iocs))
            .write(&format!("{dir}/blocks.xml"), &blocks_xml(blocks))
            .write(&format!("{dir}/components.xml"), &components_xml(components))
            .write(&format!("{dir}/groups.xml"), "<groups/>")
            .write(&format!("{dir}/meta.xml"), "<meta><description/></meta>")
    }

    /// A complete configuration directory.
    pub fn configuration(
        &self,
        name: &str,
        iocs: &[(&str, &[(&str, &str)])],
        blocks: &[&str],
        components: &[&str],
    ) -> &Self {
        self.directory("configurations", name, iocs, blocks, components)
    }

    /// A complete component directory.
    pub fn component(&self, name: &str, iocs: &[(&str, &[(&str, &str)])], blocks: &[&str]) -> &Self {
        self.directory("components", name, iocs, blocks, &[])
    }

    /// `configurations/config_version.txt`.
    pub fn version(&self, version: &str) -> &Self {
        self.write("configurations/config_version.txt", &format!("{version}\n"))
    }
}

// ─── Contexts and reports ────────────────────────────────────────────────────

/// An instrument named `name` on host `NDX<name>`.
#[allow(dead_code)]
pub fn instrument(name: &str) -> InstrumentRecord {
    InstrumentRecord {
        name: name.to_string(),
        host_name: format!("NDX{name}"),
        pv_prefix: format!("IN:{name}:"),
    }
}

/// A context with no server data and default settings.
#[allow(dead_code)]
pub fn offline(repo: &Repo, name: &str) -> InstrumentContext {
    InstrumentContext::offline(instrument(name), repo.path(), Arc::new(Settings::default()))
}

/// The result of `check` on `subject`; panics if the suite did not run it.
#[allow(dead_code)]
pub fn result<'a>(report: &'a InstrumentReport, check: &str, subject: &Subject) -> &'a CheckResult {
    report
        .results
        .iter()
        .find(|r| r.check == check && &r.subject == subject)
        .unwrap_or_else(|| panic!("no result for {check} on {subject}"))
}
