//! `configurations/globals.txt`: instrument-wide macro definitions.
//!
//! Each line is `IOC__MACRO=VALUE`, `MACRO=VALUE` or blank, optionally
//! followed by a `#` comment.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::fs_util;

/// File name of the globals file.
pub const GLOBALS_FILE: &str = "globals.txt";

/// Macros that put an IOC into simulation when set to `1`.
pub const SIM_MODE_MACROS: [&str; 3] = ["RECSIM", "DEVSIM", "SIMULATE"];

const NAME: &str = "[A-Za-z0-9]+(?:_[A-Za-z0-9]+)*";

static OPTIONAL_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^(?:({NAME})__)?({NAME})=(.*)$")).expect("static regex must compile")
});

static REQUIRED_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^({NAME})__({NAME})=(.*)$")).expect("static regex must compile")
});

/// Remove a trailing `#` comment and surrounding whitespace.
pub fn strip_comments(line: &str) -> &str {
    line.split('#').next().unwrap_or("").trim()
}

/// One parsed `[IOC__]MACRO=VALUE` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    /// The IOC prefix, if the line has one.
    pub ioc: Option<String>,
    /// Macro name.
    pub name: String,
    /// Macro value, possibly empty.
    pub value: String,
}

/// The globals file of one repository.
#[derive(Debug, Clone)]
pub struct Globals {
    repo: PathBuf,
    require_ioc_prefix: bool,
}

impl Globals {
    /// Globals of the repository at `repo`; the IOC prefix is optional.
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            require_ioc_prefix: false,
        }
    }

    /// Reject lines without an `IOC__` prefix (builder pattern).
    pub fn with_required_ioc_prefix(mut self, required: bool) -> Self {
        self.require_ioc_prefix = required;
        self
    }

    /// `<repo>/configurations/globals.txt`
    pub fn path(&self) -> PathBuf {
        self.repo.join("configurations").join(GLOBALS_FILE)
    }

    /// Whether the globals file exists.
    pub fn file_exists(&self) -> bool {
        self.path().is_file()
    }

    /// Number of files named `globals.txt` anywhere in the repository.
    pub fn count_globals_files(&self) -> usize {
        fs_util::count_files_with_name(&self.repo, GLOBALS_FILE)
    }

    /// Raw lines of the file; empty when it is absent or unreadable.
    pub fn get_lines(&self) -> Vec<String> {
        match fs_util::read_text(&self.path()) {
            Ok(text) => text.lines().map(str::to_string).collect(),
            Err(e) => {
                tracing::debug!(error = %e, "no globals file");
                Vec::new()
            }
        }
    }

    fn pattern(&self) -> &'static Regex {
        if self.require_ioc_prefix {
            &REQUIRED_PREFIX
        } else {
            &OPTIONAL_PREFIX
        }
    }

    /// Whether a line is blank, a comment, or a valid macro definition.
    pub fn check_syntax(&self, line: &str) -> bool {
        let line = strip_comments(line);
        line.is_empty() || self.pattern().is_match(line)
    }

    /// Parse one line; `None` for blank or invalid lines.
    pub fn parse_line(&self, line: &str) -> Option<MacroDefinition> {
        parse_with(self.pattern(), line)
    }

    /// Every valid definition in file order.
    pub fn definitions(&self) -> Vec<MacroDefinition> {
        self.get_lines()
            .iter()
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    /// Macros defined for exactly `ioc_name`. Later lines override earlier ones.
    pub fn get_macros(&self, ioc_name: &str) -> BTreeMap<String, String> {
        self.definitions()
            .into_iter()
            .filter(|d| d.ioc.as_deref() == Some(ioc_name))
            .map(|d| (d.name, d.value))
            .collect()
    }

    /// Every value assigned to macro `name`, for any IOC, in file order.
    pub fn get_values_of_macro(&self, name: &str) -> Vec<String> {
        self.definitions()
            .into_iter()
            .filter(|d| d.name == name)
            .map(|d| d.value)
            .collect()
    }

    /// True if any of [`SIM_MODE_MACROS`] is set to `1` anywhere.
    ///
    /// Lines without an IOC prefix count even when the prefix is required.
    pub fn is_any_ioc_in_sim_mode(&self) -> bool {
        self.get_lines()
            .iter()
            .filter_map(|line| parse_with(&OPTIONAL_PREFIX, line))
            .any(|d| SIM_MODE_MACROS.contains(&d.name.as_str()) && d.value == "1")
    }
}

fn parse_with(pattern: &Regex, line: &str) -> Option<MacroDefinition> {
    let caps = pattern.captures(strip_comments(line))?;
    Some(MacroDefinition {
        ioc: caps.get(1).map(|m| m.as_str().to_string()),
        name: caps.get(2)?.as_str().to_string(),
        value: caps.get(3).map_or("", |m| m.as_str()).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn globals_with(text: &str) -> (tempfile::TempDir, Globals) {
        let repo = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(repo.path().join("configurations")).unwrap();
        std::fs::write(repo.path().join("configurations").join(GLOBALS_FILE), text).unwrap();
        let globals = Globals::new(repo.path());
        (repo, globals)
    }

    #[test]
    fn accepts_valid_lines() {
        let g = Globals::new("/unused");
        for line in [
            "",
            "# comment",
            "GALIL_01__ADDR1=1.2.3.4",
            "A_B_C__M_A_C=1.2.3.4",
            "GALIL_01__ADDR1=",
            "GALIL_01__ADDR1=1.2.3.4 # trailing comment",
            "ADDR1=1.2.3.4",
        ] {
            assert!(g.check_syntax(line), "{line:?} should be accepted");
        }
    }

    #[test]
    fn rejects_invalid_lines() {
        let g = Globals::new("/unused");
        for line in [
            "IOCNAME__ADDR1 1.2.3.4",
            "IOCNAME__ADDR1__YES=1.2.3.4",
            "VALID___MACRO=thing",
            "_LEADING=1",
            "TRAILING_=1",
        ] {
            assert!(!g.check_syntax(line), "{line:?} should be rejected");
        }
    }

    #[test]
    fn required_prefix_rejects_bare_macros() {
        let g = Globals::new("/unused").with_required_ioc_prefix(true);
        assert!(!g.check_syntax("ADDR1=1.2.3.4"));
        assert!(g.check_syntax("GALIL_01__ADDR1=1.2.3.4"));
        assert!(g.check_syntax(""));
    }

    #[test]
    fn missing_file_has_no_lines() {
        let g = Globals::new("/nonexistent/instcheck/repo");
        assert!(!g.file_exists());
        assert!(g.get_lines().is_empty());
        assert!(!g.is_any_ioc_in_sim_mode());
    }

    #[test]
    fn macros_are_selected_by_exact_ioc_name() {
        let (_repo, g) = globals_with(
            "GALIL_01__MTRCTRL=1\nGALIL_01__GALILADDR=10.0.0.1 # rack 2\nGALIL_010__MTRCTRL=3\n",
        );
        assert_eq!(
            g.get_macros("GALIL_01"),
            BTreeMap::from([
                ("GALILADDR".to_string(), "10.0.0.1".to_string()),
                ("MTRCTRL".to_string(), "1".to_string()),
            ])
        );
        assert!(g.get_macros("GALIL").is_empty());
    }

    #[test]
    fn sim_mode_detected_from_any_ioc() {
        let (_repo, g) = globals_with("EUROTHRM_01__RECSIM=0\nCRYOVALVE_01__DEVSIM=1\n");
        assert!(g.is_any_ioc_in_sim_mode());
        assert_eq!(g.get_values_of_macro("DEVSIM"), ["1"]);

        let (_repo, g) = globals_with("EUROTHRM_01__RECSIM=0\n# DEVSIM=1\nNOTRECSIM=1\n");
        assert!(!g.is_any_ioc_in_sim_mode());
    }

    #[test]
    fn bare_sim_macro_counts_when_prefix_is_required() {
        let (_repo, g) = globals_with("RECSIM=1\n");
        let g = g.with_required_ioc_prefix(true);
        assert!(!g.check_syntax("RECSIM=1"));
        assert!(g.definitions().is_empty());
        assert!(g.is_any_ioc_in_sim_mode());
    }

    #[test]
    fn counts_globals_files_in_whole_repository() {
        let (repo, g) = globals_with("");
        assert_eq!(g.count_globals_files(), 1);
        std::fs::create_dir_all(repo.path().join("configurations/components/x")).unwrap();
        std::fs::write(
            repo.path().join("configurations/components/x").join(GLOBALS_FILE),
            "",
        )
        .unwrap();
        assert_eq!(g.count_globals_files(), 2);
    }
}
