//! Release versions: the repository's `config_version.txt` and comparisons.

use std::cmp::Ordering;
use std::path::PathBuf;

use crate::{ConfigError, fs_util};

/// File name of the version record.
pub const VERSION_FILE: &str = "config_version.txt";

/// The version record of one repository.
#[derive(Debug, Clone)]
pub struct VersionFile {
    repo: PathBuf,
}

impl VersionFile {
    /// Version record of the repository at `repo`.
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    /// `<repo>/configurations/config_version.txt`
    pub fn path(&self) -> PathBuf {
        self.repo.join("configurations").join(VERSION_FILE)
    }

    /// Whether the version file exists.
    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// First line of the file, trimmed.
    pub fn read(&self) -> Result<String, ConfigError> {
        let text = fs_util::read_text(&self.path())?;
        Ok(text.lines().next().unwrap_or("").trim().to_string())
    }

    /// The version, or `None` when the file is absent or unreadable.
    pub fn read_optional(&self) -> Option<String> {
        self.exists().then(|| self.read().ok()).flatten()
    }

    /// Number of files named `config_version.txt` anywhere in the repository.
    pub fn count_version_files(&self) -> usize {
        fs_util::count_files_with_name(&self.repo, VERSION_FILE)
    }
}

/// True when the first three dot-separated components are equal.
///
/// A fourth (checksum) component is ignored.
pub fn versions_similar(a: &str, b: &str) -> bool {
    a.split('.').take(3).eq(b.split('.').take(3))
}

/// Up to three leading release components of a version string.
pub fn extract_release_numbers_from_string(version: &str) -> Vec<&str> {
    version.split('.').take(3).collect()
}

/// A `major.minor.patch` release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Release {
    /// Major number.
    pub major: u32,
    /// Minor number; 0 when absent.
    pub minor: u32,
    /// Patch number; 0 when absent.
    pub patch: u32,
}

impl Release {
    /// Build from extracted release numbers; missing minor or patch default to 0.
    pub fn from_numbers(numbers: &[&str]) -> Option<Self> {
        let parse = |i: usize| -> Option<u32> {
            numbers.get(i).map_or(Some(0), |n| n.trim().parse().ok())
        };
        if numbers.is_empty() {
            return None;
        }
        Some(Self {
            major: parse(0)?,
            minor: parse(1)?,
            patch: parse(2)?,
        })
    }

    /// Parse the release part of a version such as `15.0.1.abc123`.
    pub fn from_version(version: &str) -> Result<Self, ConfigError> {
        Self::from_numbers(&extract_release_numbers_from_string(version)).ok_or_else(|| {
            ConfigError::InvalidVersion {
                version: version.to_string(),
            }
        })
    }

    /// Git tag of this release, `vX.Y.Z`.
    pub fn tag_name(&self) -> String {
        format!("v{}.{}.{}", self.major, self.minor, self.patch)
    }

    /// Legacy release branch name, `Release_X.Y.Z`.
    pub fn branch_name(&self) -> String {
        format!("Release_{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// `vX.Y.Z` from extracted release numbers.
pub fn convert_release_to_tag_name(numbers: &[&str]) -> Option<String> {
    Release::from_numbers(numbers).map(|r| r.tag_name())
}

/// `Release_X.Y.Z` from extracted release numbers.
pub fn convert_release_to_branch_name(numbers: &[&str]) -> Option<String> {
    Release::from_numbers(numbers).map(|r| r.branch_name())
}

/// True when `version` sorts before `other`.
///
/// Segments are compared numerically when both are numbers and as text
/// otherwise; a version that is a prefix of the other is older.
pub fn is_version_older(version: &str, other: &str) -> bool {
    compare_versions(version, other) == Ordering::Less
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}
