//! Git synchronization for configuration and GUI repositories.
//!
//! Runs the `git` executable with a hard timeout. [`GitRepo::update_branch`]
//! is the only operation that mutates a working copy; it never returns an
//! error, only `false`, so a failed sync cannot abort a multi-instrument run.

mod error;
mod process;

pub use error::GitError;

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default limit for any single git invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// A working copy on disk.
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
    timeout: Duration,
}

impl GitRepo {
    /// A working copy at `path` using [`DEFAULT_TIMEOUT`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-command timeout (builder pattern).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path of the working copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn git(&self, args: &[&str]) -> Result<String, GitError> {
        process::run_git(Some(&self.path), args, self.timeout)
    }

    /// Fetch every remote.
    pub fn fetch_all(&self) -> Result<(), GitError> {
        self.git(&["fetch", "--all"]).map(|_| ())
    }

    fn try_force_clean_checkout(&self, name: &str, is_tag: bool) -> Result<(), GitError> {
        self.git(&["reset", "--hard", "HEAD"])?;
        self.git(&["clean", "-fdx"])?;
        let target = if is_tag {
            format!("tags/{name}")
        } else {
            format!("origin/{name}")
        };
        self.git(&["checkout", "--force", &target])?;
        Ok(())
    }

    /// Discard local changes and untracked files, then check out
    /// `origin/<name>` (or `tags/<name>` when `is_tag`).
    ///
    /// Returns `false` on any failure.
    pub fn force_clean_checkout(&self, name: &str, is_tag: bool) -> bool {
        match self.try_force_clean_checkout(name, is_tag) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(repo = %self.path.display(), error = %e, "git checkout failed");
                false
            }
        }
    }

    /// Fetch all remotes, then [`force_clean_checkout`](Self::force_clean_checkout).
    ///
    /// Returns `false` on any failure: not a repository, network failure, or
    /// unknown ref.
    pub fn update_branch(&self, name: &str, is_tag: bool) -> bool {
        if let Err(e) = self.fetch_all() {
            tracing::warn!(repo = %self.path.display(), error = %e, "git fetch failed");
            return false;
        }
        let ok = self.force_clean_checkout(name, is_tag);
        if ok {
            tracing::info!(repo = %self.path.display(), git_ref = name, is_tag, "repository synchronized");
        }
        ok
    }

    /// Resolve a revision to its full commit hash.
    pub fn rev_parse(&self, rev: &str) -> Result<String, GitError> {
        let out = self.git(&["rev-parse", "--verify", rev])?;
        let hash = out.trim();
        if hash.len() < 40 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(GitError::UnexpectedOutput {
                command: format!("rev-parse {rev}"),
                output: out,
            });
        }
        Ok(hash.to_string())
    }

    /// Diff of `path` against `rev`; empty when identical.
    pub fn diff_against(&self, rev: &str, path: &Path) -> Result<String, GitError> {
        let path = path.to_string_lossy();
        self.git(&["diff", rev, "--", &path])
    }
}

/// Hash that `refname` points at in the repository at `url`, without a clone.
///
/// Returns `Ok(None)` when the remote has no such ref.
pub fn ls_remote(url: &str, refname: &str, timeout: Duration) -> Result<Option<String>, GitError> {
    let out = process::run_git(None, &["ls-remote", url, refname], timeout)?;
    Ok(out
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .find(|(_, name)| *name == refname || name.ends_with(&format!("/{refname}")))
        .map(|(hash, _)| hash.to_string()))
}
