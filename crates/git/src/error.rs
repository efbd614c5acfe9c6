//! Typed errors for git invocations.

use std::io;
use std::time::Duration;

/// A git command that could not be completed.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// git could not be started (not installed, or the directory is missing).
    #[error("failed to run git {command}")]
    Spawn {
        /// The git subcommand and arguments.
        command: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// git ran longer than the configured timeout and was killed.
    #[error("git {command} timed out after {timeout:?}")]
    Timeout {
        /// The git subcommand and arguments.
        command: String,
        /// The configured timeout that elapsed.
        timeout: Duration,
    },

    /// git exited with a failure status.
    #[error("git {command} failed ({status}): {stderr}")]
    Failed {
        /// The git subcommand and arguments.
        command: String,
        /// Exit status description.
        status: String,
        /// Trimmed standard error.
        stderr: String,
    },

    /// git printed something that was not the expected shape.
    #[error("unexpected output from git {command}: {output}")]
    UnexpectedOutput {
        /// The git subcommand and arguments.
        command: String,
        /// The offending output.
        output: String,
    },
}

impl GitError {
    /// Returns `true` if the failure may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GitError::Timeout { .. })
    }
}
