//! Running git with a deadline.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::GitError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run `git <args>` and return its standard output.
///
/// The child is killed once `timeout` elapses. Output pipes are drained on
/// separate threads so a chatty command cannot block on a full pipe.
pub(crate) fn run_git(
    cwd: Option<&Path>,
    args: &[&str],
    timeout: Duration,
) -> Result<String, GitError> {
    let command = args.join(" ");
    let mut cmd = Command::new("git");
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("LC_ALL", "C");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
        // Stop git from walking up into an enclosing repository.
        if let Some(parent) = dir.parent() {
            cmd.env("GIT_CEILING_DIRECTORIES", parent);
        }
    }

    tracing::debug!(command = %command, "running git");
    let mut child = cmd.spawn().map_err(|source| GitError::Spawn {
        command: command.clone(),
        source,
    })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if started.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(GitError::Timeout { command, timeout });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(source) => return Err(GitError::Spawn { command, source }),
        }
    };

    let stdout = stdout.map(join_text).unwrap_or_default();
    let stderr = stderr.map(join_text).unwrap_or_default();

    if !status.success() {
        return Err(GitError::Failed {
            command,
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(stdout)
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_text(handle: thread::JoinHandle<Vec<u8>>) -> String {
    String::from_utf8_lossy(&handle.join().unwrap_or_default()).into_owned()
}
