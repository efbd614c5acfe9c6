//! Channel Access reads through the EPICS `caget` tool.

use std::process::Command;
use std::time::Duration;

use crate::config::DEFAULT_MAX_ARRAY_BYTES;
use crate::{PvError, ValueSource};

const MAX_ARRAY_BYTES_VAR: &str = "EPICS_CA_MAX_ARRAY_BYTES";

/// Reads PVs by running `caget` once per value.
///
/// Uses terse output (`-t`), numeric enums (`-n`), char arrays as strings
/// (`-S`), and `-w` for the connection timeout. Each child gets
/// `EPICS_CA_MAX_ARRAY_BYTES` so large payloads arrive whole.
#[derive(Debug, Clone)]
pub struct CagetSource {
    program: String,
    timeout: Duration,
    max_array_bytes: u64,
}

impl CagetSource {
    /// Create a source that runs `caget` from `PATH`.
    pub fn new(timeout: Duration) -> Self {
        Self::with_program("caget", timeout)
    }

    /// Create a source that runs the given `caget` executable.
    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            max_array_bytes: DEFAULT_MAX_ARRAY_BYTES,
        }
    }

    /// Set the `EPICS_CA_MAX_ARRAY_BYTES` passed to each read.
    pub fn with_max_array_bytes(mut self, bytes: u64) -> Self {
        self.max_array_bytes = bytes;
        self
    }

    fn args(&self, pv: &str) -> Vec<String> {
        vec![
            "-t".into(),
            "-n".into(),
            "-S".into(),
            "-w".into(),
            format!("{:.1}", self.timeout.as_secs_f64()),
            pv.into(),
        ]
    }
}

impl ValueSource for CagetSource {
    fn read(&self, pv: &str) -> Result<String, PvError> {
        let output = Command::new(&self.program)
            .args(self.args(pv))
            .env(MAX_ARRAY_BYTES_VAR, self.max_array_bytes.to_string())
            .output()
            .map_err(|source| PvError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() || (stdout.trim().is_empty() && !stderr.trim().is_empty()) {
            return Err(classify_failure(pv, self.timeout, &stdout, &stderr));
        }
        Ok(stdout.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Map caget's failure text onto an error variant.
fn classify_failure(pv: &str, timeout: Duration, stdout: &str, stderr: &str) -> PvError {
    let details = format!("{} {}", stdout.trim(), stderr.trim());
    if details.contains("connect timed out") || details.contains("Channel connect timed out") {
        PvError::ConnectTimeout {
            pv: pv.to_string(),
            timeout,
        }
    } else {
        PvError::ReadFailed {
            pv: pv.to_string(),
            details: details.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_request_terse_numeric_string_output() {
        let source = CagetSource::new(Duration::from_secs(5));
        assert_eq!(
            source.args("IN:LARMOR:CS:VERSION:SVN:REV"),
            vec!["-t", "-n", "-S", "-w", "5.0", "IN:LARMOR:CS:VERSION:SVN:REV"]
        );
    }

    #[test]
    fn connect_timeout_is_recognised() {
        let err = classify_failure(
            "IN:LARMOR:CS:INSTLIST",
            Duration::from_secs(5),
            "IN:LARMOR:CS:INSTLIST *** Not connected (PV not found)\n",
            "Channel connect timed out: some PV(s) not found.\n",
        );
        assert!(matches!(err, PvError::ConnectTimeout { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn other_failures_carry_tool_output() {
        let err = classify_failure("X", Duration::from_secs(1), "", "Read access denied\n");
        match err {
            PvError::ReadFailed { details, .. } => assert_eq!(details, "Read access denied"),
            other => panic!("expected ReadFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    fn stub_caget(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("caget");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[test]
    fn reads_raise_the_array_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let program = stub_caget(dir.path(), r#"echo "MAX=${EPICS_CA_MAX_ARRAY_BYTES:-unset}""#);

        let source = CagetSource::with_program(&program, Duration::from_secs(1));
        assert_eq!(source.read("CS:INSTLIST").unwrap(), "MAX=1000000");

        let source = source.with_max_array_bytes(4_000_000);
        assert_eq!(source.read("CS:INSTLIST").unwrap(), "MAX=4000000");
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let source = CagetSource::with_program(
            "/nonexistent/instcheck-caget",
            Duration::from_millis(100),
        );
        assert!(matches!(source.read("X"), Err(PvError::Spawn { .. })));
    }
}
