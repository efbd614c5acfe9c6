//! Whether each instrument host's configuration checkout matches the head
//! of its branch in a reference repository.

use std::collections::BTreeMap;
use std::time::Duration;

use instcheck_diagnostics::{Diagnostic, codes};
use instcheck_git::{GitError, GitRepo, ls_remote};
use instcheck_pv::InstrumentRecord;
use serde::Serialize;

use crate::pool::map_bounded;
use crate::validate::Outcome;

/// Reads the commit a host has checked out.
pub trait HeadProbe: Send + Sync {
    /// `HEAD` of the host's configuration repository, or `None` if it has none.
    fn head(&self, instrument: &InstrumentRecord) -> Result<Option<String>, GitError>;
}

/// Probe via `git ls-remote` against a URL built from a template.
///
/// `{host}` and `{name}` in the template are replaced by the instrument's
/// host name and instrument name.
#[derive(Debug, Clone)]
pub struct LsRemoteProbe {
    url_template: String,
    timeout: Duration,
}

impl LsRemoteProbe {
    /// A probe over `url_template`, giving each host `timeout`.
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url_template: url_template.into(),
            timeout,
        }
    }

    /// Repository URL of `instrument`.
    pub fn url_for(&self, instrument: &InstrumentRecord) -> String {
        self.url_template
            .replace("{host}", &instrument.host_name)
            .replace("{name}", &instrument.name)
    }
}

impl HeadProbe for LsRemoteProbe {
    fn head(&self, instrument: &InstrumentRecord) -> Result<Option<String>, GitError> {
        ls_remote(&self.url_for(instrument), "HEAD", self.timeout)
    }
}

/// How one host compares with the reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostStatus {
    /// Instrument name.
    pub instrument: String,
    /// Host name, also the branch name.
    pub host: String,
    /// Head of `origin/<host>` in the reference repository.
    pub expected: Option<String>,
    /// Head found on the host.
    pub found: Option<String>,
    /// Verdict.
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Compare every host with the reference repository.
///
/// Branch heads are resolved first; hosts are then probed on at most
/// `workers` threads. Results come back in `instruments` order.
pub fn scan(
    reference: &GitRepo,
    instruments: &[InstrumentRecord],
    probe: &dyn HeadProbe,
    workers: usize,
) -> Vec<HostStatus> {
    if let Err(e) = reference.fetch_all() {
        tracing::warn!(error = %e, "fetch failed; comparing against local refs");
    }
    let expected: Vec<(InstrumentRecord, Option<String>)> = instruments
        .iter()
        .map(|i| {
            let head = reference.rev_parse(&format!("origin/{}", i.host_name));
            if let Err(e) = &head {
                tracing::debug!(host = %i.host_name, error = %e, "no reference branch");
            }
            (i.clone(), head.ok())
        })
        .collect();

    let statuses = map_bounded(&expected, workers, |(instrument, expected)| {
        compare(instrument, expected.as_deref(), probe)
    });
    let failed = statuses.iter().filter(|s| s.outcome.is_failure()).count();
    tracing::info!(hosts = statuses.len(), failed, "consistency scan finished");
    statuses
}

fn compare(instrument: &InstrumentRecord, expected: Option<&str>, probe: &dyn HeadProbe) -> HostStatus {
    let host = instrument.host_name.clone();
    let context = || -> BTreeMap<String, String> {
        BTreeMap::from([
            ("instrument".to_string(), instrument.name.clone()),
            ("host".to_string(), host.clone()),
        ])
    };
    let status = |found: Option<String>, outcome: Outcome| HostStatus {
        instrument: instrument.name.clone(),
        host: host.clone(),
        expected: expected.map(str::to_string),
        found,
        outcome,
    };

    let Some(expected) = expected else {
        return status(
            None,
            Outcome::skipped(format!("no branch origin/{host} in the reference repository")),
        );
    };
    match probe.head(instrument) {
        Err(e) => status(
            None,
            Outcome::failed(
                Diagnostic::error(codes::HOST_UNREACHABLE, format!("cannot read {host}: {e}"))
                    .with_context(context()),
            ),
        ),
        Ok(None) => status(
            None,
            Outcome::failed(
                Diagnostic::error(codes::HOST_UNREACHABLE, format!("{host} reported no HEAD"))
                    .with_context(context()),
            ),
        ),
        Ok(Some(found)) if found == expected => status(Some(found), Outcome::Passed),
        Ok(Some(found)) => {
            let diag = Diagnostic::error(
                codes::HEAD_MISMATCH,
                format!("{host} is at {found} but origin/{host} is at {expected}"),
            )
            .with_context(context());
            status(Some(found), Outcome::failed(diag))
        }
    }
}
