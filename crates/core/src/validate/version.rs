use std::collections::BTreeMap;

use instcheck_diagnostics::{Diagnostic, codes};

use super::{InstrumentContext, Outcome, error_diagnostic};
use crate::version::{VERSION_FILE, versions_similar};

/// Servers built from development branches report this release.
const DEVELOPMENT_RELEASE: &str = "0.0.0";

pub(super) fn file_exists(ctx: &InstrumentContext) -> Outcome {
    let file = ctx.version_file();
    if file.exists() {
        Outcome::Passed
    } else {
        Outcome::failed(
            Diagnostic::error(codes::VERSION_FILE_MISSING, "config version file did not exist")
                .with_context(ctx!("file" => file.path().display().to_string())),
        )
    }
}

pub(super) fn single_file(ctx: &InstrumentContext) -> Outcome {
    let found = ctx.version_file().count_version_files();
    if found <= 1 {
        return Outcome::Passed;
    }
    Outcome::failed(
        Diagnostic::error(
            codes::EXTRA_VERSION_FILES,
            format!("there should not be more than one '{VERSION_FILE}' file in the repository; found {found}"),
        )
        .with_context(ctx!("count" => found.to_string())),
    )
}

pub(super) fn matches_server(ctx: &InstrumentContext) -> Outcome {
    let file = ctx.version_file();
    if !file.exists() {
        return Outcome::skipped("version file did not exist");
    }
    let Some(server) = ctx.server_version.as_deref() else {
        return Outcome::skipped("couldn't read the version PV on the server");
    };
    if server.starts_with(DEVELOPMENT_RELEASE) {
        return Outcome::Passed;
    }
    let config = match file.read() {
        Ok(version) => version,
        Err(e) => return Outcome::failed(error_diagnostic(&e, None)),
    };
    if versions_similar(&config, server) {
        return Outcome::Passed;
    }
    Outcome::failed(
        Diagnostic::error(
            codes::VERSION_MISMATCH,
            format!("config version was wrong. Server version={server}, config version={config}"),
        )
        .with_context(ctx!("server" => server, "config" => config.as_str())),
    )
}
