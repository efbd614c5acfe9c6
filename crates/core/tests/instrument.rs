//! End-to-end suite runs over temporary configuration repositories.
//!
//! No git or network access: contexts are built offline or bound to an
//! in-memory value source.

mod common;

use std::sync::Arc;

use common::{Repo, instrument, offline, result};
use instcheck_core::{
    InstrumentContext, InstrumentReport, Outcome, Settings, Severity, Subject, check_instrument,
    codes,
};
use instcheck_pv::decode::compress_and_hex;
use instcheck_pv::{MapSource, PvGateway};
use serde_json::json;

fn configuration(name: &str) -> Subject {
    Subject::Configuration(name.to_string())
}

fn component(name: &str) -> Subject {
    Subject::Component(name.to_string())
}

// ─── Offline runs ────────────────────────────────────────────────────────────

#[test]
fn clean_repository_passes() {
    let repo = Repo::new();
    repo.version("12.0.0")
        .component("TEMPERATURE", &[("LKSH336_01", &[])], &["T_SAMPLE"])
        .configuration("default", &[("SIMPLE_01", &[])], &["TEMP"], &["_base", "TEMPERATURE"]);

    let report = check_instrument(&offline(&repo, "LARMOR"));

    let failures: Vec<_> = report.failures().collect();
    assert!(failures.is_empty(), "unexpected failures: {failures:#?}");
    assert!(report.success());
    assert_eq!(
        result(&report, "configurations.exist", &Subject::Instrument).outcome,
        Outcome::Passed
    );
    assert!(
        result(&report, "live.beckhoff-delay", &Subject::Instrument)
            .outcome
            .is_skipped()
    );
}

#[test]
fn case_insensitive_duplicate_block_across_component() {
    let repo = Repo::new();
    repo.version("12.0.0")
        .component("comp", &[], &["CY"])
        .configuration("cfg", &[], &["Cy"], &["comp"]);

    let report = check_instrument(&offline(&repo, "LARMOR"));

    let unique = result(&report, "configurations.unique-blocks", &configuration("cfg"));
    let diags = unique.outcome.diagnostics();
    assert_eq!(diags.len(), 1, "{diags:#?}");
    assert_eq!(diags[0].id, codes::DUPLICATE_BLOCK_IGNORING_CASE);
    assert!(diags[0].message.contains("Cy"), "{}", diags[0].message);
    assert!(diags[0].message.contains("CY"), "{}", diags[0].message);
    assert!(!report.success());
}

#[test]
fn exact_duplicate_ioc_through_component() {
    let repo = Repo::new();
    repo.version("12.0.0")
        .component("motors", &[("GALIL_01", &[])], &[])
        .configuration("cfg", &[("GALIL_01", &[])], &[], &["motors"]);

    let report = check_instrument(&offline(&repo, "LARMOR"));

    let unique = result(&report, "configurations.unique-iocs", &configuration("cfg"));
    assert_eq!(unique.outcome.diagnostics()[0].id, codes::DUPLICATE_IOC);
}

#[test]
fn unknown_server_skips_ioc_membership() {
    let repo = Repo::new();
    repo.version("12.0.0")
        .configuration("cfg", &[("MYSTERY_01", &[])], &[], &[]);

    let report = check_instrument(&offline(&repo, "LARMOR"));

    for check in ["configurations.valid-iocs", "configurations.protected-iocs"] {
        let r = result(&report, check, &configuration("cfg"));
        assert!(r.outcome.is_skipped(), "{check}: {:?}", r.outcome);
    }
}

#[test]
fn missing_synoptics_directory_fails_enumeration() {
    let repo = Repo::new();
    std::fs::remove_dir(repo.path().join("configurations/synoptics")).unwrap();

    let report = check_instrument(&offline(&repo, "LARMOR"));

    let failure = report.phase_failure.as_ref().expect("phase failure");
    assert_eq!(failure.id, codes::ENUMERATION_FAILED);
    assert!(report.results.is_empty());
    assert!(!report.success());
}

#[test]
fn skip_table_is_honoured_per_instrument() {
    let repo = Repo::new();
    repo.version("12.0.0").configuration(
        "cfg",
        &[("GALIL_01", &[("MTRCTRL", "1")])],
        &[],
        &[],
    );

    let demo = check_instrument(&offline(&repo, "DEMO"));
    let r = result(&demo, "configurations.motor-macros", &configuration("cfg"));
    assert!(r.outcome.is_skipped());

    let larmor = check_instrument(&offline(&repo, "LARMOR"));
    let r = result(&larmor, "configurations.motor-macros", &configuration("cfg"));
    assert_eq!(r.outcome.diagnostics()[0].id, codes::MOTOR_MACROS_MISMATCH);
}

#[test]
fn malformed_blocks_file_is_reported_with_a_span() {
    let repo = Repo::new();
    repo.version("12.0.0")
        .configuration("cfg", &[], &[], &[])
        .write("configurations/configurations/cfg/blocks.xml", "<blocks>\n<block>\n</blocks>");

    let report = check_instrument(&offline(&repo, "LARMOR"));

    let r = result(&report, "configurations.well-formed-xml", &configuration("cfg"));
    let diag = &r.outcome.diagnostics()[0];
    assert_eq!(diag.id, codes::MALFORMED_XML);
    assert!(diag.span.is_some());
}

#[test]
fn missing_version_file_fails_and_skips_synoptics() {
    let repo = Repo::new();
    repo.configuration("cfg", &[], &[], &[]).write(
        "configurations/synoptics/beamline.xml",
        r#"<instrument xmlns="http://www.isis.stfc.ac.uk//instrument"><components/></instrument>"#,
    );

    let report = check_instrument(&offline(&repo, "LARMOR"));

    let exists = result(&report, "version.file-exists", &Subject::Instrument);
    assert_eq!(exists.outcome.diagnostics()[0].id, codes::VERSION_FILE_MISSING);
    let addresses = result(
        &report,
        "synoptic.pv-addresses",
        &Subject::Synoptic("beamline.xml".to_string()),
    );
    assert!(addresses.outcome.is_skipped());
}

// ─── Bound to a value source ─────────────────────────────────────────────────

fn bound(repo: &Repo) -> InstrumentContext {
    bound_with(repo, &[])
}

/// Bound to a running LARMOR, plus `live` values named without the prefix.
fn bound_with(repo: &Repo, live: &[(&str, &str)]) -> InstrumentContext {
    let mut source = MapSource::new()
        .with(
            "IN:LARMOR:CS:BLOCKSERVER:IOCS",
            compress_and_hex(&json!({"SIMPLE_01": {}, "INSTETC_01": {}})).unwrap(),
        )
        .with(
            "IN:LARMOR:CS:BLOCKSERVER:IOCS_NOT_TO_STOP",
            compress_and_hex(&json!(["INSTETC_01"])).unwrap(),
        )
        .with("IN:LARMOR:CS:VERSION:SVN:REV", "12.0.0.abcdef");
    for (name, value) in live {
        source.insert(format!("IN:LARMOR:{name}"), *value);
    }
    let gateway = PvGateway::new(Arc::new(source));
    InstrumentContext::bind(
        instrument("LARMOR"),
        repo.path(),
        None,
        &gateway,
        Arc::new(Settings::default()),
    )
}

#[test]
fn server_sets_drive_ioc_membership() {
    let repo = Repo::new();
    repo.version("12.0.0")
        .component("_base", &[("INSTETC_01", &[])], &[])
        .configuration(
            "cfg",
            &[("SIMPLE_01", &[]), ("INSTETC_01", &[]), ("MYSTERY_01", &[])],
            &[],
            &[],
        );

    let report = check_instrument(&bound(&repo));

    let valid = result(&report, "configurations.valid-iocs", &configuration("cfg"));
    let unknown: Vec<_> = valid
        .outcome
        .diagnostics()
        .iter()
        .map(|d| d.context_value("ioc"))
        .collect();
    assert_eq!(unknown, [Some("MYSTERY_01")]);

    let protected = result(&report, "configurations.protected-iocs", &configuration("cfg"));
    assert_eq!(protected.outcome.diagnostics()[0].id, codes::PROTECTED_IOC);

    let base = result(&report, "components.protected-iocs", &component("_base"));
    assert_eq!(base.outcome, Outcome::Passed);

    let version = result(&report, "version.matches-server", &Subject::Instrument);
    assert_eq!(version.outcome, Outcome::Passed);
}

#[test]
fn live_checks_run_when_the_server_answers() {
    let repo = Repo::new();
    repo.version("12.0.0").configuration("cfg", &[("SIMPLE_01", &[])], &[], &[]);

    let report = check_instrument(&bound(&repo));

    assert_eq!(
        result(&report, "live.beckhoff-delay", &Subject::Instrument).outcome,
        Outcome::Passed
    );
    assert!(
        result(&report, "live.run-number-headroom", &Subject::Instrument)
            .outcome
            .is_skipped()
    );
}

#[test]
fn block_pvs_outside_every_interest_tier_only_warn() {
    let repo = Repo::new();
    repo.version("12.0.0")
        .configuration("cfg", &[("SIMPLE_01", &[])], &["TEMP", "FIELD"], &[]);
    let high =
        compress_and_hex(&json!([["IN:TEST:TEMP:PV", "ai", "Temperature", ""]])).unwrap();
    let ctx = bound_with(&repo, &[("CS:BLOCKSERVER:PVS:INTEREST:HIGH", high.as_str())]);

    let report = check_instrument(&ctx);

    let r = result(&report, "configurations.interesting-block-pvs", &Subject::Instrument);
    let diags = r.outcome.diagnostics();
    assert!(matches!(r.outcome, Outcome::Warned(_)), "{:?}", r.outcome);
    assert_eq!(diags[0].id, codes::NON_INTERESTING_BLOCK_PVS);
    assert_eq!(diags[0].severity, Severity::Warn);
    assert!(diags[0].message.contains("IN:TEST:FIELD:PV"), "{}", diags[0].message);
    assert_eq!(report.non_interesting_block_pvs.configurations, 1);
    assert!(report.success());
}

/// The single diagnostic of a failed live check, and the axis it names.
fn live_failure(report: &InstrumentReport, check: &str) -> (String, Option<String>) {
    let r = result(report, check, &Subject::Instrument);
    let diags = r.outcome.diagnostics();
    assert_eq!(diags.len(), 1, "{check}: {:?}", r.outcome);
    assert!(r.outcome.is_failure(), "{check}: {:?}", r.outcome);
    (diags[0].id.to_string(), diags[0].context_value("axis").map(str::to_string))
}

#[test]
fn beckhoff_axis_with_zero_delay_fails() {
    let repo = Repo::new();
    repo.version("12.0.0").configuration("cfg", &[], &[], &[]);
    let ctx = bound_with(
        &repo,
        &[
            ("MOT:MTR0101_IOCNAME", "TC_01"),
            ("MOT:MTR0101.DLY", "0.5"),
            ("MOT:MTR0103_IOCNAME", "TC_01"),
            ("MOT:MTR0103.DLY", "0"),
            ("MOT:MTR0104_IOCNAME", "GALIL_02"),
            ("MOT:MTR0104.DLY", "0"),
        ],
    );

    let report = check_instrument(&ctx);

    let (id, axis) = live_failure(&report, "live.beckhoff-delay");
    assert_eq!(id, codes::BECKHOFF_ZERO_DELAY);
    assert_eq!(axis.as_deref(), Some("MOT:MTR0103"));
}

#[test]
fn closed_loop_galil_axis_with_zero_tolerance_fails() {
    let repo = Repo::new();
    repo.version("12.0.0").configuration("cfg", &[], &[], &[]);
    let ctx = bound_with(
        &repo,
        &[
            ("MOT:MTR0201_IOCNAME", "GALIL_02"),
            ("MOT:MTR0201_MOT_ENC_SYNC_TOL_SP", "0"),
            ("MOT:MTR0201.UEIP", "1"),
            ("MOT:MTR0202_IOCNAME", "GALIL_02"),
            ("MOT:MTR0202_MOT_ENC_SYNC_TOL_SP", "0.2"),
            ("MOT:MTR0202.UEIP", "Yes"),
        ],
    );

    let report = check_instrument(&ctx);

    let (id, axis) = live_failure(&report, "live.galil-sync-tolerance");
    assert_eq!(id, codes::GALIL_ZERO_SYNC_TOLERANCE);
    assert_eq!(axis.as_deref(), Some("MOT:MTR0201"));
}

#[test]
fn open_loop_galil_axis_may_have_zero_tolerance() {
    let repo = Repo::new();
    repo.version("12.0.0").configuration("cfg", &[], &[], &[]);
    let ctx = bound_with(
        &repo,
        &[
            ("MOT:MTR0201_IOCNAME", "GALIL_02"),
            ("MOT:MTR0201_MOT_ENC_SYNC_TOL_SP", "0"),
            ("MOT:MTR0201.UEIP", "0"),
        ],
    );

    let report = check_instrument(&ctx);

    assert_eq!(
        result(&report, "live.galil-sync-tolerance", &Subject::Instrument).outcome,
        Outcome::Passed
    );
}

#[test]
fn run_number_near_its_digit_capacity_fails() {
    let repo = Repo::new();
    repo.version("12.0.0").configuration("cfg", &[], &[], &[]);

    let report = check_instrument(&bound_with(&repo, &[("DAE:RUNNUMBER", "9500")]));
    let (id, _) = live_failure(&report, "live.run-number-headroom");
    assert_eq!(id, codes::RUN_NUMBER_NEAR_LIMIT);

    let report = check_instrument(&bound_with(&repo, &[("DAE:RUNNUMBER", "00095000")]));
    assert_eq!(
        result(&report, "live.run-number-headroom", &Subject::Instrument).outcome,
        Outcome::Passed
    );
}
