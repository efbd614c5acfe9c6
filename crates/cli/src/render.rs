//! Pretty report rendering using ariadne.
//!
//! Converts [`Diagnostic`]s into ariadne [`Report`]s for coloured,
//! source-annotated terminal output when the diagnostic points into a file.
//! Falls back to structured JSON when the output is piped or when the user
//! explicitly requests it.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, IsTerminal};

use anyhow::Result;
use ariadne::{Color, Config, Fmt, IndexType, Label, Report, ReportKind, Source};
use instcheck_core::consistency::HostStatus;
use instcheck_core::usage::InstrumentUsage;
use instcheck_core::{InstrumentReport, Outcome, RunSummary};
use instcheck_diagnostics::{Diagnostic, Severity};
use serde::Serialize;

// ── Output format ───────────────────────────────────────────────────────

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Format {
    /// Coloured, source-annotated output (ariadne).
    Pretty,
    /// Machine-readable JSON.
    Json,
}

impl Format {
    /// Use the explicit choice, else pretty for terminals and JSON for pipes.
    pub(crate) fn resolve_or_detect(explicit: Option<&str>) -> Self {
        match explicit {
            Some("json") => Format::Json,
            Some("pretty") => Format::Pretty,
            _ => {
                if io::stdout().is_terminal() {
                    Format::Pretty
                } else {
                    Format::Json
                }
            }
        }
    }
}

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── Severity mapping ────────────────────────────────────────────────────

fn report_kind(severity: &Severity) -> ReportKind<'static> {
    match severity {
        Severity::Error => ReportKind::Error,
        Severity::Warn => ReportKind::Warning,
        Severity::Info => ReportKind::Advice,
        _ => ReportKind::Warning,
    }
}

fn severity_color(severity: &Severity) -> Color {
    match severity {
        Severity::Error => Color::Red,
        Severity::Warn => Color::Yellow,
        Severity::Info => Color::Blue,
        _ => Color::White,
    }
}

fn context_note(diag: &Diagnostic) -> Option<String> {
    let ctx = diag.context.as_ref().filter(|ctx| !ctx.is_empty())?;
    Some(
        ctx.iter()
            .filter(|(k, _)| k.as_str() != "diff")
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

// ── Diagnostics ─────────────────────────────────────────────────────────

/// Render diagnostics to stderr.
///
/// A diagnostic with a span and a readable `file` context is rendered with
/// source context; anything else as a standalone message.
pub(crate) fn render_diagnostics_pretty(diagnostics: &[Diagnostic]) {
    for diag in diagnostics {
        let source = diag
            .span
            .and_then(|span| Some((span, diag.context_value("file")?)))
            .and_then(|(span, file)| Some((span, file, fs::read_to_string(file).ok()?)));
        match source {
            Some((span, file, text)) => render_with_source(diag, file, &text, span.start, span.end),
            None => render_standalone(diag),
        }
    }
}

fn render_with_source(diag: &Diagnostic, filename: &str, source: &str, start: usize, end: usize) {
    // Clamp span to source length to avoid panics on a file edited since the check.
    let start = start.min(source.len());
    let end = end.min(source.len()).max(start);
    let config = Config::default()
        .with_compact(false)
        .with_index_type(IndexType::Byte);

    let mut builder = Report::build(report_kind(&diag.severity), (filename, start..end))
        .with_code(diag.id.as_ref())
        .with_message(&diag.message)
        .with_config(config)
        .with_label(
            Label::new((filename, start..end))
                .with_message(diag.context_value("error").unwrap_or(&diag.message))
                .with_color(severity_color(&diag.severity)),
        );
    if let Some(note) = context_note(diag) {
        builder = builder.with_note(note);
    }
    if let Some(explanation) = diag.explain() {
        builder = builder.with_help(explanation);
    }
    let mut cache = (filename, Source::from(source));
    builder.finish().eprint(&mut cache).ok();
}

fn render_standalone(diag: &Diagnostic) {
    let kind_str = match diag.severity {
        Severity::Error => "error",
        Severity::Warn => "warning",
        Severity::Info => "info",
        _ => "diagnostic",
    };
    eprintln!(
        "{}[{}]: {}",
        kind_str.fg(severity_color(&diag.severity)),
        diag.id,
        diag.message
    );
    if let Some(note) = context_note(diag) {
        eprintln!("  = note: {note}");
    }
    if let Some(diff) = diag.context_value("diff") {
        for line in diff.lines() {
            eprintln!("  | {line}");
        }
    }
    if let Some(explanation) = diag.explain() {
        eprintln!("  = help: {explanation}");
    }
}

// ── Reports ─────────────────────────────────────────────────────────────

/// One coloured line of outcome counts, e.g. `118 passed, 2 failed, 9 skipped`.
fn print_counts(report: &InstrumentReport) {
    let passed = report.count(|o| matches!(o, Outcome::Passed));
    let warned = report.count(|o| matches!(o, Outcome::Warned(_)));
    let failed = report.count(Outcome::is_failure);
    let skipped = report.count(Outcome::is_skipped);

    let mut parts = vec![format!("{}", format!("{passed} passed").fg(Color::Green))];
    if warned > 0 {
        parts.push(format!("{}", format!("{warned} warned").fg(Color::Yellow)));
    }
    if failed > 0 {
        parts.push(format!("{}", format!("{failed} failed").fg(Color::Red)));
    }
    if skipped > 0 {
        parts.push(format!("{}", format!("{skipped} skipped").fg(Color::Blue)));
    }
    eprintln!("{}", parts.join(", "));
}

fn render_report_pretty(report: &InstrumentReport) {
    eprintln!("{}", format!("── {} ──", report.instrument).fg(Color::Cyan));
    if let Some(failure) = &report.phase_failure {
        render_diagnostics_pretty(std::slice::from_ref(failure));
        return;
    }
    for result in &report.results {
        let diagnostics = result.outcome.diagnostics();
        if diagnostics.is_empty() {
            continue;
        }
        eprintln!("{} on {}:", result.check, result.subject);
        render_diagnostics_pretty(diagnostics);
    }
    let counts = report.non_interesting_block_pvs;
    if counts.configurations + counts.components > 0 {
        eprintln!(
            "block PVs without an interest level: {} in configurations, {} in components",
            counts.configurations, counts.components
        );
    }
    print_counts(report);
}

/// Render one instrument's report.
pub(crate) fn render_report(report: &InstrumentReport, format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(report),
        Format::Pretty => {
            render_report_pretty(report);
            Ok(())
        }
    }
}

/// Render a whole run.
pub(crate) fn render_run(summary: &RunSummary, format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(summary),
        Format::Pretty => {
            for report in &summary.instruments {
                render_report_pretty(report);
            }
            if !summary.excluded.is_empty() {
                eprintln!("excluded: {}", summary.excluded.join(", "));
            }
            let failed: Vec<&str> = summary
                .instruments
                .iter()
                .filter(|r| !r.success())
                .map(|r| r.instrument.as_str())
                .collect();
            let totals = summary.total_non_interesting();
            eprintln!(
                "block PVs without an interest level across the run: {} in configurations, {} in components",
                totals.configurations, totals.components
            );
            if failed.is_empty() {
                eprintln!("{}", "all instruments passed".fg(Color::Green));
            } else {
                eprintln!("{} {}", "failed:".fg(Color::Red), failed.join(", "));
            }
            Ok(())
        }
    }
}

// ── Usage ───────────────────────────────────────────────────────────────

/// Render the IOC usage survey.
///
/// With `ioc`, only instruments holding an IOC starting with it are listed.
pub(crate) fn render_usage(
    usage: &BTreeMap<String, InstrumentUsage>,
    ioc: Option<&str>,
    device_screens: bool,
    format: Format,
) -> Result<()> {
    if format == Format::Json {
        let out: BTreeMap<&str, serde_json::Value> = usage
            .iter()
            .map(|(instrument, found)| {
                let iocs: Vec<&str> = match ioc {
                    Some(prefix) => found.iocs_matching(prefix).collect(),
                    None => found.iocs.iter().map(String::as_str).collect(),
                };
                let mut entry = serde_json::json!({ "iocs": iocs });
                if device_screens {
                    entry["device_screens"] = serde_json::json!(found.device_screens);
                }
                (instrument.as_str(), entry)
            })
            .collect();
        return print_json(&out);
    }

    match ioc {
        Some(prefix) => {
            println!("Instruments containing IOCs starting with {prefix}");
            for (instrument, found) in usage {
                for ioc in found.iocs_matching(prefix) {
                    println!("{instrument} has {ioc}");
                }
            }
        }
        None => {
            for (instrument, found) in usage {
                println!("{instrument}");
                for ioc in &found.iocs {
                    println!("    - {ioc}");
                }
            }
        }
    }
    if device_screens {
        println!("\nDevice screens:");
        for (instrument, found) in usage {
            println!("{instrument}");
            for screen in &found.device_screens {
                println!("    - {screen}");
            }
        }
    }
    Ok(())
}

// ── Consistency ─────────────────────────────────────────────────────────

/// Render the host consistency scan.
pub(crate) fn render_consistency(statuses: &[HostStatus], format: Format) -> Result<()> {
    match format {
        Format::Json => print_json(statuses),
        Format::Pretty => {
            for status in statuses {
                let label = status.outcome.label();
                let colored = match &status.outcome {
                    Outcome::Passed => label.fg(Color::Green),
                    Outcome::Skipped(_) => label.fg(Color::Blue),
                    Outcome::Warned(_) => label.fg(Color::Yellow),
                    _ => label.fg(Color::Red),
                };
                eprintln!("{} ({}): {colored}", status.instrument, status.host);
                if let Outcome::Skipped(reason) = &status.outcome {
                    eprintln!("  = note: {reason}");
                }
                render_diagnostics_pretty(status.outcome.diagnostics());
            }
            Ok(())
        }
    }
}
