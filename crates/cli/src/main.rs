mod logging;
mod render;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use instcheck_core::consistency::{self, LsRemoteProbe};
use instcheck_core::runner::select_instruments;
use instcheck_core::{InstrumentContext, InstrumentReport, Runner, Settings, check_instrument, usage};
use instcheck_diagnostics as diag;
use instcheck_git::GitRepo;
use instcheck_pv::{InstrumentRecord, PvGateway, SnapshotSource, ValueSource, live_source};

use crate::render::{Format, print_json, render_consistency, render_report, render_run, render_usage};

// ── CLI definition ──────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "instcheck",
    version,
    about = "Check instrument configuration repositories against each other and the control system"
)]
struct Cli {
    /// Settings file (TOML). `INSTCHECK_*` environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output mode: "pretty" for coloured terminal output, "json" for
    /// machine-readable JSON. Defaults to "pretty" when stdout is a TTY,
    /// "json" otherwise.
    #[arg(long, global = true, value_parser = ["pretty", "json"])]
    output: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

/// Where PV values come from.
#[derive(Args, Debug)]
struct PvArgs {
    /// Read PVs from a JSON snapshot (`{"PV": "value", ...}`) instead of `caget`.
    #[arg(long)]
    pv_snapshot: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    // ── Validation ──────────────────────────────────────────────────
    /// Check every instrument (or the listed ones): sync each branch, run
    /// the suite and write `<reports-path>/<instrument>/report.json`.
    ///
    /// Both repositories are forcibly cleaned and reset.
    Run {
        #[arg(long)]
        configs_repo_path: PathBuf,
        #[arg(long)]
        gui_repo_path: PathBuf,
        #[arg(long)]
        reports_path: PathBuf,
        /// Only these instruments.
        #[arg(long, num_args = 1..)]
        instruments: Option<Vec<String>>,
        #[command(flatten)]
        pv: PvArgs,
    },

    /// Check the current checkout for one instrument, without touching git.
    Check {
        #[arg(long)]
        configs_repo_path: PathBuf,
        /// GUI checkout for the synoptic target and type checks.
        #[arg(long)]
        gui_repo_path: Option<PathBuf>,
        #[arg(long)]
        instrument: String,
        /// Instrument PV prefix; defaults to `IN:<INSTRUMENT>:`.
        #[arg(long)]
        pv_prefix: Option<String>,
        /// Do not read any PVs; every server-dependent check is skipped.
        #[arg(long, conflicts_with = "pv_snapshot")]
        offline: bool,
        #[command(flatten)]
        pv: PvArgs,
    },

    // ── Surveys ─────────────────────────────────────────────────────
    /// List the IOCs each instrument's configurations and components use.
    IocUsage {
        #[arg(long)]
        configs_repo_path: PathBuf,
        /// Only these instruments.
        #[arg(long, num_args = 1..)]
        instruments: Option<Vec<String>>,
        /// Show instruments with an IOC starting with this (case-insensitive).
        #[arg(long)]
        ioc: Option<String>,
        /// Also list device screens.
        #[arg(long)]
        device_screens: bool,
        #[command(flatten)]
        pv: PvArgs,
    },

    /// Compare each host's checked-out commit with its branch head.
    Consistency {
        /// Reference clone holding an `origin/<host>` branch per instrument.
        #[arg(long)]
        configs_repo_path: PathBuf,
        /// Remote URL per host; `{host}` and `{name}` are substituted.
        #[arg(long)]
        url_template: String,
        /// Only these instruments.
        #[arg(long, num_args = 1..)]
        instruments: Option<Vec<String>>,
        #[command(flatten)]
        pv: PvArgs,
    },

    // ── Reference ───────────────────────────────────────────────────
    /// Explain a diagnostic ID (e.g. CFG2004).
    Explain { id: String },
}

// ── Main ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = Format::resolve_or_detect(cli.output.as_deref());

    if let Cmd::Explain { id } = &cli.cmd {
        return cmd_explain(id, format);
    }

    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    logging::init(&settings.log_level);
    let settings = Arc::new(settings);

    let ok = match cli.cmd {
        Cmd::Run {
            configs_repo_path,
            gui_repo_path,
            reports_path,
            instruments,
            pv,
        } => cmd_run(
            settings,
            &pv,
            configs_repo_path,
            gui_repo_path,
            &reports_path,
            instruments.as_deref(),
            format,
        )?,
        Cmd::Check {
            configs_repo_path,
            gui_repo_path,
            instrument,
            pv_prefix,
            offline,
            pv,
        } => {
            let gateway = if offline { None } else { Some(gateway(&settings, &pv)?) };
            cmd_check(
                settings,
                gateway.as_ref(),
                configs_repo_path,
                gui_repo_path,
                instrument,
                pv_prefix,
                format,
            )?
        }
        Cmd::IocUsage {
            configs_repo_path,
            instruments,
            ioc,
            device_screens,
            pv,
        } => cmd_ioc_usage(
            &settings,
            &pv,
            &configs_repo_path,
            instruments.as_deref(),
            ioc.as_deref(),
            device_screens,
            format,
        )?,
        Cmd::Consistency {
            configs_repo_path,
            url_template,
            instruments,
            pv,
        } => cmd_consistency(
            &settings,
            &pv,
            &configs_repo_path,
            &url_template,
            instruments.as_deref(),
            format,
        )?,
        Cmd::Explain { .. } => true,
    };

    if !ok {
        process::exit(1);
    }
    Ok(())
}

// ── Commands ────────────────────────────────────────────────────────────

fn cmd_run(
    settings: Arc<Settings>,
    pv: &PvArgs,
    configs_repo_path: PathBuf,
    gui_repo_path: PathBuf,
    reports_path: &Path,
    instruments: Option<&[String]>,
    format: Format,
) -> Result<bool> {
    let gateway = gateway(&settings, pv)?;
    let runner = Runner::new(settings, gateway, configs_repo_path, gui_repo_path);
    let selected = runner.select_instruments(instruments)?;
    let summary = runner.run_all(&selected);
    for report in &summary.instruments {
        write_report(reports_path, report)?;
    }
    render_run(&summary, format)?;
    Ok(summary.success())
}

fn cmd_check(
    settings: Arc<Settings>,
    gateway: Option<&PvGateway>,
    configs_repo_path: PathBuf,
    gui_repo_path: Option<PathBuf>,
    name: String,
    pv_prefix: Option<String>,
    format: Format,
) -> Result<bool> {
    let instrument = InstrumentRecord {
        host_name: format!("NDX{name}"),
        pv_prefix: pv_prefix.unwrap_or_else(|| format!("IN:{name}:")),
        name,
    };
    let ctx = match gateway {
        Some(gateway) => {
            InstrumentContext::bind(instrument, configs_repo_path, gui_repo_path, gateway, settings)
        }
        None => {
            let ctx = InstrumentContext::offline(instrument, configs_repo_path, settings);
            match gui_repo_path {
                Some(gui) => ctx.with_gui_repo(gui),
                None => ctx,
            }
        }
    };
    let report = check_instrument(&ctx);
    render_report(&report, format)?;
    Ok(report.success())
}

fn cmd_ioc_usage(
    settings: &Settings,
    pv: &PvArgs,
    configs_repo_path: &Path,
    instruments: Option<&[String]>,
    ioc: Option<&str>,
    device_screens: bool,
    format: Format,
) -> Result<bool> {
    let gateway = gateway(settings, pv)?;
    let selected = select_instruments(&gateway, instruments)?;
    let found = usage::survey(configs_repo_path, &selected, settings);
    render_usage(&found, ioc, device_screens, format)?;
    Ok(found.len() == selected.len())
}

fn cmd_consistency(
    settings: &Settings,
    pv: &PvArgs,
    configs_repo_path: &Path,
    url_template: &str,
    instruments: Option<&[String]>,
    format: Format,
) -> Result<bool> {
    let gateway = gateway(settings, pv)?;
    let selected = select_instruments(&gateway, instruments)?;
    let reference = GitRepo::new(configs_repo_path).with_timeout(settings.git_timeout());
    let probe = LsRemoteProbe::new(url_template, settings.git_timeout());
    let statuses = consistency::scan(&reference, &selected, &probe, settings.host_workers);
    render_consistency(&statuses, format)?;
    Ok(!statuses.iter().any(|s| s.outcome.is_failure()))
}

fn cmd_explain(id: &str, format: Format) -> Result<()> {
    match format {
        Format::Json => {
            let out = serde_json::json!({
                "id": id,
                "severity": diag::severity_for_code(id),
                "explanation": diag::explain(id),
            });
            print_json(&out)?;
        }
        Format::Pretty => {
            // The explanation is the command output, so it goes to stdout.
            if let Some(text) = diag::explain(id) {
                use ariadne::Fmt;
                println!("{}: {}", id.fg(ariadne::Color::Cyan), text);
            } else {
                println!("{id}: (no explanation available)");
            }
        }
    }
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────────

/// Gateway over the snapshot when one is given, else over `caget`.
fn gateway(settings: &Settings, pv: &PvArgs) -> Result<PvGateway> {
    let source: Arc<dyn ValueSource> = match &pv.pv_snapshot {
        Some(path) => Arc::new(
            SnapshotSource::load(path)
                .with_context(|| format!("failed to load PV snapshot {}", path.display()))?,
        ),
        None => live_source(&settings.pv_config()),
    };
    Ok(PvGateway::new(source))
}

/// Write `<reports>/<instrument>/report.json`.
fn write_report(reports_path: &Path, report: &InstrumentReport) -> Result<()> {
    let dir = reports_path.join(&report.instrument);
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join("report.json");
    let json = serde_json::to_string_pretty(report)?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(instrument = %report.instrument, path = %path.display(), "report written");
    Ok(())
}
