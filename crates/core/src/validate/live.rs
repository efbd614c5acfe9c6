//! Diagnostics that read live values from a running instrument.
//!
//! All of them skip when live diagnostics are disabled, when there is no
//! gateway, or when none of the server queries answered during binding.

use std::collections::BTreeMap;

use instcheck_diagnostics::{Diagnostic, codes};
use instcheck_pv::PvGateway;

use super::{InstrumentContext, Outcome};
use crate::pool::map_bounded;

const CONTROLLERS: u32 = 16;
const MOTORS_PER_CONTROLLER: u32 = 8;

/// Fraction of the run number's digit capacity that fails the check.
const RUN_NUMBER_LIMIT: f64 = 0.9;

fn gateway(ctx: &InstrumentContext) -> Result<&PvGateway, Outcome> {
    if !ctx.settings.live_diagnostics {
        return Err(Outcome::skipped("live diagnostics are disabled"));
    }
    let Some(pv) = &ctx.live else {
        return Err(Outcome::skipped("no connection to live values"));
    };
    if ctx.appears_offline() {
        return Err(Outcome::skipped("instrument appears to be off"));
    }
    Ok(pv)
}

/// `MOT:MTR0101` to `MOT:MTR1608`.
fn axes() -> Vec<String> {
    (1..=CONTROLLERS)
        .flat_map(|c| (1..=MOTORS_PER_CONTROLLER).map(move |m| format!("MOT:MTR{c:02}{m:02}")))
        .collect()
}

/// Run `probe` on every axis through the worker pool and gather its findings.
fn scan_axes<F>(ctx: &InstrumentContext, pv: &PvGateway, probe: F) -> Outcome
where
    F: Fn(&PvGateway, &str) -> Option<Diagnostic> + Sync,
{
    let axes = axes();
    let findings = map_bounded(&axes, ctx.settings.motor_workers, |axis| probe(pv, axis));
    Outcome::from_diagnostics(findings.into_iter().flatten().collect())
}

fn controller_is(pv: &PvGateway, axis: &str, ioc_prefix: &str) -> bool {
    pv.get_value(&format!("{axis}_IOCNAME"))
        .is_some_and(|ioc| ioc.trim().starts_with(ioc_prefix))
}

/// Enum and numeric field values that mean "enabled".
fn truthy(value: &str) -> bool {
    let value = value.trim();
    match value.parse::<f64>() {
        Ok(n) => n != 0.0,
        Err(_) => !value.is_empty() && !value.eq_ignore_ascii_case("no"),
    }
}

pub(super) fn beckhoff_delay(ctx: &InstrumentContext) -> Outcome {
    let pv = match gateway(ctx) {
        Ok(pv) => pv,
        Err(skip) => return skip,
    };
    scan_axes(ctx, pv, |pv, axis| {
        if !controller_is(pv, axis, "TC_") {
            return None;
        }
        (pv.get_number(&format!("{axis}.DLY")) == Some(0.0)).then(|| {
            Diagnostic::error(
                codes::BECKHOFF_ZERO_DELAY,
                format!("delay is zero on Beckhoff axis {}{axis}", pv.prefix()),
            )
            .with_context(ctx!("axis" => axis))
        })
    })
}

pub(super) fn galil_sync_tolerance(ctx: &InstrumentContext) -> Outcome {
    let pv = match gateway(ctx) {
        Ok(pv) => pv,
        Err(skip) => return skip,
    };
    scan_axes(ctx, pv, |pv, axis| {
        if !controller_is(pv, axis, "GALIL_") {
            return None;
        }
        let tolerance = pv.get_number(&format!("{axis}_MOT_ENC_SYNC_TOL_SP"));
        let closed_loop = pv
            .get_value(&format!("{axis}.UEIP"))
            .is_some_and(|v| truthy(&v));
        (closed_loop && tolerance == Some(0.0)).then(|| {
            Diagnostic::error(
                codes::GALIL_ZERO_SYNC_TOLERANCE,
                format!(
                    "motor-encoder sync tolerance is zero on closed-loop axis {}{axis}",
                    pv.prefix()
                ),
            )
            .with_context(ctx!("axis" => axis))
        })
    })
}

pub(super) fn run_number_headroom(ctx: &InstrumentContext) -> Outcome {
    let pv = match gateway(ctx) {
        Ok(pv) => pv,
        Err(skip) => return skip,
    };
    let Some(raw) = pv.get_value("DAE:RUNNUMBER") else {
        return Outcome::skipped("no run number, likely instrument is off");
    };
    let digits = raw.trim();
    let Ok(run) = digits.parse::<u64>() else {
        return Outcome::skipped(format!("run number {digits:?} is not a number"));
    };
    let capacity = 10f64.powi(digits.len() as i32);
    let used = run as f64 / capacity;
    if used < RUN_NUMBER_LIMIT {
        return Outcome::Passed;
    }
    Outcome::failed(
        Diagnostic::error(
            codes::RUN_NUMBER_NEAR_LIMIT,
            format!(
                "the current run number is within {:.0}% ({:.1}%) of the maximum run number",
                RUN_NUMBER_LIMIT * 100.0,
                used * 100.0
            ),
        )
        .with_context(ctx!("run_number" => digits)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_grid() {
        let axes = axes();
        assert_eq!(axes.len(), 128);
        assert_eq!(axes[0], "MOT:MTR0101");
        assert_eq!(axes[8], "MOT:MTR0201");
        assert_eq!(axes[127], "MOT:MTR1608");
    }

    #[test]
    fn truthy_values() {
        for v in ["1", "Yes", "yes", " 1.0 "] {
            assert!(truthy(v), "{v}");
        }
        for v in ["0", "No", "", "0.0"] {
            assert!(!truthy(v), "{v}");
        }
    }
}
