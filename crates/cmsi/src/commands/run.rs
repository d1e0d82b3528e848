//! `cmsi run` -- play a scenario against a fresh control unit.
//!
//! Table and plain output stream the journal live. Structured formats
//! collect it and print one report when the run ends.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use cmsi_core::{
    CmsiSnapshot, DeviceKind, EvacuationCore, LogEvent, LogEventKind, LogSource, ResetRejected,
    RunnerStatus, ScenarioRunner, ScenarioRunnerSnapshot, SnapshotStream, ZoneId,
};

use crate::cli::{OutputFormat, RunArgs};
use crate::commands::{Ctx, load_scenario};
use crate::error::CliError;
use crate::output;

// ── Report ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport {
    run: Arc<ScenarioRunnerSnapshot>,
    unit: Arc<CmsiSnapshot>,
    journal: Vec<Arc<LogEvent>>,
}

enum Outcome {
    Finished,
    TimedOut(u64),
    Interrupted,
}

/// Where journal events go while the run is live.
struct Journal {
    format: OutputFormat,
    color: bool,
    quiet: bool,
    collected: Vec<Arc<LogEvent>>,
}

impl Journal {
    fn streams(&self) -> bool {
        matches!(self.format, OutputFormat::Table | OutputFormat::Plain)
    }

    fn push(&mut self, event: Arc<LogEvent>) {
        if self.streams() {
            let line = output::format_log_line(&event, self.color && self.format == OutputFormat::Table);
            output::print_output(&line, self.quiet);
        } else {
            self.collected.push(event);
        }
    }

    fn drain(&mut self, rx: &mut broadcast::Receiver<Arc<LogEvent>>) {
        loop {
            match rx.try_recv() {
                Ok(event) => self.push(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "journal receiver lagged");
                }
                Err(_) => break,
            }
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: &RunArgs, ctx: &Ctx) -> Result<(), CliError> {
    let scenario = load_scenario(&args.file)?;

    let mut domain = ctx.config.domain.clone();
    if let Some(ms) = args.evac_delay_ms {
        domain.evac_delay_ms = ms;
    }
    if args.evac_on_dai {
        domain.evac_on_dai = true;
    }

    let mut policy = ctx.config.out_of_service_policy();
    for raw in &args.out_of_service {
        let (kind, zone) = parse_out_of_service(raw)?;
        policy.insert(kind, zone);
    }
    if !policy.is_empty() {
        debug!(zones = policy.len(), "out-of-service policy loaded");
    }

    let auto_reset = args
        .auto_reset_after
        .or(ctx.config.runner.auto_reset_after_secs)
        .map(Duration::from_secs);
    let timeout = args.timeout.or(ctx.config.runner.timeout_secs);

    let core = EvacuationCore::new(domain);
    let runner = ScenarioRunner::new(core.clone(), Arc::new(policy));
    let mut rx = core.log_events();
    let mut progress = runner.snapshots();
    let mut journal = Journal {
        format: ctx.output,
        color: ctx.color,
        quiet: ctx.quiet,
        collected: Vec::new(),
    };

    let run_id = runner.run(scenario);
    info!(%run_id, file = %args.file.display(), "scenario started");

    let outcome = drive(&runner, &mut rx, &mut progress, &mut journal, auto_reset, timeout).await;
    journal.drain(&mut rx);
    core.shutdown();

    let report = RunReport {
        run: runner.snapshot(),
        unit: core.snapshot(),
        journal: journal.collected,
    };
    let out = output::render_single(ctx.output, &report, summary, |r| r.run.status.to_string())?;
    output::print_output(&out, ctx.quiet);

    match outcome {
        Outcome::Finished => Ok(()),
        Outcome::TimedOut(seconds) => Err(CliError::Timeout { seconds }),
        Outcome::Interrupted => Err(CliError::Interrupted),
    }
}

/// Pump the journal until the run reaches a terminal status, the timeout
/// elapses, or the user interrupts.
async fn drive(
    runner: &ScenarioRunner,
    rx: &mut broadcast::Receiver<Arc<LogEvent>>,
    progress: &mut SnapshotStream<ScenarioRunnerSnapshot>,
    journal: &mut Journal,
    auto_reset: Option<Duration>,
    timeout: Option<u64>,
) -> Outcome {
    let deadline = timeout.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut reset_at: Option<Instant> = None;
    let mut reset_scheduled = false;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ctrl_c_armed = true;

    loop {
        tokio::select! {
            biased;

            signal = &mut ctrl_c, if ctrl_c_armed => {
                ctrl_c_armed = false;
                match signal {
                    Ok(()) => {
                        info!("interrupted, stopping run");
                        runner.stop(RunnerStatus::Stopped);
                        return Outcome::Interrupted;
                    }
                    Err(e) => warn!(error = %e, "cannot listen for ctrl-c"),
                }
            }

            () = sleep_until(deadline) => {
                runner.stop(RunnerStatus::Stopped);
                return Outcome::TimedOut(timeout.unwrap_or_default());
            }

            () = sleep_until(reset_at) => {
                reset_at = None;
                if let Err(rejected) = trainee_reset(runner) {
                    warn!(code = rejected.code(), "system reset refused: {rejected}");
                }
            }

            received = rx.recv() => match received {
                Ok(event) => journal.push(event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "journal receiver lagged"),
                Err(RecvError::Closed) => return Outcome::Finished,
            },

            changed = progress.changed() => {
                let Some(snap) = changed else {
                    return Outcome::Finished;
                };
                if snap.status.is_terminal() {
                    return Outcome::Finished;
                }
                if snap.awaiting_system_reset && !reset_scheduled {
                    reset_scheduled = true;
                    match auto_reset {
                        Some(after) => reset_at = Some(Instant::now() + after),
                        None => warn!(
                            "scenario is waiting for a system reset; pass --auto-reset-after to simulate the trainee"
                        ),
                    }
                }
            }
        }
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Act as the trainee: clear every device the scenario lets them clear,
/// then ask the unit for a system reset.
fn trainee_reset(runner: &ScenarioRunner) -> Result<(), ResetRejected> {
    let core = runner.core();
    let unit = core.snapshot();

    for point in unit.manual_call_points.iter().filter(|p| p.is_latched) {
        if runner.can_manually_reset(DeviceKind::ManualCallPoint, &point.zone_id) {
            core.reset_manual_call_point(&point.zone_id);
        } else {
            debug!(zone = %point.zone_id, "call point not resettable by the trainee");
        }
    }
    for detector in unit.detectors.iter().filter(|d| d.is_active) {
        if runner.can_manually_reset(DeviceKind::AutomaticDetector, &detector.zone_id) {
            core.reset_automatic_detector(&detector.zone_id);
        } else {
            debug!(zone = %detector.zone_id, "detector not resettable by the trainee");
        }
    }

    core.append_log(LogEvent::new(
        LogSource::Trainee,
        LogEventKind::Note,
        "Trainee requests a system reset",
    ));
    core.try_system_reset()
}

fn summary(report: &RunReport) -> String {
    let run = &report.run;
    let scenario = run
        .scenario
        .as_ref()
        .map_or_else(|| "-".to_owned(), |s| format!("{} ({})", s.name, s.id));
    let time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map_or_else(|| "-".to_owned(), |t| t.format("%H:%M:%S%.3f").to_string())
    };

    let lines = [
        String::new(),
        format!("Run:        {}", run.run_id.map(|id| id.to_string()).unwrap_or_default()),
        format!("Scenario:   {scenario}"),
        format!("Status:     {}", run.status),
        format!("Started:    {}", time(run.started_at)),
        format!("Ended:      {}", time(run.ended_at)),
        format!("Unit state: {}", report.unit.state.label()),
    ];
    lines.join("\n")
}

// ── Argument parsing ────────────────────────────────────────────────

/// Parse `KIND:ZONE`, e.g. `DM:ZF3` or `dai:ZD1`.
fn parse_out_of_service(raw: &str) -> Result<(DeviceKind, ZoneId), CliError> {
    let invalid = |reason: &str| CliError::Validation {
        field: "--out-of-service".into(),
        reason: format!("'{raw}': {reason}"),
    };

    let (kind, zone) = raw
        .split_once(':')
        .ok_or_else(|| invalid("expected KIND:ZONE"))?;
    let kind: DeviceKind = kind
        .trim()
        .parse()
        .map_err(|_| invalid("kind must be DM or DAI"))?;
    let zone = ZoneId::new(zone.trim());
    if zone.is_blank() {
        return Err(invalid("zone is empty"));
    }
    Ok((kind, zone))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn out_of_service_flag_parses_kind_and_zone() {
        let (kind, zone) = parse_out_of_service("DM:ZF3").unwrap();
        assert_eq!(kind, DeviceKind::ManualCallPoint);
        assert_eq!(zone, ZoneId::new("ZF3"));

        let (kind, _) = parse_out_of_service("dai: ZD1").unwrap();
        assert_eq!(kind, DeviceKind::AutomaticDetector);

        assert!(parse_out_of_service("ZF3").is_err());
        assert!(parse_out_of_service("UGA:ZF3").is_err());
        assert!(parse_out_of_service("DM: ").is_err());
    }
}
