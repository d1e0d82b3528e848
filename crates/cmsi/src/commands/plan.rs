//! `cmsi plan` -- show the expanded timeline of a scenario.

use std::fmt::Write as _;

use tabled::Tabled;

use cmsi_core::ScenarioPlan;
use cmsi_core::scenario::{DroppedStep, PlannedStep, StepOrigin};

use crate::cli::{OutputFormat, PlanArgs};
use crate::commands::{Ctx, load_scenario};
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "At")]
    at: String,
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Action")]
    action: &'static str,
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Origin")]
    origin: String,
}

fn step_row(plan: &ScenarioPlan, step: &PlannedStep) -> StepRow {
    StepRow {
        at: format!("{:.3}s", step.at.as_secs_f64()),
        event: plan
            .events
            .get(step.event_index)
            .map(cmsi_core::ScenarioEvent::display_name)
            .unwrap_or_default(),
        action: step.action.tag(),
        zone: step
            .action
            .zone_id()
            .map(ToString::to_string)
            .unwrap_or_default(),
        origin: match &step.origin {
            StepOrigin::Event => "event".into(),
            StepOrigin::Sequence { device_id } => format!("sequence {device_id}"),
        },
    }
}

#[derive(Tabled)]
struct DroppedRow {
    #[tabled(rename = "Event")]
    event: usize,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

impl From<&DroppedStep> for DroppedRow {
    fn from(d: &DroppedStep) -> Self {
        Self {
            event: d.event_index,
            device: d.device_id.clone(),
            reason: d.reason.to_string(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: &PlanArgs, ctx: &Ctx) -> Result<(), CliError> {
    let scenario = load_scenario(&args.file)?;
    let plan = ScenarioPlan::build(&scenario, &scenario.device_lookup());

    let out = match ctx.output {
        OutputFormat::Table => render_table(&scenario.name, &plan),
        OutputFormat::Plain => plan
            .steps
            .iter()
            .map(|step| {
                let zone = step.action.zone_id().map_or("-", |z| z.as_str());
                format!("{}\t{}\t{zone}", step.at.as_millis(), step.action.tag())
            })
            .collect::<Vec<_>>()
            .join("\n"),
        format => output::render_single(format, &plan, |_| String::new(), |_| String::new())?,
    };
    output::print_output(&out, ctx.quiet);
    Ok(())
}

fn render_table(name: &str, plan: &ScenarioPlan) -> String {
    let rows: Vec<StepRow> = plan.steps.iter().map(|s| step_row(plan, s)).collect();
    let mut out = format!("{name}: {} steps\n", plan.steps.len());
    out.push_str(&output::render_table(&rows));

    if !plan.dropped.is_empty() {
        let dropped: Vec<DroppedRow> = plan.dropped.iter().map(DroppedRow::from).collect();
        let _ = write!(
            out,
            "\n\nDropped sequence steps:\n{}",
            output::render_table(&dropped)
        );
    }
    out
}
