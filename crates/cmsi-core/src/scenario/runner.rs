// ── Scenario orchestrator ──
//
// Replays a scenario timeline against the evacuation core. Each run owns a
// generation number, a cancellation token and the handles of the two tasks
// it spawns (timeline driver, reset watcher). Every callback re-checks its
// generation under the runner lock, so nothing from a superseded run can
// reach the core.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::definition::{ScenarioAction, ScenarioDefinition, ScenarioEvent};
use super::plan::{PlannedStep, ScenarioPlan};
use super::policy::OutOfServicePolicy;
use crate::command::CommandResult;
use crate::evacuation::EvacuationCore;
use crate::model::{DeviceKind, LogEvent, LogEventKind, LogSource, ZoneId};
use crate::stream::SnapshotStream;

// ── Runner snapshot ──────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunnerStatus {
    #[default]
    Idle,
    Ready,
    Running,
    Stopped,
    Completed,
}

impl RunnerStatus {
    /// A run ended with this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed)
    }
}

/// Playback progress, published on every scheduling, dispatch and stop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRunnerSnapshot {
    pub status: RunnerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<Arc<ScenarioDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Highest event index dispatched so far, in plan (offset) order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_event_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_event: Option<ScenarioEvent>,
    pub awaiting_system_reset: bool,
}

// ── Runner ───────────────────────────────────────────────────────────

/// Handle to the scenario orchestrator. Cheaply cloneable.
///
/// `run`, `load` + `run_loaded` spawn Tokio tasks and must be called from
/// within a Tokio runtime.
#[derive(Clone)]
pub struct ScenarioRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    core: EvacuationCore,
    policy: Arc<dyn OutOfServicePolicy>,
    state: Mutex<RunnerState>,
    snapshot_tx: watch::Sender<Arc<ScenarioRunnerSnapshot>>,
}

#[derive(Default)]
struct RunnerState {
    context: Option<RunContext>,
    loaded: Option<Arc<ScenarioDefinition>>,
    next_generation: u64,
}

/// Everything owned by one run. Dropping it out of `RunnerState` is the
/// only way a run ends.
struct RunContext {
    generation: u64,
    run_id: Uuid,
    scenario: Arc<ScenarioDefinition>,
    plan: Arc<ScenarioPlan>,
    started_at: DateTime<Utc>,
    current_event_index: Option<usize>,
    /// Index into `plan.steps` of the next step the driver will dispatch.
    next_step: usize,
    awaiting_system_reset: bool,
    reset_event_index: Option<usize>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl RunContext {
    fn snapshot(&self) -> ScenarioRunnerSnapshot {
        let next_event = if self.awaiting_system_reset {
            self.reset_event_index
                .and_then(|index| self.plan.events.get(index))
        } else {
            self.plan
                .steps
                .get(self.next_step)
                .and_then(|step| self.plan.events.get(step.event_index))
        };

        ScenarioRunnerSnapshot {
            status: RunnerStatus::Running,
            run_id: Some(self.run_id),
            scenario: Some(Arc::clone(&self.scenario)),
            started_at: Some(self.started_at),
            ended_at: None,
            current_event_index: self.current_event_index,
            next_event: next_event.cloned(),
            awaiting_system_reset: self.awaiting_system_reset,
        }
    }

    fn cancel(&self) {
        self.cancel.cancel();
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl ScenarioRunner {
    pub fn new(core: EvacuationCore, policy: Arc<dyn OutOfServicePolicy>) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(ScenarioRunnerSnapshot::default()));
        Self {
            inner: Arc::new(RunnerInner {
                core,
                policy,
                state: Mutex::new(RunnerState::default()),
                snapshot_tx,
            }),
        }
    }

    pub fn core(&self) -> &EvacuationCore {
        &self.inner.core
    }

    /// Stop any active run, then start `scenario` from t=0.
    pub fn run(&self, scenario: ScenarioDefinition) -> Uuid {
        self.inner.start(Arc::new(scenario))
    }

    /// Stop any active run and stage `scenario` without starting it.
    pub fn load(&self, scenario: ScenarioDefinition) {
        let scenario = Arc::new(scenario);
        let mut state = self.inner.state.lock();
        self.inner.stop_locked(&mut state, RunnerStatus::Stopped);
        info!(scenario = %scenario.id, "scenario loaded");
        state.loaded = Some(Arc::clone(&scenario));
        self.inner.publish(ScenarioRunnerSnapshot {
            status: RunnerStatus::Ready,
            scenario: Some(scenario),
            ..ScenarioRunnerSnapshot::default()
        });
    }

    /// Start the staged scenario. `None` when nothing is loaded.
    pub fn run_loaded(&self) -> Option<Uuid> {
        let scenario = self.inner.state.lock().loaded.clone()?;
        Some(self.inner.start(scenario))
    }

    /// End the active run with `status`.
    ///
    /// Without an active run only `Idle` does anything: it clears the
    /// published snapshot. `Running` and `Ready` are recorded as `Stopped`.
    pub fn stop(&self, status: RunnerStatus) {
        let mut state = self.inner.state.lock();
        self.inner.stop_locked(&mut state, status);
    }

    /// Whether the trainee may reset `zone` directly. Unconstrained when no
    /// run is active or the scenario has no allow-list for `kind`.
    pub fn can_manually_reset(&self, kind: DeviceKind, zone: &ZoneId) -> bool {
        self.inner
            .state
            .lock()
            .context
            .as_ref()
            .is_none_or(|ctx| ctx.scenario.can_manually_reset(kind, zone))
    }

    pub fn current_run_id(&self) -> Option<Uuid> {
        self.inner.state.lock().context.as_ref().map(|ctx| ctx.run_id)
    }

    pub fn snapshot(&self) -> Arc<ScenarioRunnerSnapshot> {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub fn snapshots(&self) -> SnapshotStream<ScenarioRunnerSnapshot> {
        SnapshotStream::new(self.inner.snapshot_tx.subscribe())
    }
}

impl RunnerInner {
    fn start(self: &Arc<Self>, scenario: Arc<ScenarioDefinition>) -> Uuid {
        let plan = Arc::new(ScenarioPlan::build(&scenario, &scenario.device_lookup()));
        for dropped in &plan.dropped {
            warn!(
                scenario = %scenario.id,
                event = dropped.event_index,
                device = %dropped.device_id,
                reason = %dropped.reason,
                "sequence step dropped"
            );
        }

        let mut state = self.state.lock();
        self.stop_locked(&mut state, RunnerStatus::Stopped);
        state.loaded = None;
        state.next_generation += 1;
        let generation = state.next_generation;
        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        // Subscribe before anything is dispatched so no reset can slip by.
        let log_rx = self.core.log_events();
        let origin = Instant::now();
        let handles = vec![
            tokio::spawn(reset_watch_task(
                Arc::downgrade(self),
                generation,
                run_id,
                log_rx,
                cancel.clone(),
            )),
            tokio::spawn(driver_task(
                Arc::downgrade(self),
                generation,
                Arc::clone(&plan),
                origin,
                cancel.clone(),
            )),
        ];

        info!(
            %run_id,
            scenario = %scenario.id,
            steps = plan.steps.len(),
            "scenario run started"
        );
        let context = RunContext {
            generation,
            run_id,
            scenario,
            plan,
            started_at: Utc::now(),
            current_event_index: None,
            next_step: 0,
            awaiting_system_reset: false,
            reset_event_index: None,
            cancel,
            handles,
        };
        self.publish(context.snapshot());
        state.context = Some(context);
        run_id
    }

    fn stop_locked(&self, state: &mut RunnerState, status: RunnerStatus) {
        let status = match status {
            RunnerStatus::Running | RunnerStatus::Ready => RunnerStatus::Stopped,
            other => other,
        };

        let Some(context) = state.context.take() else {
            if status == RunnerStatus::Idle {
                state.loaded = None;
                self.publish(ScenarioRunnerSnapshot::default());
            } else {
                debug!(%status, "no active run, stop ignored");
            }
            return;
        };

        context.cancel();
        info!(run_id = %context.run_id, %status, "scenario run ended");

        if status == RunnerStatus::Idle {
            self.publish(ScenarioRunnerSnapshot::default());
            return;
        }
        self.publish(ScenarioRunnerSnapshot {
            status,
            run_id: Some(context.run_id),
            scenario: Some(Arc::clone(&context.scenario)),
            started_at: Some(context.started_at),
            ended_at: Some(Utc::now()),
            current_event_index: context.current_event_index,
            next_event: None,
            awaiting_system_reset: false,
        });
    }

    fn publish(&self, snapshot: ScenarioRunnerSnapshot) {
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }

    /// Dispatch one planned step. Returns `false` when `generation` is no
    /// longer the active run.
    fn dispatch(&self, generation: u64, step_index: usize, step: &PlannedStep) -> bool {
        // Queried before locking so a policy may call back into the runner.
        let out_of_service = self.out_of_service(generation, &step.action);

        let mut state = self.state.lock();
        let Some(ctx) = state
            .context
            .as_mut()
            .filter(|ctx| ctx.generation == generation)
        else {
            debug!(generation, "stale scenario step ignored");
            return false;
        };

        ctx.current_event_index = Some(
            ctx.current_event_index
                .map_or(step.event_index, |current| current.max(step.event_index)),
        );
        ctx.next_step = step_index + 1;

        if step.action == ScenarioAction::SystemReset {
            let reset_index = *ctx.reset_event_index.get_or_insert(step.event_index);
            ctx.awaiting_system_reset = true;
            info!(run_id = %ctx.run_id, event = reset_index, "scenario awaiting system reset");
            // The reset watcher only honours resets journaled after this marker.
            self.core.append_log(
                LogEvent::new(
                    LogSource::Trainer,
                    LogEventKind::ScenarioAwaitingReset,
                    "Scenario reached its reset point, waiting for the unit to be reset",
                )
                .with_details(json!({ "run_id": ctx.run_id, "event_index": reset_index })),
            );
        } else if out_of_service {
            self.skip_step(ctx.run_id, step);
        } else {
            self.execute_step(ctx.run_id, step);
        }

        self.publish(ctx.snapshot());
        true
    }

    /// Whether the zone targeted by `action` is out of service. A failed
    /// lookup counts as in service.
    fn out_of_service(&self, generation: u64, action: &ScenarioAction) -> bool {
        let Some((kind, zone)) = action.device_target() else {
            return false;
        };
        match self.policy.is_out_of_service(kind, zone) {
            Ok(out) => out,
            Err(error) => {
                warn!(generation, %kind, zone = %zone, %error, "out-of-service lookup failed, zone treated as in service");
                false
            }
        }
    }

    fn skip_step(&self, run_id: Uuid, step: &PlannedStep) {
        let action = &step.action;
        let Some((kind, zone)) = action.device_target() else {
            return;
        };
        info!(%run_id, %kind, zone = %zone, action = action.tag(), "zone out of service, step skipped");
        self.core.append_log(
            LogEvent::new(
                LogSource::Trainer,
                LogEventKind::ScenarioStepSkipped,
                format!("Skipped {} on zone {zone}: {kind} out of service", action.tag()),
            )
            .with_details(json!({
                "run_id": run_id,
                "event_index": step.event_index,
                "action": action.tag(),
                "zone_id": zone,
            })),
        );
    }

    fn execute_step(&self, run_id: Uuid, step: &PlannedStep) {
        let action = &step.action;
        let Some(cmd) = action.to_command() else {
            return;
        };
        let name = cmd.name();
        match self.core.execute(cmd) {
            Ok(CommandResult::Ok) => debug!(%run_id, command = name, "scenario step dispatched"),
            Ok(CommandResult::ResetRejected(rejected)) => {
                debug!(%run_id, command = name, %rejected, "scenario step rejected by the unit");
            }
            Err(error) => {
                warn!(%run_id, command = name, %error, "scenario step failed");
                self.core.append_log(
                    LogEvent::new(
                        LogSource::Trainer,
                        LogEventKind::ScenarioStepFailed,
                        format!("Step {} failed: {error}", action.tag()),
                    )
                    .with_details(json!({ "run_id": run_id, "event_index": step.event_index })),
                );
            }
        }
    }

    /// The driver dispatched its last step.
    fn finish_timeline(&self, generation: u64) {
        let mut state = self.state.lock();
        let Some(ctx) = state
            .context
            .as_ref()
            .filter(|ctx| ctx.generation == generation)
        else {
            return;
        };
        if ctx.awaiting_system_reset {
            debug!(run_id = %ctx.run_id, "timeline finished, still awaiting system reset");
            return;
        }
        self.stop_locked(&mut state, RunnerStatus::Completed);
    }

    fn is_awaiting_reset(&self, generation: u64) -> bool {
        self.state
            .lock()
            .context
            .as_ref()
            .is_some_and(|ctx| ctx.generation == generation && ctx.awaiting_system_reset)
    }

    /// The core reported a reset to idle. Returns `true` once the watcher
    /// has nothing left to do for `generation`.
    fn system_reset_observed(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        let Some(ctx) = state
            .context
            .as_ref()
            .filter(|ctx| ctx.generation == generation)
        else {
            return true;
        };
        if !ctx.awaiting_system_reset {
            debug!(run_id = %ctx.run_id, "system reset before the scripted reset point ignored");
            return false;
        }
        self.stop_locked(&mut state, RunnerStatus::Completed);
        true
    }
}

impl Drop for RunnerInner {
    fn drop(&mut self) {
        if let Some(context) = self.state.get_mut().context.take() {
            context.cancel();
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Walks the plan in order, sleeping until each step is due. A single
/// task keeps equal offsets in declaration order.
async fn driver_task(
    runner: Weak<RunnerInner>,
    generation: u64,
    plan: Arc<ScenarioPlan>,
    origin: Instant,
    cancel: CancellationToken,
) {
    for (index, step) in plan.steps.iter().enumerate() {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep_until(origin + step.at) => {}
        }
        let Some(runner) = runner.upgrade() else {
            return;
        };
        if !runner.dispatch(generation, index, step) {
            return;
        }
    }
    if let Some(runner) = runner.upgrade() {
        runner.finish_timeline(generation);
    }
}

/// Completes the run when the core reports a reset to idle after the
/// script reached its `SYSTEM_RESET` point. Journal order decides: a
/// `SystemReset` only counts once this run's `ScenarioAwaitingReset`
/// marker has gone past.
async fn reset_watch_task(
    runner: Weak<RunnerInner>,
    generation: u64,
    run_id: Uuid,
    mut log_rx: broadcast::Receiver<Arc<LogEvent>>,
    cancel: CancellationToken,
) {
    let mut armed = false;
    loop {
        let reset_seen = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = log_rx.recv() => match result {
                Ok(event) => match event.kind {
                    LogEventKind::ScenarioAwaitingReset => {
                        armed |= marks_run(&event, run_id);
                        false
                    }
                    LogEventKind::SystemReset => armed,
                    _ => false,
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "scenario runner lagged behind the unit log");
                    // The marker or a reset may have been among the skipped events.
                    let Some(runner) = runner.upgrade() else {
                        break;
                    };
                    armed |= runner.is_awaiting_reset(generation);
                    armed && runner.core.snapshot().state.is_idle()
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        if !reset_seen {
            continue;
        }
        let Some(runner) = runner.upgrade() else {
            break;
        };
        if runner.system_reset_observed(generation) {
            break;
        }
    }
}

fn marks_run(event: &LogEvent, run_id: Uuid) -> bool {
    event
        .details
        .as_ref()
        .and_then(|details| details.get("run_id"))
        .and_then(serde_json::Value::as_str)
        .and_then(|id| id.parse::<Uuid>().ok())
        == Some(run_id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::config::DomainConfig;
    use crate::scenario::policy::NoOutOfService;

    fn runner() -> ScenarioRunner {
        let core = EvacuationCore::new(DomainConfig::default());
        ScenarioRunner::new(core, Arc::new(NoOutOfService))
    }

    fn scenario(value: serde_json::Value) -> ScenarioDefinition {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_without_reset_completes_after_last_step() {
        let runner = runner();
        runner.run(scenario(json!({
            "id": "s", "name": "s",
            "events": [{ "type": "MANUAL_EVAC_START", "reason": "drill", "offset": 1 }]
        })));
        assert_eq!(runner.snapshot().status, RunnerStatus::Running);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let snap = runner.snapshot();
        assert_eq!(snap.status, RunnerStatus::Completed);
        assert_eq!(snap.current_event_index, Some(0));
        assert!(snap.ended_at.is_some());
        assert!(runner.core().snapshot().state.is_evacuating());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_run() {
        let runner = runner();
        runner.stop(RunnerStatus::Completed);
        assert_eq!(runner.snapshot().status, RunnerStatus::Idle);

        runner.load(scenario(json!({ "id": "s", "name": "s", "events": [] })));
        assert_eq!(runner.snapshot().status, RunnerStatus::Ready);
        runner.stop(RunnerStatus::Stopped);
        assert_eq!(runner.snapshot().status, RunnerStatus::Ready);
        runner.stop(RunnerStatus::Idle);
        assert_eq!(*runner.snapshot(), ScenarioRunnerSnapshot::default());
        assert!(runner.run_loaded().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn load_then_run_loaded() {
        let runner = runner();
        runner.load(scenario(json!({
            "id": "s", "name": "s",
            "events": [{ "type": "PROCESS_ACK", "offset": 5 }]
        })));
        let run_id = runner.run_loaded().unwrap();
        let snap = runner.snapshot();
        assert_eq!(snap.status, RunnerStatus::Running);
        assert_eq!(snap.run_id, Some(run_id));
        assert_eq!(
            snap.next_event.as_ref().map(|e| e.action.tag()),
            Some("PROCESS_ACK")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_stop_cancels_pending_steps() {
        let runner = runner();
        runner.run(scenario(json!({
            "id": "s", "name": "s",
            "events": [{ "type": "DM_TRIGGER", "zoneId": "ZF1", "offset": 3 }]
        })));
        runner.stop(RunnerStatus::Stopped);
        assert_eq!(runner.snapshot().status, RunnerStatus::Stopped);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(runner.core().snapshot().manual_call_points.is_empty());
    }
}
