// ── Scenario orchestration ──
//
// Scenario model, timeline planning, the injected out-of-service policy
// and the runner that replays a scenario against the evacuation core.

pub mod definition;
pub mod plan;
pub mod policy;
pub mod runner;

pub use definition::{
    ManualResetPolicy, ScenarioAction, ScenarioDefinition, ScenarioEvent, SequenceStep,
    TopologyDevice,
};
pub use plan::{DropReason, DroppedStep, PlannedStep, ScenarioPlan, StepOrigin};
pub use policy::{NoOutOfService, OutOfServicePolicy, StaticOutOfService};
pub use runner::{RunnerStatus, ScenarioRunner, ScenarioRunnerSnapshot};
