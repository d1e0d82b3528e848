//! Simulated fire-safety control unit (CMSI) for operator training.
//!
//! This crate owns the regulatory behavior of the unit and the replay of
//! scripted training exercises against it:
//!
//! - **[`EvacuationCore`]**: Cloneable handle over the single authoritative
//!   state machine ([`CmsiState`]). Commands mutate the unit atomically and
//!   publish a [`CmsiSnapshot`] (watch channel) plus zero or more
//!   [`LogEvent`]s (broadcast channel). Evacuation deadlines run as Tokio
//!   tasks keyed by zone and generation.
//!
//! - **[`ScenarioRunner`]**: Schedules a [`ScenarioDefinition`] against the
//!   core, tracks progress in a [`ScenarioRunnerSnapshot`], and completes a
//!   scripted `SYSTEM_RESET` only once the unit itself reports a reset.
//!
//! - **[`Command`]**: Typed mutation requests routed through
//!   [`EvacuationCore::execute`].
//!
//! - **[`OutOfServicePolicy`]**: Injected capability consulted before every
//!   zone-typed scenario step.
//!
//! - **Domain model** ([`model`]): Zones, devices, state, outputs and the
//!   log journal types shared with external adapters.

pub mod command;
pub mod config;
pub mod error;
pub mod evacuation;
pub mod model;
pub mod scenario;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, CommandResult};
pub use config::{DomainConfig, DomainConfigPatch};
pub use error::{CoreError, PolicyError, ResetRejected};
pub use evacuation::EvacuationCore;
pub use stream::{SnapshotStream, SnapshotWatchStream};

pub use model::{
    AlarmOutputs, AutomaticDetector, CmsiSnapshot, CmsiState, DeviceKind, LogEvent, LogEventKind,
    LogSource, ManualCallPoint, ProcessAcknowledgement, ZoneId,
};
pub use scenario::{
    NoOutOfService, OutOfServicePolicy, RunnerStatus, ScenarioAction, ScenarioDefinition,
    ScenarioEvent, ScenarioPlan, ScenarioRunner, ScenarioRunnerSnapshot, StaticOutOfService,
};
