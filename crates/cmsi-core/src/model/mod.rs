// ── Domain model ──
//
// Canonical types shared by the evacuation core, the scenario runner and
// every external adapter that consumes snapshots or log events.

pub mod device;
pub mod log;
pub mod state;
pub mod zone;

pub use device::{AutomaticDetector, DeviceKind, ManualCallPoint};
pub use log::{LogEvent, LogEventKind, LogSource};
pub use state::{AlarmOutputs, CmsiSnapshot, CmsiState, ProcessAcknowledgement};
pub use zone::ZoneId;
