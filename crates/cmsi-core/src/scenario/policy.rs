// ── Out-of-service policy ──
//
// Injected capability answering "is this zone administratively out of
// service for this device kind?". The runner consults it before every
// zone-typed step.

use std::collections::HashSet;

use crate::error::PolicyError;
use crate::model::{DeviceKind, ZoneId};

/// Called without the runner's lock held, so an implementation may query
/// the runner (e.g. [`ScenarioRunner::can_manually_reset`]).
///
/// [`ScenarioRunner::can_manually_reset`]: crate::ScenarioRunner::can_manually_reset
pub trait OutOfServicePolicy: Send + Sync {
    fn is_out_of_service(&self, kind: DeviceKind, zone: &ZoneId) -> Result<bool, PolicyError>;
}

impl<F> OutOfServicePolicy for F
where
    F: Fn(DeviceKind, &ZoneId) -> Result<bool, PolicyError> + Send + Sync,
{
    fn is_out_of_service(&self, kind: DeviceKind, zone: &ZoneId) -> Result<bool, PolicyError> {
        self(kind, zone)
    }
}

/// Every zone is in service.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOutOfService;

impl OutOfServicePolicy for NoOutOfService {
    fn is_out_of_service(&self, _kind: DeviceKind, _zone: &ZoneId) -> Result<bool, PolicyError> {
        Ok(false)
    }
}

/// Fixed set of `(kind, zone)` pairs, typically built from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticOutOfService {
    entries: HashSet<(DeviceKind, ZoneId)>,
}

impl StaticOutOfService {
    pub fn new(entries: impl IntoIterator<Item = (DeviceKind, ZoneId)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, kind: DeviceKind, zone: ZoneId) {
        self.entries.insert((kind, zone));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl OutOfServicePolicy for StaticOutOfService {
    fn is_out_of_service(&self, kind: DeviceKind, zone: &ZoneId) -> Result<bool, PolicyError> {
        Ok(self.entries.contains(&(kind, zone.clone())))
    }
}
