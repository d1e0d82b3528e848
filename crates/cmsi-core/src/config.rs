// ── Unit behavior configuration ──
//
// These types describe *how* the simulated unit behaves. They never touch
// disk: `cmsi-config` (or any embedding application) builds a
// `DomainConfig` and hands it to the evacuation core.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_EVAC_DELAY_MS: u64 = 5 * 60 * 1000;

/// Regulatory behavior of the unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Temporization between a manual call point latching and automatic
    /// general evacuation.
    pub evac_delay_ms: u64,
    /// Whether an operator acknowledgement can suspend the temporization.
    pub process_ack_required: bool,
    /// Whether any automatic detector activation forces immediate
    /// evacuation (otherwise it only raises the local pre-alarm).
    pub evac_on_dai: bool,
    /// Whether active automatic detectors block a system reset, in
    /// addition to latched manual call points.
    pub reset_requires_dai_clear: bool,
}

impl DomainConfig {
    pub fn evac_delay(&self) -> Duration {
        Duration::from_millis(self.evac_delay_ms)
    }

    /// Merge the fields present in `patch`.
    pub fn merge(&mut self, patch: &DomainConfigPatch) {
        if let Some(ms) = patch.evac_delay_ms {
            self.evac_delay_ms = ms;
        }
        if let Some(required) = patch.process_ack_required {
            self.process_ack_required = required;
        }
        if let Some(evac) = patch.evac_on_dai {
            self.evac_on_dai = evac;
        }
        if let Some(blocks) = patch.reset_requires_dai_clear {
            self.reset_requires_dai_clear = blocks;
        }
    }
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            evac_delay_ms: DEFAULT_EVAC_DELAY_MS,
            process_ack_required: true,
            evac_on_dai: false,
            reset_requires_dai_clear: true,
        }
    }
}

/// Partial update for [`DomainConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evac_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_ack_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evac_on_dai: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_requires_dai_clear: Option<bool>,
}

impl DomainConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.evac_delay_ms.is_none()
            && self.process_ack_required.is_none()
            && self.evac_on_dai.is_none()
            && self.reset_requires_dai_clear.is_none()
    }
}
