// ── Field device domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::zone::ZoneId;

/// Class of zoned field device a scenario step or reset policy targets.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum DeviceKind {
    /// Manual call point (déclencheur manuel).
    #[serde(rename = "DM", alias = "dm")]
    #[strum(to_string = "DM", serialize = "dm")]
    ManualCallPoint,
    /// Automatic detector (détecteur automatique d'incendie).
    #[serde(rename = "DAI", alias = "dai")]
    #[strum(to_string = "DAI", serialize = "dai")]
    AutomaticDetector,
}

/// A manual call point. Latches on activation until explicitly reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualCallPoint {
    pub zone_id: ZoneId,
    pub is_latched: bool,
    pub last_activated_at: Option<DateTime<Utc>>,
    /// Carried over from the previous reset of the same zone.
    pub last_reset_at: Option<DateTime<Utc>>,
}

impl ManualCallPoint {
    pub(crate) fn new(zone_id: ZoneId, last_reset_at: Option<DateTime<Utc>>) -> Self {
        Self {
            zone_id,
            is_latched: false,
            last_activated_at: None,
            last_reset_at,
        }
    }
}

/// An automatic detector, tracked independently of manual call points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomaticDetector {
    pub zone_id: ZoneId,
    pub is_active: bool,
    pub last_activated_at: Option<DateTime<Utc>>,
    pub last_reset_at: Option<DateTime<Utc>>,
}

impl AutomaticDetector {
    pub(crate) fn new(zone_id: ZoneId, last_reset_at: Option<DateTime<Utc>>) -> Self {
        Self {
            zone_id,
            is_active: false,
            last_activated_at: None,
            last_reset_at,
        }
    }
}
