// ── Zone identity ──
//
// Every device, deadline and scenario step is addressed by the zone it
// belongs to. Zone ids are opaque strings chosen by the site topology.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Identifier of a zone of the protected site (e.g. `"ZF1"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(String);

impl ZoneId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank ids cannot address a zone.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ZoneId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for ZoneId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ZoneId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for ZoneId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn zone_id_display_and_parse() {
        let zone: ZoneId = "ZF1".parse().unwrap();
        assert_eq!(zone.to_string(), "ZF1");
        assert_eq!(zone, ZoneId::from("ZF1"));
    }

    #[test]
    fn zone_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&ZoneId::new("ZF2")).unwrap();
        assert_eq!(json, "\"ZF2\"");
    }

    #[test]
    fn blank_zone_is_detected() {
        assert!(ZoneId::new("  ").is_blank());
        assert!(!ZoneId::new("ZA").is_blank());
    }
}
