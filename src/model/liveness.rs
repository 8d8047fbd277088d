//! Heartbeat state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::EntityId;

/// Per-entity heartbeat record, replaced on every pulse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessRecord {
    pub entity: EntityId,
    pub last_pulse: DateTime<Utc>,
    pub expected_interval_secs: i64,
    /// Timing consistency of the latest pulse, in [0, 1].
    pub resilience: f64,
    pub pulses: u64,
    pub note: Option<String>,
}

impl LivenessRecord {
    pub fn expected_interval(&self) -> Duration {
        Duration::seconds(self.expected_interval_secs)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_pulse
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreathingPattern {
    Steady,
    Irregular,
    Fading,
    Unknown,
}

impl BreathingPattern {
    pub fn from_resilience(resilience: f64) -> Self {
        if resilience > 0.9 {
            BreathingPattern::Steady
        } else if resilience > 0.5 {
            BreathingPattern::Irregular
        } else if resilience > 0.0 {
            BreathingPattern::Fading
        } else {
            BreathingPattern::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    pub alive: bool,
    pub last_pulse: DateTime<Utc>,
    pub age_ms: i64,
    /// Resilience while alive, zero otherwise.
    pub health: f64,
    pub resilience: f64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkVitality {
    pub total: usize,
    pub alive: usize,
    /// `alive / total`, zero for an empty network.
    pub vitality: f64,
    pub average_resilience: f64,
}
