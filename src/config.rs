//! # Configuration
//!
//! Every threshold and period the registry and relationship engine use.
//! Callers never hardcode these; they read them from `ResonanceConfig`.

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::fingerprint::{DEFAULT_DIMENSIONS, MAX_DIMENSIONS, MIN_DIMENSIONS};
use crate::{Error, Result};

/// Longest interval, liveness window or formation period accepted (100 years).
pub const MAX_SPAN_SECS: i64 = 100 * 365 * 24 * 3_600;

/// Master configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResonanceConfig {
    /// Classification thresholds
    pub thresholds: ThresholdConfig,

    /// Encounter history
    pub memory: MemoryConfig,

    /// Heartbeat timing
    pub liveness: LivenessConfig,

    /// Pair formation
    pub formation: FormationConfig,

    /// Feature extraction
    pub features: FeatureConfig,
}

/// Score bands.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Scores at or above are `Similar`
    pub harmonic: f64,

    /// Scores at or below are `Dissimilar`
    pub dissonant: f64,

    /// Scores at or above set the affinity lock
    pub affinity: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            harmonic: 0.7,
            dissonant: 0.3,
            affinity: 0.85,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Encounters kept per entity, oldest evicted first
    pub encounter_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { encounter_capacity: 100 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Expected pulse interval established on the first pulse
    pub default_interval_secs: i64,

    /// Liveness window as a multiple of the expected interval
    pub window_factor: i32,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: 3_600,
            window_factor: 2,
        }
    }
}

impl LivenessConfig {
    pub fn default_interval(&self) -> Duration {
        Duration::seconds(self.default_interval_secs)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormationConfig {
    /// Score required to begin forming
    pub min_score: f64,

    /// Mean score that allows completion after half the period
    pub exceptional_score: f64,

    /// Full formation period
    pub period_secs: i64,
}

impl Default for FormationConfig {
    fn default() -> Self {
        Self {
            min_score: 0.95,
            exceptional_score: 0.98,
            period_secs: 432_000,
        }
    }
}

impl FormationConfig {
    pub fn period(&self) -> Duration {
        Duration::seconds(self.period_secs)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub dimensions: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { dimensions: DEFAULT_DIMENSIONS }
    }
}

impl ResonanceConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ResonanceConfig = serde_json::from_str(json)
            .map_err(|e| Error::Validation(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        let f = &self.formation;
        for (name, v) in [
            ("thresholds.harmonic", t.harmonic),
            ("thresholds.dissonant", t.dissonant),
            ("thresholds.affinity", t.affinity),
            ("formation.min_score", f.min_score),
            ("formation.exceptional_score", f.exceptional_score),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::Validation(format!("{name} must be within [0, 1], got {v}")));
            }
        }
        if t.dissonant >= t.harmonic {
            return Err(Error::Validation(format!(
                "thresholds.dissonant ({}) must be below thresholds.harmonic ({})",
                t.dissonant, t.harmonic
            )));
        }
        if t.harmonic > t.affinity {
            return Err(Error::Validation("thresholds.affinity must not be below thresholds.harmonic".into()));
        }
        if f.min_score > f.exceptional_score {
            return Err(Error::Validation("formation.exceptional_score must not be below formation.min_score".into()));
        }
        if self.memory.encounter_capacity == 0 {
            return Err(Error::Validation("memory.encounter_capacity must be positive".into()));
        }
        if self.liveness.default_interval_secs <= 0 || self.liveness.window_factor <= 0 {
            return Err(Error::Validation("liveness interval and window factor must be positive".into()));
        }
        let l = &self.liveness;
        let window = l.default_interval_secs.checked_mul(i64::from(l.window_factor));
        if !window.is_some_and(|w| w <= MAX_SPAN_SECS) {
            return Err(Error::Validation(format!(
                "liveness window (default_interval_secs × window_factor) must not exceed {MAX_SPAN_SECS} seconds"
            )));
        }
        if f.period_secs <= 0 || f.period_secs > MAX_SPAN_SECS {
            return Err(Error::Validation(format!(
                "formation.period_secs must be within 1..={MAX_SPAN_SECS}"
            )));
        }
        if !(MIN_DIMENSIONS..=MAX_DIMENSIONS).contains(&self.features.dimensions) {
            return Err(Error::Validation(format!(
                "features.dimensions must be in {MIN_DIMENSIONS}..={MAX_DIMENSIONS}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ResonanceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.formation.period(), Duration::seconds(432_000));
        assert_eq!(config.liveness.default_interval(), Duration::hours(1));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = ResonanceConfig::from_json_str(r#"{"thresholds": {"harmonic": 0.8}}"#).unwrap();
        assert_eq!(config.thresholds.harmonic, 0.8);
        assert_eq!(config.thresholds.dissonant, 0.3);
        assert_eq!(config.memory.encounter_capacity, 100);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let err = ResonanceConfig::from_json_str(r#"{"thresholds": {"harmonic": 0.2}}"#).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = ResonanceConfig::default();
        config.memory.encounter_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_spans_rejected() {
        let huge_interval = r#"{"liveness": {"default_interval_secs": 9223372036854775807}}"#;
        assert!(matches!(ResonanceConfig::from_json_str(huge_interval), Err(Error::Validation(_))));

        let mut config = ResonanceConfig::default();
        config.liveness.default_interval_secs = MAX_SPAN_SECS;
        assert!(config.validate().is_err());
        config.liveness.window_factor = 1;
        assert!(config.validate().is_ok());
        config.liveness.window_factor = i32::MAX;
        config.liveness.default_interval_secs = 2;
        assert!(config.validate().is_err());

        let mut config = ResonanceConfig::default();
        config.formation.period_secs = i64::MAX;
        assert!(config.validate().is_err());
        config.formation.period_secs = MAX_SPAN_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resonance.json");
        std::fs::write(&path, r#"{"formation": {"period_secs": 60}}"#).unwrap();
        let config = ResonanceConfig::from_json_file(&path).unwrap();
        assert_eq!(config.formation.period(), Duration::seconds(60));
    }
}
