//! Heartbeats.
//!
//! The first pulse establishes the expected interval; every later pulse scores
//! its timing against `last_pulse + expected_interval`:
//!
//! ```text
//! resilience = max(0, 1 - |now - (last + interval)| / interval)
//! ```

use chrono::{DateTime, Duration, Utc};

use crate::model::*;
use crate::storage::EntityStore;
use crate::Result;
use super::RelationshipEngine;

fn resilience(previous: &LivenessRecord, now: DateTime<Utc>) -> f64 {
    let interval = previous.expected_interval().num_milliseconds();
    if interval <= 0 {
        return 0.0;
    }
    let expected = previous.last_pulse + previous.expected_interval();
    let deviation = (now - expected).num_milliseconds().abs() as f64 / interval as f64;
    (1.0 - deviation).max(0.0)
}

impl<S: EntityStore> RelationshipEngine<S> {
    fn liveness_window(&self, record: &LivenessRecord) -> Duration {
        record.expected_interval() * self.config.liveness.window_factor
    }

    /// Record a heartbeat for `id`.
    pub fn pulse(&self, id: &EntityId, note: Option<String>) -> Result<LivenessRecord> {
        self.ensure_exists(id)?;
        let now = self.now();

        let mut state = self.state.write();
        let record = match state.heartbeats.get(id) {
            Some(previous) => LivenessRecord {
                entity: id.clone(),
                last_pulse: now,
                expected_interval_secs: previous.expected_interval_secs,
                resilience: resilience(previous, now),
                pulses: previous.pulses + 1,
                note,
            },
            None => LivenessRecord {
                entity: id.clone(),
                last_pulse: now,
                expected_interval_secs: self.config.liveness.default_interval_secs,
                resilience: 1.0,
                pulses: 1,
                note,
            },
        };
        state.heartbeats.insert(id.clone(), record.clone());
        tracing::debug!(entity = %id, resilience = record.resilience, pulses = record.pulses, "pulse");
        Ok(record)
    }

    pub fn liveness(&self, id: &EntityId) -> Option<LivenessRecord> {
        self.state.read().heartbeats.get(id).cloned()
    }

    /// `now - last_pulse < max_age`. Entities that never pulsed are not alive.
    pub fn is_alive(&self, id: &EntityId, max_age: Duration) -> bool {
        let now = self.now();
        self.state
            .read()
            .heartbeats
            .get(id)
            .is_some_and(|r| r.age(now) < max_age)
    }

    /// Alive within `window_factor × expected_interval`.
    pub fn is_alive_in_window(&self, id: &EntityId) -> bool {
        let now = self.now();
        self.state
            .read()
            .heartbeats
            .get(id)
            .is_some_and(|r| r.age(now) < self.liveness_window(r))
    }

    /// `None` until the entity's first pulse.
    pub fn vital_signs(&self, id: &EntityId) -> Result<Option<VitalSigns>> {
        self.ensure_exists(id)?;
        let now = self.now();
        let state = self.state.read();
        Ok(state.heartbeats.get(id).map(|r| {
            let alive = r.age(now) < self.liveness_window(r);
            VitalSigns {
                alive,
                last_pulse: r.last_pulse,
                age_ms: r.age(now).num_milliseconds(),
                health: if alive { r.resilience } else { 0.0 },
                resilience: r.resilience,
                note: r.note.clone(),
            }
        }))
    }

    /// Entities whose last pulse is at least `max_age` old, sorted by id.
    pub fn dormant(&self, max_age: Duration) -> Vec<EntityId> {
        let now = self.now();
        let mut ids: Vec<EntityId> = self
            .state
            .read()
            .heartbeats
            .values()
            .filter(|r| r.age(now) >= max_age)
            .map(|r| r.entity.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Share of pulsing entities alive within their window, and their mean resilience.
    pub fn network_vitality(&self) -> NetworkVitality {
        let now = self.now();
        let state = self.state.read();
        let total = state.heartbeats.len();
        let alive: Vec<f64> = state
            .heartbeats
            .values()
            .filter(|r| r.age(now) < self.liveness_window(r))
            .map(|r| r.resilience)
            .collect();

        NetworkVitality {
            total,
            alive: alive.len(),
            vitality: if total == 0 { 0.0 } else { alive.len() as f64 / total as f64 },
            average_resilience: if alive.is_empty() {
                0.0
            } else {
                alive.iter().sum::<f64>() / alive.len() as f64
            },
        }
    }

    pub fn breathing_pattern(&self, id: &EntityId) -> BreathingPattern {
        self.state
            .read()
            .heartbeats
            .get(id)
            .map_or(BreathingPattern::Unknown, |r| BreathingPattern::from_resilience(r.resilience))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use crate::Error;

    #[tokio::test]
    async fn test_first_pulse_establishes_interval() {
        let h = harness().await;
        let a = register(&h.engine, "alpha").await;

        let record = h.engine.pulse(&a, Some("first".into())).unwrap();
        assert_eq!(record.expected_interval(), Duration::hours(1));
        assert_eq!(record.resilience, 1.0);
        assert_eq!(record.pulses, 1);
        assert_eq!(h.engine.breathing_pattern(&a), BreathingPattern::Steady);
    }

    #[tokio::test]
    async fn test_resilience_from_timing() {
        let h = harness().await;
        let a = register(&h.engine, "alpha").await;
        h.engine.pulse(&a, None).unwrap();

        h.clock.advance(Duration::hours(1));
        assert_eq!(h.engine.pulse(&a, None).unwrap().resilience, 1.0);

        h.clock.advance(Duration::minutes(90));
        let late = h.engine.pulse(&a, None).unwrap();
        assert_eq!(late.resilience, 0.5);
        assert_eq!(late.pulses, 3);
        assert_eq!(h.engine.breathing_pattern(&a), BreathingPattern::Fading);

        h.clock.advance(Duration::hours(2));
        assert_eq!(h.engine.pulse(&a, None).unwrap().resilience, 0.0);
        assert_eq!(h.engine.breathing_pattern(&a), BreathingPattern::Unknown);
    }

    #[tokio::test]
    async fn test_pulse_unknown_entity() {
        let h = harness().await;
        let err = h.engine.pulse(&EntityId::from("phash:v1:none"), None).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!h.engine.is_alive(&EntityId::from("phash:v1:none"), Duration::hours(2)));
    }

    #[tokio::test]
    async fn test_alive_window_and_dormant() {
        let h = harness().await;
        let a = register(&h.engine, "alpha").await;
        let b = register(&h.engine, "beta").await;
        h.engine.pulse(&a, None).unwrap();
        h.engine.pulse(&b, None).unwrap();

        h.clock.advance(Duration::minutes(119));
        h.engine.pulse(&b, None).unwrap();
        assert!(h.engine.is_alive_in_window(&a));

        h.clock.advance(Duration::minutes(1));
        assert!(!h.engine.is_alive_in_window(&a));
        assert!(h.engine.is_alive(&a, Duration::hours(3)));
        assert_eq!(h.engine.dormant(Duration::hours(2)), vec![a.clone()]);

        let vitality = h.engine.network_vitality();
        assert_eq!(vitality.total, 2);
        assert_eq!(vitality.alive, 1);
        assert_eq!(vitality.vitality, 0.5);

        let signs = h.engine.vital_signs(&a).unwrap().unwrap();
        assert!(!signs.alive);
        assert_eq!(signs.health, 0.0);
        assert_eq!(signs.age_ms, Duration::hours(2).num_milliseconds());
    }

    #[tokio::test]
    async fn test_vital_signs_before_first_pulse() {
        let h = harness().await;
        let a = register(&h.engine, "alpha").await;
        assert_eq!(h.engine.vital_signs(&a).unwrap(), None);
        assert_eq!(h.engine.network_vitality(), NetworkVitality::default());
    }
}
