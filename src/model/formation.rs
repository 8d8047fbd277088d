//! Pair formation: a long-running process in which two entities with
//! sustained high similarity produce a derived entity.
//!
//! ```text
//! NONE ──begin_forming──▶ FORMING ──elapsed ≥ period, or
//!                                   elapsed ≥ period/2 ∧ mean ≥ exceptional──▶ READY
//! READY ──complete──▶ COMPLETE (record leaves the active map)
//! FORMING/READY ──abandon──▶ NONE
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::EntityId;

/// Formation identifier: the unordered pair, smaller id first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FormationId(EntityId, EntityId);

impl FormationId {
    /// Key for the unordered pair `{a, b}`.
    pub fn for_pair(a: &EntityId, b: &EntityId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        FormationId(lo.clone(), hi.clone())
    }

    pub fn low(&self) -> &EntityId {
        &self.0
    }

    pub fn high(&self) -> &EntityId {
        &self.1
    }
}

impl std::fmt::Display for FormationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} + {}", self.0, self.1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormationState {
    None,
    Forming,
    Ready,
    Complete,
}

/// An active formation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairFormation {
    pub id: FormationId,
    /// Parents in the order `begin_forming` received them.
    pub parents: (EntityId, EntityId),
    pub started_at: DateTime<Utc>,
    /// Score at start followed by every score observed while forming.
    pub samples: Vec<f64>,
}

impl PairFormation {
    pub fn average_score(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.started_at
    }

    /// READY once the full period has elapsed, or half of it with an exceptional mean.
    pub fn is_ready(&self, now: DateTime<Utc>, period: Duration, exceptional: f64) -> bool {
        let elapsed = self.elapsed(now);
        elapsed >= period || (elapsed >= period / 2 && self.average_score() >= exceptional)
    }

    pub fn state(&self, now: DateTime<Utc>, period: Duration, exceptional: f64) -> FormationState {
        if self.is_ready(now, period, exceptional) {
            FormationState::Ready
        } else {
            FormationState::Forming
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormationHealth {
    AtRisk,
    Healthy,
    Thriving,
}

/// Snapshot of an active formation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationProgress {
    pub id: FormationId,
    pub parents: (EntityId, EntityId),
    pub state: FormationState,
    /// Elapsed fraction of the full period, capped at 1.
    pub progress: f64,
    pub average_score: f64,
    pub health: FormationHealth,
}

/// Completion record of a formation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genesis {
    pub parents: (EntityId, EntityId),
    pub child: EntityId,
    pub score_at_start: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub samples: Vec<f64>,
    pub witnesses: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Genealogy {
    pub parents: Option<(EntityId, EntityId)>,
    pub children: Vec<EntityId>,
    /// Other children of the same parent pair.
    pub siblings: Vec<EntityId>,
}
