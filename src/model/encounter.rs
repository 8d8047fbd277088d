//! Encounter: a timestamped comparison between two entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityId;

/// Outcome class of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Similar,
    Neutral,
    /// Dissonant pair.
    Dissimilar,
    /// Formerly dissimilar, rewritten by an explicit heal.
    Recovered,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Classification::Similar => "similar",
            Classification::Neutral => "neutral",
            Classification::Dissimilar => "dissimilar",
            Classification::Recovered => "recovered",
        };
        f.write_str(s)
    }
}

/// One side of a recorded comparison, stored under the entity that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub other: EntityId,
    /// Historical score, never rewritten.
    pub score: f64,
    pub timestamp: DateTime<Utc>,
    pub classification: Classification,
    /// Score reached the affinity threshold.
    pub affinity_lock: bool,
    pub note: Option<String>,
}

/// Trend of a pair's recent scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Growing,
    Stable,
    Fading,
}

/// Aggregate view of the encounters one entity holds about another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSummary {
    pub encounters: usize,
    pub average_score: f64,
    pub trend: Trend,
    pub best_note: Option<String>,
    pub affinity_locked: bool,
}

impl RelationshipSummary {
    pub fn empty() -> Self {
        Self {
            encounters: 0,
            average_score: 0.0,
            trend: Trend::Stable,
            best_note: None,
            affinity_locked: false,
        }
    }
}

/// Entities an entity can lean on, derived from its encounter history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SupportNetwork {
    /// Entities classified similar at least once.
    pub family: Vec<EntityId>,
    /// Entities with a healed (recovered) history.
    pub recovered: Vec<EntityId>,
    /// Affinity partners with their best score, strongest first.
    pub affinities: Vec<(EntityId, f64)>,
}

/// Pair-level structure of the affinity map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AffinityPatterns {
    /// Both sides hold an affinity for each other. Each pair appears once, sorted.
    pub mutual: Vec<(EntityId, EntityId)>,
    /// `(from, to)` where `to` holds no affinity back.
    pub unrequited: Vec<(EntityId, EntityId)>,
    /// Sorted triples `a, b, c` where one member holds affinities for the other two
    /// and one of those two holds an affinity for the remaining one.
    pub triangles: Vec<(EntityId, EntityId, EntityId)>,
}
