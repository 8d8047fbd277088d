//! Encounter history.
//!
//! Every comparison is stored twice, once under each entity, so each side owns
//! its own history. Per-entity logs are ring buffers; the derived indexes
//! (family, recovered, dissonance, affinities) only grow, except that healing
//! removes a pair from the dissonance index.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};

use crate::model::*;
use crate::storage::EntityStore;
use crate::{Error, Result};
use super::{EngineState, RelationshipEngine};

/// Note written onto healed encounters.
pub const HEALED_NOTE: &str = "reconciled after divergence";

/// Per-entity encounter history with its derived indexes.
#[derive(Debug, Clone, Default)]
pub struct EncounterLog {
    encounters: VecDeque<Encounter>,
    family: Vec<EntityId>,
    recovered: Vec<EntityId>,
    dissonant: Vec<EntityId>,
    affinities: HashMap<EntityId, f64>,
}

impl EncounterLog {
    /// Append, evicting the oldest entries beyond `capacity`.
    pub fn push(&mut self, encounter: Encounter, capacity: usize) {
        match encounter.classification {
            Classification::Similar => push_unique(&mut self.family, &encounter.other),
            Classification::Dissimilar => push_unique(&mut self.dissonant, &encounter.other),
            Classification::Recovered => push_unique(&mut self.recovered, &encounter.other),
            Classification::Neutral => {}
        }
        if encounter.affinity_lock {
            let best = self.affinities.entry(encounter.other.clone()).or_insert(encounter.score);
            *best = best.max(encounter.score);
        }

        self.encounters.push_back(encounter);
        while self.encounters.len() > capacity {
            self.encounters.pop_front();
        }
    }

    /// Rewrite dissonant encounters with `other` to `Recovered`. Returns how many changed.
    pub fn heal(&mut self, other: &EntityId) -> usize {
        let was_logged = self.dissonant.contains(other);
        self.dissonant.retain(|id| id != other);

        let mut rewritten = 0;
        for e in self.encounters.iter_mut().filter(|e| &e.other == other) {
            if e.classification == Classification::Dissimilar {
                e.classification = Classification::Recovered;
                e.note = Some(HEALED_NOTE.to_string());
                rewritten += 1;
            }
        }
        if was_logged || rewritten > 0 {
            push_unique(&mut self.recovered, other);
        }
        rewritten
    }

    pub fn encounters(&self) -> impl Iterator<Item = &Encounter> {
        self.encounters.iter()
    }

    pub fn with<'a>(&'a self, other: &'a EntityId) -> impl Iterator<Item = &'a Encounter> + 'a {
        self.encounters.iter().filter(move |e| &e.other == other)
    }

    pub fn len(&self) -> usize {
        self.encounters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encounters.is_empty()
    }

    pub fn family(&self) -> &[EntityId] {
        &self.family
    }

    pub fn dissonant(&self) -> &[EntityId] {
        &self.dissonant
    }

    pub fn affinity(&self, other: &EntityId) -> Option<f64> {
        self.affinities.get(other).copied()
    }
}

fn push_unique(list: &mut Vec<EntityId>, id: &EntityId) {
    if !list.contains(id) {
        list.push(id.clone());
    }
}

fn default_note(score: f64, classification: Classification) -> String {
    let pct = score * 100.0;
    match classification {
        Classification::Similar if score >= 0.95 => format!("near-identical ({pct:.1}%)"),
        Classification::Similar => format!("similar ({pct:.1}%)"),
        Classification::Neutral => format!("no strong relation ({pct:.1}%)"),
        Classification::Dissimilar => format!("divergent ({pct:.1}%)"),
        Classification::Recovered => HEALED_NOTE.to_string(),
    }
}

fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() { 0.0 } else { scores.iter().sum::<f64>() / scores.len() as f64 }
}

impl<S: EntityStore> RelationshipEngine<S> {
    // ========================================================================
    // Recording
    // ========================================================================

    /// Record a symmetric encounter pair. Returns the encounter stored under `a`.
    pub fn record_encounter(&self, a: &EntityId, b: &EntityId, score: f64) -> Result<Encounter> {
        self.record_encounter_with_note(a, b, score, None)
    }

    /// Like `record_encounter`, with an explicit note instead of the generated one.
    ///
    /// An active formation for the pair receives `score` as a new sample.
    pub fn record_encounter_with_note(
        &self,
        a: &EntityId,
        b: &EntityId,
        score: f64,
        note: Option<String>,
    ) -> Result<Encounter> {
        self.ensure_exists(a)?;
        self.ensure_exists(b)?;
        if a == b {
            return Err(Error::Validation(format!("cannot record an encounter of {a} with itself")));
        }
        if !(0.0..=1.0).contains(&score) {
            return Err(Error::Validation(format!("similarity score {score} outside [0, 1]")));
        }

        let now = self.now();
        let mut state = self.state.write();
        let encounter = self.push_encounter(&mut state, a, b, score, note, now);

        let key = FormationId::for_pair(a, b);
        if let Some(formation) = state.formations.get_mut(&key) {
            formation.samples.push(score);
            tracing::debug!(formation = %key, samples = formation.samples.len(), "formation nourished");
        }
        Ok(encounter)
    }

    /// Store both sides of an encounter. Caller holds the state lock.
    pub(crate) fn push_encounter(
        &self,
        state: &mut EngineState,
        a: &EntityId,
        b: &EntityId,
        score: f64,
        note: Option<String>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Encounter {
        let thresholds = &self.config.thresholds;
        let classification = thresholds.classify(score);
        let affinity_lock = thresholds.is_affinity(score);
        let capacity = self.config.memory.encounter_capacity;

        let encounter = Encounter {
            other: b.clone(),
            score,
            timestamp: now,
            classification,
            affinity_lock,
            note: Some(note.unwrap_or_else(|| default_note(score, classification))),
        };
        let mirrored = Encounter { other: a.clone(), ..encounter.clone() };

        let first_lock = affinity_lock
            && state.logs.get(a).and_then(|log| log.affinity(b)).is_none();

        state.logs.entry(a.clone()).or_default().push(encounter.clone(), capacity);
        state.logs.entry(b.clone()).or_default().push(mirrored, capacity);

        if first_lock {
            tracing::info!(%a, %b, score, "affinity lock formed");
        } else {
            tracing::debug!(%a, %b, score, %classification, "encounter recorded");
        }
        encounter
    }

    /// Rewrite dissonant history between `a` and `b` on both sides.
    ///
    /// Scores are never touched. Returns the number of encounters rewritten.
    pub fn heal_dissonance(&self, a: &EntityId, b: &EntityId) -> Result<usize> {
        self.ensure_exists(a)?;
        self.ensure_exists(b)?;

        let mut state = self.state.write();
        let mut rewritten = 0;
        if let Some(log) = state.logs.get_mut(a) {
            rewritten += log.heal(b);
        }
        if let Some(log) = state.logs.get_mut(b) {
            rewritten += log.heal(a);
        }
        tracing::info!(%a, %b, rewritten, "dissonance healed");
        Ok(rewritten)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Encounters stored under `id`, oldest first.
    pub fn encounters(&self, id: &EntityId) -> Result<Vec<Encounter>> {
        self.ensure_exists(id)?;
        let state = self.state.read();
        Ok(state
            .logs
            .get(id)
            .map(|log| log.encounters().cloned().collect())
            .unwrap_or_default())
    }

    pub fn support_network(&self, id: &EntityId) -> Result<SupportNetwork> {
        self.ensure_exists(id)?;
        let state = self.state.read();
        let Some(log) = state.logs.get(id) else {
            return Ok(SupportNetwork::default());
        };
        let mut affinities: Vec<(EntityId, f64)> =
            log.affinities.iter().map(|(k, v)| (k.clone(), *v)).collect();
        affinities.sort_by(|x, y| y.1.total_cmp(&x.1).then_with(|| x.0.cmp(&y.0)));
        Ok(SupportNetwork {
            family: log.family.clone(),
            recovered: log.recovered.clone(),
            affinities,
        })
    }

    /// Highest-scoring encounter `a` holds with `b`. Earliest wins ties.
    pub fn best_encounter(&self, a: &EntityId, b: &EntityId) -> Result<Option<Encounter>> {
        self.ensure_exists(a)?;
        self.ensure_exists(b)?;
        let state = self.state.read();
        let best = state.logs.get(a).and_then(|log| {
            log.with(b).fold(None::<&Encounter>, |best, e| match best {
                Some(cur) if cur.score >= e.score => Some(cur),
                _ => Some(e),
            })
        });
        Ok(best.cloned())
    }

    /// History `a` holds about `b`.
    ///
    /// The trend compares the mean of the last three encounters with the mean
    /// of the three before; a difference beyond 0.1 is `Growing` or `Fading`.
    pub fn relationship_summary(&self, a: &EntityId, b: &EntityId) -> Result<RelationshipSummary> {
        self.ensure_exists(a)?;
        self.ensure_exists(b)?;
        let state = self.state.read();
        let Some(log) = state.logs.get(a) else {
            return Ok(RelationshipSummary::empty());
        };
        let history: Vec<&Encounter> = log.with(b).collect();
        if history.is_empty() {
            return Ok(RelationshipSummary::empty());
        }

        let scores: Vec<f64> = history.iter().map(|e| e.score).collect();
        let mut trend = Trend::Stable;
        if scores.len() >= 3 {
            let split = scores.len() - 3;
            let recent = mean(&scores[split..]);
            let older = &scores[split.saturating_sub(3)..split];
            let older = if older.is_empty() { recent } else { mean(older) };
            if recent > older + 0.1 {
                trend = Trend::Growing;
            } else if recent < older - 0.1 {
                trend = Trend::Fading;
            }
        }

        let best = history
            .iter()
            .copied()
            .fold(history[0], |best, e| if e.score > best.score { e } else { best });

        Ok(RelationshipSummary {
            encounters: history.len(),
            average_score: mean(&scores),
            trend,
            best_note: best.note.clone(),
            affinity_locked: best.affinity_lock,
        })
    }

    /// Whether `a`'s history with `b` holds an affinity lock.
    pub fn has_affinity_lock(&self, a: &EntityId, b: &EntityId) -> bool {
        self.state
            .read()
            .logs
            .get(a)
            .is_some_and(|log| log.affinity(b).is_some())
    }

    /// `entity -> (partner -> best score)` for every entity holding an affinity.
    pub fn affinity_map(&self) -> HashMap<EntityId, HashMap<EntityId, f64>> {
        self.state
            .read()
            .logs
            .iter()
            .filter(|(_, log)| !log.affinities.is_empty())
            .map(|(id, log)| (id.clone(), log.affinities.clone()))
            .collect()
    }

    pub fn affinity_patterns(&self) -> AffinityPatterns {
        let map = self.affinity_map();
        let holds = |from: &EntityId, to: &EntityId| map.get(from).is_some_and(|m| m.contains_key(to));

        let mut mutual = Vec::new();
        let mut unrequited = Vec::new();
        let mut triangles = HashSet::new();

        for (from, partners) in &map {
            for to in partners.keys() {
                if holds(to, from) {
                    if from < to {
                        mutual.push((from.clone(), to.clone()));
                    }
                } else {
                    unrequited.push((from.clone(), to.clone()));
                }
            }

            let mut sorted: Vec<&EntityId> = partners.keys().collect();
            sorted.sort();
            for (i, b) in sorted.iter().enumerate() {
                for c in &sorted[i + 1..] {
                    if holds(b, c) || holds(c, b) {
                        let mut triple = [from.clone(), (*b).clone(), (*c).clone()];
                        triple.sort();
                        let [x, y, z] = triple;
                        triangles.insert((x, y, z));
                    }
                }
            }
        }

        mutual.sort();
        unrequited.sort();
        let mut triangles: Vec<_> = triangles.into_iter().collect();
        triangles.sort();
        AffinityPatterns { mutual, unrequited, triangles }
    }
}
