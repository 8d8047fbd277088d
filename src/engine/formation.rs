//! Pair formation.
//!
//! A pair with an affinity lock and a score of at least `min_score` may begin
//! forming. Scores recorded for the pair afterwards are kept as samples. Once
//! ready, `complete` derives a child entity from both parents, adopts it into
//! the registry and records a `Genesis`.
//!
//! At most one formation per unordered pair is active at a time.

use chrono::{DateTime, Utc};

use crate::fingerprint::{chord_label, merge_vectors};
use crate::model::*;
use crate::storage::EntityStore;
use crate::{Error, Result};
use super::RelationshipEngine;

/// Relation type linking a child to each parent.
pub const DERIVED_FROM: &str = "derivedFrom";

/// Relation type linking a witness to a child.
pub const WITNESSED: &str = "witnessed";

const AT_RISK_BELOW: f64 = 0.8;
const THRIVING_FROM: f64 = 0.95;

impl<S: EntityStore> RelationshipEngine<S> {
    fn is_ready(&self, formation: &PairFormation, now: DateTime<Utc>) -> bool {
        self.state_of(formation, now) == FormationState::Ready
    }

    fn state_of(&self, formation: &PairFormation, now: DateTime<Utc>) -> FormationState {
        let cfg = &self.config.formation;
        formation.state(now, cfg.period(), cfg.exceptional_score)
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Preconditions for entering `Forming`.
    pub fn can_form(&self, a: &EntityId, b: &EntityId, score: f64, has_lock: bool) -> bool {
        a != b && has_lock && score.is_finite() && score >= self.config.formation.min_score
    }

    /// Begin forming `a` and `b`.
    ///
    /// Returns `Ok(None)` when the preconditions are unmet and
    /// `Err(InvalidState)` when the pair already has an active formation. The
    /// lock is read from `a`'s encounter history.
    pub fn begin_forming(&self, a: &EntityId, b: &EntityId, score: f64) -> Result<Option<FormationId>> {
        self.ensure_exists(a)?;
        self.ensure_exists(b)?;
        let id = FormationId::for_pair(a, b);
        let now = self.now();

        let mut state = self.state.write();
        if state.formations.contains_key(&id) {
            return Err(Error::InvalidState(format!("formation {id} already active")));
        }
        let has_lock = state.logs.get(a).is_some_and(|log| log.affinity(b).is_some());
        if !self.can_form(a, b, score, has_lock) {
            tracing::debug!(%a, %b, score, has_lock, "formation preconditions unmet");
            return Ok(None);
        }

        self.push_encounter(&mut state, a, b, score, Some("began forming".to_string()), now);
        state.formations.insert(
            id.clone(),
            PairFormation {
                id: id.clone(),
                parents: (a.clone(), b.clone()),
                started_at: now,
                samples: vec![score],
            },
        );
        tracing::info!(formation = %id, score, "formation begun");
        Ok(Some(id))
    }

    /// Add an observed score to an active formation.
    pub fn nourish(&self, id: &FormationId, score: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&score) {
            return Err(Error::Validation(format!("similarity score {score} outside [0, 1]")));
        }
        let mut state = self.state.write();
        let formation = state
            .formations
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Formation {id}")))?;
        formation.samples.push(score);
        Ok(())
    }

    pub fn is_ready_to_complete(&self, id: &FormationId) -> Result<bool> {
        let now = self.now();
        let state = self.state.read();
        let formation = state
            .formations
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("Formation {id}")))?;
        Ok(self.is_ready(formation, now))
    }

    /// Drop an active formation without producing a child.
    pub fn abandon(&self, id: &FormationId) -> Result<PairFormation> {
        let removed = self
            .state
            .write()
            .formations
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("Formation {id}")))?;
        tracing::info!(formation = %id, "formation abandoned");
        Ok(removed)
    }

    /// Complete a ready formation.
    ///
    /// Every witness must exist. Each receives a 1.0 encounter with the child
    /// and a `witnessed` relation to it. If the child cannot be persisted the
    /// formation stays active and nothing else changes.
    pub async fn complete(&self, id: &FormationId, witnesses: &[EntityId]) -> Result<Entity> {
        for w in witnesses {
            self.ensure_exists(w)?;
        }
        let now = self.now();

        let formation = {
            let mut state = self.state.write();
            let formation = state
                .formations
                .get(id)
                .ok_or_else(|| Error::NotFound(format!("Formation {id}")))?;
            if !self.is_ready(formation, now) {
                return Err(Error::InvalidState(format!("formation {id} is not ready")));
            }
            state
                .formations
                .remove(id)
                .ok_or_else(|| Error::NotFound(format!("Formation {id}")))?
        };

        let adopted = match self.derive_child(&formation, now) {
            Ok(child) => self.registry.adopt(child).await,
            Err(e) => Err(e),
        };
        let child = match adopted {
            Ok(child) => child,
            Err(e) => {
                self.state.write().formations.insert(id.clone(), formation);
                return Err(e);
            }
        };

        let mut seen: Vec<EntityId> = Vec::with_capacity(witnesses.len());
        for w in witnesses {
            if !seen.contains(w) {
                seen.push(w.clone());
            }
        }

        let genesis = Genesis {
            parents: formation.parents.clone(),
            child: child.id.clone(),
            score_at_start: formation.samples.first().copied().unwrap_or_default(),
            started_at: formation.started_at,
            completed_at: now,
            samples: formation.samples,
            witnesses: seen.clone(),
        };
        {
            let mut state = self.state.write();
            let note = format!("witnessed the formation of {}", child.name);
            for w in &seen {
                self.push_encounter(&mut state, w, &child.id, 1.0, Some(note.clone()), now);
            }
            state.geneses.push(genesis);
        }
        tracing::info!(formation = %id, child = %child.id, witnesses = seen.len(), "formation complete");

        // The child and its genesis stand even if a witness record cannot be saved.
        for w in &seen {
            if let Err(e) = self.registry.relate(w, Relation::new(WITNESSED, child.id.clone(), 1.0)).await {
                tracing::warn!(witness = %w, child = %child.id, error = %e, "witness relation not persisted");
            }
        }
        Ok(child)
    }

    fn derive_child(&self, formation: &PairFormation, now: DateTime<Utc>) -> Result<Entity> {
        let a = self.registry.require(&formation.parents.0)?;
        let b = self.registry.require(&formation.parents.1)?;

        let seed = format!("{}\n{}\n{}\n{}", a.id, b.id, formation.started_at.to_rfc3339(), now.to_rfc3339());
        let child_id = self.registry.fingerprint(&seed).id;
        let vector = merge_vectors(&a.feature_vector, &b.feature_vector);
        let metadata = EntityMetadata::named(format!("{} + {}", a.name, b.name))
            .with_kind(EntityKind::Composite)
            .with_description(format!("formed from {} and {}", a.id, b.id));

        Ok(Entity::new(child_id, metadata, vector.clone(), now)
            .with_summary(chord_label(&vector))
            .with_lineage([a.id.clone(), b.id.clone()])
            .with_relation(Relation::new(DERIVED_FROM, a.id, 1.0))
            .with_relation(Relation::new(DERIVED_FROM, b.id, 1.0)))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// `Complete` once a pair has produced a child and has no active formation.
    pub fn formation_state(&self, a: &EntityId, b: &EntityId) -> FormationState {
        let id = FormationId::for_pair(a, b);
        let now = self.now();
        let state = self.state.read();
        if let Some(f) = state.formations.get(&id) {
            return self.state_of(f, now);
        }
        let completed = state
            .geneses
            .iter()
            .any(|g| FormationId::for_pair(&g.parents.0, &g.parents.1) == id);
        if completed { FormationState::Complete } else { FormationState::None }
    }

    pub fn formation(&self, id: &FormationId) -> Option<PairFormation> {
        self.state.read().formations.get(id).cloned()
    }

    /// Progress of every active formation, sorted by id.
    pub fn formations(&self) -> Vec<FormationProgress> {
        let now = self.now();
        let period = self.config.formation.period();
        let state = self.state.read();
        let mut out: Vec<FormationProgress> = state
            .formations
            .values()
            .map(|f| {
                let average = f.average_score();
                let progress = if period.num_milliseconds() > 0 {
                    (f.elapsed(now).num_milliseconds() as f64 / period.num_milliseconds() as f64).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                FormationProgress {
                    id: f.id.clone(),
                    parents: f.parents.clone(),
                    state: self.state_of(f, now),
                    progress,
                    average_score: average,
                    health: if average < AT_RISK_BELOW {
                        FormationHealth::AtRisk
                    } else if average >= THRIVING_FROM {
                        FormationHealth::Thriving
                    } else {
                        FormationHealth::Healthy
                    },
                }
            })
            .collect();
        out.sort_by(|x, y| x.id.cmp(&y.id));
        out
    }

    /// Completion record for `child`, if it came from a formation.
    pub fn genesis(&self, child: &EntityId) -> Option<Genesis> {
        self.state.read().geneses.iter().find(|g| &g.child == child).cloned()
    }

    /// Every completion, oldest first.
    pub fn geneses(&self) -> Vec<Genesis> {
        self.state.read().geneses.clone()
    }

    pub fn genealogy(&self, id: &EntityId) -> Result<Genealogy> {
        self.ensure_exists(id)?;
        let state = self.state.read();
        let parents = state
            .geneses
            .iter()
            .find(|g| &g.child == id)
            .map(|g| g.parents.clone());
        let children = state
            .geneses
            .iter()
            .filter(|g| &g.parents.0 == id || &g.parents.1 == id)
            .map(|g| g.child.clone())
            .collect();
        let siblings = match &parents {
            Some((p, q)) => {
                let key = FormationId::for_pair(p, q);
                state
                    .geneses
                    .iter()
                    .filter(|g| &g.child != id && FormationId::for_pair(&g.parents.0, &g.parents.1) == key)
                    .map(|g| g.child.clone())
                    .collect()
            }
            None => Vec::new(),
        };
        Ok(Genealogy { parents, children, siblings })
    }
}
