//! # Relationship Engine
//!
//! Everything the registry knows about how entities relate over time:
//!
//! | Concern | Module | State |
//! |---------|--------|-------|
//! | Scoring, classification, clustering | `similarity` | none (pure) |
//! | Encounter history and derived indexes | `memory` | `EncounterLog` per entity |
//! | Heartbeats | `liveness` | `LivenessRecord` per entity |
//! | Pair formation | `formation` | active `PairFormation`s and `Genesis` records |
//!
//! Each module adds an `impl` block to `RelationshipEngine`. All mutable state
//! shares one coarse `RwLock`; it is never held across an `.await`.

pub mod similarity;
pub mod memory;
pub mod liveness;
pub mod formation;

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::clock::Clock;
use crate::config::{ResonanceConfig, ThresholdConfig};
use crate::model::*;
use crate::registry::EntityRegistry;
use crate::storage::EntityStore;
use crate::{Error, Result};

pub use memory::EncounterLog;
pub use similarity::{
    detect_dissonance, find_clusters, resonance_field, similarity, Cluster, DissonantPair,
    ResonanceField,
};

/// Mutable engine state, guarded as a unit.
#[derive(Default)]
pub(crate) struct EngineState {
    pub(crate) logs: HashMap<EntityId, EncounterLog>,
    pub(crate) heartbeats: HashMap<EntityId, LivenessRecord>,
    pub(crate) formations: HashMap<FormationId, PairFormation>,
    pub(crate) geneses: Vec<Genesis>,
}

pub struct RelationshipEngine<S: EntityStore> {
    registry: Arc<EntityRegistry<S>>,
    config: ResonanceConfig,
    clock: Arc<dyn Clock>,
    state: RwLock<EngineState>,
}

impl<S: EntityStore> RelationshipEngine<S> {
    pub fn new(registry: Arc<EntityRegistry<S>>, config: ResonanceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            config,
            clock,
            state: RwLock::new(EngineState::default()),
        }
    }

    pub fn registry(&self) -> &Arc<EntityRegistry<S>> {
        &self.registry
    }

    pub fn config(&self) -> &ResonanceConfig {
        &self.config
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.config.thresholds
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Fail with `NotFound` unless `id` is registered.
    pub(crate) fn ensure_exists(&self, id: &EntityId) -> Result<()> {
        if self.registry.contains(id) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("Entity {id}")))
        }
    }

    // ========================================================================
    // Scoring over registered entities
    // ========================================================================

    /// Similarity of two registered entities.
    pub fn similarity_of(&self, a: &EntityId, b: &EntityId) -> Result<f64> {
        let ea = self.registry.require(a)?;
        let eb = self.registry.require(b)?;
        Ok(similarity(&ea.feature_vector, &eb.feature_vector))
    }

    pub fn classify(&self, score: f64) -> Classification {
        self.config.thresholds.classify(score)
    }

    /// Dissonant pairs across the whole registry, most dissonant first.
    pub fn dissonant_pairs(&self) -> Vec<DissonantPair> {
        detect_dissonance(&self.registry.all(), &self.config.thresholds)
    }

    /// Greedy threshold clusters across the whole registry, in registration order.
    pub fn clusters(&self, min_score: f64) -> Vec<Cluster> {
        find_clusters(&self.registry.all(), min_score)
    }

    /// Scores of every other entity relative to `center`.
    pub fn field_around(&self, center: &EntityId) -> Result<ResonanceField> {
        let center = self.registry.require(center)?;
        Ok(resonance_field(&center, &self.registry.all()))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_similarity_of_requires_both_entities() {
        let h = harness().await;
        let a = register(&h.engine, "alpha").await;
        let missing = EntityId::from("phash:v1:missing");

        assert!(matches!(h.engine.similarity_of(&a, &missing), Err(Error::NotFound(_))));
        assert_eq!(h.engine.similarity_of(&a, &a).unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_field_around_excludes_center() {
        let h = harness().await;
        let a = register(&h.engine, "alpha").await;
        register(&h.engine, "beta").await;
        register(&h.engine, "gamma").await;

        let field = h.engine.field_around(&a).unwrap();
        assert_eq!(field.scores.len(), 2);
        assert!(field.scores.iter().all(|(id, _)| id != &a));
    }
}
