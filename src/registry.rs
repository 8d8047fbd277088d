//! # Entity Registry
//!
//! Stores entities keyed by their content fingerprint. Registration is
//! idempotent: identical text always resolves to the same entity, and a repeat
//! registration only bumps its occurrence counter.
//!
//! All mutable state sits behind one `RwLock`, held only for in-memory work;
//! persistence happens after the lock is released. A write whose save fails
//! is rolled back, so memory never holds a change the store refused.

use std::collections::VecDeque;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::engine::similarity::similarity;
use crate::fingerprint::{chord_label, FeatureExtractor, Fingerprint};
use crate::model::*;
use crate::storage::EntityStore;
use crate::{Error, Result};

/// Longest feature vector the registry accepts from `adopt`.
pub const MAX_VECTOR_LEN: usize = 64;

/// Undirected adjacency derived from entity relations.
pub type KnowledgeGraph = HashMap<EntityId, HashSet<EntityId>>;

/// Aggregate counts over the registry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    pub entities: usize,
    pub total_occurrences: u64,
    pub relations: usize,
    pub derived: usize,
    pub by_kind: Vec<(EntityKind, usize)>,
}

pub struct EntityRegistry<S: EntityStore> {
    store: S,
    extractor: FeatureExtractor,
    clock: Arc<dyn Clock>,
    state: RwLock<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    entities: HashMap<EntityId, Entity>,
    /// Ids in registration order; keeps `all()` deterministic.
    order: Vec<EntityId>,
}

impl RegistryState {
    fn insert(&mut self, entity: Entity) {
        if !self.entities.contains_key(&entity.id) {
            self.order.push(entity.id.clone());
        }
        self.entities.insert(entity.id.clone(), entity);
    }

    fn remove(&mut self, id: &EntityId) {
        if self.entities.remove(id).is_some() {
            self.order.retain(|o| o != id);
        }
    }
}

impl<S: EntityStore> EntityRegistry<S> {
    /// Open a registry over `store`, loading every record it holds.
    pub async fn open(store: S, extractor: FeatureExtractor, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut loaded = store.load_all().await?;
        loaded.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut state = RegistryState::default();
        for entity in loaded {
            state.insert(entity);
        }
        tracing::info!(entities = state.order.len(), "entity registry opened");

        Ok(Self { store, extractor, clock, state: RwLock::new(state) })
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fingerprint `text` without registering it.
    pub fn fingerprint(&self, text: &str) -> Fingerprint {
        self.extractor.compute(text)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Register `text`, or count another occurrence if it is already known.
    ///
    /// Metadata of a repeat registration is validated but otherwise ignored;
    /// the first registration's metadata stays.
    pub async fn register(&self, text: &str, metadata: EntityMetadata) -> Result<Entity> {
        metadata.validate()?;
        let fp = self.extractor.compute(text);

        let (entity, is_new) = {
            let mut state = self.state.write();
            match state.entities.get_mut(&fp.id) {
                Some(existing) => {
                    existing.occurrences += 1;
                    tracing::debug!(id = %existing.id, occurrences = existing.occurrences, "duplicate registration");
                    (existing.clone(), false)
                }
                None => {
                    let summary = chord_label(&fp.vector);
                    let entity = Entity::new(fp.id, metadata, fp.vector, self.clock.now())
                        .with_summary(summary);
                    state.insert(entity.clone());
                    (entity, true)
                }
            }
        };

        if let Err(e) = self.store.save(&entity).await {
            let mut state = self.state.write();
            if is_new {
                state.remove(&entity.id);
            } else if let Some(existing) = state.entities.get_mut(&entity.id) {
                existing.occurrences = existing.occurrences.saturating_sub(1);
            }
            tracing::warn!(id = %entity.id, error = %e, "registration not persisted");
            return Err(e);
        }
        if is_new {
            tracing::info!(id = %entity.id, name = %entity.name, kind = %entity.kind, "registered entity");
        }
        Ok(entity)
    }

    /// Insert a pre-built entity, such as a formation child.
    pub async fn adopt(&self, entity: Entity) -> Result<Entity> {
        entity.metadata.validate()?;
        let len = entity.feature_vector.len();
        if len == 0 || len > MAX_VECTOR_LEN {
            return Err(Error::Validation(format!(
                "feature vector length {len} outside 1..={MAX_VECTOR_LEN}"
            )));
        }
        if entity.feature_vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation("feature vector contains non-finite values".into()));
        }

        {
            let mut state = self.state.write();
            if state.entities.contains_key(&entity.id) {
                return Err(Error::InvalidState(format!("entity {} already registered", entity.id)));
            }
            state.insert(entity.clone());
        }

        if let Err(e) = self.store.save(&entity).await {
            self.state.write().remove(&entity.id);
            tracing::warn!(id = %entity.id, error = %e, "adopted entity not persisted");
            return Err(e);
        }
        tracing::info!(id = %entity.id, lineage = entity.lineage.len(), "adopted entity");
        Ok(entity)
    }

    /// Append a relation to `source` (relations are append-only).
    pub async fn relate(&self, source: &EntityId, relation: Relation) -> Result<Entity> {
        if !relation.strength.is_finite() {
            return Err(Error::Validation("relation strength must be finite".into()));
        }
        let entity = {
            let mut state = self.state.write();
            let entity = state
                .entities
                .get_mut(source)
                .ok_or_else(|| Error::NotFound(format!("Entity {source}")))?;
            entity.relations.push(relation);
            entity.clone()
        };
        if let Err(e) = self.store.save(&entity).await {
            let mut state = self.state.write();
            if let Some(current) = state.entities.get_mut(source) {
                // Later relations may have landed meanwhile; drop only ours.
                let ours = entity.relations.last();
                if let Some(pos) = current.relations.iter().rposition(|r| Some(r) == ours) {
                    current.relations.remove(pos);
                }
            }
            tracing::warn!(id = %source, error = %e, "relation not persisted");
            return Err(e);
        }
        Ok(entity)
    }

    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get(&self, id: &EntityId) -> Option<Entity> {
        self.state.read().entities.get(id).cloned()
    }

    /// Like `get`, but absence is an error.
    pub fn require(&self, id: &EntityId) -> Result<Entity> {
        self.get(id).ok_or_else(|| Error::NotFound(format!("Entity {id}")))
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.state.read().entities.contains_key(id)
    }

    /// Every entity, in registration order.
    pub fn all(&self) -> Vec<Entity> {
        let state = self.state.read();
        state.order.iter().filter_map(|id| state.entities.get(id).cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Undirected adjacency over all relations. Relation targets that are not
    /// registered still appear as vertices.
    pub fn knowledge_graph(&self) -> KnowledgeGraph {
        let state = self.state.read();
        let mut graph = KnowledgeGraph::new();
        for entity in state.entities.values() {
            graph.entry(entity.id.clone()).or_default();
            for relation in &entity.relations {
                graph.entry(entity.id.clone()).or_default().insert(relation.target.clone());
                graph.entry(relation.target.clone()).or_default().insert(entity.id.clone());
            }
        }
        graph
    }

    /// The entity followed by its known ancestors, nearest first.
    pub fn trace_lineage(&self, id: &EntityId) -> Result<Vec<Entity>> {
        let state = self.state.read();
        let root = state
            .entities
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("Entity {id}")))?;

        let mut trail = vec![root.clone()];
        let mut seen: HashSet<EntityId> = HashSet::from_iter([id.clone()]);
        let mut queue: VecDeque<EntityId> = root.lineage.iter().cloned().collect();
        while let Some(ancestor) = queue.pop_front() {
            if !seen.insert(ancestor.clone()) {
                continue;
            }
            if let Some(entity) = state.entities.get(&ancestor) {
                queue.extend(entity.lineage.iter().cloned());
                trail.push(entity.clone());
            }
        }
        Ok(trail)
    }

    /// Every other entity scoring at least `threshold` against `id`, best first.
    pub fn find_resonant(&self, id: &EntityId, threshold: f64) -> Result<Vec<(Entity, f64)>> {
        let target = self.require(id)?;
        let mut matches: Vec<(Entity, f64)> = self
            .all()
            .into_iter()
            .filter(|e| e.id != target.id)
            .map(|e| {
                let score = similarity(&target.feature_vector, &e.feature_vector);
                (e, score)
            })
            .filter(|(_, score)| *score >= threshold)
            .collect();
        matches.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        Ok(matches)
    }

    /// Best match above `threshold`, if any.
    pub fn best_match(&self, id: &EntityId, threshold: f64) -> Result<Option<(Entity, f64)>> {
        Ok(self.find_resonant(id, threshold)?.into_iter().next())
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        let by_kind = EntityKind::ALL
            .into_iter()
            .map(|k| (k, state.entities.values().filter(|e| e.kind == k).count()))
            .filter(|(_, n)| *n > 0)
            .collect();
        RegistryStats {
            entities: state.entities.len(),
            total_occurrences: state.entities.values().map(|e| e.occurrences).sum(),
            relations: state.entities.values().map(|e| e.relations.len()).sum(),
            derived: state.entities.values().filter(|e| !e.is_root()).count(),
            by_kind,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
