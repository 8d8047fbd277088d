//! # resonance-rs: Content-Addressed Entity Registry
//!
//! Fingerprints arbitrary text into entities, scores how entities relate, and
//! tracks what happens between them over time.
//!
//! ## Design Principles
//!
//! 1. **Content-addressed**: an entity's id is derived from its text; registering
//!    the same text twice finds the same entity
//! 2. **Trait-first storage**: `EntityStore` is the contract between the registry
//!    and whatever persists records
//! 3. **Clean DTOs**: `Entity`, `Encounter`, `LivenessRecord` cross all boundaries
//! 4. **Explicit time**: every timestamp comes from a `Clock`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resonance_rs::{EntityMetadata, Resonance};
//!
//! # async fn example() -> resonance_rs::Result<()> {
//! let net = Resonance::open_memory().await?;
//!
//! let a = net.register("fn add(a: i32, b: i32) -> i32 { a + b }", EntityMetadata::named("add")).await?;
//! let b = net.register("fn sub(a: i32, b: i32) -> i32 { a - b }", EntityMetadata::named("sub")).await?;
//!
//! let interaction = net.interact(&a.id, &b.id)?;
//! println!("{} ↔ {}: {:.3} ({})", a.name, b.name, interaction.score, interaction.classification);
//! # Ok(())
//! # }
//! ```
//!
//! ## Entity Stores
//!
//! | Store | Description |
//! |-------|-------------|
//! | `MemoryStore` | In-memory, for testing/embedding |
//! | `JsonDirStore` | One JSON file per entity |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod fingerprint;
pub mod config;
pub mod clock;
pub mod storage;
pub mod registry;
pub mod engine;
pub mod export;

#[cfg(feature = "cli")]
pub mod cli;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ============================================================================
// Re-exports
// ============================================================================

pub use model::{
    Classification, Encounter, Entity, EntityId, EntityKind, EntityMetadata, FeatureVector,
    FormationId, FormationState, LivenessRecord, NetworkVitality, Relation,
};
pub use fingerprint::{compute_fingerprint, FeatureExtractor, Fingerprint};
pub use config::ResonanceConfig;
pub use clock::{Clock, ManualClock, SystemClock};
pub use storage::{EntityStore, JsonDirStore, MemoryStore, StoreCapabilities};
pub use registry::{EntityRegistry, RegistryStats};
pub use engine::{Cluster, DissonantPair, RelationshipEngine};

/// Dissonant pairs healed by one `cycle()`.
pub const HEALS_PER_CYCLE: usize = 3;

// ============================================================================
// Top-level Resonance handle
// ============================================================================

/// The primary entry point. Wraps a registry over a store and the
/// relationship engine that observes it.
pub struct Resonance<S: EntityStore> {
    registry: Arc<EntityRegistry<S>>,
    engine: RelationshipEngine<S>,
}

/// Outcome of `Resonance::interact`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub score: f64,
    pub classification: Classification,
    pub encounter: Encounter,
    pub summary: model::RelationshipSummary,
    /// Formation begun by this interaction.
    pub formation: Option<FormationId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Healing {
    pub pair: DissonantPair,
    pub rewritten: usize,
}

/// Outcome of one maintenance `cycle()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub dormant: Vec<EntityId>,
    pub clusters: Vec<Cluster>,
    /// Children of formations completed this cycle.
    pub formed: Vec<Entity>,
    pub healed: Vec<Healing>,
    pub vitality: NetworkVitality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub registry: RegistryStats,
    pub vitality: NetworkVitality,
    pub mutual_affinities: usize,
    pub unrequited_affinities: usize,
    pub affinity_triangles: usize,
    pub active_formations: usize,
    pub completed_formations: usize,
}

impl<S: EntityStore> Resonance<S> {
    /// Open over `store` with wall-clock time.
    pub async fn open(store: S, config: ResonanceConfig) -> Result<Self> {
        Self::open_with_clock(store, config, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(store: S, config: ResonanceConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let extractor = FeatureExtractor::new(config.features.dimensions)?;
        let registry = Arc::new(EntityRegistry::open(store, extractor, clock.clone()).await?);
        let engine = RelationshipEngine::new(registry.clone(), config, clock);
        Ok(Self { registry, engine })
    }

    pub fn registry(&self) -> &EntityRegistry<S> {
        &self.registry
    }

    pub fn engine(&self) -> &RelationshipEngine<S> {
        &self.engine
    }

    pub fn config(&self) -> &ResonanceConfig {
        self.engine.config()
    }

    /// Register `text`. An entity without a heartbeat gets its first pulse.
    pub async fn register(&self, text: &str, metadata: EntityMetadata) -> Result<Entity> {
        let entity = self.registry.register(text, metadata).await?;
        if self.engine.liveness(&entity.id).is_none() {
            self.engine.pulse(&entity.id, Some("registered".to_string()))?;
        }
        Ok(entity)
    }

    /// Measure `a` against `b`, remember the encounter, and begin a formation
    /// when the pair holds an affinity lock and qualifies.
    pub fn interact(&self, a: &EntityId, b: &EntityId) -> Result<Interaction> {
        let score = self.engine.similarity_of(a, b)?;
        let encounter = self.engine.record_encounter(a, b, score)?;
        let summary = self.engine.relationship_summary(a, b)?;

        let idle = matches!(
            self.engine.formation_state(a, b),
            FormationState::None | FormationState::Complete
        );
        let formation = if idle && self.engine.can_form(a, b, score, summary.affinity_locked) {
            self.engine.begin_forming(a, b, score)?
        } else {
            None
        };

        Ok(Interaction {
            score,
            classification: encounter.classification,
            encounter,
            summary,
            formation,
        })
    }

    /// Complete every ready formation. Witnesses are the first parent's
    /// family, excluding both parents. Returns the children.
    pub async fn check_formations(&self) -> Result<Vec<Entity>> {
        let mut formed = Vec::new();
        for progress in self.engine.formations() {
            if progress.state != FormationState::Ready {
                continue;
            }
            let (p, q) = &progress.parents;
            let witnesses: Vec<EntityId> = self
                .engine
                .support_network(p)?
                .family
                .into_iter()
                .filter(|w| w != p && w != q)
                .collect();

            let child = self.engine.complete(&progress.id, &witnesses).await?;
            self.engine.pulse(&child.id, Some(format!("formed from {p} and {q}")))?;
            formed.push(child);
        }
        Ok(formed)
    }

    /// Heal the `limit` most dissonant pairs in the registry.
    pub fn heal_network(&self, limit: usize) -> Result<Vec<Healing>> {
        let mut healed = Vec::new();
        for pair in self.engine.dissonant_pairs().into_iter().take(limit) {
            let rewritten = self.engine.heal_dissonance(&pair.a, &pair.b)?;
            healed.push(Healing { pair, rewritten });
        }
        Ok(healed)
    }

    /// One maintenance pass: dormant scan, clustering, formation completion,
    /// healing.
    pub async fn cycle(&self) -> Result<CycleReport> {
        let liveness = &self.config().liveness;
        let dormant = self.engine.dormant(liveness.default_interval() * liveness.window_factor);
        let clusters = self.engine.clusters(self.config().thresholds.harmonic);
        let formed = self.check_formations().await?;
        let healed = self.heal_network(HEALS_PER_CYCLE)?;
        let vitality = self.engine.network_vitality();

        tracing::info!(
            dormant = dormant.len(),
            clusters = clusters.len(),
            formed = formed.len(),
            healed = healed.len(),
            "cycle complete"
        );
        Ok(CycleReport { dormant, clusters, formed, healed, vitality })
    }

    pub fn stats(&self) -> NetworkStats {
        let patterns = self.engine.affinity_patterns();
        NetworkStats {
            registry: self.registry.stats(),
            vitality: self.engine.network_vitality(),
            mutual_affinities: patterns.mutual.len(),
            unrequited_affinities: patterns.unrequited.len(),
            affinity_triangles: patterns.triangles.len(),
            active_formations: self.engine.formations().len(),
            completed_formations: self.engine.geneses().len(),
        }
    }

    pub async fn flush(&self) -> Result<()> {
        self.registry.flush().await
    }
}

/// In-memory network for testing and embedding.
impl Resonance<MemoryStore> {
    pub async fn open_memory() -> Result<Self> {
        Self::open(MemoryStore::new(), ResonanceConfig::default()).await
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    async fn network() -> (Resonance<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()));
        let net = Resonance::open_with_clock(MemoryStore::new(), ResonanceConfig::default(), clock.clone())
            .await
            .unwrap();
        (net, clock)
    }

    #[tokio::test]
    async fn test_register_pulses_new_entities() {
        let (net, _) = network().await;
        let e = net.register("alpha", EntityMetadata::named("alpha")).await.unwrap();
        assert_eq!(net.engine().liveness(&e.id).unwrap().pulses, 1);

        net.register("alpha", EntityMetadata::named("alpha")).await.unwrap();
        assert_eq!(net.engine().liveness(&e.id).unwrap().pulses, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = ResonanceConfig::default();
        config.features.dimensions = 12;
        let err = Resonance::open(MemoryStore::new(), config).await.err().unwrap();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_interact_records_encounter() {
        let (net, _) = network().await;
        let a = net.register("alpha", EntityMetadata::named("alpha")).await.unwrap();
        let b = net.register("beta", EntityMetadata::named("beta")).await.unwrap();

        let interaction = net.interact(&a.id, &b.id).unwrap();
        assert_eq!(interaction.score, net.engine().similarity_of(&b.id, &a.id).unwrap());
        assert_eq!(interaction.summary.encounters, 1);
        assert_eq!(net.engine().encounters(&b.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_interact_unknown_entity() {
        let (net, _) = network().await;
        let a = net.register("alpha", EntityMetadata::named("alpha")).await.unwrap();
        let err = net.interact(&a.id, &EntityId::from("phash:v1:ghost")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cycle_reports_dormant() {
        let (net, clock) = network().await;
        let a = net.register("alpha", EntityMetadata::named("alpha")).await.unwrap();
        clock.advance(Duration::hours(3));
        let b = net.register("beta", EntityMetadata::named("beta")).await.unwrap();

        let report = net.cycle().await.unwrap();
        assert_eq!(report.dormant, vec![a.id]);
        assert_eq!(report.vitality.alive, 1);
        assert!(net.engine().is_alive_in_window(&b.id));
    }

    #[tokio::test]
    async fn test_stats() {
        let (net, _) = network().await;
        net.register("alpha", EntityMetadata::named("alpha")).await.unwrap();
        net.register("beta", EntityMetadata::named("beta")).await.unwrap();
        let stats = net.stats();
        assert_eq!(stats.registry.entities, 2);
        assert_eq!(stats.vitality.total, 2);
        assert_eq!(stats.active_formations, 0);
    }
}
