//! # Registry Model
//!
//! Clean DTOs shared by the registry, the relationship engine, storage and callers.
//!
//! Design rule: this module is pure data with no I/O, no locks, no async.

pub mod entity;
pub mod metadata;
pub mod encounter;
pub mod liveness;
pub mod formation;

pub use entity::{Entity, EntityId, EntityKind, FeatureVector, Relation};
pub use metadata::{EntityMetadata, METADATA_SCHEMA_VERSION};
pub use encounter::{
    AffinityPatterns, Classification, Encounter, RelationshipSummary, SupportNetwork, Trend,
};
pub use liveness::{BreathingPattern, LivenessRecord, NetworkVitality, VitalSigns};
pub use formation::{
    FormationHealth, FormationId, FormationProgress, FormationState, Genealogy, Genesis,
    PairFormation,
};
