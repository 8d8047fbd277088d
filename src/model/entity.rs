//! Entity in the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::EntityMetadata;

/// Fixed-length numeric summary of a fingerprint.
///
/// Root entities carry 5–8 components; each formation generation adds one,
/// so the inline capacity covers a root plus its first derived child.
pub type FeatureVector = SmallVec<[f64; 9]>;

/// Content-addressed entity identifier (e.g. `"phash:v1:9f86d081884c7d65"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId(s)
    }
}

/// Descriptive category. No behavioral difference between kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[default]
    Unit,
    Composite,
    Cluster,
    Concept,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Unit,
        EntityKind::Composite,
        EntityKind::Cluster,
        EntityKind::Concept,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Unit => "unit",
            EntityKind::Composite => "composite",
            EntityKind::Cluster => "cluster",
            EntityKind::Concept => "concept",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::Validation(format!("unknown entity kind '{s}'")))
    }
}

/// Directed, typed link from one entity to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub relation_type: String,
    pub target: EntityId,
    pub strength: f64,
}

impl Relation {
    pub fn new(relation_type: impl Into<String>, target: EntityId, strength: f64) -> Self {
        Self { relation_type: relation_type.into(), target, strength }
    }
}

/// A registered piece of content.
///
/// `id`, `kind`, `feature_vector`, `derived_summary` and `lineage` are fixed at
/// creation. Only `relations` (append-only) and `occurrences` change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    pub metadata: EntityMetadata,
    pub feature_vector: FeatureVector,
    pub derived_summary: Option<String>,
    pub relations: Vec<Relation>,
    /// Ancestor ids, empty for root entities.
    pub lineage: Vec<EntityId>,
    /// How many times identical content has been registered.
    pub occurrences: u64,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(
        id: EntityId,
        metadata: EntityMetadata,
        feature_vector: FeatureVector,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind: metadata.kind,
            name: metadata.name.clone(),
            metadata,
            feature_vector,
            derived_summary: None,
            relations: Vec::new(),
            lineage: Vec::new(),
            occurrences: 1,
            created_at,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.derived_summary = Some(summary.into());
        self
    }

    pub fn with_lineage(mut self, lineage: impl IntoIterator<Item = EntityId>) -> Self {
        self.lineage = lineage.into_iter().collect();
        self
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn is_root(&self) -> bool {
        self.lineage.is_empty()
    }

    /// Relations of the given type, in insertion order.
    pub fn relations_of<'a>(&'a self, relation_type: &'a str) -> impl Iterator<Item = &'a Relation> + 'a {
        self.relations.iter().filter(move |r| r.relation_type == relation_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn sample() -> Entity {
        let meta = EntityMetadata::named("sample").with_kind(EntityKind::Concept);
        Entity::new(EntityId::from("phash:v1:00"), meta, smallvec![0.1, 0.2, 0.3, 0.4, 0.5], Utc::now())
    }

    #[test]
    fn test_new_copies_kind_and_name_from_metadata() {
        let e = sample();
        assert_eq!(e.kind, EntityKind::Concept);
        assert_eq!(e.name, "sample");
        assert_eq!(e.occurrences, 1);
        assert!(e.is_root());
    }

    #[test]
    fn test_relations_of_filters_by_type() {
        let e = sample()
            .with_relation(Relation::new("derivedFrom", EntityId::from("a"), 1.0))
            .with_relation(Relation::new("witnessed", EntityId::from("b"), 1.0))
            .with_relation(Relation::new("derivedFrom", EntityId::from("c"), 1.0));
        let targets: Vec<_> = e.relations_of("derivedFrom").map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["a", "c"]);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("Composite".parse::<EntityKind>().unwrap(), EntityKind::Composite);
        assert!("planet".parse::<EntityKind>().is_err());
    }
}
