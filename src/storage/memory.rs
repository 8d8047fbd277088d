//! In-memory entity store.
//!
//! This is the reference implementation of `EntityStore`: a map of records
//! behind an `RwLock`, shared between clones through an `Arc`.
//!
//! ## Limitations
//!
//! - **No durability**: records live as long as the last clone of the store.
//!
//! Use this store for:
//! - Testing the registry and relationship engine
//! - Embedding where persistence is not wanted

use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::model::{Entity, EntityId};
use crate::Result;
use super::{EntityStore, StoreCapabilities};

/// In-memory entity storage.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<EntityId, Entity>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Stored copy of a record.
    pub fn record(&self, id: &EntityId) -> Option<Entity> {
        self.inner.read().get(id).cloned()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn save(&self, entity: &Entity) -> Result<()> {
        self.inner.write().insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Entity>> {
        Ok(self.inner.read().values().cloned().collect())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities { durable: false, location: None }
    }
}

// ============================================================================
// Tests
// ============================================================================
