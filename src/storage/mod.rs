//! # Entity Store Trait
//!
//! The contract between the registry and whatever keeps entity records.
//! Each entity is one self-contained record keyed by its id; the registry only
//! ever saves a whole entity or loads them all back.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory for testing/embedding |
//! | `JsonDirStore` | `json_dir` | One JSON file per entity in a directory |

pub mod memory;
pub mod json_dir;

use async_trait::async_trait;

use crate::model::Entity;
use crate::Result;

pub use json_dir::JsonDirStore;
pub use memory::MemoryStore;

// ============================================================================
// Store capabilities
// ============================================================================

/// What a store can do.
#[derive(Debug, Clone, Default)]
pub struct StoreCapabilities {
    /// Records survive process restart.
    pub durable: bool,
    /// Human-readable location, if any.
    pub location: Option<String>,
}

// ============================================================================
// EntityStore Trait
// ============================================================================

/// Persistence collaborator of the registry.
///
/// `save` is an upsert: saving an entity whose id already exists replaces
/// the previous record.
#[async_trait]
pub trait EntityStore: Send + Sync + 'static {
    /// Persist one entity record.
    async fn save(&self, entity: &Entity) -> Result<()>;

    /// Load every stored record. Order is not significant.
    async fn load_all(&self) -> Result<Vec<Entity>>;

    /// Flush pending writes. Default: nothing buffered.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::default()
    }
}
