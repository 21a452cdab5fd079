//! Persistence collaborator for extracted entities.
//!
//! Missions hand every extracted [`Entity`] to a [`Store`]. Backends are
//! independent: [`FanoutStore`] writes to each one separately and makes no
//! cross-backend atomicity promise.

pub mod entity;
pub mod fanout;
pub mod jsonl;
pub mod memory;

pub use entity::Entity;
pub use fanout::FanoutStore;
pub use jsonl::JsonLinesStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

/// Durable sink for entities. Calls may arrive concurrently from
/// different missions.
#[async_trait]
pub trait Store: Send + Sync {
    async fn save(&self, entity: &Entity) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Some, but not all, fan-out backends rejected the write.
    #[error("{failed} of {total} backends failed to save")]
    Partial { failed: usize, total: usize },
}
