use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{Entity, Store, StoreError};

/// Keeps every saved entity in memory, in save order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: Mutex<Vec<Entity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything saved so far.
    pub async fn entities(&self) -> Vec<Entity> {
        self.entities.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entities.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.lock().await.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save(&self, entity: &Entity) -> Result<(), StoreError> {
        self.entities.lock().await.push(entity.clone());
        Ok(())
    }
}
