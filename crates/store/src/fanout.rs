//! Fan-out to several independent backends.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::{Entity, Store, StoreError};

/// Saves every entity to each backend independently and concurrently.
///
/// There is no cross-backend consistency: a failure in one backend does not
/// undo the write in another. The result is `Ok` only if every backend
/// accepted the entity; otherwise [`StoreError::Partial`] reports how many
/// failed (with a single backend, its error is returned as-is).
pub struct FanoutStore {
    backends: Vec<Arc<dyn Store>>,
}

impl FanoutStore {
    pub fn new(backends: Vec<Arc<dyn Store>>) -> Self {
        Self { backends }
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }
}

#[async_trait]
impl Store for FanoutStore {
    async fn save(&self, entity: &Entity) -> Result<(), StoreError> {
        let results = join_all(self.backends.iter().map(|backend| backend.save(entity))).await;

        let total = results.len();
        let mut errors: Vec<StoreError> = results.into_iter().filter_map(Result::err).collect();

        for e in &errors {
            tracing::warn!(
                kind = %entity.kind,
                source = %entity.source,
                error = %e,
                "Store backend rejected entity",
            );
        }

        match errors.len() {
            0 => Ok(()),
            1 if total == 1 => Err(errors.remove(0)),
            failed => Err(StoreError::Partial { failed, total }),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::MemoryStore;

    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn save(&self, _entity: &Entity) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk on fire")))
        }
    }

    fn entity() -> Entity {
        Entity::new("page", "https://a.test/", json!({"title": "A"}))
    }

    #[tokio::test]
    async fn writes_reach_every_backend() {
        let a = Arc::new(MemoryStore::new());
        let b = Arc::new(MemoryStore::new());
        let fanout = FanoutStore::new(vec![a.clone(), b.clone()]);

        fanout.save(&entity()).await.expect("both backends accept");

        assert_eq!(a.len().await, 1);
        assert_eq!(b.len().await, 1);
    }

    #[tokio::test]
    async fn one_failing_backend_does_not_undo_the_others() {
        let healthy = Arc::new(MemoryStore::new());
        let fanout = FanoutStore::new(vec![healthy.clone(), Arc::new(BrokenStore)]);

        let result = fanout.save(&entity()).await;

        assert_matches!(result, Err(StoreError::Partial { failed: 1, total: 2 }));
        assert_eq!(healthy.entities().await, vec![entity()]);
    }

    #[tokio::test]
    async fn single_backend_error_is_passed_through() {
        let fanout = FanoutStore::new(vec![Arc::new(BrokenStore)]);
        assert_matches!(fanout.save(&entity()).await, Err(StoreError::Io(_)));
    }

    #[tokio::test]
    async fn empty_fanout_accepts_everything() {
        let fanout = FanoutStore::new(Vec::new());
        assert_eq!(fanout.backend_count(), 0);
        assert!(fanout.save(&entity()).await.is_ok());
    }
}
