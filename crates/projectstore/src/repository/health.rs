//! Health probe.

use std::collections::BTreeMap;

use futures_util::future::join_all;

use projectstore_core::storage::{HealthReport, RecordStore};

use super::EntityStore;

impl<S: RecordStore> EntityStore<S> {
    /// Probe every collection once, without retries.
    pub(super) async fn check_health(&self) -> HealthReport {
        let store = self.store.as_ref();
        let policy = self.config.retry.single_attempt();
        let policy = &policy;

        let probes = self.config.tables.collections().into_iter().map(|collection| async move {
            let result = policy
                .run("probe", move || store.probe(collection))
                .await;
            if let Err(err) = &result {
                tracing::warn!(collection, error = %err, "Collection probe failed");
            }
            (collection.to_string(), result.is_ok())
        });

        let per_collection: BTreeMap<String, bool> = join_all(probes).await.into_iter().collect();
        HealthReport::from_collections(per_collection)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::storage::StoreOperation;
    use projectstore_core::storage::{EntityRepository, RepositoryError};

    #[tokio::test]
    async fn test_all_collections_available() {
        let (repo, _store, _clock) = repo();

        let report = repo.health_check().await;

        assert!(report.available);
        assert_eq!(report.per_collection.len(), 2);
        assert!(report.per_collection.values().all(|ok| *ok));
    }

    #[tokio::test]
    async fn test_one_failing_collection_is_reported_independently() {
        let (repo, store, _clock) = repo();
        store
            .fail_next(
                StoreOperation::Probe,
                INDEX,
                1,
                RepositoryError::ConnectionFailed("refused".to_string()),
            )
            .await;

        let report = repo.health_check().await;

        assert!(report.available);
        assert!(report.per_collection[ENTITIES]);
        assert!(!report.per_collection[INDEX]);
    }

    #[tokio::test]
    async fn test_unavailable_when_every_probe_fails() {
        let (repo, store, _clock) = repo();
        for collection in [ENTITIES, INDEX] {
            store
                .fail_next(
                    StoreOperation::Probe,
                    collection,
                    1,
                    RepositoryError::Transient("throttled".to_string()),
                )
                .await;
        }

        let report = repo.health_check().await;

        assert!(!report.available);
        // Probes are not retried.
        assert_eq!(store.call_count(StoreOperation::Probe).await, 2);
    }
}
