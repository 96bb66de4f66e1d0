use async_trait::async_trait;

use crate::entity::{Entity, FieldMap};

use super::{
    ConditionalPut, FieldUpdate, HealthReport, Item, Page, PageRequest, PrefixQuery, PutCondition,
    QueryPage, RecordKey, RepositoryError, Result, WriteOutcome, MAX_BATCH_GET_KEYS,
};

/// The capability set required from the underlying key-value store.
///
/// Records live in named collections (tables) and are addressed by a
/// [`RecordKey`]. Implementations map their native errors onto
/// [`RepositoryError`], flagging retryable failures as transient.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Point read. Returns `None` if no record is stored at the key.
    async fn get(&self, collection: &str, key: &RecordKey) -> Result<Option<Item>>;

    /// Writes a full record. The key is read from the item's key attributes.
    async fn put(&self, collection: &str, item: Item, condition: PutCondition) -> Result<()>;

    /// Applies a partial update to one record.
    async fn update(&self, collection: &str, key: &RecordKey, update: &FieldUpdate) -> Result<()>;

    /// Deletes one record. Deleting a missing record succeeds.
    async fn delete(&self, collection: &str, key: &RecordKey) -> Result<()>;

    /// Reads one page of a partition in ascending sort-key order.
    async fn query(&self, collection: &str, query: &PrefixQuery) -> Result<QueryPage>;

    /// Minimal bounded read used by health checks.
    async fn probe(&self, collection: &str) -> Result<()>;

    /// Returns true if [`RecordStore::transact_put`] is available.
    fn supports_transactions(&self) -> bool {
        false
    }

    /// Writes several records atomically: all of them or none.
    async fn transact_put(&self, puts: Vec<ConditionalPut>) -> Result<()> {
        let _ = puts;
        Err(RepositoryError::Unsupported(
            "transactional writes are not available on this store".to_string(),
        ))
    }

    /// Largest number of entities resolved in one batch-read chunk.
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_GET_KEYS
    }
}

/// Storage operations for owner-scoped entities.
///
/// Reads never report absence as an error. Writes return a [`WriteOutcome`]
/// whose warnings describe secondary writes that did not land.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Creates a new entity with a fresh id.
    async fn create_entity(&self, owner_id: &str, fields: FieldMap)
        -> Result<WriteOutcome<Entity>>;

    /// Creates an entity whose id is derived from `idempotency_key`.
    ///
    /// Calling this again with the same owner and key returns the entity
    /// created by the first call.
    async fn create_entity_idempotent(
        &self,
        owner_id: &str,
        fields: FieldMap,
        idempotency_key: &str,
    ) -> Result<WriteOutcome<Entity>>;

    /// Gets an entity by its ID.
    async fn get_entity(&self, entity_id: &str, owner_id: &str) -> Result<Option<Entity>>;

    /// Lists an owner's entities, most recently updated first within a page.
    ///
    /// Pages follow the index sort key, so the ordering does not carry across
    /// pages: a later page may hold entities updated after those on an
    /// earlier one.
    async fn list_entities_by_owner(
        &self,
        owner_id: &str,
        page: PageRequest,
    ) -> Result<Page<Entity>>;

    /// Applies a partial update and returns the merged entity.
    async fn update_entity(
        &self,
        entity_id: &str,
        owner_id: &str,
        changes: FieldMap,
    ) -> Result<WriteOutcome<Entity>>;

    /// Deletes every record of an entity.
    async fn delete_entity(&self, entity_id: &str, owner_id: &str) -> Result<WriteOutcome<()>>;

    /// Gets several entities at once, omitting ids that are not found.
    async fn batch_get_entities(&self, entity_ids: &[String], owner_id: &str)
        -> Result<Vec<Entity>>;

    /// Probes every collection.
    async fn health_check(&self) -> HealthReport;
}
