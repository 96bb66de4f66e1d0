//! Entity repository over a [`RecordStore`].
//!
//! Every entity is stored twice: a primary record under `ENTITY#<id>` holding
//! the full payload, and an index record under `OWNER#<owner>` holding a
//! summary projection for listings. There are no cross-record transactions
//! by default, so writes follow a fixed order (primary first) and reads
//! tolerate the partial states that ordering can leave behind.

mod health;
mod reads;
mod writes;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use projectstore_core::clock::{Clock, SystemClock};
use projectstore_core::entity::{Entity, FieldMap};
use projectstore_core::storage::{
    EntityRepository, HealthReport, Page, PageRequest, RecordStore, Result, WriteOutcome,
};

use crate::config::StoreConfig;

/// Entity type reported in `NotFound` / `AlreadyExists` errors.
pub(crate) const ENTITY_TYPE: &str = "Project";

/// Repository implementation shared by every backend.
pub struct EntityStore<S> {
    store: Arc<S>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for EntityStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: RecordStore> EntityStore<S> {
    pub fn new(store: S, config: StoreConfig) -> Self {
        Self::from_shared(Arc::new(store), config)
    }

    pub fn from_shared(store: Arc<S>, config: StoreConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used to stamp writes.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn entities_table(&self) -> &str {
        &self.config.tables.entities
    }

    fn index_table(&self) -> &str {
        &self.config.tables.index
    }
}

// ============================================================================
// EntityRepository implementation
// ============================================================================

#[async_trait]
impl<S: RecordStore> EntityRepository for EntityStore<S> {
    async fn create_entity(
        &self,
        owner_id: &str,
        fields: FieldMap,
    ) -> Result<WriteOutcome<Entity>> {
        self.create(owner_id, fields).await
    }

    async fn create_entity_idempotent(
        &self,
        owner_id: &str,
        fields: FieldMap,
        idempotency_key: &str,
    ) -> Result<WriteOutcome<Entity>> {
        self.create_idempotent(owner_id, fields, idempotency_key)
            .await
    }

    async fn get_entity(&self, entity_id: &str, owner_id: &str) -> Result<Option<Entity>> {
        self.get(entity_id, owner_id).await
    }

    async fn list_entities_by_owner(
        &self,
        owner_id: &str,
        page: PageRequest,
    ) -> Result<Page<Entity>> {
        self.list_by_owner(owner_id, page).await
    }

    async fn update_entity(
        &self,
        entity_id: &str,
        owner_id: &str,
        changes: FieldMap,
    ) -> Result<WriteOutcome<Entity>> {
        self.update(entity_id, owner_id, changes).await
    }

    async fn delete_entity(&self, entity_id: &str, owner_id: &str) -> Result<WriteOutcome<()>> {
        self.delete(entity_id, owner_id).await
    }

    async fn batch_get_entities(
        &self,
        entity_ids: &[String],
        owner_id: &str,
    ) -> Result<Vec<Entity>> {
        self.batch_get(entity_ids, owner_id).await
    }

    async fn health_check(&self) -> HealthReport {
        self.check_health().await
    }
}
