//! Write coordinator: create, update and delete.

use serde_json::Value;
use uuid::Uuid;

use projectstore_core::entity::{
    format_timestamp, is_summary_field, next_updated_at, Entity, FieldMap, FIELD_CREATED_AT,
    FIELD_ID, FIELD_OWNER_ID, FIELD_UPDATED_AT, FIELD_USER_ID,
};
use projectstore_core::storage::codec::{self, DATA_ATTR};
use projectstore_core::storage::keys::{self, validate_identifier};
use projectstore_core::storage::{
    ConditionalPut, FieldUpdate, PutCondition, RecordKey, RecordStore, RepositoryError, Result,
    WriteOutcome, WriteWarning,
};

use crate::retry::RetryPolicy;

use super::{EntityStore, ENTITY_TYPE};

/// Namespace of ids derived from idempotency keys.
const IDEMPOTENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_8d3b_4c57_9a10_5e7f_3b2d_c0a1);

impl<S: RecordStore> EntityStore<S> {
    // ========================================================================
    // Create
    // ========================================================================

    pub(super) async fn create(
        &self,
        owner_id: &str,
        fields: FieldMap,
    ) -> Result<WriteOutcome<Entity>> {
        validate_identifier("owner", owner_id)?;
        let id = match fields.get(FIELD_ID) {
            Some(Value::String(id)) => {
                validate_identifier("entity", id)?;
                id.clone()
            }
            Some(other) => {
                return Err(RepositoryError::validation(format!(
                    "entity id must be a string, got {other}"
                )))
            }
            None => Uuid::new_v4().to_string(),
        };
        let entity = self.new_entity(id, owner_id, fields)?;

        // A retried put could create the entity twice under different ids.
        let policy = self.config.retry.single_attempt();
        self.write_new(&entity, &policy).await
    }

    pub(super) async fn create_idempotent(
        &self,
        owner_id: &str,
        fields: FieldMap,
        idempotency_key: &str,
    ) -> Result<WriteOutcome<Entity>> {
        validate_identifier("owner", owner_id)?;
        if idempotency_key.trim().is_empty() {
            return Err(RepositoryError::validation("idempotency key is empty"));
        }

        let id = idempotent_entity_id(owner_id, idempotency_key);
        if let Some(Value::String(given)) = fields.get(FIELD_ID) {
            if *given != id {
                return Err(RepositoryError::validation(
                    "entity id cannot be combined with an idempotency key",
                ));
            }
        }
        let entity = self.new_entity(id, owner_id, fields)?;

        match self.write_new(&entity, &self.config.retry).await {
            Err(RepositoryError::AlreadyExists { .. }) => {
                let Some(existing) = self.get(&entity.id, owner_id).await? else {
                    return Err(RepositoryError::AlreadyExists {
                        entity_type: ENTITY_TYPE,
                        id: entity.id,
                    });
                };
                tracing::debug!(
                    entity_id = %existing.id,
                    owner_id,
                    "Idempotent create resolved to existing entity"
                );

                // The earlier attempt may have stopped before its index write.
                let mut outcome = WriteOutcome::clean(existing);
                if let Some(warning) = self.put_index(&outcome.value).await {
                    outcome.warnings.push(warning);
                }
                Ok(outcome)
            }
            other => other,
        }
    }

    fn new_entity(&self, id: String, owner_id: &str, mut fields: FieldMap) -> Result<Entity> {
        for field in [FIELD_OWNER_ID, FIELD_USER_ID] {
            match fields.get(field) {
                None => {}
                Some(Value::String(given)) if given == owner_id => {}
                Some(_) => {
                    return Err(RepositoryError::validation(format!(
                        "{field} must match the owner of the new entity"
                    )))
                }
            }
        }
        for field in [FIELD_ID, FIELD_OWNER_ID, FIELD_USER_ID, FIELD_CREATED_AT, FIELD_UPDATED_AT] {
            fields.remove(field);
        }

        Ok(Entity::new(id, owner_id, fields, self.now()))
    }

    /// Write both records of a new entity.
    ///
    /// Without a transaction the primary record is written first, so a
    /// failure between the two writes leaves an entity that is readable by
    /// id but missing from listings, never the other way round.
    async fn write_new(
        &self,
        entity: &Entity,
        policy: &RetryPolicy,
    ) -> Result<WriteOutcome<Entity>> {
        let store = self.store.as_ref();
        let entities = self.entities_table();
        let index = self.index_table();

        if self.config.atomic_create && store.supports_transactions() {
            let puts = vec![
                ConditionalPut {
                    collection: entities.to_string(),
                    item: codec::encode(entity),
                    condition: PutCondition::MustNotExist,
                },
                ConditionalPut {
                    collection: index.to_string(),
                    item: codec::encode_index(entity),
                    condition: PutCondition::Overwrite,
                },
            ];
            policy
                .run("transact_put", move || store.transact_put(puts.clone()))
                .await
                .map_err(|err| entity_error(err, &entity.id))?;

            tracing::debug!(
                entity_id = %entity.id,
                owner_id = %entity.owner_id,
                "Created entity atomically"
            );
            return Ok(WriteOutcome::clean(entity.clone()));
        }

        policy
            .run("put", move || {
                store.put(entities, codec::encode(entity), PutCondition::MustNotExist)
            })
            .await
            .map_err(|err| entity_error(err, &entity.id))?;

        let mut outcome = WriteOutcome::clean(entity.clone());
        if let Some(warning) = self.put_index(entity).await {
            outcome.warnings.push(warning);
        }

        tracing::debug!(entity_id = %entity.id, owner_id = %entity.owner_id, "Created entity");
        Ok(outcome)
    }

    /// Write the full index record of an entity. Failures become a warning.
    async fn put_index(&self, entity: &Entity) -> Option<WriteWarning> {
        let store = self.store.as_ref();
        let index = self.index_table();

        let result = self
            .config
            .retry
            .run("put_index", move || {
                store.put(index, codec::encode_index(entity), PutCondition::Overwrite)
            })
            .await;

        match result {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(
                    entity_id = %entity.id,
                    owner_id = %entity.owner_id,
                    error = %err,
                    "Failed to write index record, entity is missing from listings"
                );
                Some(WriteWarning::IndexWriteFailed {
                    entity_id: entity.id.clone(),
                    reason: err.to_string(),
                })
            }
        }
    }

    // ========================================================================
    // Update
    // ========================================================================

    pub(super) async fn update(
        &self,
        entity_id: &str,
        owner_id: &str,
        mut changes: FieldMap,
    ) -> Result<WriteOutcome<Entity>> {
        validate_identifier("entity", entity_id)?;
        validate_identifier("owner", owner_id)?;
        reject_identity_changes(entity_id, owner_id, &changes)?;
        for field in [FIELD_ID, FIELD_OWNER_ID, FIELD_USER_ID, FIELD_CREATED_AT, FIELD_UPDATED_AT] {
            changes.remove(field);
        }

        let Some(item) = self.fetch_primary(entity_id).await? else {
            return Err(not_found(entity_id));
        };
        let current = codec::decode(&item, entity_id, self.now());
        if !current.is_owned_by(owner_id) {
            return Err(not_found(entity_id));
        }

        let mut merged = current.clone();
        merged.updated_at = next_updated_at(self.now(), current.updated_at);
        merged
            .fields
            .extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));

        let stamp = Value::String(format_timestamp(merged.updated_at));
        let update = if codec::has_data_map(&item) {
            let mut update = FieldUpdate::new()
                .set_data(FIELD_UPDATED_AT, stamp.clone())
                .set_attribute(FIELD_UPDATED_AT, stamp)
                .require_existing();
            update.data.extend(changes.clone());
            update
        } else {
            // Flat legacy record: move the whole payload under `data`.
            FieldUpdate::new()
                .set_attribute(DATA_ATTR, Value::Object(codec::entity_payload(&merged)))
                .set_attribute(FIELD_UPDATED_AT, stamp)
                .require_existing()
        };

        let key = RecordKey::from_item(&item).unwrap_or_else(|| keys::primary_key(entity_id));
        let store = self.store.as_ref();
        let entities = self.entities_table();
        let (key, update) = (&key, &update);
        self.config
            .retry
            .run("update", move || store.update(entities, key, update))
            .await
            .map_err(|err| entity_error(err, entity_id))?;

        let mut outcome = WriteOutcome::clean(merged);
        let summary_changed = changes
            .iter()
            .any(|(name, value)| is_summary_field(name) && current.field(name) != Some(value));
        if summary_changed {
            if let Some(warning) = self.repair_index(&outcome.value, owner_id).await {
                outcome.warnings.push(warning);
            }
        }

        tracing::debug!(entity_id, owner_id, "Updated entity");
        Ok(outcome)
    }

    /// Refresh the denormalized fields of the index record.
    ///
    /// Re-puts the whole projection if the index record is missing.
    async fn repair_index(&self, entity: &Entity, owner_id: &str) -> Option<WriteWarning> {
        let owner = if entity.owner_id.is_empty() {
            owner_id
        } else {
            entity.owner_id.as_str()
        };
        let key = &keys::index_key(owner, &entity.id);

        let mut update = FieldUpdate::new()
            .set_attribute(
                FIELD_UPDATED_AT,
                Value::String(format_timestamp(entity.updated_at)),
            )
            .require_existing();
        update.data = codec::summary_fields(entity);
        let update = &update;

        let store = self.store.as_ref();
        let index = self.index_table();
        let result = self
            .config
            .retry
            .run("repair_index", move || store.update(index, key, update))
            .await;

        let result = match result {
            Err(RepositoryError::NotFound { .. }) => {
                tracing::warn!(
                    entity_id = %entity.id,
                    owner_id = owner,
                    "Index record missing, re-creating it"
                );
                let mut healed = entity.clone();
                healed.owner_id = owner.to_string();
                let healed = &healed;
                self.config
                    .retry
                    .run("put_index", move || {
                        store.put(index, codec::encode_index(healed), PutCondition::Overwrite)
                    })
                    .await
            }
            other => other,
        };

        match result {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(
                    entity_id = %entity.id,
                    owner_id = owner,
                    error = %err,
                    "Failed to repair index record, listing shows stale fields"
                );
                Some(WriteWarning::IndexRepairFailed {
                    entity_id: entity.id.clone(),
                    reason: err.to_string(),
                })
            }
        }
    }

    // ========================================================================
    // Delete
    // ========================================================================

    pub(super) async fn delete(
        &self,
        entity_id: &str,
        owner_id: &str,
    ) -> Result<WriteOutcome<()>> {
        validate_identifier("entity", entity_id)?;
        validate_identifier("owner", owner_id)?;

        let variants = self.primary_variants(entity_id).await?;
        let now = self.now();
        if let Some(latest) = super::reads::most_recent(&variants) {
            if !codec::decode(latest, entity_id, now).is_owned_by(owner_id) {
                return Err(not_found(entity_id));
            }
        }

        let store = self.store.as_ref();
        let entities = self.entities_table();
        let mut outcome = WriteOutcome::clean(());
        let mut first_error = None;
        let record_keys: Vec<RecordKey> =
            variants.iter().filter_map(RecordKey::from_item).collect();

        for key in &record_keys {
            let result = self
                .config
                .retry
                .run("delete", move || store.delete(entities, key))
                .await;
            if let Err(err) = result {
                tracing::warn!(
                    entity_id,
                    key = %key,
                    error = %err,
                    "Failed to delete primary record"
                );
                outcome.warnings.push(WriteWarning::DeleteIncomplete {
                    key: key.to_string(),
                    reason: err.to_string(),
                });
                first_error.get_or_insert(err);
            }
        }

        if let Some(err) = first_error {
            if outcome.warnings.len() == record_keys.len() {
                return Err(err);
            }
        }

        let index = self.index_table();
        let index_key = &keys::index_key(owner_id, entity_id);
        let result = self
            .config
            .retry
            .run("delete_index", move || store.delete(index, index_key))
            .await;
        if let Err(err) = result {
            tracing::warn!(entity_id, owner_id, error = %err, "Failed to delete index record");
            outcome.warnings.push(WriteWarning::DeleteIncomplete {
                key: index_key.to_string(),
                reason: err.to_string(),
            });
        }

        tracing::debug!(entity_id, owner_id, records = record_keys.len(), "Deleted entity");
        Ok(outcome)
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Derive a stable entity id from an owner and an idempotency key.
fn idempotent_entity_id(owner_id: &str, idempotency_key: &str) -> String {
    // Owner ids never contain '#', so the name is unambiguous.
    let name = format!("{owner_id}#{idempotency_key}");
    Uuid::new_v5(&IDEMPOTENT_ID_NAMESPACE, name.as_bytes()).to_string()
}

fn reject_identity_changes(entity_id: &str, owner_id: &str, changes: &FieldMap) -> Result<()> {
    if let Some(id) = changes.get(FIELD_ID) {
        if id.as_str() != Some(entity_id) {
            return Err(RepositoryError::validation("id is immutable"));
        }
    }
    for field in [FIELD_OWNER_ID, FIELD_USER_ID] {
        if let Some(owner) = changes.get(field) {
            if owner.as_str() != Some(owner_id) {
                return Err(RepositoryError::validation(format!("{field} is immutable")));
            }
        }
    }
    Ok(())
}

fn not_found(entity_id: &str) -> RepositoryError {
    RepositoryError::NotFound {
        entity_type: ENTITY_TYPE,
        id: entity_id.to_string(),
    }
}

/// Report store-level conditional failures in terms of the entity.
fn entity_error(err: RepositoryError, entity_id: &str) -> RepositoryError {
    match err {
        RepositoryError::NotFound { .. } => not_found(entity_id),
        RepositoryError::AlreadyExists { .. } => RepositoryError::AlreadyExists {
            entity_type: ENTITY_TYPE,
            id: entity_id.to_string(),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::storage::StoreOperation;
    use projectstore_core::storage::{EntityRepository, PageRequest};
    use serde_json::json;

    fn transient() -> RepositoryError {
        RepositoryError::Transient("throttled".to_string())
    }

    // ------------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_writes_primary_and_index_records() {
        let (repo, store, _clock) = repo();

        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();

        let primaries = store.items(ENTITIES).await;
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0]["PK"], json!(format!("ENTITY#{}", entity.id)));
        assert_eq!(primaries[0]["entityType"], json!("PROJECT"));
        assert_eq!(primaries[0]["ownerId"], json!("u1"));
        assert_eq!(primaries[0]["data"]["name"], json!("Shop"));
        assert_eq!(primaries[0]["data"]["id"], json!(entity.id));

        let index = store.items(INDEX).await;
        assert_eq!(index.len(), 1);
        assert_eq!(index[0]["PK"], json!("OWNER#u1"));
        assert_eq!(index[0]["SK"], json!(format!("ENTITY#{}", entity.id)));
        assert_eq!(index[0]["updatedAt"], json!("2024-01-15T10:30:00.000Z"));
        assert_eq!(
            index[0]["data"],
            json!({
                "id": entity.id,
                "ownerId": "u1",
                "name": "Shop",
                "description": "",
                "status": "draft",
                "createdAt": "2024-01-15T10:30:00.000Z"
            })
        );
    }

    #[tokio::test]
    async fn test_create_ignores_managed_fields() {
        let (repo, _store, _clock) = repo();

        let mut input = shop();
        input.insert("ownerId".to_string(), json!("u1"));
        input.insert("createdAt".to_string(), json!("1999-01-01T00:00:00Z"));
        input.insert("updatedAt".to_string(), json!("1999-01-01T00:00:00Z"));

        let entity = repo.create_entity("u1", input).await.unwrap().into_inner();

        assert_eq!(entity.owner_id, "u1");
        assert_eq!(entity.created_at.to_rfc3339(), "2024-01-15T10:30:00+00:00");
        assert!(entity.field("createdAt").is_none());
        assert!(entity.field("ownerId").is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_owner_and_bad_ids() {
        let (repo, store, _clock) = repo();

        let mut foreign = shop();
        foreign.insert("ownerId".to_string(), json!("u2"));
        assert!(matches!(
            repo.create_entity("u1", foreign).await,
            Err(RepositoryError::Validation(_))
        ));

        let mut bad_id = shop();
        bad_id.insert("id".to_string(), json!("a#b"));
        assert!(matches!(
            repo.create_entity("u1", bad_id).await,
            Err(RepositoryError::Validation(_))
        ));

        assert!(matches!(
            repo.create_entity("", shop()).await,
            Err(RepositoryError::Validation(_))
        ));
        assert_eq!(store.call_count(StoreOperation::Put).await, 0);
    }

    #[tokio::test]
    async fn test_create_with_caller_id_rejects_duplicates() {
        let (repo, _store, _clock) = repo();

        let mut input = shop();
        input.insert("id".to_string(), json!("p-1"));
        let entity = repo
            .create_entity("u1", input.clone())
            .await
            .unwrap()
            .into_inner();
        assert_eq!(entity.id, "p-1");

        let err = repo.create_entity("u1", input).await.unwrap_err();
        assert_eq!(
            err,
            RepositoryError::AlreadyExists {
                entity_type: "Project",
                id: "p-1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_create_is_not_retried() {
        let (repo, store, _clock) = repo();
        store
            .fail_next(StoreOperation::Put, ENTITIES, 1, transient())
            .await;

        let err = repo.create_entity("u1", shop()).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(store.call_count(StoreOperation::Put).await, 1);
        assert!(store.items(ENTITIES).await.is_empty());
        assert!(store.items(INDEX).await.is_empty());
    }

    #[tokio::test]
    async fn test_index_write_failure_is_a_warning() {
        let (repo, store, _clock) = repo();
        store
            .fail_next(StoreOperation::Put, INDEX, 3, transient())
            .await;

        let outcome = repo.create_entity("u1", shop()).await.unwrap();

        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(
            outcome.warnings[0],
            WriteWarning::IndexWriteFailed { .. }
        ));

        // Readable by id, invisible in listings.
        let entity = outcome.into_inner();
        assert_eq!(
            repo.get_entity(&entity.id, "u1").await.unwrap(),
            Some(entity)
        );
        let page = repo
            .list_entities_by_owner("u1", PageRequest::default())
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_idempotent_create_retries_transient_errors() {
        let (repo, store, _clock) = repo();
        store
            .fail_next(StoreOperation::Put, ENTITIES, 1, transient())
            .await;

        let outcome = repo
            .create_entity_idempotent("u1", shop(), "request-1")
            .await
            .unwrap();

        assert!(outcome.is_clean());
        assert_eq!(store.call_count(StoreOperation::Put).await, 3);
        assert_eq!(store.items(ENTITIES).await.len(), 1);
    }

    #[tokio::test]
    async fn test_idempotent_create_returns_first_entity() {
        let (repo, store, clock) = repo();

        let first = repo
            .create_entity_idempotent("u1", shop(), "request-1")
            .await
            .unwrap()
            .into_inner();
        clock.advance(5_000);
        let second = repo
            .create_entity_idempotent("u1", fields(json!({ "name": "Other" })), "request-1")
            .await
            .unwrap()
            .into_inner();

        assert_eq!(first, second);
        assert_eq!(store.items(ENTITIES).await.len(), 1);

        let other_owner = repo
            .create_entity_idempotent("u2", shop(), "request-1")
            .await
            .unwrap()
            .into_inner();
        assert_ne!(other_owner.id, first.id);
    }

    #[tokio::test]
    async fn test_idempotent_create_heals_missing_index() {
        let (repo, store, _clock) = repo();
        store
            .fail_next(StoreOperation::Put, INDEX, 3, transient())
            .await;

        let first = repo
            .create_entity_idempotent("u1", shop(), "request-1")
            .await
            .unwrap();
        assert!(!first.is_clean());

        let second = repo
            .create_entity_idempotent("u1", shop(), "request-1")
            .await
            .unwrap();
        assert!(second.is_clean());

        let page = repo
            .list_entities_by_owner("u1", PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[test]
    fn test_idempotent_ids_are_stable() {
        assert_eq!(
            idempotent_entity_id("u1", "k"),
            idempotent_entity_id("u1", "k")
        );
        assert_ne!(
            idempotent_entity_id("u1", "k"),
            idempotent_entity_id("u1", "k2")
        );
        assert_ne!(
            idempotent_entity_id("u1", "k"),
            idempotent_entity_id("u2", "k")
        );
    }

    #[tokio::test]
    async fn test_atomic_create_uses_one_transaction() {
        let mut config = test_config();
        config.atomic_create = true;
        let (repo, store, _clock) = repo_with(config);

        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();

        assert_eq!(store.call_count(StoreOperation::Put).await, 0);
        assert_eq!(store.items(ENTITIES).await.len(), 1);
        assert_eq!(store.items(INDEX).await.len(), 1);
        assert!(repo.get_entity(&entity.id, "u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_atomic_create_failure_writes_nothing() {
        let mut config = test_config();
        config.atomic_create = true;
        let (repo, store, _clock) = repo_with(config);
        store
            .fail_next(StoreOperation::TransactPut, INDEX, 1, transient())
            .await;

        assert!(repo.create_entity("u1", shop()).await.is_err());
        assert!(store.items(ENTITIES).await.is_empty());
        assert!(store.items(INDEX).await.is_empty());
    }

    // ------------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_update_rejects_identity_changes() {
        let (repo, store, _clock) = repo();
        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();

        for changes in [
            json!({ "id": "other" }),
            json!({ "ownerId": "other" }),
            json!({ "userId": "other", "status": "active" }),
        ] {
            let err = repo
                .update_entity(&entity.id, "u1", fields(changes))
                .await
                .unwrap_err();
            assert!(matches!(err, RepositoryError::Validation(_)));
        }

        assert_eq!(store.call_count(StoreOperation::Update).await, 0);
        assert_eq!(
            repo.get_entity(&entity.id, "u1").await.unwrap(),
            Some(entity)
        );
    }

    #[tokio::test]
    async fn test_update_accepts_unchanged_identity_fields() {
        let (repo, _store, _clock) = repo();
        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();

        let updated = repo
            .update_entity(
                &entity.id,
                "u1",
                fields(json!({
                    "id": entity.id,
                    "ownerId": "u1",
                    "createdAt": "1999-01-01T00:00:00Z",
                    "status": "active"
                })),
            )
            .await
            .unwrap()
            .into_inner();

        assert_eq!(updated.status(), Some("active"));
        assert_eq!(updated.created_at, entity.created_at);
    }

    #[tokio::test]
    async fn test_updated_at_is_monotonic() {
        let (repo, _store, clock) = repo();
        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();

        let mut previous = entity.updated_at;
        for step in [0, 10, -60_000, 0, 1_000] {
            clock.advance(step);
            let updated = repo
                .update_entity(&entity.id, "u1", fields(json!({ "step": step })))
                .await
                .unwrap()
                .into_inner();
            assert!(updated.updated_at > previous);
            previous = updated.updated_at;
        }

        let stored = repo.get_entity(&entity.id, "u1").await.unwrap().unwrap();
        assert_eq!(stored.updated_at, previous);
    }

    #[tokio::test]
    async fn test_update_reserved_word_fields() {
        let (repo, _store, _clock) = repo();
        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();

        let changes = fields(json!({
            "name": "Shop 2",
            "status": "active",
            "type": "web",
            "schema": { "tables": [{ "name": "orders" }] },
            "order": 3
        }));
        let updated = repo
            .update_entity(&entity.id, "u1", changes)
            .await
            .unwrap()
            .into_inner();

        let stored = repo.get_entity(&entity.id, "u1").await.unwrap().unwrap();
        assert_eq!(stored, updated);
        assert_eq!(stored.name(), Some("Shop 2"));
        assert_eq!(stored.field("type"), Some(&json!("web")));
        assert_eq!(
            stored.field("schema"),
            Some(&json!({ "tables": [{ "name": "orders" }] }))
        );
        assert_eq!(stored.field("order"), Some(&json!(3)));
        assert_eq!(stored.description(), Some(""));
    }

    #[tokio::test]
    async fn test_update_repairs_index_summary() {
        let (repo, store, clock) = repo();
        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();

        clock.advance(1_000);
        repo.update_entity(&entity.id, "u1", fields(json!({ "status": "active" })))
            .await
            .unwrap();
        let index = store.items(INDEX).await;
        assert_eq!(index[0]["data"]["status"], json!("active"));
        assert_eq!(index[0]["updatedAt"], json!("2024-01-15T10:30:01.000Z"));

        // Non-summary changes leave the index alone.
        clock.advance(1_000);
        repo.update_entity(&entity.id, "u1", fields(json!({ "schema": {} })))
            .await
            .unwrap();
        let index = store.items(INDEX).await;
        assert_eq!(index[0]["updatedAt"], json!("2024-01-15T10:30:01.000Z"));
        assert!(index[0]["data"].get("schema").is_none());
    }

    #[tokio::test]
    async fn test_index_repair_failure_is_a_warning() {
        let (repo, store, _clock) = repo();
        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();
        store
            .fail_next(StoreOperation::Update, INDEX, 3, transient())
            .await;

        let outcome = repo
            .update_entity(&entity.id, "u1", fields(json!({ "name": "Renamed" })))
            .await
            .unwrap();

        assert_eq!(
            outcome.warnings,
            vec![WriteWarning::IndexRepairFailed {
                entity_id: entity.id.clone(),
                reason: "Transient store error: throttled".to_string(),
            }]
        );
        let stored = repo.get_entity(&entity.id, "u1").await.unwrap().unwrap();
        assert_eq!(stored.name(), Some("Renamed"));
        assert_eq!(store.items(INDEX).await[0]["data"]["name"], json!("Shop"));
    }

    #[tokio::test]
    async fn test_index_repair_recreates_missing_index() {
        let (repo, store, _clock) = repo();
        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();
        store
            .delete(INDEX, &keys::index_key("u1", &entity.id))
            .await
            .unwrap();

        let outcome = repo
            .update_entity(&entity.id, "u1", fields(json!({ "name": "Renamed" })))
            .await
            .unwrap();

        assert!(outcome.is_clean());
        let index = store.items(INDEX).await;
        assert_eq!(index.len(), 1);
        assert_eq!(index[0]["data"]["name"], json!("Renamed"));
        assert_eq!(index[0]["data"]["status"], json!("draft"));
    }

    #[tokio::test]
    async fn test_update_missing_or_foreign_entity() {
        let (repo, _store, _clock) = repo();
        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();

        let missing = repo
            .update_entity("nope", "u1", fields(json!({ "status": "x" })))
            .await
            .unwrap_err();
        assert!(matches!(missing, RepositoryError::NotFound { .. }));

        let foreign = repo
            .update_entity(&entity.id, "u2", fields(json!({ "status": "x" })))
            .await
            .unwrap_err();
        assert!(matches!(foreign, RepositoryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_legacy_flat_record() {
        let (repo, store, _clock) = repo();
        store
            .insert_raw(
                ENTITIES,
                fields(json!({
                    "PK": "ENTITY#legacy",
                    "SK": "ENTITY#legacy",
                    "userId": "u1",
                    "name": "Old",
                    "createdAt": "2023-05-01T09:00:00"
                })),
            )
            .await
            .unwrap();

        let updated = repo
            .update_entity("legacy", "u1", fields(json!({ "status": "active" })))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(updated.name(), Some("Old"));
        assert_eq!(updated.status(), Some("active"));

        let item = &store.items(ENTITIES).await[0];
        assert_eq!(item["data"]["name"], json!("Old"));
        assert_eq!(item["data"]["status"], json!("active"));
        assert_eq!(item["data"]["ownerId"], json!("u1"));
        assert_eq!(
            repo.get_entity("legacy", "u1").await.unwrap(),
            Some(updated)
        );
    }

    #[tokio::test]
    async fn test_update_with_out_of_range_updated_at() {
        let (repo, store, _clock) = repo();
        store
            .insert_raw(
                ENTITIES,
                fields(json!({
                    "PK": "ENTITY#p1",
                    "SK": "ENTITY#p1",
                    "updatedAt": 8_210_266_876_799_999_i64,
                    "data": {
                        "id": "p1",
                        "ownerId": "u1",
                        "createdAt": "2024-01-01T00:00:00.000Z",
                        "updatedAt": 8_210_266_876_799_999_i64
                    }
                })),
            )
            .await
            .unwrap();

        let updated = repo
            .update_entity("p1", "u1", fields(json!({ "status": "active" })))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(updated.status(), Some("active"));

        let item = &store.items(ENTITIES).await[0];
        assert_eq!(item["updatedAt"], json!("2024-01-15T10:30:00.000Z"));
        assert_eq!(item["data"]["updatedAt"], json!("2024-01-15T10:30:00.000Z"));
    }

    #[tokio::test]
    async fn test_update_targets_most_recent_variant() {
        let (repo, store, _clock) = repo();
        for (sk, updated_at, status) in [
            ("ENTITY#p1", "2024-01-01T00:00:00.000Z", "old"),
            ("CHAT#2", "2024-01-10T00:00:00.000Z", "new"),
        ] {
            store
                .insert_raw(
                    ENTITIES,
                    fields(json!({
                        "PK": "ENTITY#p1",
                        "SK": sk,
                        "updatedAt": updated_at,
                        "data": { "id": "p1", "ownerId": "u1", "status": status, "updatedAt": updated_at }
                    })),
                )
                .await
                .unwrap();
        }

        repo.update_entity("p1", "u1", fields(json!({ "name": "Named" })))
            .await
            .unwrap();

        let items = store.items(ENTITIES).await;
        let chat = items.iter().find(|i| i["SK"] == json!("CHAT#2")).unwrap();
        let canonical = items.iter().find(|i| i["SK"] == json!("ENTITY#p1")).unwrap();
        assert_eq!(chat["data"]["name"], json!("Named"));
        assert!(canonical["data"].get("name").is_none());
    }

    // ------------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_delete_removes_every_record() {
        let (repo, store, _clock) = repo();
        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();
        store
            .insert_raw(
                ENTITIES,
                fields(json!({ "PK": format!("ENTITY#{}", entity.id), "SK": "CHAT#1" })),
            )
            .await
            .unwrap();

        let outcome = repo.delete_entity(&entity.id, "u1").await.unwrap();

        assert!(outcome.is_clean());
        assert!(store.items(ENTITIES).await.is_empty());
        assert!(store.items(INDEX).await.is_empty());
        assert_eq!(repo.get_entity(&entity.id, "u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_partial_failure_is_a_warning() {
        let (repo, store, _clock) = repo();
        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();
        store
            .insert_raw(
                ENTITIES,
                fields(json!({ "PK": format!("ENTITY#{}", entity.id), "SK": "CHAT#1" })),
            )
            .await
            .unwrap();
        store
            .fail_next(StoreOperation::Delete, ENTITIES, 3, transient())
            .await;

        let outcome = repo.delete_entity(&entity.id, "u1").await.unwrap();

        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(
            outcome.warnings[0],
            WriteWarning::DeleteIncomplete { .. }
        ));
        assert_eq!(store.items(ENTITIES).await.len(), 1);
        assert!(store.items(INDEX).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_fails_when_nothing_was_deleted() {
        let (repo, store, _clock) = repo();
        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();
        store
            .fail_next(StoreOperation::Delete, ENTITIES, 3, transient())
            .await;

        let err = repo.delete_entity(&entity.id, "u1").await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(store.items(INDEX).await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_index_failure_is_a_warning() {
        let (repo, store, _clock) = repo();
        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();
        store
            .fail_next(StoreOperation::Delete, INDEX, 3, transient())
            .await;

        let outcome = repo.delete_entity(&entity.id, "u1").await.unwrap();

        assert_eq!(
            outcome.warnings,
            vec![WriteWarning::DeleteIncomplete {
                key: format!("OWNER#u1|ENTITY#{}", entity.id),
                reason: "Transient store error: throttled".to_string(),
            }]
        );
        assert!(store.items(ENTITIES).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_foreign_entity_is_not_found() {
        let (repo, store, _clock) = repo();
        let entity = repo.create_entity("u1", shop()).await.unwrap().into_inner();

        let err = repo.delete_entity(&entity.id, "u2").await.unwrap_err();

        assert!(matches!(err, RepositoryError::NotFound { .. }));
        assert_eq!(store.items(ENTITIES).await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_entity_removes_orphan_index() {
        let (repo, store, _clock) = repo();
        store
            .insert_raw(
                INDEX,
                fields(json!({
                    "PK": "OWNER#u1",
                    "SK": "ENTITY#ghost",
                    "data": { "id": "ghost", "name": "Ghost" }
                })),
            )
            .await
            .unwrap();

        let outcome = repo.delete_entity("ghost", "u1").await.unwrap();

        assert!(outcome.is_clean());
        assert!(store.items(INDEX).await.is_empty());
    }
}
