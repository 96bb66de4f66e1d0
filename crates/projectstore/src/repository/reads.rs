//! Read and query engine: point reads, owner listings and batch reads.

use std::collections::{HashMap, HashSet};

use futures_util::stream::{self, StreamExt, TryStreamExt};

use projectstore_core::entity::Entity;
use projectstore_core::storage::codec;
use projectstore_core::storage::keys::{self, validate_identifier};
use projectstore_core::storage::{
    decode_continuation_token, encode_continuation_token, Item, Page, PageRequest, PrefixQuery,
    RecordStore, RepositoryError, Result,
};

use super::EntityStore;

impl<S: RecordStore> EntityStore<S> {
    // ========================================================================
    // Point reads
    // ========================================================================

    pub(super) async fn get(&self, entity_id: &str, owner_id: &str) -> Result<Option<Entity>> {
        validate_identifier("entity", entity_id)?;
        validate_identifier("owner", owner_id)?;

        let Some(item) = self.fetch_primary(entity_id).await? else {
            tracing::trace!(entity_id, "Entity not found");
            return Ok(None);
        };

        let entity = codec::decode(&item, entity_id, self.now());
        if !entity.is_owned_by(owner_id) {
            tracing::trace!(entity_id, owner_id, "Entity belongs to another owner");
            return Ok(None);
        }
        Ok(Some(entity))
    }

    /// Every physical record in the primary partition of an entity.
    pub(super) async fn primary_variants(&self, entity_id: &str) -> Result<Vec<Item>> {
        let store = self.store.as_ref();
        let entities = self.entities_table();
        let mut query = PrefixQuery::partition(keys::entity_pk(entity_id));
        let mut items = Vec::new();

        loop {
            let current = &query;
            let page = self
                .config
                .retry
                .run("query", move || store.query(entities, current))
                .await?;
            items.extend(page.items);

            match page.last_key {
                Some(last) => query.exclusive_start_key = Some(last),
                None => return Ok(items),
            }
        }
    }

    /// The authoritative primary record of an entity, if any.
    pub(super) async fn fetch_primary(&self, entity_id: &str) -> Result<Option<Item>> {
        let variants = self.primary_variants(entity_id).await?;
        Ok(most_recent(&variants).cloned())
    }

    // ========================================================================
    // Owner listings
    // ========================================================================

    pub(super) async fn list_by_owner(
        &self,
        owner_id: &str,
        page: PageRequest,
    ) -> Result<Page<Entity>> {
        validate_identifier("owner", owner_id)?;

        let partition = keys::owner_pk(owner_id);
        let start = page
            .continuation_token
            .as_deref()
            .map(|token| decode_continuation_token(token, &partition))
            .transpose()?;
        let query = &PrefixQuery::partition(partition)
            .with_prefix(keys::index_sk_prefix())
            .with_limit(self.config.page_size(page.limit))
            .starting_after(start);

        let store = self.store.as_ref();
        let index = self.index_table();
        let result = self
            .config
            .retry
            .run("query_index", move || store.query(index, query))
            .await?;

        let mut items: Vec<Entity> = stream::iter(result.items)
            .map(|index_item| async move {
                self.resolve_index_item(&index_item, owner_id).await
            })
            .buffered(self.config.batch_concurrency.max(1))
            .filter_map(|entity| async move { entity })
            .collect()
            .await;
        items.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let next_token = result
            .last_key
            .as_ref()
            .map(encode_continuation_token)
            .transpose()?;

        tracing::trace!(
            owner_id,
            count = items.len(),
            more = next_token.is_some(),
            "Listed entities"
        );
        Ok(Page { items, next_token })
    }

    /// Turn one index record into an entity.
    ///
    /// Prefers the primary record. Falls back to the index projection when
    /// the primary record is missing, unreadable or owned by someone else.
    async fn resolve_index_item(&self, index_item: &Item, owner_id: &str) -> Option<Entity> {
        let entity_id = index_item
            .get(keys::SORT_KEY_ATTR)
            .and_then(|sk| sk.as_str())
            .and_then(keys::entity_id_from_index_sk)
            .map(str::to_string)
            .or_else(|| codec::record_entity_id(index_item));
        let Some(entity_id) = entity_id else {
            tracing::warn!(owner_id, "Skipping index record without an entity id");
            return None;
        };

        match self.fetch_primary(&entity_id).await {
            Ok(Some(item)) => {
                let entity = codec::decode(&item, &entity_id, self.now());
                if entity.is_owned_by(owner_id) {
                    return Some(entity);
                }
                tracing::warn!(
                    entity_id = %entity_id,
                    owner_id,
                    "Index record points at another owner's entity"
                );
            }
            Ok(None) => {
                tracing::trace!(
                    entity_id = %entity_id,
                    owner_id,
                    "Orphan index record, using its projection"
                );
            }
            Err(err) => {
                tracing::warn!(
                    entity_id = %entity_id,
                    owner_id,
                    error = %err,
                    "Primary read failed, using index projection"
                );
            }
        }

        let mut degraded = codec::decode(index_item, &entity_id, self.now());
        if degraded.owner_id.is_empty() {
            degraded.owner_id = owner_id.to_string();
        }
        Some(degraded)
    }

    // ========================================================================
    // Batch reads
    // ========================================================================

    pub(super) async fn batch_get(
        &self,
        entity_ids: &[String],
        owner_id: &str,
    ) -> Result<Vec<Entity>> {
        validate_identifier("owner", owner_id)?;
        for id in entity_ids {
            validate_identifier("entity", id)?;
        }

        let mut seen = HashSet::new();
        let ids: Vec<String> = entity_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Every id goes through its partition so a newer sort-key variant
        // wins over the canonical record.
        let chunk_size = self.store.max_batch_size().max(1);
        let concurrency = self.config.batch_concurrency.max(1);
        let mut found: HashMap<String, Item> = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(chunk_size) {
            let resolved: Vec<(String, Option<Item>)> = stream::iter(chunk.to_vec())
                .map(|id| async move {
                    let item = self.fetch_primary(&id).await?;
                    Ok::<_, RepositoryError>((id, item))
                })
                .buffered(concurrency)
                .try_collect()
                .await?;
            found.extend(
                resolved
                    .into_iter()
                    .filter_map(|(id, item)| item.map(|item| (id, item))),
            );
        }

        let now = self.now();
        let result: Vec<Entity> = ids
            .iter()
            .filter_map(|id| found.get(id).map(|item| codec::decode(item, id, now)))
            .filter(|entity| entity.is_owned_by(owner_id))
            .collect();

        tracing::trace!(
            owner_id,
            requested = ids.len(),
            found = result.len(),
            "Batch read entities"
        );
        Ok(result)
    }
}

/// Pick the authoritative record among sort-key variants.
///
/// The latest `updatedAt` wins; records without a parseable timestamp lose
/// to any that have one, and ties go to the later sort key.
pub(super) fn most_recent(variants: &[Item]) -> Option<&Item> {
    variants.iter().max_by_key(|item| codec::record_updated_at(item))
}
