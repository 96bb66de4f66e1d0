//! In-memory record store.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use projectstore_core::storage::codec::DATA_ATTR;
use projectstore_core::storage::{
    build_update_expression, ConditionalPut, FieldUpdate, Item, PrefixQuery, PutCondition,
    QueryPage, RecordKey, RecordStore, RepositoryError, Result,
};

/// Store operations that failures can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Get,
    Put,
    Update,
    Delete,
    Query,
    Probe,
    TransactPut,
}

#[derive(Debug)]
struct InjectedFailure {
    operation: StoreOperation,
    collection: String,
    remaining: u32,
    error: RepositoryError,
}

type Collection = BTreeMap<RecordKey, Item>;

/// In-memory storage backend for testing.
///
/// Data is not persisted and will be lost when the last clone is dropped.
/// Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
    failures: Arc<Mutex<Vec<InjectedFailure>>>,
    calls: Arc<Mutex<HashMap<StoreOperation, usize>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `operation` on `collection` fail with `error`.
    pub async fn fail_next(
        &self,
        operation: StoreOperation,
        collection: &str,
        times: u32,
        error: RepositoryError,
    ) {
        self.failures.lock().await.push(InjectedFailure {
            operation,
            collection: collection.to_string(),
            remaining: times,
            error,
        });
    }

    /// Stores a raw record as-is, bypassing failure injection.
    pub async fn insert_raw(&self, collection: &str, item: Item) -> Result<()> {
        let key = key_of(&item)?;
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(key, item);
        Ok(())
    }

    /// Every record of a collection, in key order.
    pub async fn items(&self, collection: &str) -> Vec<Item> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of calls made to `operation`, failed ones included.
    pub async fn call_count(&self, operation: StoreOperation) -> usize {
        self.calls
            .lock()
            .await
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    async fn enter(&self, operation: StoreOperation, collection: &str) -> Result<()> {
        *self.calls.lock().await.entry(operation).or_insert(0) += 1;

        let mut failures = self.failures.lock().await;
        let injected = failures.iter_mut().find(|f| {
            f.operation == operation && f.collection == collection && f.remaining > 0
        });
        match injected {
            Some(failure) => {
                failure.remaining -= 1;
                Err(failure.error.clone())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn get(&self, collection: &str, key: &RecordKey) -> Result<Option<Item>> {
        self.enter(StoreOperation::Get, collection).await?;

        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|records| records.get(key))
            .cloned())
    }

    async fn put(&self, collection: &str, item: Item, condition: PutCondition) -> Result<()> {
        self.enter(StoreOperation::Put, collection).await?;

        let key = key_of(&item)?;
        let mut collections = self.collections.write().await;
        let records = collections.entry(collection.to_string()).or_default();
        if condition == PutCondition::MustNotExist && records.contains_key(&key) {
            return Err(already_exists(&key));
        }
        records.insert(key, item);
        Ok(())
    }

    async fn update(&self, collection: &str, key: &RecordKey, update: &FieldUpdate) -> Result<()> {
        self.enter(StoreOperation::Update, collection).await?;
        build_update_expression(update)?;

        let mut collections = self.collections.write().await;
        let records = collections.entry(collection.to_string()).or_default();

        let mut item = match records.get(key) {
            Some(existing) => existing.clone(),
            None if update.require_existing => {
                return Err(RepositoryError::NotFound {
                    entity_type: "Record",
                    id: key.to_string(),
                })
            }
            None => {
                let mut fresh = Item::new();
                key.write_into(&mut fresh);
                fresh
            }
        };

        apply_update(&mut item, update)?;
        records.insert(key.clone(), item);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &RecordKey) -> Result<()> {
        self.enter(StoreOperation::Delete, collection).await?;

        if let Some(records) = self.collections.write().await.get_mut(collection) {
            records.remove(key);
        }
        Ok(())
    }

    async fn query(&self, collection: &str, query: &PrefixQuery) -> Result<QueryPage> {
        self.enter(StoreOperation::Query, collection).await?;

        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Ok(QueryPage::default());
        };

        let lower = match &query.exclusive_start_key {
            Some(start) => Bound::Excluded(start.clone()),
            None => Bound::Included(RecordKey::new(query.partition_key.clone(), String::new())),
        };
        let prefix = query.sort_key_prefix.as_deref().unwrap_or_default();
        let mut matching = records
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.partition_key == query.partition_key)
            .filter(|(key, _)| key.sort_key.starts_with(prefix));

        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        let items: Vec<Item> = matching
            .by_ref()
            .take(limit)
            .map(|(_, item)| item.clone())
            .collect();

        let last_key = if matching.next().is_some() {
            items.last().and_then(RecordKey::from_item)
        } else {
            None
        };

        Ok(QueryPage { items, last_key })
    }

    async fn probe(&self, collection: &str) -> Result<()> {
        self.enter(StoreOperation::Probe, collection).await
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    async fn transact_put(&self, puts: Vec<ConditionalPut>) -> Result<()> {
        for put in &puts {
            self.enter(StoreOperation::TransactPut, &put.collection)
                .await?;
        }

        let mut collections = self.collections.write().await;
        let mut keyed = Vec::with_capacity(puts.len());
        for put in puts {
            let key = key_of(&put.item)?;
            let exists = collections
                .get(&put.collection)
                .is_some_and(|records| records.contains_key(&key));
            if put.condition == PutCondition::MustNotExist && exists {
                return Err(already_exists(&key));
            }
            keyed.push((put.collection, key, put.item));
        }

        for (collection, key, item) in keyed {
            collections.entry(collection).or_default().insert(key, item);
        }
        Ok(())
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn key_of(item: &Item) -> Result<RecordKey> {
    RecordKey::from_item(item)
        .ok_or_else(|| RepositoryError::validation("item is missing its key attributes"))
}

fn already_exists(key: &RecordKey) -> RepositoryError {
    RepositoryError::AlreadyExists {
        entity_type: "Record",
        id: key.to_string(),
    }
}

/// Apply the same writes the rendered `SET` expression would.
fn apply_update(item: &mut Item, update: &FieldUpdate) -> Result<()> {
    let data: Vec<_> = update.writable_data().collect();
    if !data.is_empty() {
        let Some(Value::Object(nested)) = item.get_mut(DATA_ATTR) else {
            return Err(RepositoryError::QueryFailed(
                "The document path provided in the update expression is invalid for update"
                    .to_string(),
            ));
        };
        for (name, value) in data {
            nested.insert(name.clone(), value.clone());
        }
    }

    for (name, value) in update.writable_attributes() {
        item.insert(name.clone(), value.clone());
    }
    Ok(())
}
