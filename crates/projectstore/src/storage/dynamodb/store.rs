//! DynamoDB record store.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, Put, TransactWriteItem};
use aws_sdk_dynamodb::Client;

use projectstore_core::storage::{
    build_update_expression, ConditionalPut, FieldUpdate, Item, PrefixQuery, PutCondition,
    QueryPage, RecordKey, RecordStore, RepositoryError, Result,
};

use super::client::{create_client, DynamoDbConfig};
use super::conversions::{
    attributes_to_item, attributes_to_key, item_to_attributes, key_to_attributes,
    to_attribute_value,
};
use super::error::{
    map_delete_item_error, map_get_item_error, map_put_item_error, map_query_error,
    map_scan_error, map_transact_write_items_error, map_update_item_error,
};

const MUST_NOT_EXIST: &str = "attribute_not_exists(PK)";
const MUST_EXIST: &str = "attribute_exists(PK)";

/// DynamoDB-based record store.
///
/// Collections are table names. The client is cheap to clone and safe to
/// share across tasks.
#[derive(Debug, Clone)]
pub struct DynamoDbStore {
    client: Client,
}

impl DynamoDbStore {
    /// Creates a new store with the given DynamoDB client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a new store from connection settings.
    pub async fn connect(config: &DynamoDbConfig) -> Self {
        Self::new(create_client(config).await)
    }

    /// Creates a new store from environment configuration.
    ///
    /// Reads `AWS_ENDPOINT_URL` and `AWS_REGION`; credentials come from the
    /// AWS SDK default provider chain.
    pub async fn from_env() -> Self {
        Self::connect(&DynamoDbConfig::default()).await
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl RecordStore for DynamoDbStore {
    async fn get(&self, collection: &str, key: &RecordKey) -> Result<Option<Item>> {
        let result = self
            .client
            .get_item()
            .table_name(collection)
            .set_key(Some(key_to_attributes(key)))
            .consistent_read(true)
            .send()
            .await
            .map_err(map_get_item_error)?;

        Ok(result.item.as_ref().map(attributes_to_item))
    }

    async fn put(&self, collection: &str, item: Item, condition: PutCondition) -> Result<()> {
        let key = RecordKey::from_item(&item)
            .ok_or_else(|| RepositoryError::validation("item is missing its key attributes"))?;

        let mut request = self
            .client
            .put_item()
            .table_name(collection)
            .set_item(Some(item_to_attributes(&item)));
        if condition == PutCondition::MustNotExist {
            request = request.condition_expression(MUST_NOT_EXIST);
        }

        request
            .send()
            .await
            .map_err(|e| map_put_item_error(e, &key))?;

        Ok(())
    }

    async fn update(&self, collection: &str, key: &RecordKey, update: &FieldUpdate) -> Result<()> {
        let expression = build_update_expression(update)?;

        let mut request = self
            .client
            .update_item()
            .table_name(collection)
            .set_key(Some(key_to_attributes(key)))
            .update_expression(expression.expression);
        for (alias, name) in expression.names {
            request = request.expression_attribute_names(alias, name);
        }
        for (placeholder, value) in &expression.values {
            request = request.expression_attribute_values(placeholder, to_attribute_value(value));
        }
        if update.require_existing {
            request = request.condition_expression(MUST_EXIST);
        }

        request
            .send()
            .await
            .map_err(|e| map_update_item_error(e, key))?;

        Ok(())
    }

    async fn delete(&self, collection: &str, key: &RecordKey) -> Result<()> {
        self.client
            .delete_item()
            .table_name(collection)
            .set_key(Some(key_to_attributes(key)))
            .send()
            .await
            .map_err(map_delete_item_error)?;

        Ok(())
    }

    async fn query(&self, collection: &str, query: &PrefixQuery) -> Result<QueryPage> {
        let mut request = self
            .client
            .query()
            .table_name(collection)
            .consistent_read(true)
            .expression_attribute_values(":pk", AttributeValue::S(query.partition_key.clone()));

        request = match &query.sort_key_prefix {
            Some(prefix) => request
                .key_condition_expression("PK = :pk AND begins_with(SK, :prefix)")
                .expression_attribute_values(":prefix", AttributeValue::S(prefix.clone())),
            None => request.key_condition_expression("PK = :pk"),
        };
        if let Some(limit) = query.limit {
            request = request.limit(i32::try_from(limit).unwrap_or(i32::MAX));
        }
        if let Some(start) = &query.exclusive_start_key {
            request = request.set_exclusive_start_key(Some(key_to_attributes(start)));
        }

        let result = request.send().await.map_err(map_query_error)?;

        Ok(QueryPage {
            items: result
                .items
                .unwrap_or_default()
                .iter()
                .map(attributes_to_item)
                .collect(),
            last_key: result.last_evaluated_key.as_ref().and_then(attributes_to_key),
        })
    }

    async fn probe(&self, collection: &str) -> Result<()> {
        self.client
            .scan()
            .table_name(collection)
            .limit(1)
            .send()
            .await
            .map_err(map_scan_error)?;

        Ok(())
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    async fn transact_put(&self, puts: Vec<ConditionalPut>) -> Result<()> {
        let transact_items = puts
            .iter()
            .map(|put| {
                let mut builder = Put::builder()
                    .table_name(&put.collection)
                    .set_item(Some(item_to_attributes(&put.item)));
                if put.condition == PutCondition::MustNotExist {
                    builder = builder.condition_expression(MUST_NOT_EXIST);
                }
                builder
                    .build()
                    .map(|put| TransactWriteItem::builder().put(put).build())
                    .map_err(|e| {
                        RepositoryError::QueryFailed(format!("Invalid transaction item: {}", e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .transact_write_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await
            .map_err(map_transact_write_items_error)?;

        Ok(())
    }
}
