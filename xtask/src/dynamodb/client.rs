//! Table inspection (Imperative Shell).

use super::error::{DynamodbError, Result};
use super::planning::{TableState, TableStatus};
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::types::KeyType;
use aws_sdk_dynamodb::Client;

/// Fetches current table state, returns None if table doesn't exist.
pub async fn get_table_state(client: &Client, table_name: &str) -> Result<Option<TableState>> {
    match client.describe_table().table_name(table_name).send().await {
        Ok(response) => {
            let Some(table) = response.table() else {
                return Ok(None);
            };

            let key_named = |key_type: KeyType| {
                table
                    .key_schema()
                    .iter()
                    .find(|element| element.key_type() == &key_type)
                    .map(|element| element.attribute_name().to_string())
            };

            let status = match table.table_status() {
                Some(aws_sdk_dynamodb::types::TableStatus::Active) => TableStatus::Active,
                Some(aws_sdk_dynamodb::types::TableStatus::Creating) => TableStatus::Creating,
                Some(aws_sdk_dynamodb::types::TableStatus::Updating) => TableStatus::Updating,
                Some(aws_sdk_dynamodb::types::TableStatus::Deleting) => TableStatus::Deleting,
                _ => TableStatus::Active,
            };

            Ok(Some(TableState {
                status,
                partition_key: key_named(KeyType::Hash),
                sort_key: key_named(KeyType::Range),
            }))
        }
        Err(SdkError::ServiceError(err)) if err.err().is_resource_not_found_exception() => {
            Ok(None)
        }
        Err(err) => Err(DynamodbError::AwsSdk(err.to_string())),
    }
}

/// Fetches the state of every table, in order.
pub async fn get_table_states(
    client: &Client,
    table_names: &[&str],
) -> Result<Vec<(String, Option<TableState>)>> {
    let mut states = Vec::with_capacity(table_names.len());
    for name in table_names {
        states.push((name.to_string(), get_table_state(client, name).await?));
    }
    Ok(states)
}
