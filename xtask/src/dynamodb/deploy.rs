//! Table deployment operations (Imperative Shell).

use super::client;
use super::config::{self, KeyAttribute, TableConfig};
use super::error::{DynamodbError, Result};
use super::planning::{DeployPlan, DestroyPlan, TableStatus};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
};
use aws_sdk_dynamodb::Client;
use std::time::Duration;

/// Execute a deploy plan, creating missing tables one at a time.
pub async fn execute_deploy_plan(client: &Client, plan: &DeployPlan) -> Result<()> {
    for config in plan.tables_to_create() {
        create_table(client, config).await?;
        wait_for_table_active(client, &config.table_name).await?;
    }
    Ok(())
}

/// Execute a destroy plan.
pub async fn execute_destroy_plan(client: &Client, plan: &DestroyPlan) -> Result<()> {
    for table_name in &plan.to_delete {
        delete_table(client, table_name).await?;
    }
    Ok(())
}

async fn create_table(client: &Client, config: &TableConfig) -> Result<()> {
    let key_schema = vec![
        key_element(&config.partition_key, KeyType::Hash)?,
        key_element(&config.sort_key, KeyType::Range)?,
    ];
    let attribute_definitions = vec![
        attribute_definition(&config.partition_key)?,
        attribute_definition(&config.sort_key)?,
    ];

    let billing_mode = match config.billing_mode {
        config::BillingMode::PayPerRequest => BillingMode::PayPerRequest,
    };

    client
        .create_table()
        .table_name(&config.table_name)
        .set_key_schema(Some(key_schema))
        .set_attribute_definitions(Some(attribute_definitions))
        .billing_mode(billing_mode)
        .send()
        .await
        .map_err(|e| DynamodbError::AwsSdk(e.to_string()))?;
    Ok(())
}

fn key_element(key: &KeyAttribute, key_type: KeyType) -> Result<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(&key.name)
        .key_type(key_type)
        .build()
        .map_err(|e| DynamodbError::AwsSdk(e.to_string()))
}

fn attribute_definition(key: &KeyAttribute) -> Result<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(&key.name)
        .attribute_type(to_scalar_type(&key.attribute_type))
        .build()
        .map_err(|e| DynamodbError::AwsSdk(e.to_string()))
}

async fn delete_table(client: &Client, table_name: &str) -> Result<()> {
    client
        .delete_table()
        .table_name(table_name)
        .send()
        .await
        .map_err(|e| DynamodbError::AwsSdk(e.to_string()))?;
    Ok(())
}

async fn wait_for_table_active(client: &Client, table_name: &str) -> Result<()> {
    let max_attempts = 60;
    let delay = Duration::from_secs(2);

    for _ in 0..max_attempts {
        if let Some(state) = client::get_table_state(client, table_name).await? {
            if state.status == TableStatus::Active {
                return Ok(());
            }
        }
        tokio::time::sleep(delay).await;
    }

    Err(DynamodbError::TableActivationTimeout {
        table_name: table_name.to_string(),
    })
}

fn to_scalar_type(attr_type: &config::AttributeType) -> ScalarAttributeType {
    match attr_type {
        config::AttributeType::String => ScalarAttributeType::S,
    }
}
