//! Table schema definitions (Functional Core - pure data).

use projectstore::TableNames;

/// Schema of one DynamoDB table backing a record collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub table_name: String,
    pub partition_key: KeyAttribute,
    pub sort_key: KeyAttribute,
    pub billing_mode: BillingMode,
}

/// A key attribute definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    pub name: String,
    pub attribute_type: AttributeType,
}

/// DynamoDB attribute types for keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
}

/// DynamoDB billing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingMode {
    PayPerRequest,
}

impl KeyAttribute {
    fn string(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attribute_type: AttributeType::String,
        }
    }
}

impl TableConfig {
    /// A `PK`/`SK` string-keyed table, the schema every collection uses.
    pub fn record_table(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            partition_key: KeyAttribute::string("PK"),
            sort_key: KeyAttribute::string("SK"),
            billing_mode: BillingMode::PayPerRequest,
        }
    }
}

/// Table configurations for the project collections.
///
/// Primary and index records may share one table, in which case a single
/// configuration is returned.
pub fn projectstore_table_configs(tables: &TableNames) -> Vec<TableConfig> {
    tables
        .collections()
        .into_iter()
        .map(TableConfig::record_table)
        .collect()
}
