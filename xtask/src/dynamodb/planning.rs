//! Pure functions for calculating deployment plans (Functional Core).

use super::config::TableConfig;

/// Represents the current state of a table.
#[derive(Debug, Clone)]
pub struct TableState {
    pub status: TableStatus,
    /// Partition and sort key attribute names, if the table reports them.
    pub partition_key: Option<String>,
    pub sort_key: Option<String>,
}

/// Table status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    Active,
    Creating,
    Updating,
    Deleting,
}

/// Planned change for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TablePlan {
    /// Table doesn't exist, needs to be created.
    Create { config: TableConfig },
    /// Table exists with the expected key schema.
    NoChanges { table_name: String },
    /// Table exists but is keyed differently; it cannot be migrated in place.
    KeyMismatch {
        table_name: String,
        found: (String, String),
    },
}

/// Planned changes for every collection table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPlan {
    pub tables: Vec<TablePlan>,
}

impl DeployPlan {
    pub fn has_changes(&self) -> bool {
        self.tables
            .iter()
            .any(|plan| matches!(plan, TablePlan::Create { .. }))
    }

    /// Tables whose existing key schema does not match.
    pub fn mismatched(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter_map(|plan| match plan {
                TablePlan::KeyMismatch { table_name, .. } => Some(table_name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tables_to_create(&self) -> impl Iterator<Item = &TableConfig> {
        self.tables.iter().filter_map(|plan| match plan {
            TablePlan::Create { config } => Some(config),
            _ => None,
        })
    }
}

/// Plan for destroying the collection tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyPlan {
    /// Tables that exist and will be deleted.
    pub to_delete: Vec<String>,
    /// Tables that don't exist.
    pub already_gone: Vec<String>,
}

impl DestroyPlan {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty()
    }
}

/// Pure function: Calculate what one table needs to reach the desired state.
pub fn calculate_table_plan(current: Option<&TableState>, desired: &TableConfig) -> TablePlan {
    let Some(state) = current else {
        return TablePlan::Create {
            config: desired.clone(),
        };
    };

    let partition_key = state.partition_key.clone().unwrap_or_default();
    let sort_key = state.sort_key.clone().unwrap_or_default();

    if partition_key == desired.partition_key.name && sort_key == desired.sort_key.name {
        TablePlan::NoChanges {
            table_name: desired.table_name.clone(),
        }
    } else {
        TablePlan::KeyMismatch {
            table_name: desired.table_name.clone(),
            found: (partition_key, sort_key),
        }
    }
}

/// Pure function: Combine per-table states into a deploy plan.
pub fn calculate_deploy_plan(
    current: &[Option<TableState>],
    desired: &[TableConfig],
) -> DeployPlan {
    DeployPlan {
        tables: desired
            .iter()
            .zip(current)
            .map(|(config, state)| calculate_table_plan(state.as_ref(), config))
            .collect(),
    }
}

/// Pure function: Calculate destroy plan.
pub fn calculate_destroy_plan(current: &[(String, Option<TableState>)]) -> DestroyPlan {
    let (existing, missing): (Vec<_>, Vec<_>) =
        current.iter().partition(|(_, state)| state.is_some());

    DestroyPlan {
        to_delete: existing.into_iter().map(|(name, _)| name.clone()).collect(),
        already_gone: missing.into_iter().map(|(name, _)| name.clone()).collect(),
    }
}

/// Pure function: Format deploy plan for display.
pub fn format_deploy_plan(plan: &DeployPlan) -> Vec<String> {
    let mut lines = Vec::new();

    for table in &plan.tables {
        match table {
            TablePlan::Create { config } => {
                lines.push(format!("+ Create table: {}", config.table_name));
                lines.push(format!(
                    "  Keys: {} (HASH), {} (RANGE)",
                    config.partition_key.name, config.sort_key.name
                ));
                lines.push("  Billing: PAY_PER_REQUEST".to_string());
            }
            TablePlan::NoChanges { table_name } => {
                lines.push(format!("  Table '{}' is up to date", table_name));
            }
            TablePlan::KeyMismatch { table_name, found } => {
                lines.push(format!(
                    "~ Table '{}' is keyed {} / {}, expected PK / SK",
                    table_name, found.0, found.1
                ));
            }
        }
    }

    lines
}

/// Pure function: Format destroy plan for display.
pub fn format_destroy_plan(plan: &DestroyPlan) -> Vec<String> {
    let mut lines: Vec<String> = plan
        .to_delete
        .iter()
        .map(|name| format!("- Delete table: {}", name))
        .collect();

    lines.extend(
        plan.already_gone
            .iter()
            .map(|name| format!("  Table '{}' does not exist", name)),
    );

    lines
}
