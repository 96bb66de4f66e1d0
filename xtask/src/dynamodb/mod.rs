//! DynamoDB infrastructure management commands.

mod client;
mod config;
mod deploy;
mod error;
mod planning;
mod seed;

pub use error::{DynamodbError, Result};

use crate::prelude::*;
use dialoguer::Confirm;
use projectstore::storage::dynamodb::{create_client, DynamoDbConfig};
use projectstore::storage::DynamoDbStore;
use projectstore::{EntityStore, StoreConfig, TableNames};
use projectstore_core::storage::EntityRepository;

/// DynamoDB infrastructure management commands.
#[derive(Debug, clap::Parser)]
pub struct DynamodbCommand {
    #[command(subcommand)]
    pub action: DynamodbAction,
}

/// Available DynamoDB actions.
#[derive(Debug, clap::Subcommand)]
pub enum DynamodbAction {
    /// Deploy or destroy the project tables.
    Deploy(DeployCommand),

    /// Seed an owner with sample projects.
    Seed(SeedCommand),

    /// Probe every project table and report availability.
    Health(HealthCommand),
}

/// Table names shared by every action.
#[derive(Debug, Clone, clap::Args)]
pub struct TableArgs {
    /// Table holding primary project records.
    #[arg(long, env = "DYNAMODB_ENTITY_TABLE", default_value = "projects")]
    pub entity_table: String,

    /// Table holding owner index records (may equal the entity table).
    #[arg(long, env = "DYNAMODB_INDEX_TABLE", default_value = "user_projects")]
    pub index_table: String,
}

impl TableArgs {
    fn table_names(&self) -> TableNames {
        TableNames::new(&self.entity_table, &self.index_table)
    }
}

/// Deploy or update DynamoDB infrastructure.
#[derive(Debug, clap::Parser)]
#[command(long_about = "Deploy or destroy the project tables.

By default, this command creates the entity and index tables with a PK/SK
string key schema. When both names are the same a single table is created.

The command shows a plan of changes before applying and asks for confirmation.

Environment variables:
  AWS_ENDPOINT_URL    - Use local DynamoDB (e.g., http://localhost:8000)
  AWS_REGION          - AWS region (defaults to us-east-1)
  AWS_PROFILE         - AWS profile to use for credentials")]
pub struct DeployCommand {
    /// Skip confirmation prompts.
    #[arg(long)]
    pub force: bool,

    /// Destroy the tables instead of creating them.
    #[arg(long)]
    pub destroy: bool,

    #[command(flatten)]
    pub tables: TableArgs,
}

/// Seed an owner with sample projects.
#[derive(Debug, clap::Parser)]
#[command(long_about = "Create sample projects for an owner.

Projects are written through the storage layer, so each one gets both its
primary record and its owner index record. Every sample has a stable
idempotency key: seeding the same owner twice does not duplicate projects.")]
pub struct SeedCommand {
    /// Owner to create projects for.
    #[arg(long)]
    pub owner: String,

    /// Number of projects to generate.
    #[arg(long, default_value = "10")]
    pub count: u32,

    #[command(flatten)]
    pub tables: TableArgs,

    /// Skip confirmation prompts.
    #[arg(long)]
    pub force: bool,
}

/// Probe every project table.
#[derive(Debug, clap::Parser)]
pub struct HealthCommand {
    #[command(flatten)]
    pub tables: TableArgs,
}

/// Main entry point for dynamodb command.
pub async fn run(command: DynamodbCommand, global: crate::Global) -> Result<()> {
    match command.action {
        DynamodbAction::Deploy(deploy_cmd) => run_deploy(deploy_cmd, &global).await,
        DynamodbAction::Seed(seed_cmd) => run_seed(seed_cmd, &global).await,
        DynamodbAction::Health(health_cmd) => run_health(health_cmd, &global).await,
    }
}

async fn run_deploy(cmd: DeployCommand, global: &crate::Global) -> Result<()> {
    let aws_config = DynamoDbConfig::default();

    if !global.is_silent() {
        aprintln!("{} {}", p_b("Target:"), aws_config.target_display());
        aprintln!();
    }

    let dynamo_client = create_client(&aws_config).await;
    let table_names = cmd.tables.table_names();
    let current_state =
        client::get_table_states(&dynamo_client, &table_names.collections()).await?;

    if cmd.destroy {
        let plan = planning::calculate_destroy_plan(&current_state);

        if !global.is_silent() {
            aprintln!("{}", p_y("Destroy Plan:"));
            for line in planning::format_destroy_plan(&plan) {
                aprintln!("  {}", p_r(&line));
            }
            aprintln!();
        }

        if plan.is_empty() {
            if !global.is_silent() {
                aprintln!("{}", p_g("Nothing to destroy."));
            }
            return Ok(());
        }

        if !cmd.force {
            let confirmed = Confirm::new()
                .with_prompt("Are you sure you want to delete these tables? ALL DATA WILL BE LOST")
                .default(false)
                .interact()?;

            if !confirmed {
                return Err(DynamodbError::UserCancelled);
            }
        }

        if !global.is_silent() {
            aprintln!("{}", p_b("Deleting tables..."));
        }

        deploy::execute_destroy_plan(&dynamo_client, &plan).await?;

        if !global.is_silent() {
            aprintln!("{}", p_g("Tables destroyed successfully."));
        }
    } else {
        let desired = config::projectstore_table_configs(&table_names);
        let states: Vec<_> = current_state.into_iter().map(|(_, state)| state).collect();
        let plan = planning::calculate_deploy_plan(&states, &desired);

        if !global.is_silent() {
            aprintln!("{}", p_c("Deploy Plan:"));
            for line in planning::format_deploy_plan(&plan) {
                if line.starts_with('+') {
                    aprintln!("  {}", p_g(&line));
                } else if line.starts_with('~') {
                    aprintln!("  {}", p_y(&line));
                } else {
                    aprintln!("  {}", line);
                }
            }
            aprintln!();
        }

        if let Some(table_name) = plan.mismatched().first() {
            return Err(DynamodbError::KeySchemaMismatch {
                table_name: table_name.to_string(),
            });
        }

        if !plan.has_changes() {
            if !global.is_silent() {
                aprintln!("{}", p_g("Infrastructure is up to date."));
            }
            return Ok(());
        }

        if !cmd.force {
            let confirmed = Confirm::new()
                .with_prompt("Apply these changes?")
                .default(true)
                .interact()?;

            if !confirmed {
                return Err(DynamodbError::UserCancelled);
            }
        }

        if !global.is_silent() {
            aprintln!("{}", p_b("Applying changes..."));
        }

        deploy::execute_deploy_plan(&dynamo_client, &plan).await?;

        if !global.is_silent() {
            aprintln!("{}", p_g("Infrastructure deployed successfully."));
        }
    }

    Ok(())
}

async fn run_seed(cmd: SeedCommand, global: &crate::Global) -> Result<()> {
    let aws_config = DynamoDbConfig::default();
    let table_names = cmd.tables.table_names();

    if !global.is_silent() {
        aprintln!("{} {}", p_b("Target:"), aws_config.target_display());
        aprintln!("{} {}", p_b("Entity table:"), table_names.entities);
        aprintln!("{} {}", p_b("Index table:"), table_names.index);
        aprintln!("{} {}", p_b("Owner:"), cmd.owner);
        aprintln!("{} {}", p_b("Project count:"), cmd.count);
        aprintln!();
    }

    let dynamo_client = create_client(&aws_config).await;

    // Verify tables exist
    for table_name in table_names.collections() {
        if client::get_table_state(&dynamo_client, table_name)
            .await?
            .is_none()
        {
            return Err(DynamodbError::TableNotFound {
                table_name: table_name.to_string(),
            });
        }
    }

    let projects = seed::generate_seed_projects(cmd.count);

    if !global.is_silent() {
        aprintln!("{}", p_c("Projects to create:"));
        for project in projects.iter().take(5) {
            aprintln!("  {} ({})", project.name(), project.idempotency_key);
        }
        if projects.len() > 5 {
            aprintln!("  ... and {} more", projects.len() - 5);
        }
        aprintln!();
    }

    if !cmd.force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Create {} projects?", projects.len()))
            .default(true)
            .interact()?;

        if !confirmed {
            return Err(DynamodbError::UserCancelled);
        }
    }

    let repo = EntityStore::new(
        DynamoDbStore::new(dynamo_client),
        StoreConfig::new(table_names),
    );
    let (created, warnings) = seed::seed_projects(&repo, &cmd.owner, &projects).await?;

    if !global.is_silent() {
        for warning in &warnings {
            aprintln!("{} {:?}", p_y("Warning:"), warning);
        }
        aprintln!("{} {} projects created.", p_g("Success:"), created.len());
    }

    Ok(())
}

async fn run_health(cmd: HealthCommand, global: &crate::Global) -> Result<()> {
    let aws_config = DynamoDbConfig::default();
    let dynamo_client = create_client(&aws_config).await;

    let repo = EntityStore::new(
        DynamoDbStore::new(dynamo_client),
        StoreConfig::new(cmd.tables.table_names()),
    );
    let report = repo.health_check().await;

    if !global.is_silent() {
        aprintln!("{} {}", p_b("Target:"), aws_config.target_display());
        for (collection, available) in &report.per_collection {
            let status = if *available { p_g("available") } else { p_r("unavailable") };
            aprintln!("  {}: {}", collection, status);
        }
    }

    if global.is_verbose() {
        aprintln!("{}", serde_json::to_string_pretty(&report)?);
    }

    if report.available {
        Ok(())
    } else {
        Err(DynamodbError::Unavailable)
    }
}
