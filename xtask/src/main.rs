//! Table provisioning, seeding and health checks for projectstore.
//!
//! Invoked as `cargo xtask` through the alias in `.cargo/config.toml`.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod dynamodb;
mod prelude;

/// Operational tasks for the projectstore repository
#[derive(Debug, Parser)]
#[command(name = "xtask")]
#[command(about = "Operational tasks for projectstore", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: Global,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Print only errors and warnings
    #[clap(long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    /// Print full reports and store debug logs
    #[clap(long, global = true)]
    pub verbose: bool,
}

impl Global {
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Log filter used when `RUST_LOG` is not set.
    fn default_filter(&self) -> &'static str {
        if self.silent {
            "warn"
        } else if self.verbose {
            "projectstore=debug"
        } else {
            "projectstore=info"
        }
    }
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Manage DynamoDB infrastructure and data
    Dynamodb(dynamodb::DynamodbCommand),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.global.default_filter().into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Dynamodb(dynamodb_cmd) => {
            dynamodb::run(dynamodb_cmd, cli.global).await?;
        }
    }

    Ok(())
}
