use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cmd;

#[derive(Parser)]
#[command(name = "servitor")]
#[command(version, about = "Dependency-aware service lifecycle orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the service manifest
    #[arg(short, long, global = true, default_value = "services.toml")]
    pub manifest: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the activation order needed to start one or more services
    Plan {
        #[arg(required = true)]
        services: Vec<String>,

        /// Emit the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the manifest and report dependency cycles
    Check,
    /// List the services that depend on a service, directly or transitively
    Dependents {
        service: String,

        /// Only services naming it directly
        #[arg(long)]
        direct: bool,
    },
    /// Start services, report what happened, then shut everything down
    Start {
        #[arg(required = true)]
        services: Vec<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Plan { services, json } => cmd::cmd_plan(&cli.manifest, services, *json)?,
        Commands::Check => cmd::cmd_check(&cli.manifest)?,
        Commands::Dependents { service, direct } => {
            cmd::cmd_dependents(&cli.manifest, service, *direct)?
        }
        Commands::Start { services } => cmd::cmd_start(&cli.manifest, services)?,
    }

    Ok(())
}
