//! Veeam Provider CLI
//!
//! Runs one lifecycle call against the backup server using JSON state files
//! and prints the resulting state to stdout. Logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use veeam_provider::config::{ConfigOverrides, ProviderConfig};
use veeam_provider::provider::{ProviderResponse, VeeamProvider};
use veeam_provider::state::{decode_dynamic_value, DynamicValue};

/// Manage Veeam backup jobs declaratively
#[derive(Parser)]
#[command(name = "terraform-provider-veeam")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Provider config file (TOML)
    #[arg(long, default_value = "veeam-provider.toml", global = true)]
    provider_config: PathBuf,

    /// REST API base URL
    #[arg(long, env = "VEEAM_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Bearer token
    #[arg(long, env = "VEEAM_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// x-api-version header value
    #[arg(long, env = "VEEAM_API_VERSION", global = true)]
    api_version: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a job from a desired-state file
    Create { desired: PathBuf },

    /// Refresh a stored state file from the server
    Read { state: PathBuf },

    /// Apply a desired-state file to the job recorded in a state file
    Update { state: PathBuf, desired: PathBuf },

    /// Delete the job recorded in a state file
    Delete { state: PathBuf },

    /// Adopt an existing job by id
    Import { id: String },

    /// Check a desired-state file without contacting the server
    Validate { desired: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = ProviderConfig::load(&cli.provider_config)
        .with_context(|| format!("loading {}", cli.provider_config.display()))?
        .apply(ConfigOverrides {
            endpoint: cli.endpoint,
            token: cli.token,
            api_version: cli.api_version,
            timeout_secs: cli.timeout,
        });

    let response = match cli.command {
        Commands::Validate { desired } => validate(&desired)?,
        command => {
            let gateway = config.gateway()?;
            info!("Using endpoint {}", gateway.context().endpoint);
            run(&VeeamProvider::new(gateway), command).await?
        }
    };

    finish(response)
}

async fn run(provider: &VeeamProvider, command: Commands) -> anyhow::Result<ProviderResponse> {
    let response = match command {
        Commands::Create { desired } => {
            let planned = read_state(&desired)?;
            provider.apply_resource_change(None, Some(&planned)).await
        }
        Commands::Read { state } => {
            let current = read_state(&state)?;
            provider.read_resource(&current).await
        }
        Commands::Update { state, desired } => {
            let prior = read_state(&state)?;
            let planned = read_state(&desired)?;
            provider.apply_resource_change(Some(&prior), Some(&planned)).await
        }
        Commands::Delete { state } => {
            let prior = read_state(&state)?;
            provider.apply_resource_change(Some(&prior), None).await
        }
        Commands::Import { id } => provider.import_resource_state(&id).await,
        Commands::Validate { desired } => validate(&desired)?,
    };
    Ok(response)
}

fn validate(desired: &Path) -> anyhow::Result<ProviderResponse> {
    Ok(ProviderResponse {
        new_state: None,
        diagnostics: VeeamProvider::validate_config(&read_state(desired)?),
    })
}

fn read_state(path: &Path) -> anyhow::Result<DynamicValue> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    decode_dynamic_value(&data).with_context(|| format!("decoding {}", path.display()))
}

fn finish(response: ProviderResponse) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.has_errors() {
        anyhow::bail!("operation failed");
    }
    Ok(())
}
