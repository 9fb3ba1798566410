//! opcmap - Command-line tool for the OPC UA REST gateway, the model index
//! and the data warehouse

mod commands;
mod config;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use opcmap_client::{AuthClient, ModelIndexClient, OpcUaClient, TokenProvider};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::{ForecastProvider, RawArgs};
use crate::config::{Config, MergedConfig, Overrides};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "opcmap")]
#[command(author, version, about = "OPC UA gateway, model index and data warehouse client")]
#[command(propagate_version = true)]
struct Cli {
    /// REST gateway base URL
    #[arg(long, env = "OPCMAP_REST_URL", global = true)]
    rest_url: Option<String>,

    /// OPC UA server URL (opc.tcp://...)
    #[arg(long, env = "OPCMAP_OPCUA_URL", global = true)]
    opcua_url: Option<String>,

    /// Model index base URL
    #[arg(long, env = "OPCMAP_CATALOG_URL", global = true)]
    catalog_url: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "OPCMAP_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, global = true)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read current values
    Values {
        /// Node ids, e.g. ns=2;s=Line1.Pump.Speed
        #[arg(required = true)]
        nodes: Vec<String>,
    },

    /// Read aggregated history
    Aggregated {
        /// Range start (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,

        /// Range end (RFC 3339)
        #[arg(long)]
        end: DateTime<Utc>,

        /// Bucket width in milliseconds
        #[arg(long, default_value = "60000")]
        interval_ms: u64,

        /// Aggregate function name
        #[arg(long, default_value = "Average")]
        aggregate: String,

        #[arg(required = true)]
        nodes: Vec<String>,
    },

    /// Read raw history
    Raw {
        /// Range start (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,

        /// Range end (RFC 3339)
        #[arg(long)]
        end: DateTime<Utc>,

        /// First record to return
        #[arg(long, requires = "num_records")]
        start_index: Option<u64>,

        /// Records per page
        #[arg(long, requires = "start_index")]
        num_records: Option<u64>,

        /// Fetch in concurrent windows of this many seconds
        #[arg(long)]
        window_secs: Option<u64>,

        #[arg(required = true)]
        nodes: Vec<String>,
    },

    /// Show the namespace array of the model index
    Namespaces,

    /// List object types
    ObjectTypes,

    /// List objects of a type
    Objects {
        /// Object type browse name
        type_name: String,
    },

    /// Data warehouse commands
    Dwh {
        #[command(subcommand)]
        command: DwhCommands,
    },
}

#[derive(Subcommand)]
enum DwhCommands {
    /// Show the warehouse schema version
    Version,

    /// Plants due for a forecast update
    Plants {
        #[arg(value_enum)]
        provider: ForecastProvider,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let format = cli.output.unwrap_or_default();
    let ctx = OutputContext::new(format, cli.no_color, cli.quiet);
    if let Err(e) = run(cli).await {
        ctx.error(&format!("Error: {:#}", e));
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    // Load config file
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_default(),
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(&Overrides {
        rest_url: cli.rest_url.as_deref(),
        opcua_url: cli.opcua_url.as_deref(),
        catalog_url: cli.catalog_url.as_deref(),
        output: cli.output.map(OutputFormat::as_str),
        no_color: cli.no_color,
    });

    let format = match cli.output {
        Some(format) => format,
        None => OutputFormat::from_name(&merged.output)
            .with_context(|| format!("Unknown output format '{}'", merged.output))?,
    };
    let ctx = OutputContext::new(format, merged.no_color, cli.quiet);

    match cli.command {
        Commands::Values { nodes } => {
            let client = create_opcua_client(&merged)?;
            commands::values(&client, &nodes, &ctx).await?;
        }

        Commands::Aggregated {
            start,
            end,
            interval_ms,
            aggregate,
            nodes,
        } => {
            let client = create_opcua_client(&merged)?;
            commands::aggregated(&client, start, end, interval_ms, &aggregate, &nodes, &ctx)
                .await?;
        }

        Commands::Raw {
            start,
            end,
            start_index,
            num_records,
            window_secs,
            nodes,
        } => {
            let client = create_opcua_client(&merged)?;
            let args = RawArgs {
                start_index,
                num_records,
                window_secs,
            };
            commands::raw(&client, start, end, &nodes, &args, &ctx).await?;
        }

        Commands::Namespaces => {
            let client = create_catalog_client(&merged).await?;
            commands::namespaces(&client, &ctx).await?;
        }

        Commands::ObjectTypes => {
            let client = create_catalog_client(&merged).await?;
            commands::object_types(&client, &ctx)?;
        }

        Commands::Objects { type_name } => {
            let client = create_catalog_client(&merged).await?;
            commands::objects(&client, &type_name, &ctx).await?;
        }

        Commands::Dwh { command } => {
            let section = merged.dwh()?;
            match command {
                DwhCommands::Version => commands::version(section, &ctx).await?,
                DwhCommands::Plants { provider } => {
                    commands::plants(section, provider, &ctx).await?
                }
            }
        }
    }

    Ok(())
}

/// Identity-provider session shared by the REST clients, if configured
fn create_auth(merged: &MergedConfig) -> Result<Option<Arc<dyn TokenProvider>>> {
    let Some(auth) = merged.auth.clone() else {
        return Ok(None);
    };
    let client = AuthClient::new(auth).context("Failed to create identity-provider client")?;
    Ok(Some(Arc::new(client)))
}

fn create_opcua_client(merged: &MergedConfig) -> Result<OpcUaClient> {
    let mut client = OpcUaClient::new(merged.opcua()?).context("Failed to create gateway client")?;
    if let Some(auth) = create_auth(merged)? {
        client = client.with_auth(auth);
    }
    Ok(client)
}

async fn create_catalog_client(merged: &MergedConfig) -> Result<ModelIndexClient> {
    ModelIndexClient::connect(&merged.catalog()?, create_auth(merged)?)
        .await
        .context("Failed to connect to the model index")
}
