use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prometheus::{Encoder, Registry, TextEncoder};
use swtk::{init_logging, run_probe, HarnessConfig, TestSession};
use tracing::{error, info};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("SWTK_GIT_HASH"),
    ", built ",
    env!("SWTK_BUILD_DATE"),
    ")"
);

#[derive(Parser)]
#[command(name = "swtk", version = VERSION, about = "Service worker test kit")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (overrides the configured one)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a service worker, wait for activation and reload under its control
    Probe {
        /// Fixture server root
        #[arg(long)]
        root_url: Option<String>,

        /// Page to open, relative to the root
        #[arg(long)]
        page: Option<String>,

        /// Worker script URL, relative to the page
        #[arg(long)]
        script: String,

        /// Registration scope
        #[arg(long)]
        scope: Option<String>,

        /// Print adapter metrics to stderr afterwards
        #[arg(long)]
        metrics: bool,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = HarnessConfig::load(cli.config.as_deref())?;
    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    init_logging(&level, cli.debug, cli.json_logs)?;

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
        Commands::Probe {
            root_url,
            page,
            script,
            scope,
            metrics,
        } => {
            if let Some(root_url) = root_url {
                config.root_url = root_url;
            }
            let registry = Registry::new();
            cdp_adapter::metrics::register_metrics(&registry);

            info!(root_url = %config.root_url, %script, "starting probe");
            let session = TestSession::launch(&config).await?;
            let outcome = session
                .run(|client| async move {
                    run_probe(client, page.as_deref(), &script, scope.as_deref()).await
                })
                .await;

            if metrics {
                let mut buffer = Vec::new();
                TextEncoder::new()
                    .encode(&registry.gather(), &mut buffer)
                    .context("encoding metrics")?;
                eprint!("{}", String::from_utf8_lossy(&buffer));
            }

            match outcome {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(())
                }
                Err(err) => {
                    error!(error = %format!("{err:#}"), "probe failed");
                    Err(err)
                }
            }
        }
    }
}
