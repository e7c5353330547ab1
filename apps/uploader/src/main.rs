//! Lead document uploader entry point.

mod commands;
mod config;
mod probe;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use leaddocs_api_client::ApiClient;
use tracing_subscriber::EnvFilter;

use crate::config::{TOKEN_ENV, UploaderConfig};
use crate::probe::TcpProbe;

/// Upload and inspect documents attached to leads.
#[derive(Parser, Debug)]
#[command(name = "leaddocs-uploader", version, about)]
struct Cli {
    /// Configuration file (defaults to ~/.config/leaddocs/uploader.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API token; overrides the configuration file.
    #[arg(long, env = TOKEN_ENV, global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload files to a lead.
    Upload {
        /// Lead identifier.
        #[arg(long)]
        lead: String,
        /// Files to upload, in order.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List documents attached to a lead.
    List {
        #[arg(long)]
        lead: String,
    },
    /// Print a signed read URL for a document.
    View {
        #[arg(long)]
        doc: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting uploader");

    let config = UploaderConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?
        .with_token_override(cli.token);
    if config.api_token.is_empty() {
        anyhow::bail!("no API token configured; set api_token or {TOKEN_ENV}");
    }

    let client = Arc::new(
        ApiClient::new(&config.api_base_url, &config.api_token)
            .context("failed to create API client")?,
    );

    let online = match client.endpoint() {
        Some((host, port)) => TcpProbe::new(host, port).probe().await,
        None => false,
    };
    tracing::info!(api = %client.base_url(), online, "configuration loaded");

    match cli.command {
        Command::Upload { lead, files } => {
            let complete = commands::upload(client, &config, online, &lead, &files).await?;
            Ok(if complete {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::List { lead } => {
            commands::list(&client, &lead).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::View { doc } => {
            commands::view(client, &config, online, &doc).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
