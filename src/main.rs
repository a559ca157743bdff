//! Docpatch - marker-based document editing service
//!
//! Serves a sandboxed document tree over HTTP and applies AI-generated
//! edit plans that elide unchanged text with a marker.

mod app;
mod core;
mod error;
mod patch;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::DocpatchApp;
use crate::core::config::AppConfig;
use crate::core::path::DocPath;
use crate::patch::cancel::EditToken;
use crate::patch::orchestrator::EditOptions;

#[derive(Debug, Parser)]
#[command(name = "docpatch", version, about = "Marker-based document editing service")]
struct Cli {
    /// Config file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Document root, overriding the config file
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Listen address, overriding the config file
    #[arg(long, global = true)]
    bind: Option<String>,

    /// trace, debug, info, warn or error
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing_subscriber::filter::LevelFilter,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve documents and the edit API (default)
    Serve,
    /// Apply one change request to a document and exit
    Edit {
        /// Document path relative to the root
        path: String,
        /// Natural-language change request
        request: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        system_prompt: Option<String>,
    },
    /// Expand the elision markers of a plan against an original and print the result
    Materialize {
        #[arg(long)]
        plan: PathBuf,
        #[arg(long)]
        original: PathBuf,
    },
    /// Write the effective configuration to the config file
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(cli.log_level)
        .init();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.workspace.root = root;
    }
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let base = std::env::current_dir()?;
            config.resolve_root(&base);
            tracing::info!("Starting Docpatch with root {}", config.workspace.root.display());

            let listener = tokio::net::TcpListener::bind(&config.server.bind)
                .await
                .with_context(|| format!("Failed to bind {}", config.server.bind))?;
            let app = Arc::new(DocpatchApp::from_config(config)?);
            server::serve(listener, app).await
        }
        Command::Edit {
            path,
            request,
            model,
            system_prompt,
        } => {
            let base = std::env::current_dir()?;
            config.resolve_root(&base);
            let app = DocpatchApp::from_config(config)?;
            let path = DocPath::parse(&path)?;
            let options = EditOptions {
                model,
                system_prompt,
                ..Default::default()
            };

            let outcome = app
                .orchestrator
                .request_edit(&path, &request, &options, &EditToken::new())
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Command::Materialize { plan, original } => {
            let plan = std::fs::read_to_string(&plan)
                .with_context(|| format!("Failed to read plan {}", plan.display()))?;
            let original = std::fs::read_to_string(&original)
                .with_context(|| format!("Failed to read original {}", original.display()))?;
            print!("{}", patch::marker::materialize(&plan, &original));
            Ok(())
        }
        Command::InitConfig => {
            let path = config.save(cli.config.as_deref())?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}
