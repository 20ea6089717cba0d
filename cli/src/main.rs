// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # a2a-mesh
//!
//! The `a2a-mesh` binary runs the mesh daemon and operates it.
//!
//! ## Commands
//!
//! - `a2a-mesh serve` - Run the daemon in the foreground (SIGINT/SIGTERM stop it gracefully)
//! - `a2a-mesh agent list|capabilities|resolve|remove` - Inspect the registry
//! - `a2a-mesh workflow validate|list|run|status|cancel` - Workflow operations
//! - `a2a-mesh config show|validate|generate` - Configuration management
//!
//! Operator commands talk to a running daemon over its HTTP API.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use a2a_mesh::commands::{self, AgentCommand, ConfigCommand, WorkflowCommand};
use a2a_mesh::daemon::{self, DEFAULT_HOST, DEFAULT_PORT};
use a2a_mesh_core::domain::mesh_config::MeshConfigManifest;

/// a2a-mesh - capability-routed agent fabric
#[derive(Parser)]
#[command(name = "a2a-mesh")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "A2A_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// HTTP API port (default: from config, else 8080)
    #[arg(long, global = true, env = "A2A_PORT")]
    port: Option<u16>,

    /// HTTP API host; the bind address for `serve`, the daemon address otherwise
    #[arg(long, global = true, env = "A2A_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (compact, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the mesh daemon in the foreground
    #[command(name = "serve")]
    Serve,

    /// Agent and capability inspection
    #[command(name = "agent")]
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Workflow management
    #[command(name = "workflow")]
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is the normal case
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let loaded = MeshConfigManifest::load_or_default(cli.config.clone());
    let observability = loaded
        .as_ref()
        .map(|config| config.spec.observability.clone())
        .unwrap_or_default();
    let level = cli.log_level.clone().unwrap_or(observability.log_level);
    let format = cli.log_format.clone().unwrap_or(observability.log_format);
    init_logging(&level, &format)?;

    let host = cli.host.clone();
    let client_port = cli
        .port
        .or_else(|| loaded.as_ref().ok().map(|config| config.spec.network.port))
        .unwrap_or(DEFAULT_PORT);
    let client_host = host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string());

    match cli.command {
        Some(Commands::Serve) => {
            let config = loaded.context("Failed to load configuration")?;
            daemon::start_daemon(config, host, cli.port).await
        }
        Some(Commands::Agent { command }) => {
            commands::agent::handle_command(command, &client_host, client_port).await
        }
        Some(Commands::Workflow { command }) => {
            commands::workflow::handle_command(command, &client_host, client_port).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        "json" => builder.json().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}
