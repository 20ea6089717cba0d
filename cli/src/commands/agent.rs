// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent and capability inspection commands
//!
//! Commands: list, capabilities, resolve, remove

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use a2a_mesh_core::domain::agent::{AgentDescriptor, HealthState};

use crate::daemon::require_daemon;

#[derive(Subcommand)]
pub enum AgentCommand {
    /// List registered agents
    List,

    /// List announced capabilities and how many agents can serve each
    Capabilities,

    /// Show the agents a capability currently routes to, in routing order
    Resolve {
        /// Versioned capability name, e.g. recommend.products@v1
        #[arg(value_name = "CAPABILITY")]
        capability: String,
    },

    /// Deregister an agent
    Remove {
        /// Agent ID
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,
    },
}

pub async fn handle_command(command: AgentCommand, host: &str, port: u16) -> Result<()> {
    let client = require_daemon(host, port).await?;

    match command {
        AgentCommand::List => {
            let agents = client.list_agents().await?;
            if agents.is_empty() {
                println!("{}", "No agents registered".yellow());
                return Ok(());
            }
            println!("{} agents registered:", agents.len());
            print_agents(&agents);
        }
        AgentCommand::Capabilities => {
            let capabilities = client.list_capabilities().await?;
            if capabilities.is_empty() {
                println!("{}", "No capabilities announced".yellow());
                return Ok(());
            }
            println!("{:<40} {:<10} {}", "CAPABILITY", "ROUTABLE", "AGENTS");
            for capability in capabilities {
                let routable = format!("{}/{}", capability.routable, capability.agents.len());
                let routable = if capability.routable == 0 {
                    routable.red()
                } else {
                    routable.green()
                };
                let agents: Vec<String> = capability.agents.iter().map(|a| a.to_string()).collect();
                println!(
                    "{:<40} {:<10} {}",
                    capability.name.to_string().bold(),
                    routable,
                    agents.join(", ")
                );
            }
        }
        AgentCommand::Resolve { capability } => {
            let agents = client.resolve(&capability).await?;
            if agents.is_empty() {
                println!(
                    "{}",
                    format!("✗ No routable agent serves {}", capability).red()
                );
                return Ok(());
            }
            print_agents(&agents);
        }
        AgentCommand::Remove { agent_id } => {
            let removed = client.remove_agent(&agent_id).await?;
            println!("{}", format!("✓ Agent {} removed", removed.id).green());
        }
    }

    Ok(())
}

fn print_agents(agents: &[AgentDescriptor]) {
    println!(
        "{:<24} {:<12} {:<36} {}",
        "ID", "HEALTH", "ENDPOINT", "CAPABILITIES"
    );
    for agent in agents {
        let capabilities: Vec<String> = agent.capabilities.iter().map(|c| c.to_string()).collect();
        println!(
            "{:<24} {:<12} {:<36} {}",
            agent.id.to_string().bold(),
            health_label(agent.health),
            agent.endpoint,
            capabilities.join(", ")
        );
    }
}

fn health_label(health: HealthState) -> colored::ColoredString {
    let label = health.to_string();
    match health {
        HealthState::Healthy => label.green(),
        HealthState::Degraded => label.yellow(),
        HealthState::Unreachable => label.red(),
        HealthState::Unknown => label.dimmed(),
    }
}
