// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use a2a_mesh_core::domain::mesh_config::MeshConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (file + environment overrides)
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file holding every default
    Generate {
        /// Output path (default: ./a2a-mesh.yaml)
        #[arg(short, long, default_value = "./a2a-mesh.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, force } => generate(output, force),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = MeshConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. A2A_CONFIG_PATH: {}",
            std::env::var("A2A_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./a2a-mesh.yaml");
        println!("  4. /etc/a2a-mesh/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Effective configuration:".bold());
    println!();

    println!("{}", "Network:".bold());
    println!("  Listen: {}:{}", spec.network.bind_address, spec.network.port);
    println!();

    println!("{}", "Registry:".bold());
    println!("  Heartbeat grace: {}", humantime::format_duration(spec.registry.heartbeat_grace));
    println!("  Eviction after:  {}", humantime::format_duration(spec.registry.eviction_after));
    println!("  Sweep interval:  {}", humantime::format_duration(spec.registry.sweep_interval));
    match spec.registry.health_probe_interval {
        Some(interval) => println!("  Health probing:  every {}", humantime::format_duration(interval)),
        None => println!("  Health probing:  {}", "off".dimmed()),
    }
    println!();

    println!("{}", "Circuit breaker:".bold());
    println!("  Failure threshold: {}", spec.circuit_breaker.failure_threshold);
    println!(
        "  Cooldown:          {} (max {})",
        humantime::format_duration(spec.circuit_breaker.cooldown),
        humantime::format_duration(spec.circuit_breaker.max_cooldown)
    );
    println!();

    println!("{}", "Router:".bold());
    println!("  Default deadline: {}", humantime::format_duration(spec.router.default_deadline));
    for (capability, deadline) in &spec.router.capability_deadlines {
        println!("    {} → {}", capability, humantime::format_duration(**deadline));
    }
    println!();

    println!("{}", "Gateway:".bold());
    println!(
        "  Cache: {} entries, TTL static {} / volatile {} / realtime {}",
        spec.gateway.cache.capacity,
        humantime::format_duration(spec.gateway.cache.ttl_static),
        humantime::format_duration(spec.gateway.cache.ttl_volatile),
        humantime::format_duration(spec.gateway.cache.ttl_realtime)
    );
    println!(
        "  Rate limit: {} requests per {}",
        spec.gateway.rate_limit.requests,
        humantime::format_duration(spec.gateway.rate_limit.window)
    );
    println!();

    println!("{}", "Orchestrator:".bold());
    match &spec.orchestrator.workflow_dir {
        Some(dir) => println!("  Workflow dir:     {}", dir.display()),
        None => println!("  Workflow dir:     {}", "(built-in only)".dimmed()),
    }
    println!(
        "  Default deadline: {}",
        humantime::format_duration(spec.orchestrator.default_deadline)
    );
    println!("  Run retention:    {}", spec.orchestrator.run_retention);
    println!();

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = MeshConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    MeshConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a2a-mesh.yaml");

        generate(path.clone(), false).unwrap();
        let config = MeshConfigManifest::from_yaml_file(&path).unwrap();
        assert!(config.validate().is_ok());

        // refuses to clobber without --force
        assert!(generate(path.clone(), false).is_err());
        assert!(generate(path, true).is_ok());
    }
}
