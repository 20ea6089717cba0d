// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow command implementations
//!
//! # Commands
//!
//! - `a2a-mesh workflow validate <file>` - Parse and validate a workflow manifest locally
//! - `a2a-mesh workflow list` - List workflows registered with the daemon
//! - `a2a-mesh workflow run <name>` - Start a run, optionally following it to completion
//! - `a2a-mesh workflow status <run_id>` - Show a run and its steps
//! - `a2a-mesh workflow cancel <run_id>` - Cancel a running run

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use uuid::Uuid;

use a2a_mesh_core::domain::workflow::{RunStatus, StepPolicy, StepState, WorkflowRun};
use a2a_mesh_core::infrastructure::workflow_parser::WorkflowParser;

use crate::daemon::require_daemon;

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Validate a workflow manifest file
    Validate {
        /// Path to workflow manifest YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// List registered workflows
    List,

    /// Start a workflow run
    Run {
        /// Workflow name
        #[arg(value_name = "NAME")]
        name: String,

        /// Workflow input (JSON string)
        #[arg(long, short = 'i', value_name = "JSON")]
        input: Option<String>,

        /// Individual input fields (key=value); values are parsed as JSON when possible
        #[arg(long = "param", short = 'p', value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Run budget, e.g. 500ms or 10s (default: the workflow's own)
        #[arg(long, value_name = "DURATION")]
        deadline: Option<String>,

        /// Follow the run's events until it finishes
        #[arg(long, short = 'w')]
        wait: bool,
    },

    /// Show the state of a run
    Status {
        /// Run ID
        #[arg(value_name = "RUN_ID")]
        run_id: Uuid,
    },

    /// Cancel a running run
    Cancel {
        /// Run ID
        #[arg(value_name = "RUN_ID")]
        run_id: Uuid,
    },
}

pub async fn handle_command(command: WorkflowCommand, host: &str, port: u16) -> Result<()> {
    match command {
        WorkflowCommand::Validate { file } => validate_workflow(file),
        WorkflowCommand::List => list_workflows(host, port).await,
        WorkflowCommand::Run {
            name,
            input,
            params,
            deadline,
            wait,
        } => run_workflow(name, input, params, deadline, wait, host, port).await,
        WorkflowCommand::Status { run_id } => {
            let client = require_daemon(host, port).await?;
            let run = client.get_run(run_id).await?;
            print_run(&run);
            Ok(())
        }
        WorkflowCommand::Cancel { run_id } => {
            let client = require_daemon(host, port).await?;
            client.cancel_run(run_id).await?;
            println!("{}", format!("✓ Cancellation requested for run {}", run_id).green());
            Ok(())
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn validate_workflow(file: PathBuf) -> Result<()> {
    println!("{}", "Validating workflow manifest...".cyan());
    println!("   File: {}", file.display());
    println!();

    let workflow =
        WorkflowParser::parse_file(&file).context("Failed to parse workflow manifest")?;

    println!("{}", "✓ Workflow is valid!".green().bold());
    println!();
    println!("Workflow Details:");
    println!("  Name:        {}", workflow.name);
    if let Some(version) = &workflow.version {
        println!("  Version:     {}", version);
    }
    if let Some(description) = &workflow.description {
        println!("  Description: {}", description);
    }
    if let Some(deadline) = workflow.deadline {
        println!("  Deadline:    {}", humantime::format_duration(deadline));
    }
    println!("  Steps:       {}", workflow.steps.len());
    for step in &workflow.steps {
        let policy = match &step.policy {
            StepPolicy::Required => "required".to_string(),
            StepPolicy::Optional { fallback: Some(_) } => "optional, with fallback".to_string(),
            StepPolicy::Optional { fallback: None } => "optional".to_string(),
        };
        let deps: Vec<String> = step.depends_on.iter().map(|d| d.to_string()).collect();
        println!(
            "    - {} → {} ({}){}",
            step.id.to_string().bold(),
            step.capability,
            policy,
            if deps.is_empty() {
                String::new()
            } else {
                format!(" after [{}]", deps.join(", "))
            }
        );
    }

    Ok(())
}

async fn list_workflows(host: &str, port: u16) -> Result<()> {
    let client = require_daemon(host, port).await?;
    let workflows = client.list_workflows().await?;

    if workflows.is_empty() {
        println!("{}", "No workflows registered".yellow());
        return Ok(());
    }

    println!("{:<32} {:<10} {:<8} {}", "NAME", "VERSION", "STEPS", "DESCRIPTION");
    for workflow in workflows {
        println!(
            "{:<32} {:<10} {:<8} {}",
            workflow.name.bold(),
            workflow.version.as_deref().unwrap_or("-"),
            workflow.steps.len(),
            workflow.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Builds the run input from `--input` and any `--param` pairs layered on top.
pub fn build_input(input: Option<String>, params: Vec<String>) -> Result<serde_json::Value> {
    let mut value = match input {
        Some(raw) => serde_json::from_str(&raw).context("--input is not valid JSON")?,
        None => serde_json::json!({}),
    };

    if params.is_empty() {
        return Ok(value);
    }
    let map = value
        .as_object_mut()
        .context("--param requires --input to be a JSON object")?;
    for param in params {
        let (key, raw) = param
            .split_once('=')
            .with_context(|| format!("Invalid parameter '{}': expected KEY=VALUE", param))?;
        let parsed = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        map.insert(key.to_string(), parsed);
    }
    Ok(value)
}

async fn run_workflow(
    name: String,
    input: Option<String>,
    params: Vec<String>,
    deadline: Option<String>,
    wait: bool,
    host: &str,
    port: u16,
) -> Result<()> {
    let input = build_input(input, params)?;
    if let Some(deadline) = &deadline {
        humantime::parse_duration(deadline)
            .with_context(|| format!("Invalid --deadline '{}'", deadline))?;
    }

    let client = require_daemon(host, port).await?;
    let accepted = client.run_workflow(&name, input, deadline).await?;

    println!("{}", format!("✓ Run started: {}", accepted.run_id).green());
    println!("  Correlation: {}", accepted.correlation_id);

    if !wait {
        println!("Check progress with: a2a-mesh workflow status {}", accepted.run_id);
        return Ok(());
    }

    println!();
    client
        .stream_run_events(accepted.run_id, |event| {
            let data = &event.data;
            match event.name.as_str() {
                "step_dispatched" => println!(
                    "  {} {} → {}",
                    "▶".cyan(),
                    data["step"].as_str().unwrap_or("?"),
                    data["capability"].as_str().unwrap_or("?")
                ),
                "step_settled" => {
                    let state = data["state"].as_str().unwrap_or("?");
                    let line = format!("  ● {} {}", data["step"].as_str().unwrap_or("?"), state);
                    match data["error"].as_str() {
                        Some(error) => println!("{}: {}", line.red(), error),
                        None if state == "succeeded" => println!("{}", line.green()),
                        None => println!("{}", line.yellow()),
                    }
                }
                _ => {}
            }
        })
        .await?;

    println!();
    let run = client.get_run(accepted.run_id).await?;
    print_run(&run);
    Ok(())
}

fn print_run(run: &WorkflowRun) {
    println!("Run {} ({})", run.id.to_string().bold(), run.workflow);
    println!("  Status:      {}", status_label(run.status));
    println!("  Correlation: {}", run.correlation_id.0);
    println!("  Started:     {}", run.started_at.to_rfc3339());
    if let Some(finished) = run.finished_at {
        let elapsed = (finished - run.started_at).to_std().unwrap_or_default();
        println!(
            "  Finished:    {} ({})",
            finished.to_rfc3339(),
            humantime::format_duration(elapsed)
        );
    }
    if let Some(failure) = &run.failure {
        println!("  Failure:     {}", failure.to_string().red());
    }

    println!("  Steps:");
    for (id, record) in &run.steps {
        let state = format!("{:?}", record.state).to_lowercase();
        let state = match record.state {
            StepState::Succeeded => state.green(),
            StepState::FellBack | StepState::Skipped => state.yellow(),
            StepState::Failed | StepState::Blocked | StepState::Cancelled => state.red(),
            StepState::Pending | StepState::Running => state.dimmed(),
        };
        print!("    {:<20} {:<12}", id.to_string(), state);
        if let Some(responder) = &record.responder {
            print!(" by {}", responder);
        }
        if let Some(error) = &record.error {
            print!(" ({})", error);
        }
        println!();
    }

    if run.status.is_terminal() && !run.outputs.is_empty() {
        println!("  Outputs:");
        let outputs = serde_json::to_string_pretty(&run.outputs).unwrap_or_default();
        for line in outputs.lines() {
            println!("    {}", line);
        }
    }
}

fn status_label(status: RunStatus) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        RunStatus::Completed => label.green(),
        RunStatus::PartiallyFailed | RunStatus::Cancelled => label.yellow(),
        RunStatus::Failed => label.red(),
        RunStatus::Running => label.cyan(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_layer_over_input() {
        let input = build_input(
            Some(r#"{"userId": "u-1"}"#.to_string()),
            vec!["limit=3".to_string(), "userId=u-2".to_string(), "note=hello".to_string()],
        )
        .unwrap();
        assert_eq!(input, json!({"userId": "u-2", "limit": 3, "note": "hello"}));
    }

    #[test]
    fn test_params_need_an_object() {
        assert!(build_input(Some("[1, 2]".to_string()), vec!["a=1".to_string()]).is_err());
        assert!(build_input(None, vec!["missing-equals".to_string()]).is_err());
    }
}
