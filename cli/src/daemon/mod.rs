// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - Foreground HTTP server (`a2a-mesh serve`)
//! - HTTP health checks used by the operator commands
//! - Graceful shutdown

use anyhow::Result;
use std::time::Duration;

pub mod client;
pub mod server;

pub use client::DaemonClient;
pub use server::start_daemon;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub enum DaemonStatus {
    Running { uptime: Option<u64>, agents: Option<u64> },
    Stopped,
    Unhealthy { error: String },
}

pub fn base_url(host: &str, port: u16) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host.trim_end_matches('/'), port)
    } else {
        format!("http://{}:{}", host, port)
    }
}

/// Check if the daemon answers its health endpoint.
pub async fn check_daemon_running(host: &str, port: u16) -> Result<DaemonStatus> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(500))
        .build()?;

    let health_url = format!("{}/health", base_url(host, port));

    match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let body = resp.json::<serde_json::Value>().await.ok();
            let uptime = body.as_ref().and_then(|v| v["uptimeSeconds"].as_u64());
            let agents = body.as_ref().and_then(|v| v["agents"].as_u64());
            Ok(DaemonStatus::Running { uptime, agents })
        }
        Ok(resp) => Ok(DaemonStatus::Unhealthy {
            error: format!("HTTP {}", resp.status()),
        }),
        Err(e) if e.is_connect() || e.is_timeout() => Ok(DaemonStatus::Stopped),
        Err(e) => Ok(DaemonStatus::Unhealthy {
            error: e.to_string(),
        }),
    }
}

/// Fails with an operator-friendly message unless the daemon is healthy.
pub async fn require_daemon(host: &str, port: u16) -> Result<DaemonClient> {
    match check_daemon_running(host, port).await? {
        DaemonStatus::Running { .. } => DaemonClient::new(host, port),
        DaemonStatus::Unhealthy { error } => {
            anyhow::bail!(
                "Daemon at {} is running but unhealthy: {}",
                base_url(host, port),
                error
            )
        }
        DaemonStatus::Stopped => {
            anyhow::bail!(
                "No daemon reachable at {}. Start one with 'a2a-mesh serve'.",
                base_url(host, port)
            )
        }
    }
}
