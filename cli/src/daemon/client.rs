// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for communicating with daemon API

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use uuid::Uuid;

use a2a_mesh_core::domain::agent::AgentDescriptor;
use a2a_mesh_core::domain::workflow::WorkflowRun;
use a2a_mesh_core::application::registry::CapabilitySummary;

use super::base_url;

#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAccepted {
    pub run_id: Uuid,
    pub correlation_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct StreamedEvent {
    pub name: String,
    pub data: serde_json::Value,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Turns a non-2xx response into an error carrying the daemon's code.
async fn ensure_success(response: Response, action: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(body) => anyhow::bail!(
            "Failed to {}: [{}] {} (HTTP {})",
            action,
            body.error.code,
            body.error.message,
            status
        ),
        Err(_) => anyhow::bail!("Failed to {}: HTTP {} {}", action, status, text),
    }
}

impl DaemonClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let client = Client::builder()
            // No global timeout: run event streams are long-lived
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url(host, port),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ========================================================================
    // Agents
    // ========================================================================

    pub async fn list_agents(&self) -> Result<Vec<AgentDescriptor>> {
        let response = self
            .client
            .get(format!("{}/v1/agents", self.base_url))
            .send()
            .await
            .context("Failed to list agents")?;

        ensure_success(response, "list agents")
            .await?
            .json()
            .await
            .context("Failed to parse agents response")
    }

    pub async fn resolve(&self, capability: &str) -> Result<Vec<AgentDescriptor>> {
        let response = self
            .client
            .get(format!(
                "{}/v1/capabilities/{}/agents",
                self.base_url, capability
            ))
            .send()
            .await
            .context("Failed to resolve capability")?;

        ensure_success(response, "resolve capability")
            .await?
            .json()
            .await
            .context("Failed to parse resolve response")
    }

    pub async fn list_capabilities(&self) -> Result<Vec<CapabilitySummary>> {
        let response = self
            .client
            .get(format!("{}/v1/capabilities", self.base_url))
            .send()
            .await
            .context("Failed to list capabilities")?;

        ensure_success(response, "list capabilities")
            .await?
            .json()
            .await
            .context("Failed to parse capabilities response")
    }

    pub async fn remove_agent(&self, agent_id: &str) -> Result<AgentDescriptor> {
        let response = self
            .client
            .delete(format!("{}/v1/agents/{}", self.base_url, agent_id))
            .send()
            .await
            .context("Failed to remove agent")?;

        ensure_success(response, "remove agent")
            .await?
            .json()
            .await
            .context("Failed to parse remove response")
    }

    // ========================================================================
    // Workflows
    // ========================================================================

    pub async fn list_workflows(&self) -> Result<Vec<WorkflowInfo>> {
        let response = self
            .client
            .get(format!("{}/v1/workflows", self.base_url))
            .send()
            .await
            .context("Failed to list workflows")?;

        ensure_success(response, "list workflows")
            .await?
            .json()
            .await
            .context("Failed to parse workflows response")
    }

    pub async fn run_workflow(
        &self,
        name: &str,
        input: serde_json::Value,
        deadline: Option<String>,
    ) -> Result<RunAccepted> {
        #[derive(Serialize)]
        struct InvokeRequest {
            input: serde_json::Value,
            #[serde(skip_serializing_if = "Option::is_none")]
            deadline: Option<String>,
        }

        let response = self
            .client
            .post(format!("{}/v1/workflows/{}/runs", self.base_url, name))
            .json(&InvokeRequest { input, deadline })
            .send()
            .await
            .context("Failed to start workflow run")?;

        ensure_success(response, "start workflow run")
            .await?
            .json()
            .await
            .context("Failed to parse run response")
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<WorkflowRun> {
        let response = self
            .client
            .get(format!("{}/v1/runs/{}", self.base_url, run_id))
            .send()
            .await
            .context("Failed to get run")?;

        ensure_success(response, "get run")
            .await?
            .json()
            .await
            .context("Failed to parse run")
    }

    pub async fn cancel_run(&self, run_id: Uuid) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/v1/runs/{}/cancel", self.base_url, run_id))
            .send()
            .await
            .context("Failed to cancel run")?;

        ensure_success(response, "cancel run").await?;
        Ok(())
    }

    /// Follows the run's event stream, calling `on_event` for each server-sent
    /// event, until the daemon closes it after the run finishes.
    pub async fn stream_run_events(
        &self,
        run_id: Uuid,
        mut on_event: impl FnMut(StreamedEvent),
    ) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/v1/runs/{}/events", self.base_url, run_id))
            .send()
            .await
            .context("Failed to connect to run event stream")?;

        let response = ensure_success(response, "stream run events").await?;
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed to read event stream chunk")?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Events are separated by a blank line.
            while let Some(end) = buffer.find("\n\n") {
                let raw: String = buffer.drain(..end + 2).collect();
                if let Some(event) = parse_sse_event(&raw) {
                    on_event(event);
                }
            }
        }

        Ok(())
    }
}

fn parse_sse_event(raw: &str) -> Option<StreamedEvent> {
    let mut name = String::from("message");
    let mut data = String::new();
    for line in raw.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            name = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push_str(value.trim_start());
        }
    }
    if data.is_empty() {
        return None;
    }
    let data = serde_json::from_str(&data).ok()?;
    Some(StreamedEvent { name, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_event() {
        let event = parse_sse_event("event: step_settled\ndata: {\"step\":\"recommend\"}\n\n").unwrap();
        assert_eq!(event.name, "step_settled");
        assert_eq!(event.data["step"], "recommend");

        // keep-alive comments carry no data
        assert!(parse_sse_event(":\n\n").is_none());
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/v1/agents/ghost")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":"unknown_agent","message":"Agent 'ghost' is not registered"}}"#)
            .create_async()
            .await;

        let url = server.url();
        let (host, port) = url.rsplit_once(':').unwrap();
        let client = DaemonClient::new(host, port.parse().unwrap()).unwrap();
        let err = client.remove_agent("ghost").await.unwrap_err();
        assert!(err.to_string().contains("unknown_agent"));
    }
}
