// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use a2a_mesh_core::domain::agent::{AgentDescriptor, AgentId, AgentRegistration, HealthState};
use a2a_mesh_core::domain::capability::CapabilityName;
use a2a_mesh_core::domain::envelope::{CorrelationId, MessageEnvelope, ReplyEnvelope, ReplyOutcome};
use a2a_mesh_core::domain::workflow::{RunId, WorkflowRun};
use a2a_mesh_core::infrastructure::signing::{MessageSigner, Signable};

use crate::error::SdkError;

/// Client for the mesh daemon's HTTP API.
#[derive(Debug, Clone)]
pub struct MeshClient {
    base_url: String,
    client: Client,
    api_key: Option<String>,
    signer: Option<MessageSigner>,
    source_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAccepted {
    pub run_id: RunId,
    pub correlation_id: CorrelationId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationAccepted {
    agent_id: AgentId,
}

#[derive(Deserialize)]
struct BroadcastAccepted {
    delivered: usize,
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

async fn ensure_success(response: Response) -> Result<Response, SdkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(body) => (body.error.code, body.error.message),
        Err(_) => ("http_error".to_string(), text),
    };
    Err(SdkError::Mesh {
        status,
        code,
        message,
    })
}

impl MeshClient {
    /// Create a new mesh client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            api_key: None,
            signer: None,
            source_id: "a2a-mesh-sdk".to_string(),
        }
    }

    /// Set the API key sent as a bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Shared mesh key; envelopes and registrations are signed with it.
    pub fn with_signing_key(mut self, key: impl AsRef<[u8]>) -> Result<Self, SdkError> {
        self.signer = Some(MessageSigner::new(key)?);
        Ok(self)
    }

    /// Identity stamped into `sourceId` of envelopes this client originates.
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        req
    }

    fn signed<T: Signable>(&self, record: &T) -> Result<T, SdkError> {
        let mut record = record.clone();
        if let Some(signer) = &self.signer {
            signer.seal(&mut record)?;
        }
        Ok(record)
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Announce an agent to the registry.
    pub async fn register(
        &self,
        registration: &AgentRegistration,
    ) -> Result<AgentDescriptor, SdkError> {
        let response = self
            .request(reqwest::Method::POST, "/v1/agents")
            .json(&self.signed(registration)?)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    pub async fn heartbeat(&self, agent_id: &AgentId, health: HealthState) -> Result<(), SdkError> {
        #[derive(Serialize)]
        struct Heartbeat {
            health: HealthState,
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/v1/agents/{}/heartbeat", agent_id),
            )
            .json(&Heartbeat { health })
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    pub async fn deregister(&self, agent_id: &AgentId) -> Result<(), SdkError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/v1/agents/{}", agent_id))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    pub async fn resolve(&self, capability: &CapabilityName) -> Result<Vec<AgentDescriptor>, SdkError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/v1/capabilities/{}/agents", capability),
            )
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    // ========================================================================
    // Messaging
    // ========================================================================

    /// Routes `envelope` through the mesh and returns the agent's reply as is,
    /// including domain errors.
    pub async fn send(&self, envelope: &MessageEnvelope) -> Result<ReplyEnvelope, SdkError> {
        let response = self
            .request(reqwest::Method::POST, "/v1/messages")
            .json(&self.signed(envelope)?)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    /// Sends `payload` to whichever agent serves `capability` and returns the
    /// reply payload. Pass `correlation_id` to continue an existing
    /// conversation.
    pub async fn call(
        &self,
        capability: CapabilityName,
        payload: serde_json::Value,
        budget: Duration,
        correlation_id: Option<CorrelationId>,
    ) -> Result<serde_json::Value, SdkError> {
        let mut envelope = MessageEnvelope::new(self.source_id.clone(), capability, payload, budget);
        if let Some(correlation_id) = correlation_id {
            envelope = envelope.with_correlation(correlation_id);
        }
        match self.send(&envelope).await?.outcome {
            ReplyOutcome::Ok { payload } => Ok(payload),
            ReplyOutcome::Error { code, message } => Err(SdkError::Rejected { code, message }),
        }
    }

    /// Fire-and-forget delivery to one agent serving `capability`. Returns
    /// once the mesh has picked the agent; the agent's answer is discarded.
    pub async fn notify(
        &self,
        capability: CapabilityName,
        payload: serde_json::Value,
        budget: Duration,
    ) -> Result<AgentId, SdkError> {
        let envelope =
            MessageEnvelope::notification(self.source_id.clone(), capability, payload, budget);
        let accepted: NotificationAccepted =
            self.post_notification("/v1/notifications", &envelope).await?;
        Ok(accepted.agent_id)
    }

    /// Fire-and-forget delivery to every agent serving `capability`. Returns
    /// how many agents were sent a copy.
    pub async fn broadcast_notify(
        &self,
        capability: CapabilityName,
        payload: serde_json::Value,
        budget: Duration,
    ) -> Result<usize, SdkError> {
        let envelope =
            MessageEnvelope::notification(self.source_id.clone(), capability, payload, budget);
        let accepted: BroadcastAccepted = self
            .post_notification("/v1/notifications/broadcast", &envelope)
            .await?;
        Ok(accepted.delivered)
    }

    async fn post_notification<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        envelope: &MessageEnvelope,
    ) -> Result<T, SdkError> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(&self.signed(envelope)?)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    // ========================================================================
    // Workflows
    // ========================================================================

    pub async fn invoke_workflow(
        &self,
        name: &str,
        input: serde_json::Value,
        deadline: Option<Duration>,
    ) -> Result<RunAccepted, SdkError> {
        let mut body = serde_json::json!({ "input": input });
        if let Some(deadline) = deadline {
            body["deadline"] = humantime::format_duration(deadline).to_string().into();
        }
        let response = self
            .request(reqwest::Method::POST, &format!("/v1/workflows/{}/runs", name))
            .json(&body)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    pub async fn get_run(&self, run_id: RunId) -> Result<WorkflowRun, SdkError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/v1/runs/{}", run_id))
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    pub async fn cancel_run(&self, run_id: RunId) -> Result<(), SdkError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/v1/runs/{}/cancel", run_id))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    /// Polls the run every `poll_interval` until it is terminal or `timeout`
    /// elapses.
    pub async fn wait_for_run(
        &self,
        run_id: RunId,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<WorkflowRun, SdkError> {
        let started = tokio::time::Instant::now();
        loop {
            let run = self.get_run(run_id).await?;
            if run.status.is_terminal() {
                return Ok(run);
            }
            if started.elapsed() + poll_interval > timeout {
                return Err(SdkError::RunTimeout(run_id.to_string()));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Parses a run id printed by the mesh (e.g. from logs or the CLI).
pub fn parse_run_id(raw: &str) -> Option<RunId> {
    Uuid::parse_str(raw).ok().map(RunId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_returns_payload() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "messageId": "6f1c2a2e-8f7b-4a8e-9d55-3f1d1f0c8a01",
                    "correlationId": "0b6a3f5e-2c1d-4e8f-a9b7-5d4c3b2a1908",
                    "inReplyTo": "9e8d7c6b-5a49-4837-a261-5f4e3d2c1b0a",
                    "responderId": "rec-1",
                    "capability": "recommend.products@v1",
                    "outcome": {"status": "ok", "payload": {"recommendations": ["p-1"]}}
                }"#,
            )
            .create_async()
            .await;

        let client = MeshClient::new(server.url());
        let payload = client
            .call(
                CapabilityName::new("recommend.products@v1").unwrap(),
                json!({"userId": "u-1"}),
                Duration::from_secs(1),
                None,
            )
            .await
            .unwrap();
        assert_eq!(payload, json!({"recommendations": ["p-1"]}));
    }

    #[tokio::test]
    async fn test_mesh_error_is_decoded() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":"unroutable","message":"No healthy agent serves capability 'x.y@v1'"}}"#)
            .create_async()
            .await;

        let client = MeshClient::new(server.url());
        let err = client
            .call(
                CapabilityName::new("x.y@v1").unwrap(),
                json!({}),
                Duration::from_secs(1),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("unroutable"));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_signing_key_seals_outbound_envelopes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/notifications")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex(r#""signature":"[0-9a-f]{64}""#.to_string()),
                mockito::Matcher::PartialJson(json!({"kind": "notification"})),
            ]))
            .with_status(202)
            .with_header("content-type", "application/json")
            .with_body(r#"{"agentId":"mailer-1"}"#)
            .create_async()
            .await;

        let client = MeshClient::new(server.url())
            .with_signing_key("mesh-shared-secret")
            .unwrap();
        let agent_id = client
            .notify(
                CapabilityName::new("marketing.notify@v1").unwrap(),
                json!({"type": "price_drop"}),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(agent_id.as_str(), "mailer-1");
        mock.assert_async().await;

        assert!(matches!(
            MeshClient::new(server.url()).with_signing_key(""),
            Err(SdkError::Signing(_))
        ));
    }

    #[tokio::test]
    async fn test_broadcast_notify_reports_delivered_count() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/notifications/broadcast")
            .with_status(202)
            .with_header("content-type", "application/json")
            .with_body(r#"{"delivered":3}"#)
            .create_async()
            .await;

        let delivered = MeshClient::new(server.url())
            .broadcast_notify(
                CapabilityName::new("cache.invalidate@v1").unwrap(),
                json!({"keys": ["catalog"]}),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(delivered, 3);
    }

    #[test]
    fn test_parse_run_id() {
        assert!(parse_run_id("not-a-uuid").is_none());
        assert!(parse_run_id("0b6a3f5e-2c1d-4e8f-a9b7-5d4c3b2a1908").is_some());
    }
}
