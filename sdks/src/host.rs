// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Registration lifecycle of a running agent.
//!
//! [`AgentHost`] announces the agent, heartbeats on an interval, announces
//! again if the mesh has forgotten it (restart or eviction) and deregisters
//! when its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use a2a_mesh_core::domain::agent::{AgentDescriptor, AgentRegistration, HealthState};

use crate::agent::CapabilityHandler;
use crate::client::MeshClient;
use crate::error::SdkError;

pub struct AgentHost {
    client: MeshClient,
    registration: AgentRegistration,
    heartbeat_interval: Duration,
    handler: Option<Arc<dyn CapabilityHandler>>,
}

impl AgentHost {
    pub fn new(
        client: MeshClient,
        registration: AgentRegistration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            client,
            registration,
            heartbeat_interval,
            handler: None,
        }
    }

    /// Report the handler's own health in heartbeats instead of `healthy`.
    pub fn with_handler(mut self, handler: Arc<dyn CapabilityHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub async fn announce(&self) -> Result<AgentDescriptor, SdkError> {
        let descriptor = self.client.register(&self.registration).await?;
        info!(
            agent_id = %descriptor.id,
            capabilities = descriptor.capabilities.len(),
            "Announced to mesh"
        );
        Ok(descriptor)
    }

    async fn current_health(&self) -> HealthState {
        match &self.handler {
            Some(handler) => handler.health().await,
            None => HealthState::Healthy,
        }
    }

    async fn beat(&self) -> Result<(), SdkError> {
        let health = self.current_health().await;
        match self.client.heartbeat(&self.registration.id, health).await {
            Err(e) if e.is_not_found() => {
                warn!(agent_id = %self.registration.id, "Mesh no longer knows this agent, announcing again");
                self.announce().await.map(|_| ())
            }
            other => other,
        }
    }

    /// Runs the heartbeat loop until `token` is cancelled, then deregisters.
    /// Failed heartbeats are logged and retried on the next tick.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; the announcement covers it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.beat().await {
                            Ok(()) => debug!(agent_id = %self.registration.id, "Heartbeat sent"),
                            Err(e) => warn!(agent_id = %self.registration.id, error = %e, "Heartbeat failed"),
                        }
                    }
                }
            }

            match self.client.deregister(&self.registration.id).await {
                Ok(()) => info!(agent_id = %self.registration.id, "Deregistered from mesh"),
                Err(e) => warn!(agent_id = %self.registration.id, error = %e, "Deregistration failed"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a2a_mesh_core::domain::agent::AgentId;
    use mockito::Matcher;

    fn registration() -> AgentRegistration {
        AgentRegistration::new(
            AgentId::new("rec-1").unwrap(),
            "http://127.0.0.1:9100",
            ["recommend.products@v1"],
        )
    }

    const DESCRIPTOR: &str = r#"{
        "id": "rec-1",
        "name": "rec-1",
        "capabilities": ["recommend.products@v1"],
        "endpoint": "http://127.0.0.1:9100",
        "health": "unknown",
        "lastHeartbeat": "2026-01-01T00:00:00Z",
        "registeredAt": "2026-01-01T00:00:00Z"
    }"#;

    #[tokio::test]
    async fn test_forgotten_agent_announces_again() {
        let mut server = mockito::Server::new_async().await;
        let heartbeat = server
            .mock("POST", "/v1/agents/rec-1/heartbeat")
            .match_body(Matcher::PartialJsonString(r#"{"health":"healthy"}"#.to_string()))
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":"unknown_agent","message":"Agent not registered: rec-1"}}"#)
            .create_async()
            .await;
        let register = server
            .mock("POST", "/v1/agents")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(DESCRIPTOR)
            .expect(1)
            .create_async()
            .await;

        let host = AgentHost::new(
            MeshClient::new(server.url()),
            registration(),
            Duration::from_secs(5),
        );
        host.beat().await.unwrap();

        heartbeat.assert_async().await;
        register.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancel_deregisters() {
        let mut server = mockito::Server::new_async().await;
        let _heartbeat = server
            .mock("POST", "/v1/agents/rec-1/heartbeat")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(DESCRIPTOR)
            .create_async()
            .await;
        let deregister = server
            .mock("DELETE", "/v1/agents/rec-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(DESCRIPTOR)
            .expect(1)
            .create_async()
            .await;

        let token = CancellationToken::new();
        let handle = AgentHost::new(
            MeshClient::new(server.url()),
            registration(),
            Duration::from_millis(20),
        )
        .spawn(token.clone());

        tokio::time::sleep(Duration::from_millis(60)).await;
        token.cancel();
        handle.await.unwrap();

        deregister.assert_async().await;
    }
}
