// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Active Health Prober
//
// Optional companion to agent-driven heartbeats. Polls `GET {endpoint}/health`
// for every registered agent and turns the answer into a heartbeat:
//
// - 2xx with `{"status": "degraded"}`  -> heartbeat(degraded)
// - any other 2xx                      -> heartbeat(healthy)
// - error, non-2xx or no answer        -> nothing; the grace window demotes
//
// Disabled unless `spec.registry.health_probe_interval` is set.

use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::registry::AgentRegistry;
use crate::domain::agent::{AgentDescriptor, HealthState};

pub const HEALTH_PATH: &str = "/health";

#[derive(Deserialize)]
struct HealthBody {
    #[serde(default)]
    status: Option<String>,
}

pub struct HealthProber {
    client: reqwest::Client,
    registry: Arc<AgentRegistry>,
    timeout: Duration,
}

impl HealthProber {
    pub fn new(registry: Arc<AgentRegistry>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            registry,
            timeout,
        }
    }

    /// Probes one agent. `None` means no usable answer.
    pub async fn probe(&self, agent: &AgentDescriptor) -> Option<HealthState> {
        let url = format!("{}{}", agent.endpoint.trim_end_matches('/'), HEALTH_PATH);
        let response = match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(agent_id = %agent.id, error = %e, "Health probe failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(agent_id = %agent.id, status = %response.status(), "Health probe returned error status");
            return None;
        }

        let body: Option<HealthBody> = response.json().await.ok();
        match body.and_then(|b| b.status).as_deref() {
            Some("degraded") => Some(HealthState::Degraded),
            _ => Some(HealthState::Healthy),
        }
    }

    /// Probes every registered agent concurrently and records the answers.
    /// Returns how many agents answered.
    pub async fn probe_all(&self) -> usize {
        let agents = self.registry.list();
        let results = join_all(agents.iter().map(|agent| self.probe(agent))).await;

        let mut answered = 0;
        for (agent, health) in agents.iter().zip(results) {
            let Some(health) = health else { continue };
            answered += 1;
            if let Err(e) = self.registry.heartbeat(&agent.id, health) {
                // Deregistered while the probe was in flight
                debug!(agent_id = %agent.id, error = %e, "Dropping probe result");
            }
        }
        metrics::counter!("a2a_health_probes_total").increment(agents.len() as u64);
        answered
    }

    pub fn spawn(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let answered = self.probe_all().await;
                        let total = self.registry.list().len();
                        if answered < total {
                            warn!(answered, total, "Some agents did not answer health probes");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::RegistrySettings;
    use crate::domain::agent::{AgentId, AgentRegistration};
    use crate::infrastructure::event_bus::EventBus;

    fn registry() -> Arc<AgentRegistry> {
        Arc::new(AgentRegistry::new(RegistrySettings::default(), EventBus::new(16)))
    }

    #[tokio::test]
    async fn test_probe_maps_health_body() {
        let mut healthy = mockito::Server::new_async().await;
        healthy
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status":"healthy"}"#)
            .create_async()
            .await;
        let mut degraded = mockito::Server::new_async().await;
        degraded
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status":"degraded"}"#)
            .create_async()
            .await;

        let registry = registry();
        registry
            .register(AgentRegistration::new(AgentId::new("a").unwrap(), healthy.url(), ["x.y@v1"]))
            .unwrap();
        registry
            .register(AgentRegistration::new(AgentId::new("b").unwrap(), degraded.url(), ["x.y@v1"]))
            .unwrap();
        registry
            .register(AgentRegistration::new(
                AgentId::new("c").unwrap(),
                "http://127.0.0.1:1",
                ["x.y@v1"],
            ))
            .unwrap();

        let prober = HealthProber::new(Arc::clone(&registry), Duration::from_millis(500));
        assert_eq!(prober.probe_all().await, 2);

        let health = |id: &str| registry.get(&AgentId::new(id).unwrap()).unwrap().health;
        assert_eq!(health("a"), HealthState::Healthy);
        assert_eq!(health("b"), HealthState::Degraded);
        assert_eq!(health("c"), HealthState::Unknown);
    }
}
