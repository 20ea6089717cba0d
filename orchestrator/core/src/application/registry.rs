// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Registry
//!
//! Maps capability names to the agents that can currently serve them.
//!
//! Agents announce themselves ([`AgentRegistry::register`]), keep themselves
//! alive with heartbeats, and are demoted then evicted by the sweeper when
//! they fall silent:
//!
//! ```text
//! register ──▶ unknown ──heartbeat──▶ healthy / degraded
//!                 │                        │
//!                 └──── silent > grace ────┴──▶ unreachable ── silent > eviction ──▶ (removed)
//! ```
//!
//! Lookups never block on the network. State is sharded in `DashMap`s, one
//! entry per agent and one per capability, so there is no registry-wide lock
//! on the routing path.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::agent::{AgentDescriptor, AgentId, AgentRegistration, HealthState};
use crate::domain::capability::{CapabilityContract, CapabilityName};
use crate::domain::envelope::chrono_duration;
use crate::domain::events::RegistryEvent;
use crate::domain::mesh_config::RegistryConfig;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    #[error("Invalid capability name '{name}': {reason}")]
    InvalidCapability { name: String, reason: String },

    #[error("Agent must announce at least one capability")]
    NoCapabilities,

    #[error("Invalid endpoint '{0}': expected an http:// or https:// URL")]
    InvalidEndpoint(String),

    #[error("Agent '{0}' changed its capability set without restarting (new instance id required)")]
    CapabilitySetChanged(AgentId),

    #[error("Agent '{0}' is not registered")]
    UnknownAgent(AgentId),
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub heartbeat_grace: Duration,
    pub eviction_after: Duration,
    pub sweep_interval: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from(&RegistryConfig::default())
    }
}

impl From<&RegistryConfig> for RegistrySettings {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            heartbeat_grace: config.heartbeat_grace,
            eviction_after: config.eviction_after,
            sweep_interval: config.sweep_interval,
        }
    }
}

struct CapabilityEntry {
    agents: BTreeSet<AgentId>,
    /// Rotates the starting candidate on each resolve.
    cursor: AtomicUsize,
    contract: Option<CapabilityContract>,
}

impl CapabilityEntry {
    fn new() -> Self {
        Self {
            agents: BTreeSet::new(),
            cursor: AtomicUsize::new(0),
            contract: None,
        }
    }
}

/// Discovery view of one capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySummary {
    pub name: CapabilityName,
    pub agents: Vec<AgentId>,
    pub routable: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<CapabilityContract>,
}

/// What one sweep changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub demoted: Vec<AgentId>,
    pub evicted: Vec<AgentId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.demoted.is_empty() && self.evicted.is_empty()
    }
}

pub struct AgentRegistry {
    agents: DashMap<AgentId, AgentDescriptor>,
    index: DashMap<CapabilityName, CapabilityEntry>,
    settings: RegistrySettings,
    event_bus: EventBus,
}

impl AgentRegistry {
    pub fn new(settings: RegistrySettings, event_bus: EventBus) -> Self {
        Self {
            agents: DashMap::new(),
            index: DashMap::new(),
            settings,
            event_bus,
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Registers or refreshes an agent.
    ///
    /// Re-announcing the same capability set is an idempotent refresh. A
    /// different set is only accepted together with a new `instance_id`.
    pub fn register(
        &self,
        registration: AgentRegistration,
    ) -> Result<AgentDescriptor, RegistryError> {
        self.register_at(registration, Utc::now())
    }

    pub fn register_at(
        &self,
        registration: AgentRegistration,
        now: DateTime<Utc>,
    ) -> Result<AgentDescriptor, RegistryError> {
        let capabilities = registration
            .capabilities
            .iter()
            .map(|raw| {
                CapabilityName::new(raw.as_str()).map_err(|e| RegistryError::InvalidCapability {
                    name: raw.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<BTreeSet<_>, _>>()?;
        if capabilities.is_empty() {
            return Err(RegistryError::NoCapabilities);
        }
        if !(registration.endpoint.starts_with("http://")
            || registration.endpoint.starts_with("https://"))
        {
            return Err(RegistryError::InvalidEndpoint(registration.endpoint));
        }

        let contracts: Vec<CapabilityContract> = registration
            .contracts
            .iter()
            .filter(|c| capabilities.contains(&c.name))
            .cloned()
            .collect();
        let agent_id = registration.id.clone();
        let mut descriptor = AgentDescriptor::from_registration(registration, capabilities, now);

        let previous = match self.agents.entry(agent_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get();
                let restarted = descriptor.instance_id.is_some()
                    && descriptor.instance_id != existing.instance_id;
                if existing.capabilities != descriptor.capabilities && !restarted {
                    return Err(RegistryError::CapabilitySetChanged(agent_id));
                }
                if !restarted {
                    descriptor.registered_at = existing.registered_at;
                }
                Some(occupied.insert(descriptor.clone()))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(descriptor.clone());
                None
            }
        };

        if let Some(previous) = &previous {
            let dropped: Vec<&CapabilityName> = previous
                .capabilities
                .difference(&descriptor.capabilities)
                .collect();
            self.unindex(&agent_id, dropped);
        }
        for capability in &descriptor.capabilities {
            let mut entry = self
                .index
                .entry(capability.clone())
                .or_insert_with(CapabilityEntry::new);
            entry.agents.insert(agent_id.clone());
            if let Some(contract) = contracts.iter().find(|c| &c.name == capability) {
                entry.contract = Some(contract.clone());
            }
        }

        if previous.is_none() {
            info!(
                agent_id = %agent_id,
                endpoint = %descriptor.endpoint,
                capabilities = descriptor.capabilities.len(),
                "Agent registered"
            );
        } else {
            debug!(agent_id = %agent_id, "Agent re-announced");
        }
        metrics::gauge!("a2a_registry_agents").set(self.agents.len() as f64);
        self.event_bus
            .publish_registry_event(RegistryEvent::AgentRegistered {
                agent_id,
                capabilities: descriptor.capabilities.iter().cloned().collect(),
                registered_at: now,
            });
        Ok(descriptor)
    }

    /// Routable agents for `capability`, healthy before degraded, rotated
    /// round-robin across calls. An empty result is a normal outcome.
    pub fn resolve(&self, capability: &CapabilityName) -> Vec<AgentDescriptor> {
        let (ids, start) = match self.index.get(capability) {
            Some(entry) => (
                entry.agents.iter().cloned().collect::<Vec<_>>(),
                entry.cursor.fetch_add(1, Ordering::Relaxed),
            ),
            None => return Vec::new(),
        };

        let mut healthy = Vec::with_capacity(ids.len());
        let mut degraded = Vec::new();
        for offset in 0..ids.len() {
            let id = &ids[(start + offset) % ids.len()];
            if let Some(agent) = self.agents.get(id) {
                match agent.health {
                    HealthState::Unreachable => {}
                    HealthState::Degraded => degraded.push(agent.clone()),
                    HealthState::Healthy | HealthState::Unknown => healthy.push(agent.clone()),
                }
            }
        }
        healthy.extend(degraded);
        healthy
    }

    pub fn heartbeat(
        &self,
        agent_id: &AgentId,
        health: HealthState,
    ) -> Result<AgentDescriptor, RegistryError> {
        self.heartbeat_at(agent_id, health, Utc::now())
    }

    pub fn heartbeat_at(
        &self,
        agent_id: &AgentId,
        health: HealthState,
        now: DateTime<Utc>,
    ) -> Result<AgentDescriptor, RegistryError> {
        let (descriptor, previous) = {
            let mut agent = self
                .agents
                .get_mut(agent_id)
                .ok_or_else(|| RegistryError::UnknownAgent(agent_id.clone()))?;
            let previous = agent.health;
            agent.health = health;
            agent.last_heartbeat = now;
            (agent.clone(), previous)
        };

        if previous != health {
            info!(agent_id = %agent_id, from = %previous, to = %health, "Agent health changed");
            self.event_bus
                .publish_registry_event(RegistryEvent::AgentHealthChanged {
                    agent_id: agent_id.clone(),
                    from: previous,
                    to: health,
                    changed_at: now,
                });
        }
        Ok(descriptor)
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now())
    }

    /// Demotes agents silent past the grace window and evicts those silent
    /// past the eviction window.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let grace = chrono_duration(self.settings.heartbeat_grace);
        let eviction = chrono_duration(self.settings.eviction_after);

        let mut report = SweepReport::default();
        for agent in self.agents.iter() {
            let silence = agent.silence(now);
            if silence > eviction {
                report.evicted.push(agent.id.clone());
            } else if silence > grace && agent.health != HealthState::Unreachable {
                report.demoted.push(agent.id.clone());
            }
        }

        for agent_id in &report.demoted {
            let previous = match self.agents.get_mut(agent_id) {
                Some(mut agent) => std::mem::replace(&mut agent.health, HealthState::Unreachable),
                None => continue,
            };
            warn!(agent_id = %agent_id, "Agent missed heartbeats, marked unreachable");
            self.event_bus
                .publish_registry_event(RegistryEvent::AgentHealthChanged {
                    agent_id: agent_id.clone(),
                    from: previous,
                    to: HealthState::Unreachable,
                    changed_at: now,
                });
        }

        for agent_id in &report.evicted {
            if let Some((_, agent)) = self.agents.remove(agent_id) {
                self.unindex(agent_id, agent.capabilities.iter());
                warn!(agent_id = %agent_id, "Agent evicted after sustained silence");
                self.event_bus
                    .publish_registry_event(RegistryEvent::AgentEvicted {
                        agent_id: agent_id.clone(),
                        silent_for_secs: agent.silence(now).num_seconds(),
                        evicted_at: now,
                    });
            }
        }

        if !report.evicted.is_empty() {
            metrics::counter!("a2a_registry_evictions_total").increment(report.evicted.len() as u64);
            metrics::gauge!("a2a_registry_agents").set(self.agents.len() as f64);
        }
        report
    }

    pub fn deregister(&self, agent_id: &AgentId) -> Result<AgentDescriptor, RegistryError> {
        let (_, agent) = self
            .agents
            .remove(agent_id)
            .ok_or_else(|| RegistryError::UnknownAgent(agent_id.clone()))?;
        self.unindex(agent_id, agent.capabilities.iter());

        info!(agent_id = %agent_id, "Agent deregistered");
        metrics::gauge!("a2a_registry_agents").set(self.agents.len() as f64);
        self.event_bus
            .publish_registry_event(RegistryEvent::AgentDeregistered {
                agent_id: agent_id.clone(),
                deregistered_at: Utc::now(),
            });
        Ok(agent)
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<AgentDescriptor> {
        self.agents.get(agent_id).map(|a| a.clone())
    }

    pub fn list(&self) -> Vec<AgentDescriptor> {
        let mut agents: Vec<AgentDescriptor> = self.agents.iter().map(|a| a.clone()).collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    pub fn capabilities(&self) -> Vec<CapabilitySummary> {
        let health: HashMap<AgentId, HealthState> = self
            .agents
            .iter()
            .map(|a| (a.id.clone(), a.health))
            .collect();

        let mut summaries: Vec<CapabilitySummary> = self
            .index
            .iter()
            .map(|entry| CapabilitySummary {
                name: entry.key().clone(),
                agents: entry.agents.iter().cloned().collect(),
                routable: entry
                    .agents
                    .iter()
                    .filter(|id| health.get(*id).is_some_and(|h| h.is_routable()))
                    .count(),
                contract: entry.contract.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Runs [`Self::sweep`] every `sweep_interval` until `shutdown` fires.
    pub fn spawn_sweeper(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.settings.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Registry sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let report = self.sweep();
                        if !report.is_empty() {
                            info!(
                                demoted = report.demoted.len(),
                                evicted = report.evicted.len(),
                                "Registry sweep"
                            );
                        }
                    }
                }
            }
        })
    }

    fn unindex<'a>(&self, agent_id: &AgentId, capabilities: impl IntoIterator<Item = &'a CapabilityName>) {
        for capability in capabilities {
            if let Some(mut entry) = self.index.get_mut(capability) {
                entry.agents.remove(agent_id);
            }
            self.index.remove_if(capability, |_, entry| entry.agents.is_empty());
        }
    }
}
