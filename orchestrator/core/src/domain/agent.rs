// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent descriptors as seen by the registry.
//!
//! An agent is an independently deployed worker process serving one or more
//! capabilities. The mesh never owns an agent's lifecycle; it only tracks what
//! the agent announced (identity, capabilities, endpoint) and what it last
//! heard about its health.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::capability::{CapabilityContract, CapabilityName};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentIdError {
    #[error("Agent id cannot be empty")]
    Empty,

    #[error("Agent id '{0}' contains invalid characters")]
    InvalidCharacters(String),

    #[error("Agent id exceeds 128 characters")]
    TooLong,
}

/// Stable agent identity chosen by the agent itself (e.g. `rec-1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Result<Self, AgentIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(AgentIdError::Empty);
        }
        if id.len() > 128 {
            return Err(AgentIdError::TooLong);
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        {
            return Err(AgentIdError::InvalidCharacters(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for AgentId {
    type Err = AgentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AgentId {
    type Error = AgentIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AgentId> for String {
    fn from(value: AgentId) -> Self {
        value.0
    }
}

/// Liveness as last observed by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Announced but no heartbeat or probe result yet.
    #[default]
    Unknown,
    Healthy,
    /// Serving, but reported reduced capacity. Ordered after healthy peers.
    Degraded,
    /// Silent past the heartbeat grace window. Never routed to.
    Unreachable,
}

impl HealthState {
    pub fn is_routable(&self) -> bool {
        !matches!(self, HealthState::Unreachable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unreachable => "unreachable",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Announcement an agent sends at startup (and may resend at any time).
///
/// Capability names are carried as announced; the registry validates them
/// and rejects the whole announcement if any name is malformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistration {
    pub id: AgentId,
    #[serde(default)]
    pub name: Option<String>,
    pub capabilities: Vec<String>,
    pub endpoint: String,
    /// Identifies one process lifetime of the agent. A restarted agent presents
    /// a new instance id, which is what allows its capability set to change.
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub contracts: Vec<CapabilityContract>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Hex HMAC-SHA256 over the announcement, required when the mesh has a
    /// signing key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl AgentRegistration {
    pub fn new(
        id: AgentId,
        endpoint: impl Into<String>,
        capabilities: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id,
            name: None,
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            endpoint: endpoint.into(),
            instance_id: None,
            contracts: Vec::new(),
            metadata: BTreeMap::new(),
            signature: None,
        }
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn with_contract(mut self, contract: CapabilityContract) -> Self {
        self.contracts.push(contract);
        self
    }
}

/// Registry view of a single agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub name: String,
    pub capabilities: BTreeSet<CapabilityName>,
    pub endpoint: String,
    pub health: HealthState,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl AgentDescriptor {
    /// Builds a descriptor from an announcement whose capability names were
    /// already validated.
    pub fn from_registration(
        registration: AgentRegistration,
        capabilities: BTreeSet<CapabilityName>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: registration
                .name
                .unwrap_or_else(|| registration.id.as_str().to_string()),
            id: registration.id,
            capabilities,
            endpoint: registration.endpoint,
            health: HealthState::Unknown,
            last_heartbeat: now,
            registered_at: now,
            instance_id: registration.instance_id,
            metadata: registration.metadata,
        }
    }

    pub fn serves(&self, capability: &CapabilityName) -> bool {
        self.capabilities.contains(capability)
    }

    /// Time since the agent was last heard from.
    pub fn silence(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_heartbeat
    }
}
