// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Routing contracts: the error taxonomy every caller of the router sees and
//! the transport port the router uses to reach an agent.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::agent::{AgentDescriptor, AgentId};
use crate::domain::capability::CapabilityName;
use crate::domain::envelope::{MessageEnvelope, ReplyEnvelope};

/// Why a routed request did not produce a successful reply.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutingError {
    /// No routable agent serves the capability. Never retried.
    #[error("No healthy agent serves capability '{capability}'")]
    Unroutable { capability: CapabilityName },

    /// The envelope deadline passed while the call was in flight.
    #[error("Call to '{capability}' timed out after {elapsed:?}")]
    Timeout {
        capability: CapabilityName,
        agent_id: Option<AgentId>,
        elapsed: Duration,
    },

    /// Every candidate's circuit is open; no network attempt was made.
    #[error("Circuit open for '{capability}' on agent '{agent_id}'")]
    CircuitOpen {
        capability: CapabilityName,
        agent_id: AgentId,
        retry_after: Duration,
    },

    /// The agent answered with a domain error. Surfaced verbatim.
    #[error("Agent '{agent_id}' rejected '{capability}': [{code}] {message}")]
    AgentApplicationError {
        capability: CapabilityName,
        agent_id: AgentId,
        code: String,
        message: String,
    },

    #[error("Transport failure reaching agent '{agent_id}': {reason}")]
    Transport { agent_id: AgentId, reason: String },

    /// Reply did not decode or did not answer the request it was paired with.
    #[error("Malformed reply from agent '{agent_id}': {reason}")]
    MalformedReply { agent_id: AgentId, reason: String },
}

impl RoutingError {
    /// Stable machine-readable code used in HTTP bodies and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            RoutingError::Unroutable { .. } => "unroutable",
            RoutingError::Timeout { .. } => "timeout",
            RoutingError::CircuitOpen { .. } => "circuit_open",
            RoutingError::AgentApplicationError { .. } => "agent_error",
            RoutingError::Transport { .. } => "transport",
            RoutingError::MalformedReply { .. } => "malformed_reply",
        }
    }

    /// Whether this outcome counts against the target's circuit.
    pub fn is_circuit_failure(&self) -> bool {
        matches!(
            self,
            RoutingError::Timeout { .. }
                | RoutingError::Transport { .. }
                | RoutingError::MalformedReply { .. }
        )
    }
}

/// Failure raised by an [`AgentTransport`] implementation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("agent returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("reply could not be decoded: {0}")]
    Decode(String),
}

/// Port through which the router reaches a single agent.
///
/// Implementations deliver exactly one envelope and return the agent's reply.
/// They must not retry and must not apply their own deadline shorter than the
/// envelope's; the router races every call against the envelope deadline and
/// drops the future on expiry.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn deliver(
        &self,
        agent: &AgentDescriptor,
        envelope: &MessageEnvelope,
    ) -> Result<ReplyEnvelope, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_infrastructure_failures_trip_circuit() {
        let capability = CapabilityName::new("pricing.quote@v1").unwrap();
        let agent_id = AgentId::new("pricing-1").unwrap();

        assert!(RoutingError::Timeout {
            capability: capability.clone(),
            agent_id: Some(agent_id.clone()),
            elapsed: Duration::from_millis(10),
        }
        .is_circuit_failure());
        assert!(RoutingError::Transport {
            agent_id: agent_id.clone(),
            reason: "refused".into()
        }
        .is_circuit_failure());

        assert!(!RoutingError::AgentApplicationError {
            capability: capability.clone(),
            agent_id: agent_id.clone(),
            code: "bad_sku".into(),
            message: "unknown sku".into(),
        }
        .is_circuit_failure());
        assert!(!RoutingError::CircuitOpen {
            capability: capability.clone(),
            agent_id,
            retry_after: Duration::from_secs(1),
        }
        .is_circuit_failure());
        assert!(!RoutingError::Unroutable { capability }.is_circuit_failure());
    }
}
