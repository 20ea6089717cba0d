// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentId, HealthState};
use crate::domain::capability::CapabilityName;
use crate::domain::circuit::CircuitPhase;
use crate::domain::envelope::CorrelationId;
use crate::domain::workflow::{RunFailure, RunId, RunStatus, StepId, StepState, WorkflowName};

/// Agent membership and liveness changes observed by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    AgentRegistered {
        agent_id: AgentId,
        capabilities: Vec<CapabilityName>,
        registered_at: DateTime<Utc>,
    },
    AgentHealthChanged {
        agent_id: AgentId,
        from: HealthState,
        to: HealthState,
        changed_at: DateTime<Utc>,
    },
    AgentEvicted {
        agent_id: AgentId,
        silent_for_secs: i64,
        evicted_at: DateTime<Utc>,
    },
    AgentDeregistered {
        agent_id: AgentId,
        deregistered_at: DateTime<Utc>,
    },
}

/// Circuit transitions for one (agent, capability) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CircuitEvent {
    StateChanged {
        agent_id: AgentId,
        capability: CapabilityName,
        from: CircuitPhase,
        to: CircuitPhase,
        changed_at: DateTime<Utc>,
    },
}

/// Progress of a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    RunStarted {
        run_id: RunId,
        correlation_id: CorrelationId,
        workflow: WorkflowName,
        started_at: DateTime<Utc>,
    },
    StepDispatched {
        run_id: RunId,
        step: StepId,
        capability: CapabilityName,
        dispatched_at: DateTime<Utc>,
    },
    StepSettled {
        run_id: RunId,
        step: StepId,
        state: StepState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        settled_at: DateTime<Utc>,
    },
    RunFinished {
        run_id: RunId,
        status: RunStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure: Option<RunFailure>,
        finished_at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            WorkflowEvent::RunStarted { run_id, .. }
            | WorkflowEvent::StepDispatched { run_id, .. }
            | WorkflowEvent::StepSettled { run_id, .. }
            | WorkflowEvent::RunFinished { run_id, .. } => *run_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowEvent::RunFinished { .. })
    }
}
