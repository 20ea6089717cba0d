// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod circuit_breaker;
pub mod gateway;
pub mod orchestrator;
pub mod registry;
pub mod router;

// Re-export services for convenience
pub use circuit_breaker::CircuitBreaker;
pub use gateway::GatewayService;
pub use orchestrator::{InvokeOptions, OrchestratorError, OrchestratorSettings, RunHandle, WorkflowOrchestrator};
pub use registry::{AgentRegistry, RegistryError, RegistrySettings};
pub use router::{MessageRouter, RequestContext, RouterSettings};
