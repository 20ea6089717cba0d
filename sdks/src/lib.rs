// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! a2a-mesh Rust SDK
//!
//! Build agents that join an a2a-mesh fabric, and call the mesh from Rust.
//!
//! - [`CapabilityHandler`] + [`agent_router`]: the HTTP endpoint an agent
//!   exposes (`POST /a2a/messages`, `GET /health`)
//! - [`AgentHost`]: announces the agent and keeps it alive with heartbeats
//! - [`MeshClient`]: sends envelopes through the router and drives workflows

pub mod agent;
pub mod client;
pub mod error;
pub mod host;

pub use agent::{agent_router, signed_agent_router, CapabilityHandler, HandlerError};
pub use client::{MeshClient, RunAccepted};
pub use error::SdkError;
pub use host::AgentHost;

pub use a2a_mesh_core::domain::agent::{AgentId, AgentRegistration, HealthState};
pub use a2a_mesh_core::domain::capability::CapabilityName;
pub use a2a_mesh_core::domain::envelope::{
    MessageEnvelope, MessagePriority, ReplyEnvelope, ReplyOutcome,
};
pub use a2a_mesh_core::infrastructure::signing::MessageSigner;
