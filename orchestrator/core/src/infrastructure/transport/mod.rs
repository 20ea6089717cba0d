// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Agent Transport Infrastructure - Anti-Corruption Layer Implementations
//
// Adapters behind the `AgentTransport` port. Only the message router holds
// one of these.
//
// - `http`: JSON over HTTP to `{endpoint}/a2a/messages` (production)
// - `local`: in-process handlers keyed by agent id (tests, embedded agents)

pub mod http;
pub mod local;

pub use http::HttpAgentTransport;
pub use local::{AgentFault, LocalTransport};
