// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// In-Process Agent Transport
//
// Dispatches envelopes to async closures registered per agent id. Used by the
// test suites and for agents embedded in the daemon process. Every delivered
// envelope is recorded so tests can assert on what reached an agent.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::domain::agent::AgentDescriptor;
use crate::domain::envelope::{MessageEnvelope, ReplyEnvelope};
use crate::domain::routing::{AgentTransport, TransportError};

/// Domain error raised by an in-process handler; becomes an `error` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentFault {
    pub code: String,
    pub message: String,
}

impl AgentFault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

type Handler =
    Arc<dyn Fn(MessageEnvelope) -> BoxFuture<'static, Result<serde_json::Value, AgentFault>> + Send + Sync>;

enum Behaviour {
    Handle(Handler),
    Fail(TransportError),
    /// Hands back a prepared reply regardless of the request.
    Reply(ReplyEnvelope),
}

#[derive(Default)]
pub struct LocalTransport {
    agents: Mutex<HashMap<String, Behaviour>>,
    received: Mutex<Vec<(String, MessageEnvelope)>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves every envelope addressed to `agent_id` with `handler`.
    pub fn handle<F, Fut>(&self, agent_id: &str, handler: F)
    where
        F: Fn(MessageEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, AgentFault>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |envelope| handler(envelope).boxed());
        self.agents
            .lock()
            .insert(agent_id.to_string(), Behaviour::Handle(handler));
    }

    /// Makes every delivery to `agent_id` fail with `error`.
    pub fn fail(&self, agent_id: &str, error: TransportError) {
        self.agents
            .lock()
            .insert(agent_id.to_string(), Behaviour::Fail(error));
    }

    /// Answers every delivery to `agent_id` with `reply` as is.
    pub fn reply_with(&self, agent_id: &str, reply: ReplyEnvelope) {
        self.agents
            .lock()
            .insert(agent_id.to_string(), Behaviour::Reply(reply));
    }

    /// Every envelope delivered so far, in delivery order.
    pub fn received(&self) -> Vec<MessageEnvelope> {
        self.received
            .lock()
            .iter()
            .map(|(_, envelope)| envelope.clone())
            .collect()
    }

    pub fn received_by(&self, agent_id: &str) -> Vec<MessageEnvelope> {
        self.received
            .lock()
            .iter()
            .filter(|(id, _)| id == agent_id)
            .map(|(_, envelope)| envelope.clone())
            .collect()
    }
}

#[async_trait]
impl AgentTransport for LocalTransport {
    async fn deliver(
        &self,
        agent: &AgentDescriptor,
        envelope: &MessageEnvelope,
    ) -> Result<ReplyEnvelope, TransportError> {
        self.received
            .lock()
            .push((agent.id.as_str().to_string(), envelope.clone()));

        let handler = {
            let agents = self.agents.lock();
            match agents.get(agent.id.as_str()) {
                Some(Behaviour::Handle(handler)) => Arc::clone(handler),
                Some(Behaviour::Fail(error)) => return Err(error.clone()),
                Some(Behaviour::Reply(reply)) => return Ok(reply.clone()),
                None => {
                    return Err(TransportError::Connection(format!(
                        "no in-process agent '{}'",
                        agent.id
                    )))
                }
            }
        };

        Ok(match handler(envelope.clone()).await {
            Ok(payload) => ReplyEnvelope::ok(envelope, agent.id.as_str(), payload),
            Err(fault) => ReplyEnvelope::error(envelope, agent.id.as_str(), fault.code, fault.message),
        })
    }
}
