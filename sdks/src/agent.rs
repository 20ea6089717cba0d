// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent-side HTTP endpoint
//!
//! An agent joins the mesh by serving two routes:
//!
//! - `POST /a2a/messages` takes a [`MessageEnvelope`] and answers with a
//!   [`ReplyEnvelope`]
//! - `GET /health` reports `{"status": "healthy" | "degraded"}` to the prober
//!
//! Implement [`CapabilityHandler`] and mount [`agent_router`] in any axum
//! server.
//!
//! Notifications are acknowledged with an empty `ok` reply as soon as they
//! arrive; the handler keeps running in the background until the envelope's
//! deadline. [`signed_agent_router`] additionally refuses envelopes whose
//! signature does not verify against the mesh key.

use async_trait::async_trait;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use a2a_mesh_core::domain::agent::HealthState;
use a2a_mesh_core::domain::envelope::{MessageEnvelope, ReplyEnvelope, DEADLINE_EXCEEDED};
use a2a_mesh_core::infrastructure::signing::MessageSigner;

/// Domain-level rejection returned to the caller as an error reply.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct HandlerError {
    pub code: String,
    pub message: String,
}

impl HandlerError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(capability: impl std::fmt::Display) -> Self {
        Self::new(
            "unsupported_capability",
            format!("This agent does not serve '{}'", capability),
        )
    }
}

#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Handles one request. `envelope.capability` says which announced
    /// capability was addressed.
    async fn handle(&self, envelope: &MessageEnvelope) -> Result<Value, HandlerError>;

    /// Health reported on `GET /health`.
    async fn health(&self) -> HealthState {
        HealthState::Healthy
    }
}

struct AgentState {
    responder_id: String,
    handler: Arc<dyn CapabilityHandler>,
    signer: Option<MessageSigner>,
}

pub fn agent_router(responder_id: impl Into<String>, handler: Arc<dyn CapabilityHandler>) -> Router {
    build_router(responder_id.into(), handler, None)
}

/// Like [`agent_router`], but only envelopes signed with the mesh key are
/// handled.
pub fn signed_agent_router(
    responder_id: impl Into<String>,
    handler: Arc<dyn CapabilityHandler>,
    signer: MessageSigner,
) -> Router {
    build_router(responder_id.into(), handler, Some(signer))
}

fn build_router(
    responder_id: String,
    handler: Arc<dyn CapabilityHandler>,
    signer: Option<MessageSigner>,
) -> Router {
    let state = Arc::new(AgentState {
        responder_id,
        handler,
        signer,
    });
    Router::new()
        .route("/a2a/messages", post(receive_message))
        .route("/health", get(report_health))
        .with_state(state)
}

async fn receive_message(
    State(state): State<Arc<AgentState>>,
    Json(envelope): Json<MessageEnvelope>,
) -> Json<ReplyEnvelope> {
    debug!(
        correlation_id = %envelope.correlation_id,
        message_id = %envelope.message_id,
        capability = %envelope.capability,
        kind = ?envelope.kind,
        "Envelope received"
    );

    if let Some(signer) = &state.signer {
        if let Err(e) = signer.verify(&envelope) {
            warn!(
                correlation_id = %envelope.correlation_id,
                source_id = %envelope.source_id,
                "Refusing envelope: {}",
                e
            );
            return Json(ReplyEnvelope::error(
                &envelope,
                &state.responder_id,
                e.code(),
                e.to_string(),
            ));
        }
    }

    // Nobody is waiting for an expired request; answer without running it.
    let Some(remaining) = envelope.remaining() else {
        return Json(ReplyEnvelope::error(
            &envelope,
            &state.responder_id,
            DEADLINE_EXCEEDED,
            "Request arrived after its deadline",
        ));
    };

    if envelope.is_notification() {
        let reply = ReplyEnvelope::ok(&envelope, &state.responder_id, Value::Null);
        let handler = Arc::clone(&state.handler);
        tokio::spawn(async move {
            match tokio::time::timeout(remaining, handler.handle(&envelope)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!(code = %e.code, "Notification handler rejected message"),
                Err(_) => warn!(
                    correlation_id = %envelope.correlation_id,
                    "Notification handler overran its deadline"
                ),
            }
        });
        return Json(reply);
    }

    let reply = match tokio::time::timeout(remaining, state.handler.handle(&envelope)).await {
        Ok(Ok(payload)) => ReplyEnvelope::ok(&envelope, &state.responder_id, payload),
        Ok(Err(e)) => {
            debug!(code = %e.code, "Handler rejected request");
            ReplyEnvelope::error(&envelope, &state.responder_id, e.code, e.message)
        }
        Err(_) => {
            warn!(
                correlation_id = %envelope.correlation_id,
                budget_ms = envelope.budget().as_millis() as u64,
                "Handler overran the request deadline"
            );
            ReplyEnvelope::error(
                &envelope,
                &state.responder_id,
                DEADLINE_EXCEEDED,
                "Handler did not finish before the deadline",
            )
        }
    };
    Json(reply)
}

async fn report_health(State(state): State<Arc<AgentState>>) -> Json<Value> {
    Json(json!({ "status": state.handler.health().await.as_str() }))
}
