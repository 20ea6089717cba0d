// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// HTTP Agent Transport
//
// Delivers a `MessageEnvelope` as JSON to `POST {endpoint}/a2a/messages` and
// decodes the `ReplyEnvelope` from the response body. No client-side timeout
// is configured here; the router races every call against the envelope
// deadline and drops the request future on expiry.
//
// With a signer configured every outbound envelope is sealed just before it
// is sent, since retries and broadcast copies carry fresh message ids.

use async_trait::async_trait;

use crate::domain::agent::AgentDescriptor;
use crate::domain::envelope::{MessageEnvelope, ReplyEnvelope};
use crate::domain::routing::{AgentTransport, TransportError};
use crate::infrastructure::signing::MessageSigner;

pub const MESSAGES_PATH: &str = "/a2a/messages";

pub struct HttpAgentTransport {
    client: reqwest::Client,
    signer: Option<MessageSigner>,
}

impl HttpAgentTransport {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            signer: None,
        }
    }

    pub fn with_signer(mut self, signer: MessageSigner) -> Self {
        self.signer = Some(signer);
        self
    }
}

impl Default for HttpAgentTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentTransport for HttpAgentTransport {
    async fn deliver(
        &self,
        agent: &AgentDescriptor,
        envelope: &MessageEnvelope,
    ) -> Result<ReplyEnvelope, TransportError> {
        let url = format!("{}{}", agent.endpoint.trim_end_matches('/'), MESSAGES_PATH);

        let mut outbound = envelope.clone();
        if let Some(signer) = &self.signer {
            signer
                .seal(&mut outbound)
                .map_err(|e| TransportError::Connection(e.to_string()))?;
        }

        let response = self
            .client
            .post(&url)
            .header("x-correlation-id", envelope.correlation_id.to_string())
            .json(&outbound)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentId, AgentRegistration};
    use crate::domain::capability::CapabilityName;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn descriptor(endpoint: &str) -> AgentDescriptor {
        let capability = CapabilityName::new("catalog.get@v1").unwrap();
        AgentDescriptor::from_registration(
            AgentRegistration::new(AgentId::new("catalog-1").unwrap(), endpoint, ["catalog.get@v1"]),
            BTreeSet::from([capability]),
            Utc::now(),
        )
    }

    fn envelope() -> MessageEnvelope {
        MessageEnvelope::new(
            "gateway:commerce",
            CapabilityName::new("catalog.get@v1").unwrap(),
            json!({"productId": "66VCHSJNUP"}),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn test_delivers_envelope_and_decodes_reply() {
        let mut server = mockito::Server::new_async().await;
        let request = envelope();
        let reply = ReplyEnvelope::ok(&request, "catalog-1", json!({"name": "Tank Top"}));

        let mock = server
            .mock("POST", "/a2a/messages")
            .match_header("x-correlation-id", request.correlation_id.to_string().as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&reply).unwrap())
            .create_async()
            .await;

        let transport = HttpAgentTransport::new();
        let received = transport
            .deliver(&descriptor(&server.url()), &request)
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(received.answers(&request));
        assert_eq!(received.payload(), Some(&json!({"name": "Tank Top"})));
    }

    #[tokio::test]
    async fn test_signer_seals_outbound_envelope() {
        let mut server = mockito::Server::new_async().await;
        let request = envelope();
        let signer = MessageSigner::new("mesh-shared-secret").unwrap();
        let mut expected = request.clone();
        signer.seal(&mut expected).unwrap();
        let reply = ReplyEnvelope::ok(&request, "catalog-1", json!({}));

        let mock = server
            .mock("POST", "/a2a/messages")
            .match_body(mockito::Matcher::PartialJson(json!({
                "signature": expected.signature.clone().unwrap()
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&reply).unwrap())
            .create_async()
            .await;

        HttpAgentTransport::new()
            .with_signer(signer)
            .deliver(&descriptor(&server.url()), &request)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/a2a/messages")
            .with_status(503)
            .with_body("draining")
            .create_async()
            .await;

        let err = HttpAgentTransport::new()
            .deliver(&descriptor(&server.url()), &envelope())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Status {
                status: 503,
                body: "draining".into()
            }
        );
    }

    #[tokio::test]
    async fn test_garbage_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/a2a/messages")
            .with_status(200)
            .with_body("{\"not\": \"a reply\"}")
            .create_async()
            .await;

        let err = HttpAgentTransport::new()
            .deliver(&descriptor(&server.url()), &envelope())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }
}
