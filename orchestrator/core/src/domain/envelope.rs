// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! A2A wire messages
//!
//! The [`MessageEnvelope`] is the unit the router delivers to agents; the
//! [`ReplyEnvelope`] is what an agent answers with. Both serialize as
//! camelCase JSON records. Payloads are opaque to the mesh and pass through
//! unchanged.
//!
//! # Identity
//!
//! - `messageId` is unique per send (a retry is a new send).
//! - `correlationId` groups a request with its reply and every message of one
//!   workflow run; it is copied unchanged through every hop.
//!
//! # Budgets
//!
//! No call may be given more than [`MAX_BUDGET`]. Larger budgets are clamped
//! when a deadline is computed, so deadline arithmetic never overflows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::capability::CapabilityName;

/// Upper bound on any single budget: one call, one retry or one workflow run.
pub const MAX_BUDGET: Duration = Duration::from_secs(24 * 60 * 60);

/// Reply code an agent uses when it gave up on a request at its deadline.
pub const DEADLINE_EXCEEDED: &str = "deadline_exceeded";

/// `from + budget`, with the budget clamped to [`MAX_BUDGET`].
pub fn deadline_after(from: DateTime<Utc>, budget: Duration) -> DateTime<Utc> {
    from.checked_add_signed(chrono_duration(budget.min(MAX_BUDGET)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Envelopes
// ============================================================================

/// Whether the sender waits for an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Request,
    /// One-way message. The agent acknowledges receipt and the sender never
    /// sees the handler's result.
    Notification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl MessagePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagePriority::Low => "low",
            MessagePriority::Medium => "medium",
            MessagePriority::High => "high",
            MessagePriority::Critical => "critical",
        }
    }
}

/// Request delivered to one agent serving `capability`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub message_id: MessageId,
    pub correlation_id: CorrelationId,
    pub source_id: String,
    pub capability: CapabilityName,
    pub payload: serde_json::Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Absolute instant after which the sender stops waiting.
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub priority: MessagePriority,
    /// Hex HMAC-SHA256 over the envelope with this field unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl MessageEnvelope {
    /// New envelope opening a fresh correlation.
    pub fn new(
        source_id: impl Into<String>,
        capability: CapabilityName,
        payload: serde_json::Value,
        budget: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            message_id: MessageId::new(),
            correlation_id: CorrelationId::new(),
            source_id: source_id.into(),
            capability,
            payload,
            timestamp: now,
            deadline: deadline_after(now, budget),
            kind: MessageKind::Request,
            priority: MessagePriority::Medium,
            signature: None,
        }
    }

    /// One-way envelope. Notifications default to low priority.
    pub fn notification(
        source_id: impl Into<String>,
        capability: CapabilityName,
        payload: serde_json::Value,
        budget: Duration,
    ) -> Self {
        Self {
            kind: MessageKind::Notification,
            priority: MessagePriority::Low,
            ..Self::new(source_id, capability, payload, budget)
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_notification(&self) -> bool {
        self.kind == MessageKind::Notification
    }

    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Time left before the deadline, `None` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        (self.deadline - Utc::now()).to_std().ok().filter(|d| !d.is_zero())
    }

    /// Budget this envelope was sent with.
    pub fn budget(&self) -> Duration {
        (self.deadline - self.timestamp).to_std().unwrap_or_default()
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_none()
    }

    /// Copy of this message for a fresh attempt: new message id, same
    /// correlation, new deadline. Any signature is dropped since it no longer
    /// covers the copy.
    pub fn reissue(&self, deadline: DateTime<Utc>) -> Self {
        Self {
            message_id: MessageId::new(),
            timestamp: Utc::now(),
            deadline,
            signature: None,
            ..self.clone()
        }
    }
}

/// Outcome an agent reports for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplyOutcome {
    Ok {
        payload: serde_json::Value,
    },
    /// Domain-level rejection raised by the agent itself.
    Error { code: String, message: String },
}

/// Answer to a [`MessageEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    pub message_id: MessageId,
    pub correlation_id: CorrelationId,
    pub in_reply_to: MessageId,
    pub responder_id: String,
    pub capability: CapabilityName,
    pub outcome: ReplyOutcome,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ReplyEnvelope {
    pub fn ok(
        request: &MessageEnvelope,
        responder_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::with_outcome(request, responder_id, ReplyOutcome::Ok { payload })
    }

    pub fn error(
        request: &MessageEnvelope,
        responder_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::with_outcome(
            request,
            responder_id,
            ReplyOutcome::Error {
                code: code.into(),
                message: message.into(),
            },
        )
    }

    fn with_outcome(
        request: &MessageEnvelope,
        responder_id: impl Into<String>,
        outcome: ReplyOutcome,
    ) -> Self {
        Self {
            message_id: MessageId::new(),
            correlation_id: request.correlation_id,
            in_reply_to: request.message_id,
            responder_id: responder_id.into(),
            capability: request.capability.clone(),
            outcome,
            timestamp: Utc::now(),
        }
    }

    /// True if this reply answers `request` (same correlation, same message).
    pub fn answers(&self, request: &MessageEnvelope) -> bool {
        self.correlation_id == request.correlation_id && self.in_reply_to == request.message_id
    }

    /// Payload of a successful reply.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            ReplyOutcome::Ok { payload } => Some(payload),
            ReplyOutcome::Error { .. } => None,
        }
    }

    pub fn into_payload(self) -> Option<serde_json::Value> {
        match self.outcome {
            ReplyOutcome::Ok { payload } => Some(payload),
            ReplyOutcome::Error { .. } => None,
        }
    }
}

pub(crate) fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn capability() -> CapabilityName {
        CapabilityName::new("recommend.products@v1").unwrap()
    }

    #[test]
    fn test_wire_format_uses_camel_case() {
        let envelope = MessageEnvelope::new(
            "gateway.commerce",
            capability(),
            json!({"userId": "u-1"}),
            Duration::from_secs(2),
        );
        let value = serde_json::to_value(&envelope).unwrap();

        for field in ["messageId", "correlationId", "sourceId", "capability", "payload", "deadline", "timestamp"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(value["payload"], json!({"userId": "u-1"}));
    }

    #[test]
    fn test_timestamp_defaults_on_receipt() {
        let wire = json!({
            "messageId": Uuid::new_v4(),
            "correlationId": Uuid::new_v4(),
            "sourceId": "agent-a",
            "capability": "recommend.products@v1",
            "payload": {"anything": [1, 2, 3]},
            "deadline": "2099-01-01T00:00:00Z"
        });
        let envelope: MessageEnvelope = serde_json::from_value(wire).unwrap();
        assert!(envelope.timestamp <= Utc::now());
        assert_eq!(envelope.payload["anything"], json!([1, 2, 3]));
    }

    #[test]
    fn test_reissue_keeps_correlation() {
        let original = MessageEnvelope::new("src", capability(), json!(null), Duration::from_secs(1));
        let retry = original.reissue(Utc::now() + chrono::Duration::milliseconds(200));

        assert_ne!(retry.message_id, original.message_id);
        assert_eq!(retry.correlation_id, original.correlation_id);
        assert_eq!(retry.capability, original.capability);
    }

    #[test]
    fn test_expired_envelope_has_no_remaining_budget() {
        let envelope = MessageEnvelope::new("src", capability(), json!(null), Duration::from_secs(5))
            .with_deadline(Utc::now() - chrono::Duration::seconds(1));
        assert!(envelope.is_expired());
        assert_eq!(envelope.remaining(), None);
    }

    #[test]
    fn test_huge_budget_is_clamped() {
        let envelope = MessageEnvelope::new(
            "src",
            capability(),
            json!(null),
            Duration::from_secs(u64::MAX / 2),
        );
        assert_eq!(envelope.budget(), MAX_BUDGET);

        let far = humantime::parse_duration("300000years").unwrap();
        let now = Utc::now();
        assert_eq!(deadline_after(now, far), now + chrono_duration(MAX_BUDGET));
        assert_eq!(
            deadline_after(DateTime::<Utc>::MAX_UTC, Duration::from_secs(1)),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[test]
    fn test_notification_defaults() {
        let note = MessageEnvelope::notification("pricing-1", capability(), json!({"sku": "1"}), Duration::from_secs(1));
        assert!(note.is_notification());
        assert_eq!(note.priority, MessagePriority::Low);

        let wire = serde_json::to_value(&note).unwrap();
        assert_eq!(wire["kind"], "notification");
        assert_eq!(wire["priority"], "low");
        assert!(wire.get("signature").is_none());

        // Older senders omit both fields.
        let legacy = json!({
            "messageId": Uuid::new_v4(),
            "correlationId": Uuid::new_v4(),
            "sourceId": "agent-a",
            "capability": "recommend.products@v1",
            "payload": {},
            "deadline": "2099-01-01T00:00:00Z"
        });
        let envelope: MessageEnvelope = serde_json::from_value(legacy).unwrap();
        assert_eq!(envelope.kind, MessageKind::Request);
        assert_eq!(envelope.priority, MessagePriority::Medium);
        assert!(MessagePriority::Critical > MessagePriority::High);
    }

    #[test]
    fn test_reply_answers_only_its_request() {
        let request = MessageEnvelope::new("src", capability(), json!({}), Duration::from_secs(1));
        let other = MessageEnvelope::new("src", capability(), json!({}), Duration::from_secs(1));

        let reply = ReplyEnvelope::ok(&request, "rec-1", json!(["sku-1"]));
        assert!(reply.answers(&request));
        assert!(!reply.answers(&other));

        let wire = serde_json::to_value(&reply).unwrap();
        assert_eq!(wire["outcome"]["status"], "ok");
        assert_eq!(wire["inReplyTo"], json!(request.message_id));
    }

    #[test]
    fn test_error_reply_carries_code() {
        let request = MessageEnvelope::new("src", capability(), json!({}), Duration::from_secs(1));
        let reply = ReplyEnvelope::error(&request, "rec-1", "unknown_user", "no such user");
        assert_eq!(reply.payload(), None);
        assert_eq!(
            reply.outcome,
            ReplyOutcome::Error {
                code: "unknown_user".into(),
                message: "no such user".into()
            }
        );
    }
}
