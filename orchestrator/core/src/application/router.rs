// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Message Router
//!
//! The single path from a caller to an agent. Every outbound call, whether it
//! comes from a gateway, the workflow orchestrator or `POST /v1/messages`,
//! goes through [`MessageRouter`]:
//!
//! 1. resolve the capability in the [`AgentRegistry`]
//! 2. ask the [`CircuitBreaker`] for a permit, skipping candidates whose
//!    circuit is open
//! 3. deliver through the [`AgentTransport`], raced against the envelope
//!    deadline
//! 4. check that the reply answers the request and classify the outcome
//!
//! Notifications take the same path up to the circuit admission, then the
//! delivery continues in the background and the sender only learns which
//! agent (or how many agents) it went to.
//!
//! The router is the only component that holds a transport.

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::application::circuit_breaker::{CallOutcome, CallPermit, CircuitBreaker};
use crate::application::registry::AgentRegistry;
use crate::domain::agent::{AgentDescriptor, AgentId};
use crate::domain::capability::CapabilityName;
use crate::domain::circuit::CircuitKey;
use crate::domain::envelope::{
    deadline_after, CorrelationId, MessageEnvelope, MessageKind, ReplyEnvelope, ReplyOutcome,
    DEADLINE_EXCEEDED, MAX_BUDGET,
};
use crate::domain::mesh_config::RouterConfig;
use crate::domain::routing::{AgentTransport, RoutingError, TransportError};

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub source_id: String,
    pub default_deadline: Duration,
    pub capability_deadlines: BTreeMap<CapabilityName, Duration>,
    pub min_retry_budget: Duration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from(&RouterConfig::default())
    }
}

impl From<&RouterConfig> for RouterSettings {
    fn from(config: &RouterConfig) -> Self {
        Self {
            source_id: config.source_id.clone(),
            default_deadline: config.default_deadline,
            capability_deadlines: config
                .capability_deadlines
                .iter()
                .map(|(capability, deadline)| (capability.clone(), **deadline))
                .collect(),
            min_retry_budget: config.min_retry_budget,
        }
    }
}

/// Caller-supplied context for [`MessageRouter::request`].
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Join an existing correlation (e.g. a workflow run). A fresh one is
    /// opened otherwise.
    pub correlation_id: Option<CorrelationId>,
    pub source_id: Option<String>,
    /// Per-call budget; defaults to the capability's configured deadline.
    pub budget: Option<Duration>,
    /// Outer bound no attempt, retries included, may exceed.
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct MessageRouter {
    registry: Arc<AgentRegistry>,
    breaker: Arc<CircuitBreaker>,
    transport: Arc<dyn AgentTransport>,
    settings: Arc<RouterSettings>,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<AgentRegistry>,
        breaker: Arc<CircuitBreaker>,
        transport: Arc<dyn AgentTransport>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            registry,
            breaker,
            transport,
            settings: Arc::new(settings),
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Budget for one call to `capability`.
    pub fn deadline_for(&self, capability: &CapabilityName) -> Duration {
        self.settings
            .capability_deadlines
            .get(capability)
            .copied()
            .unwrap_or(self.settings.default_deadline)
    }

    /// Builds an envelope for `capability` and sends it with the retry
    /// policy applied.
    pub async fn request(
        &self,
        capability: CapabilityName,
        payload: serde_json::Value,
        context: RequestContext,
    ) -> Result<ReplyEnvelope, RoutingError> {
        let budget = context
            .budget
            .unwrap_or_else(|| self.deadline_for(&capability));
        let source_id = context
            .source_id
            .unwrap_or_else(|| self.settings.source_id.clone());

        let mut envelope = MessageEnvelope::new(source_id, capability, payload, budget);
        if let Some(correlation_id) = context.correlation_id {
            envelope = envelope.with_correlation(correlation_id);
        }
        if let Some(outer) = context.deadline {
            if outer < envelope.deadline {
                envelope = envelope.with_deadline(outer);
            }
        }
        self.send_with_retry(&envelope, context.deadline).await
    }

    /// Sends `envelope` once.
    pub async fn send(&self, envelope: &MessageEnvelope) -> Result<ReplyEnvelope, RoutingError> {
        let started = Instant::now();
        let result = self.route(envelope).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };
        metrics::counter!(
            "a2a_router_requests_total",
            "capability" => envelope.capability.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!(
            "a2a_router_latency_seconds",
            "capability" => envelope.capability.to_string()
        )
        .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(reply) => debug!(
                correlation_id = %envelope.correlation_id,
                capability = %envelope.capability,
                priority = envelope.priority.as_str(),
                responder = %reply.responder_id,
                "Message delivered"
            ),
            Err(e) => warn!(
                correlation_id = %envelope.correlation_id,
                capability = %envelope.capability,
                error = %e,
                "Message not delivered"
            ),
        }
        result
    }

    /// Sends `envelope`, retrying once on `Timeout`.
    ///
    /// The retry is a fresh message (new id, same correlation) with half the
    /// original budget, bounded by `outer_deadline`. It is skipped when less
    /// than the configured minimum retry budget would remain.
    pub async fn send_with_retry(
        &self,
        envelope: &MessageEnvelope,
        outer_deadline: Option<DateTime<Utc>>,
    ) -> Result<ReplyEnvelope, RoutingError> {
        let first = match self.send(envelope).await {
            Err(timeout @ RoutingError::Timeout { .. }) => timeout,
            other => return other,
        };

        let now = Utc::now();
        let mut deadline = deadline_after(now, envelope.budget() / 2);
        if let Some(outer) = outer_deadline {
            deadline = deadline.min(outer);
        }
        let budget = (deadline - now).to_std().unwrap_or_default();
        if budget < self.settings.min_retry_budget {
            debug!(
                correlation_id = %envelope.correlation_id,
                remaining_ms = budget.as_millis() as u64,
                "Not enough budget left to retry"
            );
            return Err(first);
        }

        let retry = envelope.reissue(deadline);
        info!(
            correlation_id = %envelope.correlation_id,
            capability = %envelope.capability,
            budget_ms = budget.as_millis() as u64,
            "Retrying timed out message"
        );
        metrics::counter!(
            "a2a_router_retries_total",
            "capability" => envelope.capability.to_string()
        )
        .increment(1);
        self.send(&retry).await
    }

    /// Delivers a copy of `envelope` to every routable agent serving its
    /// capability. Each copy gets its own message id; all share the
    /// correlation id and deadline.
    pub fn broadcast(&self, envelope: &MessageEnvelope) -> Result<Broadcast, RoutingError> {
        let candidates = self.registry.resolve(&envelope.capability);
        if candidates.is_empty() {
            return Err(RoutingError::Unroutable {
                capability: envelope.capability.clone(),
            });
        }

        let replies = FuturesUnordered::new();
        let expected = candidates.len();
        for agent in candidates {
            let router = self.clone();
            let copy = envelope.reissue(envelope.deadline);
            replies.push(Box::pin(async move {
                let agent_id = agent.id.clone();
                let result = router.deliver_to(agent, &copy).await;
                BroadcastReply { agent_id, result }
            }) as BoxFuture<'static, BroadcastReply>);
        }
        Ok(Broadcast {
            replies,
            expected,
            capability: envelope.capability.clone(),
        })
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Sends `envelope` one-way to a single agent serving its capability.
    ///
    /// Returns the chosen agent once its circuit admitted the call. Delivery
    /// finishes in the background: transport failures and timeouts still
    /// count against the agent's circuit, and whatever the handler returns is
    /// dropped.
    pub async fn notify(&self, envelope: &MessageEnvelope) -> Result<AgentId, RoutingError> {
        let envelope = as_notification(envelope);
        let (agent, permit, wait_until) = self.admit(&envelope).await?;
        let agent_id = agent.id.clone();
        self.spawn_notification(agent, envelope, permit, wait_until);
        Ok(agent_id)
    }

    /// Sends a one-way copy of `envelope` to every routable agent serving its
    /// capability and returns how many copies went out. Agents whose circuit
    /// is open are left out; the call fails only if that leaves nobody.
    pub async fn broadcast_notify(&self, envelope: &MessageEnvelope) -> Result<usize, RoutingError> {
        let envelope = as_notification(envelope);
        let candidates = self.registry.resolve(&envelope.capability);
        if candidates.is_empty() {
            return Err(RoutingError::Unroutable {
                capability: envelope.capability.clone(),
            });
        }
        let wait_until = wait_until(&envelope).ok_or_else(|| expired(&envelope))?;

        let mut sent = 0;
        let mut last_error = None;
        for agent in candidates {
            let key = CircuitKey::new(agent.id.clone(), envelope.capability.clone());
            match self.breaker.acquire(&key, wait_until).await {
                Ok(permit) => {
                    let copy = envelope.reissue(envelope.deadline);
                    self.spawn_notification(agent, copy, permit, wait_until);
                    sent += 1;
                }
                Err(e) => {
                    debug!(
                        agent_id = %agent.id,
                        error = %e,
                        "Agent left out of broadcast notification"
                    );
                    last_error = Some(e);
                }
            }
        }
        match (sent, last_error) {
            (0, Some(e)) => Err(e),
            _ => Ok(sent),
        }
    }

    fn spawn_notification(
        &self,
        agent: AgentDescriptor,
        envelope: MessageEnvelope,
        permit: CallPermit,
        wait_until: Instant,
    ) {
        let router = self.clone();
        tokio::spawn(async move {
            let agent_id = agent.id.clone();
            let result = router.call(agent, &envelope, permit, wait_until).await;
            let outcome = match &result {
                Ok(_) => "ok",
                Err(e) => e.code(),
            };
            metrics::counter!(
                "a2a_router_notifications_total",
                "capability" => envelope.capability.to_string(),
                "priority" => envelope.priority.as_str(),
                "outcome" => outcome
            )
            .increment(1);
            match result {
                Ok(_) | Err(RoutingError::AgentApplicationError { .. }) => debug!(
                    correlation_id = %envelope.correlation_id,
                    capability = %envelope.capability,
                    agent_id = %agent_id,
                    "Notification delivered"
                ),
                Err(e) => warn!(
                    correlation_id = %envelope.correlation_id,
                    capability = %envelope.capability,
                    agent_id = %agent_id,
                    error = %e,
                    "Notification not delivered"
                ),
            }
        });
    }

    async fn route(&self, envelope: &MessageEnvelope) -> Result<ReplyEnvelope, RoutingError> {
        let (agent, permit, wait_until) = self.admit(envelope).await?;
        self.call(agent, envelope, permit, wait_until).await
    }

    /// Picks the first candidate whose circuit admits a call.
    async fn admit(
        &self,
        envelope: &MessageEnvelope,
    ) -> Result<(AgentDescriptor, CallPermit, Instant), RoutingError> {
        let candidates = self.registry.resolve(&envelope.capability);
        if candidates.is_empty() {
            return Err(RoutingError::Unroutable {
                capability: envelope.capability.clone(),
            });
        }
        let wait_until = wait_until(envelope).ok_or_else(|| expired(envelope))?;

        let mut rejection = None;
        for agent in candidates {
            let key = CircuitKey::new(agent.id.clone(), envelope.capability.clone());
            match self.breaker.acquire(&key, wait_until).await {
                Ok(permit) => return Ok((agent, permit, wait_until)),
                Err(open @ RoutingError::CircuitOpen { .. }) => {
                    debug!(agent_id = %agent.id, capability = %envelope.capability, "Circuit open, trying next candidate");
                    rejection = Some(open);
                }
                Err(other) => return Err(other),
            }
        }
        Err(rejection.unwrap_or_else(|| RoutingError::Unroutable {
            capability: envelope.capability.clone(),
        }))
    }

    async fn deliver_to(
        &self,
        agent: AgentDescriptor,
        envelope: &MessageEnvelope,
    ) -> Result<ReplyEnvelope, RoutingError> {
        let wait_until = wait_until(envelope).ok_or_else(|| expired(envelope))?;
        let key = CircuitKey::new(agent.id.clone(), envelope.capability.clone());
        let permit = self.breaker.acquire(&key, wait_until).await?;
        self.call(agent, envelope, permit, wait_until).await
    }

    async fn call(
        &self,
        agent: AgentDescriptor,
        envelope: &MessageEnvelope,
        permit: CallPermit,
        wait_until: Instant,
    ) -> Result<ReplyEnvelope, RoutingError> {
        let started = Instant::now();
        let delivered =
            tokio::time::timeout_at(wait_until, self.transport.deliver(&agent, envelope)).await;

        let result = match delivered {
            Err(_) => Err(RoutingError::Timeout {
                capability: envelope.capability.clone(),
                agent_id: Some(agent.id.clone()),
                elapsed: started.elapsed(),
            }),
            Ok(Err(TransportError::Decode(reason))) => Err(RoutingError::MalformedReply {
                agent_id: agent.id.clone(),
                reason,
            }),
            Ok(Err(e)) => Err(RoutingError::Transport {
                agent_id: agent.id.clone(),
                reason: e.to_string(),
            }),
            Ok(Ok(reply)) => classify(&agent.id, envelope, reply, started.elapsed()),
        };

        permit.record(match &result {
            Err(e) if e.is_circuit_failure() => CallOutcome::Failure,
            _ => CallOutcome::Success,
        });
        result
    }
}

fn classify(
    agent_id: &AgentId,
    request: &MessageEnvelope,
    reply: ReplyEnvelope,
    elapsed: Duration,
) -> Result<ReplyEnvelope, RoutingError> {
    if !reply.answers(request) {
        return Err(RoutingError::MalformedReply {
            agent_id: agent_id.clone(),
            reason: format!(
                "reply (correlation {}, in reply to {}) does not answer message {} of correlation {}",
                reply.correlation_id, reply.in_reply_to, request.message_id, request.correlation_id
            ),
        });
    }
    match &reply.outcome {
        ReplyOutcome::Ok { .. } => Ok(reply),
        // The agent gave up at the deadline itself; same as never answering.
        ReplyOutcome::Error { code, .. } if code == DEADLINE_EXCEEDED => {
            Err(RoutingError::Timeout {
                capability: request.capability.clone(),
                agent_id: Some(agent_id.clone()),
                elapsed,
            })
        }
        ReplyOutcome::Error { code, message } => Err(RoutingError::AgentApplicationError {
            capability: request.capability.clone(),
            agent_id: agent_id.clone(),
            code: code.clone(),
            message: message.clone(),
        }),
    }
}

fn as_notification(envelope: &MessageEnvelope) -> MessageEnvelope {
    let mut copy = envelope.clone();
    if copy.kind != MessageKind::Notification {
        copy.kind = MessageKind::Notification;
        copy.signature = None;
    }
    copy
}

fn wait_until(envelope: &MessageEnvelope) -> Option<Instant> {
    envelope
        .remaining()
        .map(|remaining| Instant::now() + remaining.min(MAX_BUDGET))
}

fn expired(envelope: &MessageEnvelope) -> RoutingError {
    RoutingError::Timeout {
        capability: envelope.capability.clone(),
        agent_id: None,
        elapsed: Duration::ZERO,
    }
}

// ============================================================================
// Broadcast
// ============================================================================

/// Result of one agent's part in a broadcast.
#[derive(Debug, Clone)]
pub struct BroadcastReply {
    pub agent_id: AgentId,
    pub result: Result<ReplyEnvelope, RoutingError>,
}

/// Lazy stream of broadcast replies in arrival order.
///
/// Nothing is sent until the stream is polled. Dropping the stream abandons
/// every outstanding call.
pub struct Broadcast {
    replies: FuturesUnordered<BoxFuture<'static, BroadcastReply>>,
    expected: usize,
    capability: CapabilityName,
}

impl Broadcast {
    /// Number of agents the envelope was fanned out to.
    pub fn expected(&self) -> usize {
        self.expected
    }

    pub async fn collect_all(self) -> Vec<BroadcastReply> {
        self.collect().await
    }

    /// First successful reply; the last error if every agent failed.
    pub async fn first_ok(mut self) -> Result<ReplyEnvelope, RoutingError> {
        let mut last_error = None;
        while let Some(reply) = self.next().await {
            match reply.result {
                Ok(envelope) => return Ok(envelope),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or(RoutingError::Unroutable {
            capability: self.capability,
        }))
    }

    /// Waits for `n` successful replies, failing as soon as that becomes
    /// impossible.
    pub async fn quorum(mut self, n: usize) -> Result<Vec<ReplyEnvelope>, RoutingError> {
        let mut accepted = Vec::with_capacity(n);
        let mut outstanding = self.expected;
        let mut last_error = None;
        while accepted.len() < n {
            if accepted.len() + outstanding < n {
                break;
            }
            let Some(reply) = self.next().await else { break };
            outstanding -= 1;
            match reply.result {
                Ok(envelope) => accepted.push(envelope),
                Err(e) => last_error = Some(e),
            }
        }
        if accepted.len() >= n {
            Ok(accepted)
        } else {
            Err(last_error.unwrap_or(RoutingError::Unroutable {
                capability: self.capability,
            }))
        }
    }
}

impl Stream for Broadcast {
    type Item = BroadcastReply;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.replies.poll_next_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::RegistrySettings;
    use crate::domain::agent::AgentRegistration;
    use crate::domain::circuit::CircuitPolicy;
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::transport::local::{AgentFault, LocalTransport};
    use serde_json::json;

    fn cap(name: &str) -> CapabilityName {
        CapabilityName::new(name).unwrap()
    }

    fn setup(transport: Arc<LocalTransport>) -> MessageRouter {
        let bus = EventBus::new(64);
        let registry = Arc::new(AgentRegistry::new(RegistrySettings::default(), bus.clone()));
        let breaker = Arc::new(CircuitBreaker::new(CircuitPolicy::default(), bus));
        MessageRouter::new(registry, breaker, transport, RouterSettings::default())
    }

    fn register(router: &MessageRouter, id: &str, caps: &[&str]) {
        router
            .registry()
            .register(AgentRegistration::new(
                AgentId::new(id).unwrap(),
                format!("http://{}.local", id),
                caps.iter().copied(),
            ))
            .unwrap();
    }

    #[tokio::test]
    async fn test_request_round_trip_keeps_correlation() {
        let transport = Arc::new(LocalTransport::new());
        transport.handle("echo-1", |envelope: MessageEnvelope| async move {
            Ok(json!({"echo": envelope.payload}))
        });
        let router = setup(transport);
        register(&router, "echo-1", &["echo.say@v1"]);

        let correlation_id = CorrelationId::new();
        let reply = router
            .request(
                cap("echo.say@v1"),
                json!("hi"),
                RequestContext {
                    correlation_id: Some(correlation_id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.correlation_id, correlation_id);
        assert_eq!(reply.responder_id, "echo-1");
        assert_eq!(reply.payload(), Some(&json!({"echo": "hi"})));
    }

    #[tokio::test]
    async fn test_agent_error_is_surfaced_verbatim() {
        let transport = Arc::new(LocalTransport::new());
        transport.handle("catalog-1", |_envelope: MessageEnvelope| async move {
            Err(AgentFault::new("product_not_found", "no product OLJCESPC7Z"))
        });
        let router = setup(transport);
        register(&router, "catalog-1", &["catalog.get@v1"]);

        let err = router
            .request(cap("catalog.get@v1"), json!({"productId": "OLJCESPC7Z"}), RequestContext::default())
            .await
            .unwrap_err();
        match err {
            RoutingError::AgentApplicationError { code, message, .. } => {
                assert_eq!(code, "product_not_found");
                assert_eq!(message, "no product OLJCESPC7Z");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_retried_once_with_same_correlation() {
        let transport = Arc::new(LocalTransport::new());
        transport.handle("slow-1", |_envelope: MessageEnvelope| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!(null))
        });
        let router = setup(Arc::clone(&transport));
        register(&router, "slow-1", &["slow.op@v1"]);

        let err = router
            .request(
                cap("slow.op@v1"),
                json!({}),
                RequestContext {
                    budget: Some(Duration::from_millis(200)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::Timeout { .. }));

        let seen = transport.received();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0].message_id, seen[1].message_id);
        assert_eq!(seen[0].correlation_id, seen[1].correlation_id);
        assert!(seen[1].budget() <= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_open_circuit_falls_over_to_next_candidate() {
        let transport = Arc::new(LocalTransport::new());
        transport.fail("bad-1", TransportError::Connection("refused".into()));
        transport.handle("good-1", |_envelope: MessageEnvelope| async move { Ok(json!("ok")) });
        let router = setup(transport);
        register(&router, "bad-1", &["work.do@v1"]);
        register(&router, "good-1", &["work.do@v1"]);

        let mut served_by_good = 0;
        for _ in 0..12 {
            if let Ok(reply) = router
                .send(&MessageEnvelope::new("test", cap("work.do@v1"), json!({}), Duration::from_secs(1)))
                .await
            {
                assert_eq!(reply.responder_id, "good-1");
                served_by_good += 1;
            }
        }
        // bad-1 fails until its circuit opens (5 failures), then every call
        // lands on good-1.
        assert_eq!(served_by_good, 12 - 5);
    }

    #[tokio::test]
    async fn test_agent_giving_up_at_deadline_is_a_timeout() {
        let transport = Arc::new(LocalTransport::new());
        transport.handle("slow-1", |_envelope: MessageEnvelope| async move {
            Err(AgentFault::new(DEADLINE_EXCEEDED, "Handler did not finish before the deadline"))
        });
        let router = setup(transport);
        register(&router, "slow-1", &["slow.op@v1"]);

        let err = router
            .send(&MessageEnvelope::new("test", cap("slow.op@v1"), json!({}), Duration::from_secs(1)))
            .await
            .unwrap_err();
        match &err {
            RoutingError::Timeout { agent_id, .. } => {
                assert_eq!(agent_id.as_ref().map(AgentId::as_str), Some("slow-1"))
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(err.is_circuit_failure());
        assert_eq!(router.breaker().snapshot()[0].counters.failures, 1);
    }

    #[tokio::test]
    async fn test_notify_is_one_way() {
        let transport = Arc::new(LocalTransport::new());
        transport.handle("mailer-1", |_envelope: MessageEnvelope| async move {
            Err(AgentFault::new("template_missing", "no template for price_drop"))
        });
        let router = setup(Arc::clone(&transport));
        register(&router, "mailer-1", &["marketing.notify@v1"]);

        let envelope = MessageEnvelope::new(
            "pricing-1",
            cap("marketing.notify@v1"),
            json!({"type": "price_drop", "sku": "OLJCESPC7Z"}),
            Duration::from_secs(1),
        );
        for _ in 0..6 {
            let agent_id = router.notify(&envelope).await.unwrap();
            assert_eq!(agent_id.as_str(), "mailer-1");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = transport.received_by("mailer-1");
        assert_eq!(seen.len(), 6);
        assert!(seen.iter().all(|e| e.kind == MessageKind::Notification));
        // Handler rejections never reach the circuit as failures.
        let circuit = &router.breaker().snapshot()[0];
        assert_eq!(circuit.counters.failures, 0);
        assert_eq!(circuit.phase, crate::domain::circuit::CircuitPhase::Closed);
    }

    #[tokio::test]
    async fn test_notify_without_agents_is_unroutable() {
        let transport = Arc::new(LocalTransport::new());
        let router = setup(Arc::clone(&transport));
        let envelope = MessageEnvelope::notification(
            "pricing-1",
            cap("nobody.listens@v1"),
            json!({}),
            Duration::from_secs(1),
        );

        assert!(matches!(
            router.notify(&envelope).await,
            Err(RoutingError::Unroutable { .. })
        ));
        assert!(matches!(
            router.broadcast_notify(&envelope).await,
            Err(RoutingError::Unroutable { .. })
        ));
        assert!(transport.received().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_notify_reaches_every_agent() {
        let transport = Arc::new(LocalTransport::new());
        for id in ["stylist-1", "mailer-1", "chat-1"] {
            transport.handle(id, |_envelope: MessageEnvelope| async move { Ok(json!(null)) });
        }
        let router = setup(Arc::clone(&transport));
        for id in ["stylist-1", "mailer-1", "chat-1"] {
            register(&router, id, &["catalog.changed@v1"]);
        }

        let envelope = MessageEnvelope::notification(
            "pricing-1",
            cap("catalog.changed@v1"),
            json!({"type": "price_change"}),
            Duration::from_secs(1),
        )
        .with_priority(crate::domain::envelope::MessagePriority::High);
        assert_eq!(router.broadcast_notify(&envelope).await.unwrap(), 3);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = transport.received();
        assert_eq!(seen.len(), 3);
        let ids: std::collections::BTreeSet<_> = seen.iter().map(|e| e.message_id.0).collect();
        assert_eq!(ids.len(), 3);
        assert!(seen.iter().all(|e| e.correlation_id == envelope.correlation_id
            && e.priority == crate::domain::envelope::MessagePriority::High));
    }

    #[tokio::test]
    async fn test_broadcast_quorum() {
        let transport = Arc::new(LocalTransport::new());
        for id in ["a", "b", "c"] {
            transport.handle(id, |envelope: MessageEnvelope| async move { Ok(envelope.payload) });
        }
        transport.fail("d", TransportError::Connection("refused".into()));
        let router = setup(transport);
        for id in ["a", "b", "c", "d"] {
            register(&router, id, &["vote.cast@v1"]);
        }

        let envelope = MessageEnvelope::new("test", cap("vote.cast@v1"), json!(1), Duration::from_secs(1));
        let broadcast = router.broadcast(&envelope).unwrap();
        assert_eq!(broadcast.expected(), 4);
        let replies = broadcast.quorum(3).await.unwrap();
        assert_eq!(replies.len(), 3);
        assert!(replies.iter().all(|r| r.correlation_id == envelope.correlation_id));

        let all = router.broadcast(&envelope).unwrap().collect_all().await;
        assert_eq!(all.len(), 4);
        assert_eq!(all.iter().filter(|r| r.result.is_err()).count(), 1);

        let too_many = router.broadcast(&envelope).unwrap().quorum(4).await;
        assert!(too_many.is_err());
    }
}
