// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP API
//!
//! JSON surface of the mesh daemon: agent lifecycle, capability discovery,
//! envelope routing, workflow runs (with SSE progress) and the three gateways.
//!
//! # Architecture
//!
//! - **Layer:** Presentation
//! - **Purpose:** Translate HTTP requests into application service calls
//! - **Errors:** Every module error maps to a status code through [`ApiError`]
//! - **Signing:** With a [`MessageSigner`] installed, envelopes and agent
//!   registrations must carry a valid signature or are refused with 401

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::gateway::{
    AnalyticsRequest, CommerceRequest, GatewayRequest, GatewayService, InferenceRequest,
    ANONYMOUS_CLIENT,
};
use crate::application::orchestrator::{InvokeOptions, OrchestratorError, WorkflowOrchestrator};
use crate::application::registry::{AgentRegistry, RegistryError};
use crate::application::router::MessageRouter;
use crate::domain::agent::{AgentId, AgentRegistration, HealthState};
use crate::domain::capability::CapabilityName;
use crate::domain::envelope::{CorrelationId, MessageEnvelope, MessageKind, MAX_BUDGET};
use crate::domain::events::WorkflowEvent;
use crate::domain::routing::RoutingError;
use crate::domain::workflow::{RunId, WorkflowName};
use crate::infrastructure::event_bus::{EventBus, EventBusError};
use crate::infrastructure::signing::{MessageSigner, Signable, SignatureError};

/// Header carrying the caller identity used for gateway rate limiting.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

const DEFAULT_RUN_LIST_LIMIT: usize = 50;

// ============================================================================
// State
// ============================================================================

pub struct AppState {
    pub registry: Arc<AgentRegistry>,
    pub router: Arc<MessageRouter>,
    pub orchestrator: Arc<WorkflowOrchestrator>,
    pub gateway: Arc<GatewayService>,
    pub event_bus: EventBus,
    pub metrics: Option<PrometheusHandle>,
    pub signer: Option<MessageSigner>,
    pub started: Instant,
}

impl AppState {
    pub fn new(
        registry: Arc<AgentRegistry>,
        router: Arc<MessageRouter>,
        orchestrator: Arc<WorkflowOrchestrator>,
        gateway: Arc<GatewayService>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            registry,
            router,
            orchestrator,
            gateway,
            event_bus,
            metrics: None,
            signer: None,
            started: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn with_signer(mut self, signer: MessageSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Accepts anything when no signer is installed.
    fn verify<T: Signable>(&self, record: &T) -> Result<(), ApiError> {
        match &self.signer {
            Some(signer) => signer.verify(record).map_err(ApiError::from),
            None => Ok(()),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .route("/v1/agents", post(register_agent).get(list_agents))
        .route("/v1/agents/{id}", axum::routing::delete(deregister_agent))
        .route("/v1/agents/{id}/heartbeat", post(heartbeat))
        .route("/v1/capabilities", get(list_capabilities))
        .route("/v1/capabilities/{capability}/agents", get(resolve_capability))
        .route("/v1/circuits", get(list_circuits))
        .route("/v1/messages", post(route_message))
        .route("/v1/notifications", post(notify))
        .route("/v1/notifications/broadcast", post(broadcast_notify))
        .route("/v1/workflows", get(list_workflows))
        .route("/v1/workflows/{name}/runs", post(invoke_workflow))
        .route("/v1/runs", get(list_runs))
        .route("/v1/runs/{id}", get(get_run))
        .route("/v1/runs/{id}/cancel", post(cancel_run))
        .route("/v1/runs/{id}/events", get(stream_run_events))
        .route("/v1/gateway/commerce", post(gateway::<CommerceRequest>))
        .route("/v1/gateway/analytics", post(gateway::<AnalyticsRequest>))
        .route("/v1/gateway/inference", post(gateway::<InferenceRequest>))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        let status = match &e {
            RegistryError::UnknownAgent(_) => StatusCode::NOT_FOUND,
            RegistryError::CapabilitySetChanged(_) => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        };
        let code = match &e {
            RegistryError::UnknownAgent(_) => "unknown_agent",
            RegistryError::CapabilitySetChanged(_) => "capability_set_changed",
            _ => "invalid_registration",
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<SignatureError> for ApiError {
    fn from(e: SignatureError) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, e.code(), e.to_string())
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        let (status, code) = match &e {
            OrchestratorError::UnknownWorkflow(_) => (StatusCode::NOT_FOUND, "unknown_workflow"),
            OrchestratorError::RunNotFound(_) => (StatusCode::NOT_FOUND, "run_not_found"),
            OrchestratorError::AlreadyTerminal(_) => (StatusCode::CONFLICT, "run_terminal"),
            OrchestratorError::Definition(_) => (StatusCode::BAD_REQUEST, "invalid_workflow"),
            OrchestratorError::Repository(_) => (StatusCode::INTERNAL_SERVER_ERROR, "repository"),
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<RoutingError> for ApiError {
    fn from(e: RoutingError) -> Self {
        let status = match &e {
            RoutingError::Unroutable { .. } | RoutingError::CircuitOpen { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RoutingError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RoutingError::AgentApplicationError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            RoutingError::Transport { .. } | RoutingError::MalformedReply { .. } => {
                StatusCode::BAD_GATEWAY
            }
        };
        Self::new(status, e.code(), e.to_string())
    }
}

fn agent_id(raw: String) -> Result<AgentId, ApiError> {
    AgentId::new(raw).map_err(|e| ApiError::bad_request(e.to_string()))
}

fn run_id(raw: &str) -> Result<RunId, ApiError> {
    Uuid::parse_str(raw)
        .map(RunId)
        .map_err(|_| ApiError::bad_request(format!("'{}' is not a run id", raw)))
}

// ============================================================================
// Daemon
// ============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": state.started.elapsed().as_secs(),
        "agents": state.registry.list().len(),
        "activeRuns": state.orchestrator.active_runs(),
        "eventSubscribers": state.event_bus.subscriber_count(),
    }))
}

async fn render_metrics(State(state): State<Arc<AppState>>) -> Result<String, ApiError> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or_else(|| ApiError::not_found("metrics are disabled"))
}

// ============================================================================
// Agents & Capabilities
// ============================================================================

async fn register_agent(
    State(state): State<Arc<AppState>>,
    Json(registration): Json<AgentRegistration>,
) -> Result<impl IntoResponse, ApiError> {
    state.verify(&registration)?;
    let descriptor = state.registry.register(registration)?;
    Ok((StatusCode::CREATED, Json(descriptor)))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.list())
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    #[serde(default = "reported_healthy")]
    health: HealthState,
}

fn reported_healthy() -> HealthState {
    HealthState::Healthy
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<HeartbeatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.health == HealthState::Unreachable {
        return Err(ApiError::bad_request(
            "an agent cannot report itself unreachable",
        ));
    }
    let descriptor = state.registry.heartbeat(&agent_id(id)?, request.health)?;
    Ok(Json(descriptor))
}

async fn deregister_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let descriptor = state.registry.deregister(&agent_id(id)?)?;
    Ok(Json(descriptor))
}

async fn list_capabilities(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.capabilities())
}

async fn resolve_capability(
    State(state): State<Arc<AppState>>,
    Path(capability): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let capability =
        CapabilityName::new(capability).map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(state.registry.resolve(&capability)))
}

async fn list_circuits(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.router.breaker().snapshot())
}

// ============================================================================
// Messages
// ============================================================================

/// Signature and budget checks shared by every envelope entry point.
fn admit_envelope(state: &AppState, envelope: &MessageEnvelope) -> Result<(), ApiError> {
    state.verify(envelope)?;
    if envelope.budget() > MAX_BUDGET {
        return Err(ApiError::bad_request(format!(
            "deadline is {} after the timestamp; the maximum budget is 24h",
            humantime::format_duration(envelope.budget())
        )));
    }
    Ok(())
}

async fn route_message(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<MessageEnvelope>,
) -> Result<Response, ApiError> {
    admit_envelope(&state, &envelope)?;
    debug!(
        correlation_id = %envelope.correlation_id,
        capability = %envelope.capability,
        source_id = %envelope.source_id,
        priority = envelope.priority.as_str(),
        "Routing envelope received over HTTP"
    );
    if envelope.kind == MessageKind::Notification {
        let agent_id = state.router.notify(&envelope).await?;
        return Ok((StatusCode::ACCEPTED, Json(json!({ "agentId": agent_id }))).into_response());
    }
    let reply = state.router.send_with_retry(&envelope, None).await?;
    Ok(Json(reply).into_response())
}

async fn notify(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<MessageEnvelope>,
) -> Result<impl IntoResponse, ApiError> {
    admit_envelope(&state, &envelope)?;
    let agent_id = state.router.notify(&envelope).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "agentId": agent_id }))))
}

async fn broadcast_notify(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<MessageEnvelope>,
) -> Result<impl IntoResponse, ApiError> {
    admit_envelope(&state, &envelope)?;
    let delivered = state.router.broadcast_notify(&envelope).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "delivered": delivered }))))
}

// ============================================================================
// Workflows & Runs
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowSummary {
    name: WorkflowName,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    deadline: Option<Duration>,
    steps: Vec<String>,
}

async fn list_workflows(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let summaries: Vec<WorkflowSummary> = state
        .orchestrator
        .definitions()
        .await?
        .iter()
        .map(|definition| WorkflowSummary {
            name: definition.name.clone(),
            version: definition.version.clone(),
            description: definition.description.clone(),
            deadline: definition.deadline,
            steps: definition.steps.iter().map(|s| s.id.to_string()).collect(),
        })
        .collect();
    Ok(Json(summaries))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvokeRunRequest {
    #[serde(default)]
    input: serde_json::Value,
    #[serde(default, with = "humantime_serde")]
    deadline: Option<Duration>,
    #[serde(default)]
    correlation_id: Option<CorrelationId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunAccepted {
    run_id: RunId,
    correlation_id: CorrelationId,
}

async fn invoke_workflow(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<InvokeRunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = WorkflowName::new(name).map_err(|e| ApiError::bad_request(e.to_string()))?;
    if let Some(deadline) = request.deadline.filter(|d| *d > MAX_BUDGET) {
        return Err(ApiError::bad_request(format!(
            "deadline {} exceeds the maximum budget of 24h",
            humantime::format_duration(deadline)
        )));
    }
    let handle = state
        .orchestrator
        .invoke(
            &name,
            request.input,
            InvokeOptions {
                correlation_id: request.correlation_id,
                deadline: request.deadline,
            },
        )
        .await?;
    info!(workflow = %name, run_id = %handle.run_id, "Workflow run accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            run_id: handle.run_id,
            correlation_id: handle.correlation_id,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct ListRunsQuery {
    limit: Option<usize>,
}

async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRunsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let runs = state
        .orchestrator
        .list_runs(query.limit.unwrap_or(DEFAULT_RUN_LIST_LIMIT))
        .await?;
    Ok(Json(runs))
}

async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let run = state.orchestrator.get_run(run_id(&id)?).await?;
    Ok(Json(run))
}

async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let run_id = run_id(&id)?;
    state.orchestrator.cancel(run_id).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "runId": run_id }))))
}

fn event_name(event: &WorkflowEvent) -> &'static str {
    match event {
        WorkflowEvent::RunStarted { .. } => "run_started",
        WorkflowEvent::StepDispatched { .. } => "step_dispatched",
        WorkflowEvent::StepSettled { .. } => "step_settled",
        WorkflowEvent::RunFinished { .. } => "run_finished",
    }
}

/// Server-sent events for one run: a `snapshot` of the current state, then
/// every workflow event until the run finishes.
async fn stream_run_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let run_id = run_id(&id)?;
    // Subscribe before reading the snapshot so no event falls in between.
    let receiver = state.event_bus.subscribe_run(run_id);
    let run = state.orchestrator.get_run(run_id).await?;

    let snapshot = Event::default()
        .event("snapshot")
        .data(serde_json::to_string(&run).unwrap_or_default());
    let receiver = (!run.status.is_terminal()).then_some(receiver);

    let events = stream::unfold((Some(snapshot), receiver), |(first, receiver)| async move {
        if let Some(first) = first {
            return Some((Ok::<_, Infallible>(first), (None, receiver)));
        }
        let mut receiver = receiver?;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .event(event_name(&event))
                        .data(serde_json::to_string(&event).unwrap_or_default());
                    let next = (!event.is_terminal()).then_some(receiver);
                    return Some((Ok::<_, Infallible>(sse), (None, next)));
                }
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ============================================================================
// Gateways
// ============================================================================

async fn gateway<R: GatewayRequest>(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let client = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(ANONYMOUS_CLIENT);

    let response = state.gateway.handle_json::<R>(client, body).await;
    let status =
        StatusCode::from_u16(response.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::circuit_breaker::CircuitBreaker;
    use crate::application::orchestrator::OrchestratorSettings;
    use crate::application::registry::RegistrySettings;
    use crate::application::router::RouterSettings;
    use crate::domain::circuit::CircuitPolicy;
    use crate::domain::mesh_config::GatewayConfig;
    use crate::infrastructure::repositories::{
        InMemoryWorkflowDefinitionRepository, InMemoryWorkflowRunRepository,
    };
    use crate::infrastructure::transport::local::LocalTransport;
    use crate::infrastructure::workflow_parser::WorkflowParser;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const ECHO_WORKFLOW: &str = r#"
apiVersion: a2a-mesh/v1
kind: Workflow
metadata:
  name: echo
spec:
  steps:
    - id: echo
      capability: test.echo@v1
"#;

    async fn state(transport: Arc<LocalTransport>) -> AppState {
        let bus = EventBus::new(256);
        let registry = Arc::new(AgentRegistry::new(RegistrySettings::default(), bus.clone()));
        let breaker = Arc::new(CircuitBreaker::new(CircuitPolicy::default(), bus.clone()));
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&registry),
            breaker,
            transport,
            RouterSettings::default(),
        ));
        let orchestrator = Arc::new(WorkflowOrchestrator::new(
            Arc::clone(&router),
            Arc::new(InMemoryWorkflowDefinitionRepository::new()),
            Arc::new(InMemoryWorkflowRunRepository::new(16)),
            bus.clone(),
            OrchestratorSettings::default(),
        ));
        orchestrator
            .register_definition(WorkflowParser::parse_yaml(ECHO_WORKFLOW).unwrap())
            .await
            .unwrap();
        let gateway = Arc::new(GatewayService::new(
            Arc::clone(&router),
            Arc::clone(&orchestrator),
            &GatewayConfig::default(),
        ));
        AppState::new(registry, router, orchestrator, gateway, bus)
    }

    fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_register_then_resolve() {
        let app = app(state(Arc::new(LocalTransport::new())).await);

        let response = app
            .clone()
            .oneshot(post(
                "/v1/agents",
                json!({
                    "id": "rec-1",
                    "capabilities": ["recommend.products@v1"],
                    "endpoint": "http://rec-1.local:9000"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(
                Request::get("/v1/capabilities/recommend.products@v1/agents")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let agents = body_json(response).await;
        assert_eq!(agents.as_array().unwrap().len(), 1);
        assert_eq!(agents[0]["id"], "rec-1");
    }

    #[tokio::test]
    async fn test_heartbeat_for_unknown_agent_is_404() {
        let app = app(state(Arc::new(LocalTransport::new())).await);
        let response = app
            .oneshot(post("/v1/agents/ghost/heartbeat", json!({"health": "healthy"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "unknown_agent");
    }

    #[tokio::test]
    async fn test_unroutable_message_is_503() {
        let transport = Arc::new(LocalTransport::new());
        let app = app(state(Arc::clone(&transport)).await);
        let envelope = MessageEnvelope::new(
            "tester",
            CapabilityName::new("nobody.home@v1").unwrap(),
            json!({}),
            Duration::from_secs(1),
        );

        let response = app
            .oneshot(post("/v1/messages", serde_json::to_value(&envelope).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["error"]["code"], "unroutable");
        assert!(transport.received().is_empty());
    }

    #[tokio::test]
    async fn test_invoke_and_poll_run() {
        let transport = Arc::new(LocalTransport::new());
        transport.handle("echo-1", |envelope| async move { Ok(envelope.payload) });
        let state = state(Arc::clone(&transport)).await;
        state
            .registry
            .register(AgentRegistration::new(
                AgentId::new("echo-1").unwrap(),
                "http://echo-1.local",
                ["test.echo@v1"],
            ))
            .unwrap();
        let orchestrator = Arc::clone(&state.orchestrator);
        let app = app(state);

        let response = app
            .clone()
            .oneshot(post("/v1/workflows/echo/runs", json!({"input": {"hello": "mesh"}})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let accepted = body_json(response).await;
        let run_id = accepted["runId"].as_str().unwrap().to_string();

        orchestrator
            .wait(RunId(Uuid::parse_str(&run_id).unwrap()))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::get(format!("/v1/runs/{}", run_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let run = body_json(response).await;
        assert_eq!(run["status"], "completed");
        assert_eq!(run["correlationId"], accepted["correlationId"]);
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_404() {
        let app = app(state(Arc::new(LocalTransport::new())).await);
        let response = app
            .oneshot(post("/v1/workflows/missing/runs", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_gateway_rejects_unknown_operation() {
        let app = app(state(Arc::new(LocalTransport::new())).await);
        let response = app
            .oneshot(post("/v1/gateway/commerce", json!({"operation": "teleport"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_gateway_degrades_to_default() {
        let app = app(state(Arc::new(LocalTransport::new())).await);
        let mut request = post("/v1/gateway/commerce", json!({"operation": "list_products"}));
        request
            .headers_mut()
            .insert(CLIENT_ID_HEADER, "storefront".parse().unwrap());

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["data"], json!({"products": []}));
        assert_eq!(body["degraded"][0]["fallback"], "default");
    }

    #[tokio::test]
    async fn test_huge_deadlines_are_rejected() {
        let transport = Arc::new(LocalTransport::new());
        let app = app(state(Arc::clone(&transport)).await);

        let response = app
            .clone()
            .oneshot(post(
                "/v1/workflows/echo/runs",
                json!({"input": {}, "deadline": "300000years"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut envelope = MessageEnvelope::new(
            "tester",
            CapabilityName::new("test.echo@v1").unwrap(),
            json!({}),
            Duration::from_secs(1),
        );
        envelope.deadline = chrono::DateTime::<chrono::Utc>::MAX_UTC;
        let response = app
            .oneshot(post("/v1/messages", serde_json::to_value(&envelope).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(transport.received().is_empty());
    }

    #[tokio::test]
    async fn test_signed_mesh_refuses_unsigned_or_tampered_input() {
        let transport = Arc::new(LocalTransport::new());
        transport.handle("echo-1", |envelope| async move { Ok(envelope.payload) });
        let signer = MessageSigner::new("mesh-shared-secret").unwrap();
        let app = app(state(Arc::clone(&transport)).await.with_signer(signer.clone()));

        let mut registration = AgentRegistration::new(
            AgentId::new("echo-1").unwrap(),
            "http://echo-1.local",
            ["test.echo@v1"],
        );
        let response = app
            .clone()
            .oneshot(post("/v1/agents", serde_json::to_value(&registration).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "missing_signature");

        signer.seal(&mut registration).unwrap();
        let response = app
            .clone()
            .oneshot(post("/v1/agents", serde_json::to_value(&registration).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let mut envelope = MessageEnvelope::new(
            "tester",
            CapabilityName::new("test.echo@v1").unwrap(),
            json!({"amount": 10}),
            Duration::from_secs(1),
        );
        signer.seal(&mut envelope).unwrap();
        let mut tampered = envelope.clone();
        tampered.payload = json!({"amount": 10_000});

        let response = app
            .clone()
            .oneshot(post("/v1/messages", serde_json::to_value(&tampered).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "invalid_signature");
        assert!(transport.received().is_empty());

        let response = app
            .oneshot(post("/v1/messages", serde_json::to_value(&envelope).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["outcome"]["payload"],
            json!({"amount": 10})
        );
    }

    #[tokio::test]
    async fn test_notifications_are_accepted_without_waiting() {
        let transport = Arc::new(LocalTransport::new());
        transport.handle("mailer-1", |_envelope| async move { Ok(json!(null)) });
        transport.handle("mailer-2", |_envelope| async move { Ok(json!(null)) });
        let state = state(Arc::clone(&transport)).await;
        for id in ["mailer-1", "mailer-2"] {
            state
                .registry
                .register(AgentRegistration::new(
                    AgentId::new(id).unwrap(),
                    format!("http://{}.local", id),
                    ["marketing.notify@v1"],
                ))
                .unwrap();
        }
        let app = app(state);
        let envelope = MessageEnvelope::notification(
            "pricing-1",
            CapabilityName::new("marketing.notify@v1").unwrap(),
            json!({"type": "price_drop"}),
            Duration::from_secs(1),
        );

        let response = app
            .clone()
            .oneshot(post("/v1/notifications", serde_json::to_value(&envelope).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(body_json(response).await["agentId"].is_string());

        let response = app
            .oneshot(post(
                "/v1/notifications/broadcast",
                serde_json::to_value(&envelope).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["delivered"], 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.received().len(), 3);
    }

    #[tokio::test]
    async fn test_metrics_disabled_is_404() {
        let app = app(state(Arc::new(LocalTransport::new())).await);
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
