// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Gateway Servers
//!
//! Translate external request shapes into capability calls or workflow runs.
//!
//! # Architecture
//!
//! - **Layer:** Application
//! - **Purpose:** Edge of the mesh for commerce, analytics and inference clients
//! - **Collaborators:** [`MessageRouter`], [`WorkflowOrchestrator`]; never an
//!   agent endpoint directly
//!
//! # Request Pipeline
//!
//! ```text
//! validate -> normalize -> fingerprint -> rate limit -> cache -> router/orchestrator
//! ```
//!
//! Identical normalized requests share a fingerprint, so they share a cache
//! entry and concurrent misses coalesce into one downstream call. When the
//! upstream fails the gateway answers `degraded` with the last cached value
//! or the operation's static default.

pub mod analytics;
pub mod commerce;
pub mod inference;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::application::orchestrator::{InvokeOptions, WorkflowOrchestrator};
use crate::application::router::{MessageRouter, RequestContext};
use crate::domain::capability::CapabilityName;
use crate::domain::envelope::CorrelationId;
use crate::domain::mesh_config::{CacheConfig, GatewayConfig};
use crate::domain::routing::RoutingError;
use crate::domain::workflow::{RunStatus, StepState, WorkflowName};
use crate::infrastructure::rate_limiter::ClientRateLimiter;
use crate::infrastructure::response_cache::ResponseCache;

pub use analytics::AnalyticsRequest;
pub use commerce::CommerceRequest;
pub use inference::InferenceRequest;

/// Client id used when a caller does not identify itself.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

// ============================================================================
// Request Contract
// ============================================================================

/// How long a successful answer may be served from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    /// Catalog metadata and other slow-changing data
    Static,
    /// Inventory, carts, recommendations
    Volatile,
    /// Live analytics
    Realtime,
    /// Mutations and non-deterministic generation
    Uncacheable,
}

/// Downstream target of one gateway operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Capability {
        capability: &'static str,
        payload: serde_json::Value,
    },
    Workflow {
        name: &'static str,
        input: serde_json::Value,
    },
}

/// A typed gateway request. Implementations are internally tagged enums
/// (`{"operation": "...", ...params}`).
pub trait GatewayRequest: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Versioned gateway name, e.g. `commerce@v1`.
    const GATEWAY: &'static str;

    fn operation(&self) -> &'static str;

    fn validate(&self) -> Result<(), GatewayError>;

    /// Canonical form of the request; equal requests must normalize equal.
    fn normalize(self) -> Self {
        self
    }

    fn volatility(&self) -> Volatility;

    fn plan(&self) -> Dispatch;

    /// Static answer served when the upstream fails and nothing is cached.
    fn fallback_default(&self) -> Option<serde_json::Value> {
        None
    }
}

/// The request's parameters: its JSON form minus the operation tag.
pub(crate) fn params<R: Serialize>(request: &R) -> serde_json::Value {
    let mut value = serde_json::to_value(request).unwrap_or(serde_json::Value::Null);
    if let Some(map) = value.as_object_mut() {
        map.remove("operation");
    }
    value
}

/// SHA-256 over the canonical JSON of `{gateway, operation, params}`.
pub fn fingerprint<R: GatewayRequest>(request: &R) -> String {
    let subject = serde_json::json!({
        "gateway": R::GATEWAY,
        "operation": request.operation(),
        "params": params(request),
    });
    let mut canonical = String::new();
    write_canonical(&subject, &mut canonical);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Degraded,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackSource {
    Cached,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedCapability {
    pub capability: String,
    pub fallback: FallbackSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub status: ResponseStatus,
    pub data: serde_json::Value,
    #[serde(default)]
    pub degraded: Vec<DegradedCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub correlation_id: CorrelationId,
    /// Served from cache without a downstream call.
    #[serde(default)]
    pub cached: bool,
}

impl GatewayResponse {
    fn failed(error: &GatewayError, correlation_id: CorrelationId) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: serde_json::Value::Null,
            degraded: Vec::new(),
            error: Some(ErrorBody {
                code: error.code().to_string(),
                message: error.to_string(),
            }),
            correlation_id,
            cached: false,
        }
    }

    /// HTTP status the presentation layer answers with.
    pub fn status_code(&self) -> u16 {
        match (&self.status, &self.error) {
            (ResponseStatus::Error, Some(error)) => match error.code.as_str() {
                "invalid_request" => 400,
                "rate_limited" => 429,
                "upstream_unavailable" => 503,
                _ => 422,
            },
            (ResponseStatus::Error, None) => 500,
            _ => 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Rate limit exceeded, retry in {}ms", .retry_after.as_millis())]
    RateLimited { retry_after: Duration },

    /// Domain error raised by the agent; passed through with its code.
    #[error("{message}")]
    Rejected { code: String, message: String },

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    pub fn code(&self) -> &str {
        match self {
            GatewayError::Validation(_) => "invalid_request",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::Rejected { code, .. } => code,
            GatewayError::Unavailable(_) => "upstream_unavailable",
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        GatewayError::Validation(reason.into())
    }
}

// ============================================================================
// Gateway Service
// ============================================================================

/// Successful downstream answer as cached.
#[derive(Debug, Clone)]
pub struct Upstream {
    data: serde_json::Value,
    degraded: Vec<DegradedCapability>,
}

#[derive(Debug)]
struct UpstreamFailure {
    capability: String,
    reason: String,
    rejected: Option<(String, String)>,
}

pub struct GatewayService {
    router: Arc<MessageRouter>,
    orchestrator: Arc<WorkflowOrchestrator>,
    cache: ResponseCache<Upstream>,
    limiter: ClientRateLimiter,
    ttls: CacheConfig,
}

impl GatewayService {
    pub fn new(
        router: Arc<MessageRouter>,
        orchestrator: Arc<WorkflowOrchestrator>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            router,
            orchestrator,
            cache: ResponseCache::new(config.cache.capacity),
            limiter: ClientRateLimiter::from(&config.rate_limit),
            ttls: config.cache.clone(),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Drops idle rate-limiter state.
    pub fn prune(&self) {
        self.limiter.prune();
    }

    fn ttl(&self, volatility: Volatility) -> Option<Duration> {
        match volatility {
            Volatility::Static => Some(self.ttls.ttl_static),
            Volatility::Volatile => Some(self.ttls.ttl_volatile),
            Volatility::Realtime => Some(self.ttls.ttl_realtime),
            Volatility::Uncacheable => None,
        }
    }

    /// Runs one request through the pipeline. Never fails: errors become an
    /// `error` response carrying a stable code.
    pub async fn handle<R: GatewayRequest>(&self, client: &str, request: R) -> GatewayResponse {
        let started = Instant::now();
        let operation = request.operation();
        let correlation_id = CorrelationId::new();

        let response = match self.process(client, request, correlation_id).await {
            Ok(response) => response,
            Err(e) => {
                debug!(
                    gateway = R::GATEWAY,
                    operation,
                    client,
                    code = e.code(),
                    "Gateway request rejected"
                );
                GatewayResponse::failed(&e, correlation_id)
            }
        };

        let status = match response.status {
            ResponseStatus::Ok => "ok",
            ResponseStatus::Degraded => "degraded",
            ResponseStatus::Error => "error",
        };
        metrics::counter!(
            "a2a_gateway_requests_total",
            "gateway" => R::GATEWAY,
            "operation" => operation,
            "status" => status
        )
        .increment(1);
        metrics::histogram!(
            "a2a_gateway_latency_seconds",
            "gateway" => R::GATEWAY,
            "operation" => operation
        )
        .record(started.elapsed().as_secs_f64());
        response
    }

    /// Decodes a raw JSON body as `R` and handles it. Bodies that do not
    /// match any operation answer `invalid_request`.
    pub async fn handle_json<R: GatewayRequest>(
        &self,
        client: &str,
        body: serde_json::Value,
    ) -> GatewayResponse {
        match serde_json::from_value::<R>(body) {
            Ok(request) => self.handle(client, request).await,
            Err(e) => {
                metrics::counter!(
                    "a2a_gateway_requests_total",
                    "gateway" => R::GATEWAY,
                    "operation" => "unknown",
                    "status" => "error"
                )
                .increment(1);
                GatewayResponse::failed(&GatewayError::invalid(e.to_string()), CorrelationId::new())
            }
        }
    }

    async fn process<R: GatewayRequest>(
        &self,
        client: &str,
        request: R,
        correlation_id: CorrelationId,
    ) -> Result<GatewayResponse, GatewayError> {
        request.validate()?;
        let request = request.normalize();
        let key = fingerprint(&request);

        self.limiter.check(client).map_err(|retry_after| {
            metrics::counter!("a2a_gateway_rate_limited_total", "gateway" => R::GATEWAY).increment(1);
            GatewayError::RateLimited { retry_after }
        })?;

        let plan = request.plan();
        let source = format!("gateway:{}", R::GATEWAY);
        let fetched = match self.ttl(request.volatility()) {
            Some(ttl) => self
                .cache
                .get_or_try_insert(&key, ttl, || self.execute(&plan, &source, correlation_id))
                .await
                .map(|lookup| (lookup.value, lookup.hit)),
            None => self
                .execute(&plan, &source, correlation_id)
                .await
                .map(|upstream| (upstream, false)),
        };

        let failure = match fetched {
            Ok((upstream, hit)) => {
                if hit {
                    metrics::counter!("a2a_gateway_cache_hits_total", "gateway" => R::GATEWAY).increment(1);
                }
                let status = if upstream.degraded.is_empty() {
                    ResponseStatus::Ok
                } else {
                    ResponseStatus::Degraded
                };
                return Ok(GatewayResponse {
                    status,
                    data: upstream.data,
                    degraded: upstream.degraded,
                    error: None,
                    correlation_id,
                    cached: hit,
                });
            }
            Err(failure) => failure,
        };

        if let Some((code, message)) = failure.rejected {
            return Err(GatewayError::Rejected { code, message });
        }

        let fallback = self
            .cache
            .get_stale(&key)
            .map(|stale| (stale.data, FallbackSource::Cached))
            .or_else(|| {
                request
                    .fallback_default()
                    .map(|default| (default, FallbackSource::Default))
            });
        match fallback {
            Some((data, source)) => {
                warn!(
                    gateway = R::GATEWAY,
                    operation = request.operation(),
                    correlation_id = %correlation_id,
                    capability = %failure.capability,
                    reason = %failure.reason,
                    fallback = ?source,
                    "Serving degraded gateway response"
                );
                Ok(GatewayResponse {
                    status: ResponseStatus::Degraded,
                    data,
                    degraded: vec![DegradedCapability {
                        capability: failure.capability,
                        fallback: source,
                    }],
                    error: None,
                    correlation_id,
                    cached: false,
                })
            }
            None => Err(GatewayError::Unavailable(failure.reason)),
        }
    }

    async fn execute(
        &self,
        plan: &Dispatch,
        source: &str,
        correlation_id: CorrelationId,
    ) -> Result<Upstream, UpstreamFailure> {
        match plan {
            Dispatch::Capability { capability, payload } => {
                let capability = CapabilityName::new(*capability).map_err(|e| UpstreamFailure {
                    capability: capability.to_string(),
                    reason: e.to_string(),
                    rejected: None,
                })?;
                let context = RequestContext {
                    correlation_id: Some(correlation_id),
                    source_id: Some(source.to_string()),
                    ..Default::default()
                };
                match self.router.request(capability.clone(), payload.clone(), context).await {
                    Ok(reply) => Ok(Upstream {
                        data: reply.into_payload().unwrap_or(serde_json::Value::Null),
                        degraded: Vec::new(),
                    }),
                    Err(RoutingError::AgentApplicationError { code, message, .. }) => {
                        Err(UpstreamFailure {
                            capability: capability.to_string(),
                            reason: message.clone(),
                            rejected: Some((code, message)),
                        })
                    }
                    Err(e) => Err(UpstreamFailure {
                        capability: capability.to_string(),
                        reason: e.to_string(),
                        rejected: None,
                    }),
                }
            }
            Dispatch::Workflow { name, input } => self.run_workflow(name, input.clone(), correlation_id).await,
        }
    }

    async fn run_workflow(
        &self,
        name: &str,
        input: serde_json::Value,
        correlation_id: CorrelationId,
    ) -> Result<Upstream, UpstreamFailure> {
        let unavailable = |reason: String| UpstreamFailure {
            capability: format!("workflow:{}", name),
            reason,
            rejected: None,
        };
        let name = WorkflowName::new(name).map_err(|e| unavailable(e.to_string()))?;
        let definition = self
            .orchestrator
            .definition(&name)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let options = InvokeOptions {
            correlation_id: Some(correlation_id),
            deadline: None,
        };
        let mut handle = self
            .orchestrator
            .invoke(&name, input, options)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let run = handle.wait().await;

        match run.status {
            RunStatus::Completed | RunStatus::PartiallyFailed => {
                let degraded = definition
                    .steps
                    .iter()
                    .filter(|step| run.step_state(&step.id) == Some(StepState::FellBack))
                    .map(|step| DegradedCapability {
                        capability: step.capability.to_string(),
                        fallback: FallbackSource::Default,
                    })
                    .collect();
                let data = run
                    .outputs
                    .into_iter()
                    .map(|(step, output)| (step.to_string(), output))
                    .collect::<serde_json::Map<_, _>>();
                info!(run_id = %run.id, workflow = %name, status = %run.status, "Gateway workflow finished");
                Ok(Upstream {
                    data: serde_json::Value::Object(data),
                    degraded,
                })
            }
            _ => Err(unavailable(
                run.failure
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| format!("run {}", run.status)),
            )),
        }
    }
}
