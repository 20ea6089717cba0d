// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Workflow Orchestrator - Application Service
//
// Executes WorkflowDefinitions as dependency graphs of capability calls.
//
// Each run is driven by one spawned task that owns the WorkflowRun aggregate.
// Ready steps are dispatched concurrently through the MessageRouter; every
// envelope of a run carries the run's correlation id and is bounded by the
// run deadline. Observers read snapshots through a watch channel and progress
// events through the EventBus. Terminal runs are archived in the run
// repository and dropped from the active table.
//
// Cancellation: one CancellationToken per run, a child token per step. The
// driver stops dispatching as soon as the run fails, expires or is cancelled
// and drops every in-flight request.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::router::{MessageRouter, RequestContext};
use crate::domain::envelope::{deadline_after, CorrelationId, ReplyEnvelope, MAX_BUDGET};
use crate::domain::events::WorkflowEvent;
use crate::domain::mesh_config::OrchestratorConfig;
use crate::domain::repository::{
    RepositoryError, WorkflowDefinitionRepository, WorkflowRunRepository,
};
use crate::domain::routing::RoutingError;
use crate::domain::workflow::{
    Readiness, RunFailure, RunId, RunStatus, StepDefinition, StepId, StepPolicy, StepState,
    WorkflowDefinition, WorkflowError, WorkflowName, WorkflowRun, WorkflowValidator,
};
use crate::infrastructure::event_bus::EventBus;

/// A step timeout reported this close to the run deadline is attributed to
/// the run deadline.
const DEADLINE_SLACK: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Run budget when neither the caller nor the definition sets one.
    pub default_deadline: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&OrchestratorConfig::default())
    }
}

impl From<&OrchestratorConfig> for OrchestratorSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            default_deadline: config.default_deadline,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub correlation_id: Option<CorrelationId>,
    /// Aggregate budget for the run, overriding the definition's.
    pub deadline: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Unknown workflow '{0}'")]
    UnknownWorkflow(WorkflowName),

    #[error("Run {0} not found")]
    RunNotFound(RunId),

    #[error("Run {0} has already finished")]
    AlreadyTerminal(RunId),

    #[error("Invalid workflow definition: {0}")]
    Definition(#[from] WorkflowError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

struct ActiveRun {
    cancel: CancellationToken,
    snapshot: watch::Receiver<WorkflowRun>,
}

type StepFuture = BoxFuture<'static, (StepId, Option<Result<ReplyEnvelope, RoutingError>>)>;

pub struct WorkflowOrchestrator {
    router: Arc<MessageRouter>,
    definitions: Arc<dyn WorkflowDefinitionRepository>,
    runs: Arc<dyn WorkflowRunRepository>,
    active: DashMap<RunId, ActiveRun>,
    event_bus: EventBus,
    settings: OrchestratorSettings,
}

impl WorkflowOrchestrator {
    pub fn new(
        router: Arc<MessageRouter>,
        definitions: Arc<dyn WorkflowDefinitionRepository>,
        runs: Arc<dyn WorkflowRunRepository>,
        event_bus: EventBus,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            router,
            definitions,
            runs,
            active: DashMap::new(),
            event_bus,
            settings,
        }
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    // ========================================================================
    // Definitions
    // ========================================================================

    pub async fn register_definition(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<(), OrchestratorError> {
        WorkflowValidator::validate(&definition)?;
        let name = definition.name.clone();
        let steps = definition.steps.len();
        self.definitions.save(definition).await?;
        info!(workflow = %name, steps, "Workflow definition registered");
        Ok(())
    }

    pub async fn definitions(&self) -> Result<Vec<Arc<WorkflowDefinition>>, OrchestratorError> {
        Ok(self.definitions.list_all().await?)
    }

    pub async fn definition(
        &self,
        name: &WorkflowName,
    ) -> Result<Arc<WorkflowDefinition>, OrchestratorError> {
        self.definitions
            .find_by_name(name)
            .await?
            .ok_or_else(|| OrchestratorError::UnknownWorkflow(name.clone()))
    }

    // ========================================================================
    // Runs
    // ========================================================================

    /// Starts a run of `name` and returns immediately.
    pub async fn invoke(
        self: &Arc<Self>,
        name: &WorkflowName,
        input: serde_json::Value,
        options: InvokeOptions,
    ) -> Result<RunHandle, OrchestratorError> {
        let definition = self.definition(name).await?;
        let budget = options
            .deadline
            .or(definition.deadline)
            .unwrap_or(self.settings.default_deadline)
            .min(MAX_BUDGET);
        let correlation_id = options.correlation_id.unwrap_or_default();
        let run = WorkflowRun::new(
            &definition,
            input,
            correlation_id,
            deadline_after(Utc::now(), budget),
        );
        let run_id = run.id;

        let (sender, receiver) = watch::channel(run.clone());
        let cancel = CancellationToken::new();
        self.active.insert(
            run_id,
            ActiveRun {
                cancel: cancel.clone(),
                snapshot: receiver.clone(),
            },
        );

        self.event_bus.publish_workflow_event(WorkflowEvent::RunStarted {
            run_id,
            correlation_id,
            workflow: definition.name.clone(),
            started_at: run.started_at,
        });
        metrics::counter!("a2a_workflow_runs_started_total", "workflow" => definition.name.to_string())
            .increment(1);
        metrics::gauge!("a2a_workflow_runs_active").set(self.active.len() as f64);
        info!(
            run_id = %run_id,
            correlation_id = %correlation_id,
            workflow = %definition.name,
            budget_ms = budget.as_millis() as u64,
            "Workflow run started"
        );

        let orchestrator = Arc::clone(self);
        let token = cancel.clone();
        tokio::spawn(async move { orchestrator.drive(definition, run, sender, token).await });

        Ok(RunHandle {
            run_id,
            correlation_id,
            snapshot: receiver,
            cancel,
        })
    }

    /// Current state of a run, live or archived.
    pub async fn get_run(&self, run_id: RunId) -> Result<WorkflowRun, OrchestratorError> {
        let live = self
            .active
            .get(&run_id)
            .map(|active| active.snapshot.borrow().clone());
        if let Some(run) = live {
            return Ok(run);
        }
        self.runs
            .find_by_id(run_id)
            .await?
            .ok_or(OrchestratorError::RunNotFound(run_id))
    }

    pub async fn cancel(&self, run_id: RunId) -> Result<(), OrchestratorError> {
        let token = self.active.get(&run_id).map(|active| active.cancel.clone());
        match token {
            Some(token) => {
                info!(run_id = %run_id, "Cancelling workflow run");
                token.cancel();
                Ok(())
            }
            None => match self.runs.find_by_id(run_id).await? {
                Some(_) => Err(OrchestratorError::AlreadyTerminal(run_id)),
                None => Err(OrchestratorError::RunNotFound(run_id)),
            },
        }
    }

    /// Watch channel of run snapshots. Archived runs yield a channel holding
    /// their final state.
    pub async fn subscribe(
        &self,
        run_id: RunId,
    ) -> Result<watch::Receiver<WorkflowRun>, OrchestratorError> {
        let live = self.active.get(&run_id).map(|active| active.snapshot.clone());
        if let Some(receiver) = live {
            return Ok(receiver);
        }
        let run = self
            .runs
            .find_by_id(run_id)
            .await?
            .ok_or(OrchestratorError::RunNotFound(run_id))?;
        let (_, receiver) = watch::channel(run);
        Ok(receiver)
    }

    /// Suspends until the run is terminal.
    pub async fn wait(&self, run_id: RunId) -> Result<WorkflowRun, OrchestratorError> {
        let mut receiver = self.subscribe(run_id).await?;
        let finished = receiver
            .wait_for(|run| run.status.is_terminal())
            .await
            .map(|run| WorkflowRun::clone(&run))
            .ok();
        match finished {
            Some(run) => Ok(run),
            None => self.get_run(run_id).await,
        }
    }

    /// Active runs first, then the most recently started archived runs.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<WorkflowRun>, OrchestratorError> {
        let mut runs: Vec<WorkflowRun> = self
            .active
            .iter()
            .map(|entry| entry.snapshot.borrow().clone())
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        for run in self.runs.list_recent(limit).await? {
            if !runs.iter().any(|r| r.id == run.id) {
                runs.push(run);
            }
        }
        runs.truncate(limit);
        Ok(runs)
    }

    pub fn active_runs(&self) -> usize {
        self.active.len()
    }

    // ========================================================================
    // Driver
    // ========================================================================

    async fn drive(
        self: Arc<Self>,
        definition: Arc<WorkflowDefinition>,
        mut run: WorkflowRun,
        snapshot: watch::Sender<WorkflowRun>,
        cancel: CancellationToken,
    ) {
        let started = Instant::now();
        let deadline = instant_of(run.deadline);
        let mut in_flight: FuturesUnordered<StepFuture> = FuturesUnordered::new();

        loop {
            if let Err(failure) = self.advance(&definition, &mut run, &mut in_flight, &cancel) {
                run.fail(failure);
                break;
            }
            snapshot.send_replace(run.clone());

            if in_flight.is_empty() {
                run.conclude(&definition);
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    run.cancel();
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    run.fail(RunFailure::DeadlineExceeded);
                    break;
                }
                Some((step, result)) = in_flight.next() => {
                    let Some(result) = result else { continue };
                    if let Err(failure) = self.settle(&definition, &mut run, step, result) {
                        run.fail(failure);
                        break;
                    }
                }
            }
        }

        // Stops every step still in flight; their results are never read.
        cancel.cancel();
        drop(in_flight);
        self.finish(run, snapshot, started).await;
    }

    /// Dispatches every ready step and settles skip/block cascades until the
    /// run makes no further progress without a reply.
    fn advance(
        &self,
        definition: &WorkflowDefinition,
        run: &mut WorkflowRun,
        in_flight: &mut FuturesUnordered<StepFuture>,
        cancel: &CancellationToken,
    ) -> Result<(), RunFailure> {
        loop {
            let mut settled_any = false;
            let pending: Vec<StepId> = definition
                .topological_order()
                .into_iter()
                .filter(|id| run.step_state(id) == Some(StepState::Pending))
                .cloned()
                .collect();

            for id in pending {
                let Some(step) = definition.step(&id) else { continue };
                match run.readiness(step) {
                    Readiness::Waiting => {}
                    Readiness::Skip => {
                        run.record_skipped(&id);
                        self.publish_settled(run, &id);
                        settled_any = true;
                    }
                    Readiness::Block => {
                        run.record_blocked(&id);
                        self.publish_settled(run, &id);
                        if step.policy.is_required() {
                            return Err(RunFailure::RequiredStepBlocked { step: id });
                        }
                        settled_any = true;
                    }
                    Readiness::Dispatch => {
                        if Utc::now() >= run.deadline {
                            return Err(RunFailure::DeadlineExceeded);
                        }
                        in_flight.push(self.dispatch(run, step, cancel));
                    }
                }
            }

            if !settled_any {
                return Ok(());
            }
        }
    }

    fn dispatch(
        &self,
        run: &mut WorkflowRun,
        step: &StepDefinition,
        cancel: &CancellationToken,
    ) -> StepFuture {
        let payload = step.build_payload(&run.input, &run.outputs);
        run.mark_running(&step.id);
        self.event_bus.publish_workflow_event(WorkflowEvent::StepDispatched {
            run_id: run.id,
            step: step.id.clone(),
            capability: step.capability.clone(),
            dispatched_at: Utc::now(),
        });
        debug!(
            run_id = %run.id,
            correlation_id = %run.correlation_id,
            step = %step.id,
            capability = %step.capability,
            "Dispatching workflow step"
        );

        let router = Arc::clone(&self.router);
        let token = cancel.child_token();
        let id = step.id.clone();
        let capability = step.capability.clone();
        let context = RequestContext {
            correlation_id: Some(run.correlation_id),
            source_id: Some(format!("workflow:{}", run.workflow)),
            budget: step.timeout,
            deadline: Some(run.deadline),
        };
        async move {
            let result = tokio::select! {
                _ = token.cancelled() => None,
                result = router.request(capability, payload, context) => Some(result),
            };
            (id, result)
        }
        .boxed()
    }

    fn settle(
        &self,
        definition: &WorkflowDefinition,
        run: &mut WorkflowRun,
        id: StepId,
        result: Result<ReplyEnvelope, RoutingError>,
    ) -> Result<(), RunFailure> {
        let Some(step) = definition.step(&id) else {
            return Ok(());
        };

        let outcome = match result {
            Ok(reply) => {
                run.set_responder(&id, reply.responder_id.clone());
                run.record_success(&id, reply.into_payload().unwrap_or(serde_json::Value::Null));
                Ok(())
            }
            Err(RoutingError::Timeout { .. })
                if deadline_after(Utc::now(), DEADLINE_SLACK) >= run.deadline =>
            {
                Err(RunFailure::DeadlineExceeded)
            }
            Err(error) => {
                let message = error.to_string();
                warn!(
                    run_id = %run.id,
                    step = %id,
                    error = %message,
                    "Workflow step failed"
                );
                match &step.policy {
                    StepPolicy::Required => {
                        run.record_failure(&id, message.clone());
                        Err(RunFailure::RequiredStepFailed {
                            step: id.clone(),
                            error: message,
                        })
                    }
                    StepPolicy::Optional { fallback: Some(value) } => {
                        run.record_fallback(&id, message, value.clone());
                        Ok(())
                    }
                    StepPolicy::Optional { fallback: None } => {
                        run.record_failure(&id, message);
                        Ok(())
                    }
                }
            }
        };

        if run.step_state(&id).is_some_and(|s| s.is_settled()) {
            self.publish_settled(run, &id);
        }
        outcome
    }

    fn publish_settled(&self, run: &WorkflowRun, id: &StepId) {
        let Some(record) = run.steps.get(id) else { return };
        self.event_bus.publish_workflow_event(WorkflowEvent::StepSettled {
            run_id: run.id,
            step: id.clone(),
            state: record.state,
            error: record.error.clone(),
            settled_at: record.finished_at.unwrap_or_else(Utc::now),
        });
    }

    async fn finish(&self, run: WorkflowRun, snapshot: watch::Sender<WorkflowRun>, started: Instant) {
        if let Err(e) = self.runs.save(&run).await {
            error!(run_id = %run.id, error = %e, "Failed to archive workflow run");
        }
        snapshot.send_replace(run.clone());
        self.active.remove(&run.id);

        self.event_bus.publish_workflow_event(WorkflowEvent::RunFinished {
            run_id: run.id,
            status: run.status,
            failure: run.failure.clone(),
            finished_at: run.finished_at.unwrap_or_else(Utc::now),
        });
        metrics::counter!(
            "a2a_workflow_runs_total",
            "workflow" => run.workflow.to_string(),
            "status" => run.status.to_string()
        )
        .increment(1);
        metrics::histogram!("a2a_workflow_run_duration_seconds", "workflow" => run.workflow.to_string())
            .record(started.elapsed().as_secs_f64());
        metrics::gauge!("a2a_workflow_runs_active").set(self.active.len() as f64);

        match &run.failure {
            Some(failure) => warn!(
                run_id = %run.id,
                correlation_id = %run.correlation_id,
                status = %run.status,
                failure = %failure,
                "Workflow run finished"
            ),
            None => info!(
                run_id = %run.id,
                correlation_id = %run.correlation_id,
                status = %run.status,
                "Workflow run finished"
            ),
        }
    }
}

fn instant_of(deadline: DateTime<Utc>) -> Instant {
    let remaining = (deadline - Utc::now()).to_std().unwrap_or_default();
    Instant::now() + remaining.min(MAX_BUDGET)
}

// ============================================================================
// Run Handle
// ============================================================================

/// Caller's view of a started run.
pub struct RunHandle {
    pub run_id: RunId,
    pub correlation_id: CorrelationId,
    snapshot: watch::Receiver<WorkflowRun>,
    cancel: CancellationToken,
}

impl RunHandle {
    pub fn current(&self) -> WorkflowRun {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> RunStatus {
        self.snapshot.borrow().status
    }

    /// Suspends until the run is terminal and returns its final state.
    pub async fn wait(&mut self) -> WorkflowRun {
        let finished = self
            .snapshot
            .wait_for(|run| run.status.is_terminal())
            .await
            .map(|run| WorkflowRun::clone(&run))
            .ok();
        finished.unwrap_or_else(|| self.snapshot.borrow().clone())
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::circuit_breaker::CircuitBreaker;
    use crate::application::registry::{AgentRegistry, RegistrySettings};
    use crate::application::router::RouterSettings;
    use crate::domain::agent::{AgentId, AgentRegistration};
    use crate::domain::capability::CapabilityName;
    use crate::domain::circuit::CircuitPolicy;
    use crate::domain::envelope::MessageEnvelope;
    use crate::domain::workflow::{InputSource, StepCondition};
    use crate::infrastructure::repositories::{
        InMemoryWorkflowDefinitionRepository, InMemoryWorkflowRunRepository,
    };
    use crate::infrastructure::transport::local::{AgentFault, LocalTransport};
    use serde_json::json;

    fn id(s: &str) -> StepId {
        StepId::new(s).unwrap()
    }

    fn cap(s: &str) -> CapabilityName {
        CapabilityName::new(s).unwrap()
    }

    fn setup(transport: Arc<LocalTransport>, agents: &[(&str, &str)]) -> Arc<WorkflowOrchestrator> {
        let bus = EventBus::new(256);
        let registry = Arc::new(AgentRegistry::new(RegistrySettings::default(), bus.clone()));
        for (agent, capability) in agents {
            registry
                .register(AgentRegistration::new(
                    AgentId::new(*agent).unwrap(),
                    format!("http://{}.local", agent),
                    [*capability],
                ))
                .unwrap();
        }
        let breaker = Arc::new(CircuitBreaker::new(CircuitPolicy::default(), bus.clone()));
        let router = Arc::new(MessageRouter::new(
            registry,
            breaker,
            transport,
            RouterSettings::default(),
        ));
        Arc::new(WorkflowOrchestrator::new(
            router,
            Arc::new(InMemoryWorkflowDefinitionRepository::new()),
            Arc::new(InMemoryWorkflowRunRepository::new(16)),
            bus,
            OrchestratorSettings::default(),
        ))
    }

    #[tokio::test]
    async fn test_optional_fallback_feeds_dependent() {
        let transport = Arc::new(LocalTransport::new());
        transport.handle("pricing-1", |_envelope: MessageEnvelope| async move {
            Err(AgentFault::new("pricing_down", "no prices today"))
        });
        transport.handle("render-1", |envelope: MessageEnvelope| async move { Ok(envelope.payload) });
        let orchestrator = setup(
            Arc::clone(&transport),
            &[("pricing-1", "pricing.quote@v1"), ("render-1", "page.render@v1")],
        );

        let definition = WorkflowDefinition::new(
            WorkflowName::new("quote-page").unwrap(),
            vec![
                StepDefinition::optional(id("pricing"), cap("pricing.quote@v1"), Some(json!({"price": 0}))),
                StepDefinition::required(id("render"), cap("page.render@v1"))
                    .after(id("pricing"))
                    .bind("price", InputSource::Step { step: id("pricing"), pointer: "/price".into() }),
            ],
        )
        .unwrap();
        orchestrator.register_definition(definition).await.unwrap();

        let mut handle = orchestrator
            .invoke(&WorkflowName::new("quote-page").unwrap(), json!({}), InvokeOptions::default())
            .await
            .unwrap();
        let run = handle.wait().await;

        assert_eq!(run.status, RunStatus::PartiallyFailed);
        assert_eq!(run.step_state(&id("pricing")), Some(StepState::FellBack));
        assert_eq!(run.outputs[&id("render")], json!({"price": 0}));
        assert_eq!(run.steps[&id("render")].responder.as_deref(), Some("render-1"));
    }

    #[tokio::test]
    async fn test_false_condition_skips_step() {
        let transport = Arc::new(LocalTransport::new());
        transport.handle("check-1", |_envelope: MessageEnvelope| async move { Ok(json!({"inStock": false})) });
        transport.handle("order-1", |_envelope: MessageEnvelope| async move { Ok(json!({"orderId": "o-1"})) });
        let orchestrator = setup(
            Arc::clone(&transport),
            &[("check-1", "inventory.check@v1"), ("order-1", "orders.place@v1")],
        );

        orchestrator
            .register_definition(
                WorkflowDefinition::new(
                    WorkflowName::new("order-if-stocked").unwrap(),
                    vec![
                        StepDefinition::required(id("check"), cap("inventory.check@v1")),
                        StepDefinition::required(id("order"), cap("orders.place@v1"))
                            .after(id("check"))
                            .when(StepCondition::OutputEquals {
                                step: id("check"),
                                pointer: "/inStock".into(),
                                value: json!(true),
                            }),
                    ],
                )
                .unwrap(),
            )
            .await
            .unwrap();

        let handle = orchestrator
            .invoke(&WorkflowName::new("order-if-stocked").unwrap(), json!({}), InvokeOptions::default())
            .await
            .unwrap();
        let run = orchestrator.wait(handle.run_id).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.step_state(&id("order")), Some(StepState::Skipped));
        assert!(transport.received_by("order-1").is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stops_in_flight_steps() {
        let transport = Arc::new(LocalTransport::new());
        transport.handle("slow-1", |_envelope: MessageEnvelope| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(json!(null))
        });
        let orchestrator = setup(Arc::clone(&transport), &[("slow-1", "slow.op@v1")]);
        orchestrator
            .register_definition(
                WorkflowDefinition::new(
                    WorkflowName::new("slow").unwrap(),
                    vec![StepDefinition::required(id("wait"), cap("slow.op@v1"))],
                )
                .unwrap(),
            )
            .await
            .unwrap();

        let handle = orchestrator
            .invoke(&WorkflowName::new("slow").unwrap(), json!({}), InvokeOptions::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        orchestrator.cancel(handle.run_id).await.unwrap();

        let run = orchestrator.wait(handle.run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.step_state(&id("wait")), Some(StepState::Cancelled));

        let err = orchestrator.cancel(handle.run_id).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AlreadyTerminal(_)));
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_rejected() {
        let orchestrator = setup(Arc::new(LocalTransport::new()), &[]);
        let err = orchestrator
            .invoke(&WorkflowName::new("missing").unwrap(), json!({}), InvokeOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, OrchestratorError::UnknownWorkflow(_)));

        let err = orchestrator.get_run(RunId::new()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::RunNotFound(_)));
    }
}
