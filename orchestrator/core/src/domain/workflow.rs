// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow Domain Model
//!
//! A workflow is a static dependency graph of capability invocations. Each
//! step names a capability, the steps it depends on, how its input is built
//! from the workflow input and upstream outputs, and whether the run can
//! survive its failure.
//!
//! # Architectural Context
//!
//! - **Aggregate Root:** [`WorkflowDefinition`] (immutable once registered)
//! - **Entity:** [`WorkflowRun`] (one execution, owned by the orchestrator)
//!
//! # Step Resolution
//!
//! A step is *settled* once it is `succeeded`, `fell_back`, `failed`,
//! `skipped`, `blocked` or `cancelled`. Only `succeeded` and `fell_back`
//! steps provide an output to dependents. A dependent whose upstream step
//! failed without a fallback is blocked, whatever its `when` guard says,
//! unless the guard branches on that very failure. Otherwise a false guard
//! or a skipped upstream step skips the dependent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::capability::CapabilityName;
use crate::domain::envelope::{CorrelationId, MAX_BUDGET};

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

/// Unique identifier for one workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workflow name (DNS-label style: lowercase alphanumerics and '-')
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkflowName(String);

impl WorkflowName {
    pub fn new(name: impl Into<String>) -> Result<Self, WorkflowError> {
        let name = name.into();
        if name.is_empty() || name.len() > 63 {
            return Err(WorkflowError::InvalidName(name));
        }
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid_chars || name.starts_with('-') || name.ends_with('-') {
            return Err(WorkflowError::InvalidName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkflowName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for WorkflowName {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WorkflowName> for String {
    fn from(value: WorkflowName) -> Self {
        value.0
    }
}

/// Step identifier, unique within one workflow (e.g. "price", "sentiment")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Result<Self, WorkflowError> {
        let id = id.into();
        if id.is_empty()
            || !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(WorkflowError::InvalidStepId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StepId {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StepId> for String {
    fn from(value: StepId) -> Self {
        value.0
    }
}

// ============================================================================
// Value Objects: Step Definition
// ============================================================================

/// What the run does when a step fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPolicy {
    /// Failure fails the whole run.
    Required,
    /// Failure is recorded; dependents receive `fallback` if one is declared
    /// and are blocked otherwise.
    Optional {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Option<serde_json::Value>,
    },
}

impl StepPolicy {
    pub fn is_required(&self) -> bool {
        matches!(self, StepPolicy::Required)
    }
}

/// Where one field of a step's input comes from.
///
/// Pointers are RFC 6901 JSON pointers; the empty pointer selects the whole
/// value. A pointer that selects nothing yields `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum InputSource {
    Input {
        #[serde(default)]
        pointer: String,
    },
    Step {
        step: StepId,
        #[serde(default)]
        pointer: String,
    },
    Literal {
        value: serde_json::Value,
    },
}

/// Guard evaluated once all dependencies of a step have settled. A false
/// guard marks the step `skipped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum StepCondition {
    Succeeded { step: StepId },
    Failed { step: StepId },
    OutputExists {
        step: StepId,
        pointer: String,
    },
    OutputEquals {
        step: StepId,
        #[serde(default)]
        pointer: String,
        value: serde_json::Value,
    },
    InputEquals {
        pointer: String,
        value: serde_json::Value,
    },
}

impl StepCondition {
    pub fn referenced_step(&self) -> Option<&StepId> {
        match self {
            StepCondition::Succeeded { step }
            | StepCondition::Failed { step }
            | StepCondition::OutputExists { step, .. }
            | StepCondition::OutputEquals { step, .. } => Some(step),
            StepCondition::InputEquals { .. } => None,
        }
    }

    /// Step whose failure this condition explicitly branches on.
    pub fn tolerated_failure(&self) -> Option<&StepId> {
        match self {
            StepCondition::Failed { step } => Some(step),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub id: StepId,
    pub capability: CapabilityName,
    #[serde(default)]
    pub depends_on: Vec<StepId>,
    pub policy: StepPolicy,
    /// Named input fields. Empty means the workflow input is passed as is.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input: BTreeMap<String, InputSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<StepCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl StepDefinition {
    pub fn required(id: StepId, capability: CapabilityName) -> Self {
        Self {
            id,
            capability,
            depends_on: Vec::new(),
            policy: StepPolicy::Required,
            input: BTreeMap::new(),
            when: None,
            timeout: None,
        }
    }

    pub fn optional(id: StepId, capability: CapabilityName, fallback: Option<serde_json::Value>) -> Self {
        Self {
            policy: StepPolicy::Optional { fallback },
            ..Self::required(id, capability)
        }
    }

    pub fn after(mut self, dependency: StepId) -> Self {
        self.depends_on.push(dependency);
        self
    }

    pub fn bind(mut self, field: impl Into<String>, source: InputSource) -> Self {
        self.input.insert(field.into(), source);
        self
    }

    pub fn when(mut self, condition: StepCondition) -> Self {
        self.when = Some(condition);
        self
    }

    /// Builds the request payload for this step from the workflow input and
    /// the outputs of its dependencies.
    pub fn build_payload(
        &self,
        workflow_input: &serde_json::Value,
        outputs: &BTreeMap<StepId, serde_json::Value>,
    ) -> serde_json::Value {
        if self.input.is_empty() {
            return workflow_input.clone();
        }
        let fields = self
            .input
            .iter()
            .map(|(field, source)| {
                let value = match source {
                    InputSource::Input { pointer } => select(workflow_input, pointer),
                    InputSource::Step { step, pointer } => outputs
                        .get(step)
                        .map(|output| select(output, pointer))
                        .unwrap_or(serde_json::Value::Null),
                    InputSource::Literal { value } => value.clone(),
                };
                (field.clone(), value)
            })
            .collect();
        serde_json::Value::Object(fields)
    }
}

fn select(value: &serde_json::Value, pointer: &str) -> serde_json::Value {
    value.pointer(pointer).cloned().unwrap_or(serde_json::Value::Null)
}

// ============================================================================
// Aggregate Root: WorkflowDefinition
// ============================================================================

/// Immutable plan of capability invocations.
///
/// # Invariants
/// - At least one step
/// - Step ids are unique
/// - Every dependency, binding and condition references a declared step
/// - Bindings and conditions only reference steps listed in `depends_on`
/// - The dependency graph is acyclic
/// - No deadline or step timeout exceeds [`MAX_BUDGET`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub name: WorkflowName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Aggregate budget for a run; the orchestrator default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub deadline: Option<Duration>,
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    pub fn new(name: WorkflowName, steps: Vec<StepDefinition>) -> Result<Self, WorkflowError> {
        let definition = Self {
            name,
            version: None,
            description: None,
            deadline: None,
            steps,
        };
        WorkflowValidator::validate(&definition)?;
        Ok(definition)
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn step(&self, id: &StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Steps in a dependency-respecting order.
    pub fn topological_order(&self) -> Vec<&StepId> {
        let mut placed: BTreeSet<&StepId> = BTreeSet::new();
        let mut order = Vec::with_capacity(self.steps.len());
        while order.len() < self.steps.len() {
            let before = order.len();
            for step in &self.steps {
                if !placed.contains(&step.id) && step.depends_on.iter().all(|d| placed.contains(d)) {
                    placed.insert(&step.id);
                    order.push(&step.id);
                }
            }
            if order.len() == before {
                break;
            }
        }
        order
    }
}

/// Structural validation for workflow definitions.
pub struct WorkflowValidator;

impl WorkflowValidator {
    pub fn validate(definition: &WorkflowDefinition) -> Result<(), WorkflowError> {
        if definition.steps.is_empty() {
            return Err(WorkflowError::NoSteps);
        }
        if definition.deadline.is_some_and(|d| d > MAX_BUDGET) {
            return Err(WorkflowError::BudgetTooLarge("deadline".to_string()));
        }

        let mut ids = BTreeSet::new();
        for step in &definition.steps {
            if !ids.insert(&step.id) {
                return Err(WorkflowError::DuplicateStep(step.id.clone()));
            }
        }

        for step in &definition.steps {
            if step.timeout.is_some_and(|t| t > MAX_BUDGET) {
                return Err(WorkflowError::BudgetTooLarge(format!("timeout of step '{}'", step.id)));
            }
            for dependency in &step.depends_on {
                if !ids.contains(dependency) {
                    return Err(WorkflowError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
                if dependency == &step.id {
                    return Err(WorkflowError::Cycle(step.id.clone()));
                }
            }

            for source in step.input.values() {
                if let InputSource::Step { step: upstream, .. } = source {
                    if !step.depends_on.contains(upstream) {
                        return Err(WorkflowError::UndeclaredReference {
                            step: step.id.clone(),
                            referenced: upstream.clone(),
                        });
                    }
                }
            }

            if let Some(upstream) = step.when.as_ref().and_then(|c| c.referenced_step()) {
                if !step.depends_on.contains(upstream) {
                    return Err(WorkflowError::UndeclaredReference {
                        step: step.id.clone(),
                        referenced: upstream.clone(),
                    });
                }
            }
        }

        Self::check_for_cycles(definition)
    }

    /// Depth-first search over `depends_on` edges.
    pub fn check_for_cycles(definition: &WorkflowDefinition) -> Result<(), WorkflowError> {
        fn visit<'a>(
            current: &'a StepId,
            edges: &HashMap<&'a StepId, &'a [StepId]>,
            visited: &mut HashMap<&'a StepId, bool>,
            rec_stack: &mut HashMap<&'a StepId, bool>,
        ) -> Option<StepId> {
            visited.insert(current, true);
            rec_stack.insert(current, true);

            for next in edges.get(current).copied().unwrap_or_default() {
                if !visited.get(next).copied().unwrap_or(false) {
                    if let Some(at) = visit(next, edges, visited, rec_stack) {
                        return Some(at);
                    }
                } else if rec_stack.get(next).copied().unwrap_or(false) {
                    return Some(next.clone());
                }
            }

            rec_stack.insert(current, false);
            None
        }

        let edges: HashMap<&StepId, &[StepId]> = definition
            .steps
            .iter()
            .map(|s| (&s.id, s.depends_on.as_slice()))
            .collect();
        let mut visited = HashMap::new();
        let mut rec_stack = HashMap::new();

        for step in &definition.steps {
            if visited.get(&step.id).copied().unwrap_or(false) {
                continue;
            }
            if let Some(at) = visit(&step.id, &edges, &mut visited, &mut rec_stack) {
                return Err(WorkflowError::Cycle(at));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Entity: WorkflowRun
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    PartiallyFailed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::PartiallyFailed => "partially_failed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    /// Optional step failed; its declared fallback stands in for the output.
    FellBack,
    Failed,
    Skipped,
    Blocked,
    Cancelled,
}

impl StepState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, StepState::Pending | StepState::Running)
    }

    pub fn provides_output(&self) -> bool {
        matches!(self, StepState::Succeeded | StepState::FellBack)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub state: StepState,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Agent that produced the step's reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    fn pending() -> Self {
        Self {
            state: StepState::Pending,
            attempts: 0,
            error: None,
            responder: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Why a run ended in `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RunFailure {
    RequiredStepFailed { step: StepId, error: String },
    RequiredStepBlocked { step: StepId },
    DeadlineExceeded,
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunFailure::RequiredStepFailed { step, error } => {
                write!(f, "required step '{}' failed: {}", step, error)
            }
            RunFailure::RequiredStepBlocked { step } => {
                write!(f, "required step '{}' blocked by a failed dependency", step)
            }
            RunFailure::DeadlineExceeded => f.write_str("run deadline exceeded"),
        }
    }
}

/// How a settled step with all dependencies settled should proceed.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    /// Some dependency has not settled yet.
    Waiting,
    Dispatch,
    Skip,
    Block,
}

/// One execution of a [`WorkflowDefinition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: RunId,
    pub correlation_id: CorrelationId,
    pub workflow: WorkflowName,
    pub input: serde_json::Value,
    pub status: RunStatus,
    pub steps: BTreeMap<StepId, StepRecord>,
    pub outputs: BTreeMap<StepId, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub deadline: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn new(
        definition: &WorkflowDefinition,
        input: serde_json::Value,
        correlation_id: CorrelationId,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RunId::new(),
            correlation_id,
            workflow: definition.name.clone(),
            input,
            status: RunStatus::Running,
            steps: definition
                .steps
                .iter()
                .map(|s| (s.id.clone(), StepRecord::pending()))
                .collect(),
            outputs: BTreeMap::new(),
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
            deadline,
        }
    }

    pub fn step_state(&self, step: &StepId) -> Option<StepState> {
        self.steps.get(step).map(|r| r.state)
    }

    /// Evaluates whether `step` can be dispatched now.
    pub fn readiness(&self, step: &StepDefinition) -> Readiness {
        let mut upstream = Vec::with_capacity(step.depends_on.len());
        for dependency in &step.depends_on {
            match self.step_state(dependency) {
                Some(state) if state.is_settled() => upstream.push((dependency, state)),
                _ => return Readiness::Waiting,
            }
        }

        // A failed upstream blocks before the guard is looked at, so a guard
        // over a missing output cannot turn a blocked step into a skipped one.
        let tolerated = step.when.as_ref().and_then(|c| c.tolerated_failure());
        let blocked = upstream.iter().any(|(dependency, state)| {
            Some(*dependency) != tolerated
                && !state.provides_output()
                && *state != StepState::Skipped
        });
        if blocked {
            return Readiness::Block;
        }

        if let Some(condition) = &step.when {
            if !self.condition_holds(condition) {
                return Readiness::Skip;
            }
        }

        if upstream
            .iter()
            .any(|(dependency, state)| *state == StepState::Skipped && Some(*dependency) != tolerated)
        {
            return Readiness::Skip;
        }
        Readiness::Dispatch
    }

    fn condition_holds(&self, condition: &StepCondition) -> bool {
        match condition {
            StepCondition::Succeeded { step } => self.step_state(step) == Some(StepState::Succeeded),
            StepCondition::Failed { step } => matches!(
                self.step_state(step),
                Some(StepState::Failed | StepState::FellBack | StepState::Blocked)
            ),
            StepCondition::OutputExists { step, pointer } => self
                .outputs
                .get(step)
                .and_then(|o| o.pointer(pointer))
                .is_some_and(|v| !v.is_null()),
            StepCondition::OutputEquals { step, pointer, value } => self
                .outputs
                .get(step)
                .and_then(|o| o.pointer(pointer))
                .is_some_and(|v| v == value),
            StepCondition::InputEquals { pointer, value } => {
                self.input.pointer(pointer).is_some_and(|v| v == value)
            }
        }
    }

    pub fn mark_running(&mut self, step: &StepId) {
        if let Some(record) = self.steps.get_mut(step) {
            record.state = StepState::Running;
            record.attempts += 1;
            record.started_at = Some(Utc::now());
        }
    }

    pub fn record_success(&mut self, step: &StepId, output: serde_json::Value) {
        self.settle(step, StepState::Succeeded, None);
        self.outputs.insert(step.clone(), output);
    }

    pub fn set_responder(&mut self, step: &StepId, responder: impl Into<String>) {
        if let Some(record) = self.steps.get_mut(step) {
            record.responder = Some(responder.into());
        }
    }

    pub fn record_fallback(&mut self, step: &StepId, error: String, fallback: serde_json::Value) {
        self.settle(step, StepState::FellBack, Some(error));
        self.outputs.insert(step.clone(), fallback);
    }

    pub fn record_failure(&mut self, step: &StepId, error: String) {
        self.settle(step, StepState::Failed, Some(error));
    }

    pub fn record_skipped(&mut self, step: &StepId) {
        self.settle(step, StepState::Skipped, None);
    }

    pub fn record_blocked(&mut self, step: &StepId) {
        self.settle(step, StepState::Blocked, None);
    }

    fn settle(&mut self, step: &StepId, state: StepState, error: Option<String>) {
        if let Some(record) = self.steps.get_mut(step) {
            record.state = state;
            record.error = error;
            record.finished_at = Some(Utc::now());
        }
    }

    /// Marks every pending or running step cancelled.
    pub fn cancel_outstanding(&mut self) {
        let now = Utc::now();
        for record in self.steps.values_mut() {
            if !record.state.is_settled() {
                record.state = StepState::Cancelled;
                record.finished_at = Some(now);
            }
        }
    }

    pub fn fail(&mut self, failure: RunFailure) {
        self.cancel_outstanding();
        self.failure = Some(failure);
        self.finish(RunStatus::Failed);
    }

    pub fn cancel(&mut self) {
        self.cancel_outstanding();
        self.finish(RunStatus::Cancelled);
    }

    /// Final status once every step has settled without a required failure.
    pub fn conclude(&mut self, definition: &WorkflowDefinition) {
        let optional_failed = definition.steps.iter().any(|step| {
            !step.policy.is_required()
                && matches!(
                    self.step_state(&step.id),
                    Some(StepState::Failed | StepState::FellBack | StepState::Blocked)
                )
        });
        self.finish(if optional_failed {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Completed
        });
    }

    fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Invalid workflow name '{0}': use lowercase alphanumerics and '-'")]
    InvalidName(String),

    #[error("Invalid step id '{0}'")]
    InvalidStepId(String),

    #[error("Workflow must have at least one step")]
    NoSteps,

    #[error("Duplicate step id '{0}'")]
    DuplicateStep(StepId),

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: StepId, dependency: StepId },

    #[error("Step '{step}' references '{referenced}' without depending on it")]
    UndeclaredReference { step: StepId, referenced: StepId },

    #[error("Dependency cycle detected at step '{0}'")]
    Cycle(StepId),

    #[error("The {0} exceeds the maximum budget of 24h")]
    BudgetTooLarge(String),
}
