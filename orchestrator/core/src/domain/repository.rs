// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the workflow aggregates. Interfaces live in the
//! domain layer; implementations live in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `WorkflowDefinitionRepository` | `WorkflowDefinition` | `InMemoryWorkflowDefinitionRepository` |
//! | `WorkflowRunRepository` | `WorkflowRun` (terminal) | `InMemoryWorkflowRunRepository` |
//!
//! Agents are not persisted: registry state is rebuilt from announcements and
//! heartbeats after a restart.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::workflow::{RunId, WorkflowDefinition, WorkflowName, WorkflowRun};

/// Repository interface for workflow definitions
#[async_trait]
pub trait WorkflowDefinitionRepository: Send + Sync {
    /// Register a definition. Re-saving an identical definition is a no-op;
    /// saving a different definition under an existing name is rejected.
    async fn save(&self, definition: WorkflowDefinition) -> Result<(), RepositoryError>;

    async fn find_by_name(
        &self,
        name: &WorkflowName,
    ) -> Result<Option<Arc<WorkflowDefinition>>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Arc<WorkflowDefinition>>, RepositoryError>;
}

/// Archive of runs that reached a terminal status
#[async_trait]
pub trait WorkflowRunRepository: Send + Sync {
    async fn save(&self, run: &WorkflowRun) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: RunId) -> Result<Option<WorkflowRun>, RepositoryError>;

    /// Most recent runs first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<WorkflowRun>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
