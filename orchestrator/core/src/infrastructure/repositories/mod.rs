// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository abstractions defined in
//! the domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Keep workflow definitions and finished runs
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **InMemoryWorkflowDefinitionRepository** - Definitions loaded from
//!   manifests or registered at runtime
//! - **InMemoryWorkflowRunRepository** - Bounded archive of terminal runs;
//!   the least recently touched run is dropped once `retention` is reached

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::domain::repository::{
    RepositoryError, WorkflowDefinitionRepository, WorkflowRunRepository,
};
use crate::domain::workflow::{RunId, WorkflowDefinition, WorkflowName, WorkflowRun};

#[derive(Clone, Default)]
pub struct InMemoryWorkflowDefinitionRepository {
    definitions: Arc<RwLock<BTreeMap<WorkflowName, Arc<WorkflowDefinition>>>>,
}

impl InMemoryWorkflowDefinitionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowDefinitionRepository for InMemoryWorkflowDefinitionRepository {
    async fn save(&self, definition: WorkflowDefinition) -> Result<(), RepositoryError> {
        let mut definitions = self.definitions.write();
        if let Some(existing) = definitions.get(&definition.name) {
            if **existing == definition {
                return Ok(());
            }
            return Err(RepositoryError::AlreadyExists(format!(
                "workflow '{}' is already registered with a different definition",
                definition.name
            )));
        }
        definitions.insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    async fn find_by_name(
        &self,
        name: &WorkflowName,
    ) -> Result<Option<Arc<WorkflowDefinition>>, RepositoryError> {
        Ok(self.definitions.read().get(name).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Arc<WorkflowDefinition>>, RepositoryError> {
        Ok(self.definitions.read().values().cloned().collect())
    }
}

#[derive(Clone)]
pub struct InMemoryWorkflowRunRepository {
    runs: Arc<Mutex<LruCache<RunId, WorkflowRun>>>,
}

impl InMemoryWorkflowRunRepository {
    pub fn new(retention: usize) -> Self {
        let capacity = NonZeroUsize::new(retention).unwrap_or(NonZeroUsize::MIN);
        Self {
            runs: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }
}

#[async_trait]
impl WorkflowRunRepository for InMemoryWorkflowRunRepository {
    async fn save(&self, run: &WorkflowRun) -> Result<(), RepositoryError> {
        self.runs.lock().put(run.id, run.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: RunId) -> Result<Option<WorkflowRun>, RepositoryError> {
        Ok(self.runs.lock().get(&id).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let runs = self.runs.lock();
        let mut recent: Vec<WorkflowRun> = runs.iter().map(|(_, run)| run.clone()).collect();
        recent.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        recent.truncate(limit);
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capability::CapabilityName;
    use crate::domain::envelope::CorrelationId;
    use crate::domain::workflow::{StepDefinition, StepId};
    use chrono::Utc;
    use serde_json::json;

    fn definition(capability: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(
            WorkflowName::new("lookup").unwrap(),
            vec![StepDefinition::required(
                StepId::new("only").unwrap(),
                CapabilityName::new(capability).unwrap(),
            )],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_definitions_are_immutable_once_registered() {
        let repo = InMemoryWorkflowDefinitionRepository::new();
        repo.save(definition("catalog.get@v1")).await.unwrap();
        repo.save(definition("catalog.get@v1")).await.unwrap();

        let err = repo.save(definition("catalog.get@v2")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists(_)));

        let stored = repo
            .find_by_name(&WorkflowName::new("lookup").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.steps[0].capability.as_str(), "catalog.get@v1");
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_archive_is_bounded() {
        let repo = InMemoryWorkflowRunRepository::new(2);
        let def = definition("catalog.get@v1");
        let runs: Vec<WorkflowRun> = (0..3)
            .map(|_| WorkflowRun::new(&def, json!({}), CorrelationId::new(), Utc::now()))
            .collect();
        for run in &runs {
            repo.save(run).await.unwrap();
        }

        assert!(repo.find_by_id(runs[0].id).await.unwrap().is_none());
        assert!(repo.find_by_id(runs[2].id).await.unwrap().is_some());
        assert_eq!(repo.list_recent(10).await.unwrap().len(), 2);
    }
}
