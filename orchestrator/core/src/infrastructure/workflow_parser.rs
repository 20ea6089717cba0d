// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow YAML Parser
//!
//! This module provides infrastructure for parsing workflow YAML manifests
//! into domain objects.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external YAML → Domain objects
//! - **Anti-Corruption:** Translates YAML schema to domain model
//!
//! # Manifest Format
//!
//! ```yaml
//! apiVersion: a2a-mesh/v1
//! kind: Workflow
//! metadata:
//!   name: enriched-recommendations
//!   version: "1.0.0"
//! spec:
//!   deadline: 10s
//!   steps:
//!     - id: recommend
//!       capability: inference.recommend@v1
//!       input:
//!         userId: { from: input, pointer: /userId }
//!     - id: pricing
//!       capability: pricing.quote@v1
//!       policy: optional
//!       fallback: { prices: [] }
//!       depends_on: [recommend]
//!       input:
//!         products: { from: step, step: recommend, pointer: /recommendations }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::capability::CapabilityName;
use crate::domain::workflow::{
    InputSource, StepCondition, StepDefinition, StepId, StepPolicy, WorkflowDefinition,
    WorkflowName,
};

pub const API_VERSION: &str = "a2a-mesh/v1";
pub const KIND: &str = "Workflow";

// ============================================================================
// YAML Schema (External Representation)
// ============================================================================

/// External YAML representation of a workflow manifest
///
/// This struct matches the YAML schema exactly. It is then converted
/// to the domain WorkflowDefinition with validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: WorkflowMetadataYaml,
    pub spec: WorkflowSpecYaml,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMetadataYaml {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpecYaml {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub deadline: Option<Duration>,
    pub steps: Vec<StepYaml>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyYaml {
    #[default]
    Required,
    Optional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepYaml {
    pub id: String,
    pub capability: String,
    #[serde(default)]
    pub policy: PolicyYaml,
    /// Output substituted when an optional step fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input: BTreeMap<String, InputSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<StepCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

// ============================================================================
// Parser
// ============================================================================

/// Workflow parser (Infrastructure service)
pub struct WorkflowParser;

impl WorkflowParser {
    /// Parse a workflow manifest from YAML file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<WorkflowDefinition, WorkflowParseError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| WorkflowParseError::IoError {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse_yaml(&content)
    }

    /// Parse a workflow manifest from YAML string
    pub fn parse_yaml(yaml: &str) -> Result<WorkflowDefinition, WorkflowParseError> {
        let manifest: WorkflowManifest =
            serde_yaml::from_str(yaml).map_err(|e| WorkflowParseError::YamlError(e.to_string()))?;

        Self::validate_and_convert(manifest)
    }

    /// Parses every `*.yaml` / `*.yml` manifest in `dir`, in file name order.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<WorkflowDefinition>, WorkflowParseError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| WorkflowParseError::IoError {
            path: dir.display().to_string(),
            error: e.to_string(),
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("yaml" | "yml")
                )
            })
            .collect();
        paths.sort();

        let mut definitions = Vec::with_capacity(paths.len());
        for path in paths {
            debug!(path = %path.display(), "Parsing workflow manifest");
            let definition = Self::parse_file(&path)?;
            definitions.push(definition);
        }
        info!(dir = %dir.display(), count = definitions.len(), "Loaded workflow manifests");
        Ok(definitions)
    }

    /// Validate manifest and convert to domain object
    fn validate_and_convert(
        manifest: WorkflowManifest,
    ) -> Result<WorkflowDefinition, WorkflowParseError> {
        if manifest.api_version != API_VERSION {
            return Err(WorkflowParseError::InvalidApiVersion {
                expected: API_VERSION.to_string(),
                got: manifest.api_version,
            });
        }

        if manifest.kind != KIND {
            return Err(WorkflowParseError::InvalidKind {
                expected: KIND.to_string(),
                got: manifest.kind,
            });
        }

        let name = WorkflowName::new(manifest.metadata.name)
            .map_err(|e| WorkflowParseError::ValidationError(e.to_string()))?;

        let steps = manifest
            .spec
            .steps
            .into_iter()
            .map(Self::convert_step)
            .collect::<Result<Vec<_>, _>>()?;

        let mut definition = WorkflowDefinition::new(name, steps)
            .map_err(|e| WorkflowParseError::ValidationError(e.to_string()))?;
        definition.version = manifest.metadata.version;
        definition.description = manifest.metadata.description;
        definition.deadline = manifest.spec.deadline;
        Ok(definition)
    }

    fn convert_step(yaml: StepYaml) -> Result<StepDefinition, WorkflowParseError> {
        let id = StepId::new(yaml.id).map_err(|e| WorkflowParseError::ValidationError(e.to_string()))?;
        let capability = CapabilityName::new(yaml.capability).map_err(|e| {
            WorkflowParseError::ValidationError(format!("step '{}': {}", id, e))
        })?;

        let policy = match (yaml.policy, yaml.fallback) {
            (PolicyYaml::Required, Some(_)) => {
                return Err(WorkflowParseError::ValidationError(format!(
                    "step '{}': only optional steps may declare a fallback",
                    id
                )))
            }
            (PolicyYaml::Required, None) => StepPolicy::Required,
            (PolicyYaml::Optional, fallback) => StepPolicy::Optional { fallback },
        };

        let depends_on = yaml
            .depends_on
            .into_iter()
            .map(|d| StepId::new(d).map_err(|e| WorkflowParseError::ValidationError(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StepDefinition {
            id,
            capability,
            depends_on,
            policy,
            input: yaml.input,
            when: yaml.when,
            timeout: yaml.timeout,
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WorkflowParseError {
    #[error("IO error reading {path}: {error}")]
    IoError { path: String, error: String },

    #[error("YAML parse error: {0}")]
    YamlError(String),

    #[error("Invalid API version: expected '{expected}', got '{got}'")]
    InvalidApiVersion { expected: String, got: String },

    #[error("Invalid kind: expected '{expected}', got '{got}'")]
    InvalidKind { expected: String, got: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RECOMMENDATIONS: &str = r#"
apiVersion: a2a-mesh/v1
kind: Workflow
metadata:
  name: enriched-recommendations
  version: "1.0.0"
spec:
  deadline: 8s
  steps:
    - id: recommend
      capability: inference.recommend@v1
      input:
        userId: { from: input, pointer: /userId }
    - id: products
      capability: catalog.enrich@v1
      depends_on: [recommend]
      input:
        ids: { from: step, step: recommend, pointer: /recommendations }
    - id: pricing
      capability: pricing.quote@v1
      policy: optional
      fallback: { prices: [] }
      depends_on: [products]
      timeout: 500ms
"#;

    #[test]
    fn test_parse_workflow() {
        let definition = WorkflowParser::parse_yaml(RECOMMENDATIONS).unwrap();

        assert_eq!(definition.name.as_str(), "enriched-recommendations");
        assert_eq!(definition.version.as_deref(), Some("1.0.0"));
        assert_eq!(definition.deadline, Some(Duration::from_secs(8)));
        assert_eq!(definition.steps.len(), 3);

        let pricing = definition.step(&StepId::new("pricing").unwrap()).unwrap();
        assert_eq!(
            pricing.policy,
            StepPolicy::Optional {
                fallback: Some(json!({"prices": []}))
            }
        );
        assert_eq!(pricing.timeout, Some(Duration::from_millis(500)));

        let products = definition.step(&StepId::new("products").unwrap()).unwrap();
        assert_eq!(
            products.input["ids"],
            InputSource::Step {
                step: StepId::new("recommend").unwrap(),
                pointer: "/recommendations".into()
            }
        );
    }

    #[test]
    fn test_invalid_api_version() {
        let yaml = RECOMMENDATIONS.replace("a2a-mesh/v1", "100monkeys.ai/v1");
        let err = WorkflowParser::parse_yaml(&yaml).unwrap_err();
        assert!(matches!(err, WorkflowParseError::InvalidApiVersion { .. }));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let yaml = r#"
apiVersion: a2a-mesh/v1
kind: Workflow
metadata:
  name: loop
spec:
  steps:
    - id: a
      capability: x.a@v1
      depends_on: [b]
    - id: b
      capability: x.b@v1
      depends_on: [a]
"#;
        let err = WorkflowParser::parse_yaml(yaml).unwrap_err();
        assert!(matches!(err, WorkflowParseError::ValidationError(_)));
    }

    #[test]
    fn test_load_dir_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("recommendations.yaml"), RECOMMENDATIONS).unwrap();
        fs::write(dir.path().join("README.md"), "# workflows").unwrap();

        let definitions = WorkflowParser::load_dir(dir.path()).unwrap();
        assert_eq!(definitions.len(), 1);
    }
}
