// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Mesh Configuration Types
//
// Defines the configuration schema for an a2a-mesh node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Registry liveness windows and optional active health probing
// - Circuit breaker thresholds
// - Router deadlines (default and per capability)
// - Gateway cache TTLs and per-client rate limits
// - Workflow definitions directory and run retention
// - Shared HMAC signing key for envelopes and registrations
// - Logging settings
//
// Every field can be overridden from the environment (A2A_*), so container
// deployments never need a config file.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::capability::CapabilityName;
use crate::domain::circuit::CircuitPolicy;
use crate::domain::envelope::MAX_BUDGET;

pub const API_VERSION: &str = "a2a-mesh/v1";
pub const KIND: &str = "MeshConfig";

/// Top-level Kubernetes-style mesh configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfigManifest {
    /// API version (must be "a2a-mesh/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "MeshConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: MeshConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshConfigSpec {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitPolicy,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Silence after which an agent is demoted to unreachable
    #[serde(default = "default_heartbeat_grace", with = "humantime_serde")]
    pub heartbeat_grace: Duration,

    /// Silence after which an agent is removed from the registry
    #[serde(default = "default_eviction_after", with = "humantime_serde")]
    pub eviction_after: Duration,

    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Poll every agent's /health at this interval (disabled when unset)
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub health_probe_interval: Option<Duration>,

    #[serde(default = "default_health_probe_timeout", with = "humantime_serde")]
    pub health_probe_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Identity stamped into `sourceId` of envelopes the mesh originates
    #[serde(default = "default_source_id")]
    pub source_id: String,

    #[serde(default = "default_request_deadline", with = "humantime_serde")]
    pub default_deadline: Duration,

    #[serde(default)]
    pub capability_deadlines: BTreeMap<CapabilityName, humantime_serde::Serde<Duration>>,

    /// A timed-out call is only retried if at least this much budget remains
    #[serde(default = "default_min_retry_budget", with = "humantime_serde")]
    pub min_retry_budget: Duration,
}

impl RouterConfig {
    pub fn deadline_for(&self, capability: &CapabilityName) -> Duration {
        self.capability_deadlines
            .get(capability)
            .map(|d| **d)
            .unwrap_or(self.default_deadline)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Catalog metadata and other slow-changing data
    #[serde(default = "default_ttl_static", with = "humantime_serde")]
    pub ttl_static: Duration,

    /// Inventory, carts, recommendations
    #[serde(default = "default_ttl_volatile", with = "humantime_serde")]
    pub ttl_volatile: Duration,

    /// Live analytics
    #[serde(default = "default_ttl_realtime", with = "humantime_serde")]
    pub ttl_realtime: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per client within `window`
    #[serde(default = "default_rate_limit_requests")]
    pub requests: u32,

    #[serde(default = "default_rate_limit_window", with = "humantime_serde")]
    pub window: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Directory scanned for `kind: Workflow` manifests at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_dir: Option<PathBuf>,

    #[serde(default = "default_workflow_deadline", with = "humantime_serde")]
    pub default_deadline: Duration,

    /// Number of terminal runs kept for polling
    #[serde(default = "default_run_retention")]
    pub run_retention: usize,
}

/// When a signing key is set, inbound envelopes and agent registrations must
/// carry a valid HMAC-SHA256 signature and outbound envelopes are signed.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_heartbeat_grace() -> Duration {
    Duration::from_secs(30)
}

fn default_eviction_after() -> Duration {
    Duration::from_secs(300)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_health_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_source_id() -> String {
    "a2a-mesh".to_string()
}

fn default_request_deadline() -> Duration {
    Duration::from_secs(5)
}

fn default_min_retry_budget() -> Duration {
    Duration::from_millis(50)
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_ttl_static() -> Duration {
    Duration::from_secs(600)
}

fn default_ttl_volatile() -> Duration {
    Duration::from_secs(30)
}

fn default_ttl_realtime() -> Duration {
    Duration::from_secs(5)
}

fn default_rate_limit_requests() -> u32 {
    100
}

fn default_rate_limit_window() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_workflow_deadline() -> Duration {
    Duration::from_secs(30)
}

fn default_run_retention() -> usize {
    1_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_grace: default_heartbeat_grace(),
            eviction_after: default_eviction_after(),
            sweep_interval: default_sweep_interval(),
            health_probe_interval: None,
            health_probe_timeout: default_health_probe_timeout(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            source_id: default_source_id(),
            default_deadline: default_request_deadline(),
            capability_deadlines: BTreeMap::new(),
            min_retry_budget: default_min_retry_budget(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_static: default_ttl_static(),
            ttl_volatile: default_ttl_volatile(),
            ttl_realtime: default_ttl_realtime(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: default_rate_limit_requests(),
            window: default_rate_limit_window(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workflow_dir: None,
            default_deadline: default_workflow_deadline(),
            run_retention: default_run_retention(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_enabled: true,
        }
    }
}

impl Default for MeshConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "a2a-mesh".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: MeshConfigSpec::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid apiVersion: '{0}'. Must be '{API_VERSION}'")]
    InvalidApiVersion(String),

    #[error("Invalid kind: '{0}'. Must be '{KIND}'")]
    InvalidKind(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

impl MeshConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. A2A_CONFIG_PATH environment variable
    /// 2. ./a2a-mesh.yaml (working directory)
    /// 3. /etc/a2a-mesh/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("A2A_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./a2a-mesh.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        let system_config = PathBuf::from("/etc/a2a-mesh/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::warn!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply A2A_* environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// Invalid values are logged and ignored so that one bad variable does not
    /// prevent startup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let spec = &mut self.spec;

        if let Some(v) = lookup("A2A_BIND_ADDRESS") {
            spec.network.bind_address = v;
        }
        override_parsed(&lookup, "A2A_PORT", &mut spec.network.port);

        override_duration(&lookup, "A2A_HEARTBEAT_GRACE", &mut spec.registry.heartbeat_grace);
        override_duration(&lookup, "A2A_EVICTION_AFTER", &mut spec.registry.eviction_after);
        override_duration(&lookup, "A2A_SWEEP_INTERVAL", &mut spec.registry.sweep_interval);
        if let Some(v) = lookup("A2A_HEALTH_PROBE_INTERVAL") {
            match v.as_str() {
                "" | "off" | "disabled" => spec.registry.health_probe_interval = None,
                _ => match humantime::parse_duration(&v) {
                    Ok(d) => spec.registry.health_probe_interval = Some(d),
                    Err(e) => warn_invalid("A2A_HEALTH_PROBE_INTERVAL", &v, &e.to_string()),
                },
            }
        }

        override_parsed(
            &lookup,
            "A2A_CIRCUIT_FAILURE_THRESHOLD",
            &mut spec.circuit_breaker.failure_threshold,
        );
        override_duration(&lookup, "A2A_CIRCUIT_COOLDOWN", &mut spec.circuit_breaker.cooldown);
        override_duration(
            &lookup,
            "A2A_CIRCUIT_MAX_COOLDOWN",
            &mut spec.circuit_breaker.max_cooldown,
        );

        override_duration(&lookup, "A2A_DEFAULT_DEADLINE", &mut spec.router.default_deadline);
        override_duration(&lookup, "A2A_MIN_RETRY_BUDGET", &mut spec.router.min_retry_budget);
        if let Some(v) = lookup("A2A_CAPABILITY_DEADLINES") {
            match parse_capability_deadlines(&v) {
                Ok(deadlines) => spec.router.capability_deadlines.extend(deadlines),
                Err(reason) => warn_invalid("A2A_CAPABILITY_DEADLINES", &v, &reason),
            }
        }

        override_duration(&lookup, "A2A_CACHE_TTL_STATIC", &mut spec.gateway.cache.ttl_static);
        override_duration(&lookup, "A2A_CACHE_TTL_VOLATILE", &mut spec.gateway.cache.ttl_volatile);
        override_duration(&lookup, "A2A_CACHE_TTL_REALTIME", &mut spec.gateway.cache.ttl_realtime);
        override_parsed(&lookup, "A2A_CACHE_CAPACITY", &mut spec.gateway.cache.capacity);
        override_parsed(&lookup, "A2A_RATE_LIMIT_REQUESTS", &mut spec.gateway.rate_limit.requests);
        override_duration(&lookup, "A2A_RATE_LIMIT_WINDOW", &mut spec.gateway.rate_limit.window);

        if let Some(v) = lookup("A2A_WORKFLOW_DIR") {
            spec.orchestrator.workflow_dir = Some(PathBuf::from(v));
        }
        override_duration(
            &lookup,
            "A2A_WORKFLOW_DEFAULT_DEADLINE",
            &mut spec.orchestrator.default_deadline,
        );
        override_parsed(&lookup, "A2A_RUN_RETENTION", &mut spec.orchestrator.run_retention);

        if let Some(v) = lookup("A2A_SIGNING_KEY") {
            tracing::info!("Environment override: A2A_SIGNING_KEY=<redacted>");
            spec.security.signing_key = Some(v).filter(|key| !key.is_empty());
        }

        if let Some(v) = lookup("A2A_LOG_LEVEL") {
            spec.observability.log_level = v;
        }
        if let Some(v) = lookup("A2A_LOG_FORMAT") {
            spec.observability.log_format = v;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::InvalidApiVersion(self.api_version.clone()));
        }
        if self.kind != KIND {
            return Err(ConfigError::InvalidKind(self.kind.clone()));
        }
        if self.metadata.name.is_empty() {
            return Err(invalid("metadata.name", "cannot be empty"));
        }

        let spec = &self.spec;
        if spec.registry.heartbeat_grace.is_zero() {
            return Err(invalid("spec.registry.heartbeat_grace", "must be greater than zero"));
        }
        if spec.registry.eviction_after <= spec.registry.heartbeat_grace {
            return Err(invalid(
                "spec.registry.eviction_after",
                "must be longer than heartbeat_grace",
            ));
        }
        if spec.registry.sweep_interval.is_zero() {
            return Err(invalid("spec.registry.sweep_interval", "must be greater than zero"));
        }

        let breaker = &spec.circuit_breaker;
        if breaker.failure_threshold == 0 {
            return Err(invalid("spec.circuit_breaker.failure_threshold", "must be at least 1"));
        }
        if breaker.cooldown.is_zero() {
            return Err(invalid("spec.circuit_breaker.cooldown", "must be greater than zero"));
        }
        if breaker.max_cooldown < breaker.cooldown {
            return Err(invalid(
                "spec.circuit_breaker.max_cooldown",
                "must not be shorter than cooldown",
            ));
        }

        if spec.router.default_deadline.is_zero() {
            return Err(invalid("spec.router.default_deadline", "must be greater than zero"));
        }
        if spec.router.default_deadline > MAX_BUDGET {
            return Err(invalid("spec.router.default_deadline", "must not exceed 24h"));
        }
        if let Some((capability, _)) = spec
            .router
            .capability_deadlines
            .iter()
            .find(|(_, deadline)| ***deadline > MAX_BUDGET)
        {
            return Err(invalid(
                "spec.router.capability_deadlines",
                format!("deadline for {} must not exceed 24h", capability),
            ));
        }
        if spec.router.source_id.is_empty() {
            return Err(invalid("spec.router.source_id", "cannot be empty"));
        }

        if spec.gateway.cache.capacity == 0 {
            return Err(invalid("spec.gateway.cache.capacity", "must be at least 1"));
        }
        if spec.gateway.rate_limit.requests == 0 {
            return Err(invalid("spec.gateway.rate_limit.requests", "must be at least 1"));
        }
        if spec.gateway.rate_limit.window.is_zero() {
            return Err(invalid("spec.gateway.rate_limit.window", "must be greater than zero"));
        }

        if spec.orchestrator.default_deadline.is_zero() {
            return Err(invalid("spec.orchestrator.default_deadline", "must be greater than zero"));
        }
        if spec.orchestrator.default_deadline > MAX_BUDGET {
            return Err(invalid("spec.orchestrator.default_deadline", "must not exceed 24h"));
        }
        if spec.orchestrator.run_retention == 0 {
            return Err(invalid("spec.orchestrator.run_retention", "must be at least 1"));
        }

        match spec.observability.log_format.as_str() {
            "compact" | "json" => {}
            other => {
                return Err(invalid(
                    "spec.observability.log_format",
                    format!("'{}' is not one of compact, json", other),
                ))
            }
        }

        if spec.security.signing_key.as_deref() == Some("") {
            return Err(invalid("spec.security.signing_key", "cannot be empty when set"));
        }
        Ok(())
    }
}

fn warn_invalid(key: &str, value: &str, reason: &str) {
    tracing::warn!("Invalid value for {}: '{}' ({}). Ignoring.", key, value, reason);
}

fn override_duration(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut Duration) {
    if let Some(v) = lookup(key) {
        match humantime::parse_duration(&v) {
            Ok(d) => {
                tracing::info!("Environment override: {}={}", key, v);
                *target = d;
            }
            Err(e) => warn_invalid(key, &v, &e.to_string()),
        }
    }
}

fn override_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T)
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(v) = lookup(key) {
        match v.trim().parse::<T>() {
            Ok(parsed) => {
                tracing::info!("Environment override: {}={}", key, v);
                *target = parsed;
            }
            Err(e) => warn_invalid(key, &v, &e.to_string()),
        }
    }
}

/// Parses `cap=duration,cap=duration`.
fn parse_capability_deadlines(
    raw: &str,
) -> Result<Vec<(CapabilityName, humantime_serde::Serde<Duration>)>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (cap, dur) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected capability=duration, got '{}'", pair))?;
            let capability = CapabilityName::new(cap.trim()).map_err(|e| e.to_string())?;
            let duration = humantime::parse_duration(dur.trim()).map_err(|e| e.to_string())?;
            Ok((capability, humantime_serde::Serde::from(duration)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = MeshConfigManifest::default();
        assert_eq!(manifest.api_version, "a2a-mesh/v1");
        assert_eq!(manifest.kind, "MeshConfig");
        assert_eq!(manifest.spec.registry.heartbeat_grace, Duration::from_secs(30));
        assert_eq!(manifest.spec.registry.eviction_after, Duration::from_secs(300));
        assert_eq!(manifest.spec.circuit_breaker.failure_threshold, 5);
        assert_eq!(manifest.spec.circuit_breaker.cooldown, Duration::from_secs(30));
        assert_eq!(manifest.spec.gateway.rate_limit.requests, 100);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_with_partial_spec() {
        let yaml = r#"
apiVersion: a2a-mesh/v1
kind: MeshConfig
metadata:
  name: edge-mesh
spec:
  network:
    port: 9090
  circuit_breaker:
    failure_threshold: 3
    cooldown: 10s
    max_cooldown: 2m
  router:
    default_deadline: 2s
    capability_deadlines:
      inference.generate@v1: 20s
  gateway:
    cache:
      ttl_realtime: 1s
"#;
        let manifest = MeshConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.network.port, 9090);
        assert_eq!(manifest.spec.network.bind_address, "0.0.0.0");
        assert_eq!(manifest.spec.circuit_breaker.max_cooldown, Duration::from_secs(120));
        assert_eq!(manifest.spec.gateway.cache.ttl_realtime, Duration::from_secs(1));
        assert_eq!(manifest.spec.gateway.cache.ttl_static, Duration::from_secs(600));

        let generate = CapabilityName::new("inference.generate@v1").unwrap();
        let other = CapabilityName::new("catalog.search@v1").unwrap();
        assert_eq!(manifest.spec.router.deadline_for(&generate), Duration::from_secs(20));
        assert_eq!(manifest.spec.router.deadline_for(&other), Duration::from_secs(2));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut manifest = MeshConfigManifest::default();
        manifest.spec.registry.health_probe_interval = Some(Duration::from_secs(15));
        let yaml = serde_yaml::to_string(&manifest).unwrap();
        let parsed = MeshConfigManifest::from_yaml_str(&yaml).unwrap();
        assert_eq!(
            parsed.spec.registry.health_probe_interval,
            Some(Duration::from_secs(15))
        );
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("A2A_PORT", "7000"),
            ("A2A_HEARTBEAT_GRACE", "45s"),
            ("A2A_EVICTION_AFTER", "10m"),
            ("A2A_CIRCUIT_FAILURE_THRESHOLD", "8"),
            ("A2A_CAPABILITY_DEADLINES", "pricing.quote@v1=750ms, inference.chat@v1=15s"),
            ("A2A_RATE_LIMIT_REQUESTS", "not-a-number"),
            ("A2A_HEALTH_PROBE_INTERVAL", "20s"),
        ]);
        let mut manifest = MeshConfigManifest::default();
        manifest.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        let spec = &manifest.spec;
        assert_eq!(spec.network.port, 7000);
        assert_eq!(spec.registry.heartbeat_grace, Duration::from_secs(45));
        assert_eq!(spec.registry.eviction_after, Duration::from_secs(600));
        assert_eq!(spec.registry.health_probe_interval, Some(Duration::from_secs(20)));
        assert_eq!(spec.circuit_breaker.failure_threshold, 8);
        assert_eq!(spec.gateway.rate_limit.requests, 100);
        assert_eq!(
            spec.router
                .deadline_for(&CapabilityName::new("pricing.quote@v1").unwrap()),
            Duration::from_millis(750)
        );
    }

    #[test]
    fn test_validation() {
        let mut manifest = MeshConfigManifest::default();
        manifest.api_version = "v0".into();
        assert!(matches!(manifest.validate(), Err(ConfigError::InvalidApiVersion(_))));

        let mut manifest = MeshConfigManifest::default();
        manifest.spec.registry.eviction_after = Duration::from_secs(10);
        assert!(manifest.validate().is_err());

        let mut manifest = MeshConfigManifest::default();
        manifest.spec.circuit_breaker.failure_threshold = 0;
        assert!(manifest.validate().is_err());

        let mut manifest = MeshConfigManifest::default();
        manifest.spec.circuit_breaker.max_cooldown = Duration::from_secs(1);
        assert!(manifest.validate().is_err());

        let mut manifest = MeshConfigManifest::default();
        manifest.spec.observability.log_format = "xml".into();
        assert!(manifest.validate().is_err());

        let mut manifest = MeshConfigManifest::default();
        manifest.spec.orchestrator.default_deadline = Duration::from_secs(3 * 24 * 3600);
        assert!(manifest.validate().is_err());

        let mut manifest = MeshConfigManifest::default();
        manifest.spec.router.capability_deadlines.insert(
            CapabilityName::new("batch.reindex@v1").unwrap(),
            humantime_serde::Serde::from(Duration::from_secs(u64::MAX / 4)),
        );
        assert!(manifest.validate().is_err());

        let mut manifest = MeshConfigManifest::default();
        manifest.spec.security.signing_key = Some(String::new());
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_signing_key_from_env_and_yaml() {
        let yaml = r#"
apiVersion: a2a-mesh/v1
kind: MeshConfig
metadata:
  name: signed-mesh
spec:
  security:
    signing_key: from-file
"#;
        let mut manifest = MeshConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.security.signing_key.as_deref(), Some("from-file"));
        assert!(!format!("{:?}", manifest.spec.security).contains("from-file"));

        manifest.apply_overrides_from(|k| (k == "A2A_SIGNING_KEY").then(|| "from-env".to_string()));
        assert_eq!(manifest.spec.security.signing_key.as_deref(), Some("from-env"));
        assert!(manifest.validate().is_ok());

        manifest.apply_overrides_from(|k| (k == "A2A_SIGNING_KEY").then(String::new));
        assert_eq!(manifest.spec.security.signing_key, None);
        assert!(MeshConfigManifest::default().spec.security.signing_key.is_none());
    }
}
