// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mesh daemon: wires the core services together and serves the HTTP API
//! until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use a2a_mesh_core::{
    application::{
        gateway::commerce::RECOMMENDATIONS_WORKFLOW, AgentRegistry, CircuitBreaker,
        GatewayService, MessageRouter, OrchestratorSettings, RegistrySettings, RouterSettings,
        WorkflowOrchestrator,
    },
    domain::{mesh_config::MeshConfigManifest, workflow::WorkflowName},
    infrastructure::{
        event_bus::EventBus,
        health_probe::HealthProber,
        repositories::{InMemoryWorkflowDefinitionRepository, InMemoryWorkflowRunRepository},
        signing::MessageSigner,
        transport::HttpAgentTransport,
        workflow_parser::WorkflowParser,
    },
    presentation::{app, AppState},
};

const BUILTIN_RECOMMENDATIONS: &str =
    include_str!("../../../workflows/enriched-recommendations.yaml");

/// How often idle per-client rate limiter state is dropped.
const GATEWAY_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

pub async fn start_daemon(
    config: MeshConfigManifest,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    let spec = &config.spec;

    info!(
        config = %config.metadata.name,
        version = env!("CARGO_PKG_VERSION"),
        "a2a-mesh daemon starting"
    );

    let metrics = if spec.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    let signer = spec
        .security
        .signing_key
        .as_deref()
        .map(MessageSigner::new)
        .transpose()
        .context("Invalid signing key")?;
    let mut transport = HttpAgentTransport::new();
    if let Some(signer) = &signer {
        transport = transport.with_signer(signer.clone());
        info!("Envelope signing enabled");
    }

    // Initialize services
    let event_bus = EventBus::with_default_capacity();
    let registry = Arc::new(AgentRegistry::new(
        RegistrySettings::from(&spec.registry),
        event_bus.clone(),
    ));
    let breaker = Arc::new(CircuitBreaker::new(
        spec.circuit_breaker.clone(),
        event_bus.clone(),
    ));
    let router = Arc::new(MessageRouter::new(
        Arc::clone(&registry),
        breaker,
        Arc::new(transport),
        RouterSettings::from(&spec.router),
    ));
    let orchestrator = Arc::new(WorkflowOrchestrator::new(
        Arc::clone(&router),
        Arc::new(InMemoryWorkflowDefinitionRepository::new()),
        Arc::new(InMemoryWorkflowRunRepository::new(
            spec.orchestrator.run_retention,
        )),
        event_bus.clone(),
        OrchestratorSettings::from(&spec.orchestrator),
    ));
    load_workflows(&orchestrator, spec.orchestrator.workflow_dir.as_deref()).await?;

    let gateway = Arc::new(GatewayService::new(
        Arc::clone(&router),
        Arc::clone(&orchestrator),
        &spec.gateway,
    ));

    // Background tasks
    let shutdown = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = vec![Arc::clone(&registry).spawn_sweeper(shutdown.clone())];
    if let Some(interval) = spec.registry.health_probe_interval {
        let prober = Arc::new(HealthProber::new(
            Arc::clone(&registry),
            spec.registry.health_probe_timeout,
        ));
        tasks.push(prober.spawn(interval, shutdown.clone()));
        info!(interval = ?interval, "Active health probing enabled");
    }
    tasks.push(spawn_gateway_maintenance(
        Arc::clone(&gateway),
        shutdown.clone(),
    ));

    let mut state = AppState::new(registry, router, orchestrator, gateway, event_bus);
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }
    if let Some(signer) = signer {
        state = state.with_signer(signer);
    }

    // Start HTTP server
    let host = host.unwrap_or_else(|| spec.network.bind_address.clone());
    let port = port.unwrap_or(spec.network.port);
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Daemon listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Daemon shutting down");
    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    Ok(())
}

/// Registers every manifest in `dir`, then the built-in recommendations
/// workflow unless the directory already supplied one under that name.
async fn load_workflows(orchestrator: &WorkflowOrchestrator, dir: Option<&Path>) -> Result<()> {
    if let Some(dir) = dir {
        let definitions = WorkflowParser::load_dir(dir)
            .with_context(|| format!("Failed to load workflows from {:?}", dir))?;
        for definition in definitions {
            let name = definition.name.clone();
            orchestrator
                .register_definition(definition)
                .await
                .with_context(|| format!("Failed to register workflow '{}'", name))?;
        }
    }

    let builtin = WorkflowName::new(RECOMMENDATIONS_WORKFLOW)
        .context("Invalid built-in workflow name")?;
    if orchestrator.definition(&builtin).await.is_err() {
        let definition = WorkflowParser::parse_yaml(BUILTIN_RECOMMENDATIONS)
            .context("Failed to parse built-in recommendations workflow")?;
        orchestrator
            .register_definition(definition)
            .await
            .context("Failed to register built-in recommendations workflow")?;
    }
    Ok(())
}

fn spawn_gateway_maintenance(
    gateway: Arc<GatewayService>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(GATEWAY_MAINTENANCE_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    gateway.prune();
                    metrics::gauge!("a2a_gateway_cache_entries").set(gateway.cached_entries() as f64);
                }
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
