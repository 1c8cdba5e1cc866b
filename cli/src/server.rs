// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Aggregate manager daemon: recovery, wiring and the HTTP listener

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, warn};

use gram_core::{
    application::{
        aggregate_manager::{AggregateSettings, Collaborators, StandardAggregateManager},
        recovery::recover,
    },
    domain::{
        aggregate_config::AggregateConfigManifest, registry::SliceRegistry,
        snapshot::SnapshotStore,
    },
    infrastructure::{
        descriptor_parser::YamlDescriptorParser,
        dev_credentials::DevCredentialVerifier,
        event_bus::{EventBus, EventBusError},
        simulated_backend::SimulatedBackend,
        snapshot_store::FileSnapshotStore,
        stitching::InMemoryStitchingRegistry,
    },
    presentation::api,
};

/// Listener overrides taken from the command line
#[derive(Debug, Default, Clone)]
pub struct ListenOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Build the manager from configuration, restoring state from snapshots
pub fn build_manager(config: &AggregateConfigManifest) -> Result<StandardAggregateManager> {
    let settings =
        AggregateSettings::from_manifest(config).context("Invalid aggregate settings")?;
    let stitching = Arc::new(InMemoryStitchingRegistry::new());

    let store = match &config.spec.snapshots.directory {
        Some(dir) => Some(Arc::new(
            FileSnapshotStore::open(dir)
                .with_context(|| format!("Failed to open snapshot directory {:?}", dir))?,
        )),
        None => {
            warn!("No snapshot directory configured, state will not survive a restart");
            None
        }
    };

    let registry = match &store {
        Some(store) => {
            let state = recover(store.as_ref(), &config.spec.snapshots, stitching.as_ref())
                .context("Failed to recover aggregate state")?;
            if let Some(source) = &state.source {
                info!(snapshot = %source, slices = state.slices.len(), "Recovered slices");
            }
            SliceRegistry::from_slices(state.slices)
        }
        None => SliceRegistry::new(),
    };

    let collaborators = Collaborators {
        verifier: Arc::new(DevCredentialVerifier::new()),
        backend: Arc::new(SimulatedBackend::new(&config.spec.backend)),
        stitching,
        parser: Arc::new(YamlDescriptorParser::new()),
        snapshots: store.map(|s| s as Arc<dyn SnapshotStore>),
        event_bus: EventBus::with_default_capacity(),
    };

    Ok(StandardAggregateManager::new(
        settings,
        Arc::new(registry),
        collaborators,
    ))
}

pub async fn start_server(
    config: AggregateConfigManifest,
    overrides: ListenOverrides,
) -> Result<()> {
    config
        .validate()
        .context("Configuration validation failed")?;

    info!(
        aggregate = %config.aggregate_urn(),
        name = %config.metadata.name,
        "GRAM aggregate manager starting"
    );

    if let Some(metrics) = config
        .spec
        .observability
        .metrics
        .as_ref()
        .filter(|m| m.enabled)
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], metrics.port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics exporter listening on {}", addr);
    }

    let manager = Arc::new(build_manager(&config)?);
    spawn_event_logger(manager.event_bus().clone());

    let host = overrides
        .host
        .unwrap_or_else(|| config.spec.network.bind_address.clone());
    let port = overrides.port.unwrap_or(config.spec.network.port);
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Aggregate manager listening on {}", addr);

    axum::serve(listener, api::app(manager.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Aggregate manager shutting down, writing final snapshot");
    manager.persist_state().await;

    Ok(())
}

fn spawn_event_logger(event_bus: EventBus) {
    let mut receiver = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => debug!(event = ?event, "Slice event"),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });
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

#[cfg(test)]
mod tests {
    use super::*;
    use gram_core::application::aggregate_manager::AggregateManager;
    use gram_core::domain::credential::Privilege;
    use gram_core::domain::result::AmOptions;

    const SLICE: &str = "urn:publicid:IDN+gcf+slice+daemon";

    fn config_with_snapshots(dir: &std::path::Path) -> AggregateConfigManifest {
        let mut config = AggregateConfigManifest::default();
        config.spec.snapshots.directory = Some(dir.to_path_buf());
        config
    }

    #[tokio::test]
    async fn test_build_manager_recovers_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_snapshots(dir.path());
        let credentials = vec![DevCredentialVerifier::issue(
            "urn:publicid:IDN+gcf+user+alice",
            SLICE,
            &[Privilege::Allocate],
            chrono::Utc::now() + chrono::Duration::hours(1),
        )];

        let first = build_manager(&config).unwrap();
        first
            .allocate(
                SLICE,
                &credentials,
                "nodes:\n  - client_id: vm1\n",
                &AmOptions::default(),
            )
            .await
            .unwrap();
        drop(first);

        let second = build_manager(&config).unwrap();
        assert_eq!(second.registry().len(), 1);
    }

    #[test]
    fn test_build_manager_without_snapshots_starts_empty() {
        let manager = build_manager(&AggregateConfigManifest::default()).unwrap();
        assert!(manager.registry().is_empty());
    }
}
