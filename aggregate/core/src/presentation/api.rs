// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::application::aggregate_manager::{
    AggregateManager, DescribeResponse, ManifestResponse, StatusResponse, VersionInfo,
};
use crate::domain::credential::Credential;
use crate::domain::result::{AmOptions, OperationResult};
use crate::domain::sliver::SliverStatus;

pub struct AppState {
    pub manager: Arc<dyn AggregateManager>,
}

pub fn app(manager: Arc<dyn AggregateManager>) -> Router {
    let state = Arc::new(AppState { manager });

    Router::new()
        .route("/health", get(health))
        .route("/version", get(get_version))
        .route("/list_resources", post(list_resources))
        .route("/allocate", post(allocate))
        .route("/provision", post(provision))
        .route("/describe", post(describe))
        .route("/status", post(status))
        .route("/renew", post(renew))
        .route("/perform_operational_action", post(perform_operational_action))
        .route("/delete", post(delete))
        .route("/shutdown", post(shutdown))
        .with_state(state)
}

// ============================================================================
// Request Bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListResourcesRequest {
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub options: AmOptions,
}

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub slice_urn: String,
    #[serde(default)]
    pub credentials: Vec<Credential>,
    pub rspec: String,
    #[serde(default)]
    pub options: AmOptions,
}

/// Body shared by operations addressed by a URN list
#[derive(Debug, Deserialize)]
pub struct UrnsRequest {
    pub urns: Vec<String>,
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub options: AmOptions,
}

#[derive(Debug, Deserialize)]
pub struct RenewRequest {
    pub urns: Vec<String>,
    #[serde(default)]
    pub credentials: Vec<Credential>,
    pub expiration: DateTime<Utc>,
    #[serde(default)]
    pub options: AmOptions,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub urns: Vec<String>,
    #[serde(default)]
    pub credentials: Vec<Credential>,
    pub action: String,
    #[serde(default)]
    pub options: AmOptions,
}

#[derive(Debug, Deserialize)]
pub struct ShutdownRequest {
    pub slice_urn: String,
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub options: AmOptions,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

async fn get_version(State(state): State<Arc<AppState>>) -> Json<OperationResult<VersionInfo>> {
    Json(OperationResult::success(state.manager.get_version().await))
}

async fn list_resources(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ListResourcesRequest>,
) -> Json<OperationResult<String>> {
    Json(
        state
            .manager
            .list_resources(&payload.credentials, &payload.options)
            .await
            .into(),
    )
}

async fn allocate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AllocateRequest>,
) -> Json<OperationResult<ManifestResponse>> {
    Json(
        state
            .manager
            .allocate(
                &payload.slice_urn,
                &payload.credentials,
                &payload.rspec,
                &payload.options,
            )
            .await
            .into(),
    )
}

async fn provision(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UrnsRequest>,
) -> Json<OperationResult<ManifestResponse>> {
    Json(
        state
            .manager
            .provision(&payload.urns, &payload.credentials, &payload.options)
            .await
            .into(),
    )
}

async fn describe(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UrnsRequest>,
) -> Json<OperationResult<DescribeResponse>> {
    Json(
        state
            .manager
            .describe(&payload.urns, &payload.credentials, &payload.options)
            .await
            .into(),
    )
}

async fn status(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UrnsRequest>,
) -> Json<OperationResult<StatusResponse>> {
    Json(
        state
            .manager
            .status(&payload.urns, &payload.credentials, &payload.options)
            .await
            .into(),
    )
}

async fn renew(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RenewRequest>,
) -> Json<OperationResult<Vec<SliverStatus>>> {
    Json(
        state
            .manager
            .renew(
                &payload.urns,
                &payload.credentials,
                payload.expiration,
                &payload.options,
            )
            .await
            .into(),
    )
}

async fn perform_operational_action(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ActionRequest>,
) -> Json<OperationResult<Vec<SliverStatus>>> {
    Json(
        state
            .manager
            .perform_operational_action(
                &payload.urns,
                &payload.credentials,
                &payload.action,
                &payload.options,
            )
            .await
            .into(),
    )
}

async fn delete(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UrnsRequest>,
) -> Json<OperationResult<Vec<SliverStatus>>> {
    Json(
        state
            .manager
            .delete(&payload.urns, &payload.credentials, &payload.options)
            .await
            .into(),
    )
}

async fn shutdown(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ShutdownRequest>,
) -> Json<OperationResult<bool>> {
    Json(
        state
            .manager
            .shutdown(&payload.slice_urn, &payload.credentials, &payload.options)
            .await
            .into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::aggregate_manager::{
        AggregateSettings, Collaborators, StandardAggregateManager,
    };
    use crate::application::expiry::ExpirationPolicy;
    use crate::domain::aggregate_config::BackendConfig;
    use crate::domain::credential::Privilege;
    use crate::domain::registry::SliceRegistry;
    use crate::domain::urn::UrnAuthority;
    use crate::infrastructure::descriptor_parser::YamlDescriptorParser;
    use crate::infrastructure::dev_credentials::DevCredentialVerifier;
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::simulated_backend::SimulatedBackend;
    use crate::infrastructure::stitching::InMemoryStitchingRegistry;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    const SLICE: &str = "urn:publicid:IDN+gcf+slice+web";

    fn router() -> Router {
        let settings = AggregateSettings {
            authority: UrnAuthority::new("geni.net:gram").unwrap(),
            aggregate_urn: "urn:publicid:IDN+geni.net:gram+authority+am".to_string(),
            expiration: ExpirationPolicy {
                allocation_lifetime: chrono::Duration::minutes(10),
                provision_lifetime: chrono::Duration::days(1),
                allow_shorten: true,
            },
            max_vms_per_slice: 10,
            snapshot_retention: 3,
        };
        let collaborators = Collaborators {
            verifier: Arc::new(DevCredentialVerifier::new()),
            backend: Arc::new(SimulatedBackend::new(&BackendConfig::default())),
            stitching: Arc::new(InMemoryStitchingRegistry::new()),
            parser: Arc::new(YamlDescriptorParser::new()),
            snapshots: None,
            event_bus: EventBus::with_default_capacity(),
        };
        let manager = StandardAggregateManager::new(
            settings,
            Arc::new(SliceRegistry::new()),
            collaborators,
        );
        app(Arc::new(manager))
    }

    async fn post_json(router: Router, uri: &str, body: serde_json::Value) -> serde_json::Value {
        let response = router
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_version_endpoint() {
        let response = router()
            .oneshot(Request::get("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"]["geni_code"], 0);
        assert_eq!(body["value"]["geni_api"], 3);
    }

    #[tokio::test]
    async fn test_allocate_then_describe_unknown() {
        let router = router();
        let credential = DevCredentialVerifier::issue(
            "urn:publicid:IDN+gcf+user+alice",
            SLICE,
            &[Privilege::Allocate, Privilege::SliverStatus],
            Utc::now() + chrono::Duration::hours(2),
        );

        let allocated = post_json(
            router.clone(),
            "/allocate",
            serde_json::json!({
                "slice_urn": SLICE,
                "credentials": [credential],
                "rspec": "nodes:\n  - client_id: vm1\n",
            }),
        )
        .await;
        assert_eq!(allocated["code"]["geni_code"], 0);
        assert_eq!(allocated["value"]["geni_slivers"].as_array().unwrap().len(), 1);

        let unknown = post_json(
            router,
            "/describe",
            serde_json::json!({
                "urns": ["urn:publicid:IDN+gcf+slice+nothing"],
                "credentials": [credential],
            }),
        )
        .await;
        assert_eq!(unknown["code"]["geni_code"], 12);
        assert!(unknown["value"].is_null());
    }
}
