// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Cluster configuration and request helpers shared by the integration suites.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use fedauth_common_secret::SecretString;
use fedauth_server::review::ReviewForwarder;
use fedauth_server::AppState;
use fedauth_server_config::{AgentConfig, ClusterConfig, ServerConfig};
use fedauth_server_credentials::{CredentialStore, Credentials};
use fedauth_server_k8s::TOKEN_REVIEW_PATH;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub use fedauth_server_oidc::test_support::{MockCluster, TestKey, IN_CLUSTER_ISSUER};

pub const AGENT_SUBJECT: &str = "system:serviceaccount:kube-federated-auth:agent";

pub fn remote_cluster(mock: &MockCluster) -> ClusterConfig {
	ClusterConfig::new(IN_CLUSTER_ISSUER).with_api_server(mock.url())
}

pub fn config_with(clusters: Vec<(&str, ClusterConfig)>) -> ServerConfig {
	let mut config = ServerConfig::default();
	for (name, cluster) in clusters {
		config.clusters.insert(name.to_string(), cluster);
		config.agents.insert(
			name.to_string(),
			AgentConfig {
				service_account: AGENT_SUBJECT.to_string(),
			},
		);
	}
	config
}

pub fn credentials(token: &str) -> Credentials {
	Credentials {
		token: SecretString::new(token.to_string()),
		ca_cert: Vec::new(),
	}
}

/// App state with no in-cluster identity.
pub fn app_state(config: ServerConfig, store: Arc<CredentialStore>) -> AppState {
	let config = Arc::new(config);
	let forwarder = ReviewForwarder::with_ambient(config.clone(), store.clone(), None);
	AppState::with_forwarder(config, store, forwarder)
}

pub async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
	let response = fedauth_server::create_router(state.clone())
		.oneshot(request)
		.await
		.unwrap();
	let status = response.status();
	let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
		.await
		.unwrap();
	let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
	(status, body)
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
	Request::builder()
		.method("POST")
		.uri(uri)
		.header("content-type", "application/json")
		.body(Body::from(body.to_string()))
		.unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
	Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn review_request(token: &str) -> Request<Body> {
	post_json(
		TOKEN_REVIEW_PATH,
		&json!({
			"apiVersion": "authentication.k8s.io/v1",
			"kind": "TokenReview",
			"spec": {"token": token}
		}),
	)
}
