// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use axum::{extract::State, Json};
use chrono::Utc;
use fedauth_server_credentials::{token_status, TokenStatus};
use serde::{Deserialize, Serialize};

use crate::api::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ClusterInfo {
	pub name: String,
	pub issuer: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub api_server: Option<String>,
	/// Present only when credentials are registered for the cluster.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_status: Option<TokenStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClustersResponse {
	pub clusters: Vec<ClusterInfo>,
}

/// GET /clusters - configured clusters and the freshness of their
/// registered credentials.
pub async fn list_clusters(State(state): State<AppState>) -> Json<ClustersResponse> {
	let now = Utc::now();
	let mut clusters = Vec::with_capacity(state.config.clusters.len());
	for (name, cfg) in &state.config.clusters {
		let token_status = state
			.store
			.get(name)
			.await
			.map(|creds| token_status(creds.token.expose(), now));
		clusters.push(ClusterInfo {
			name: name.clone(),
			issuer: cfg.issuer.clone(),
			api_server: cfg.api_server.clone().filter(|api| !api.is_empty()),
			token_status,
		});
	}
	Json(ClustersResponse { clusters })
}
