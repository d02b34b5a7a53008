// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! `POST /register` - an agent pushes its cluster's bearer token and CA.
//!
//! The agent authenticates with a token issued by the cluster it registers,
//! verified against that cluster's own keys, and its subject must match the
//! configured allow-list entry for the cluster.

use axum::{
	body::Bytes,
	extract::State,
	http::{header::AUTHORIZATION, HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	Json,
};
use chrono::{Duration, SecondsFormat, Utc};
use fedauth_common_secret::SecretString;
use fedauth_server_credentials::{decode_ca_cert, CredentialError, Credentials};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::api::AppState;
use crate::error::ErrorResponse;

/// Nominal lifetime reported to the agent; it re-registers well before this.
const REGISTRATION_HORIZON_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
	#[serde(default)]
	pub cluster: String,
	#[serde(default)]
	pub credentials: RegisterCredentials,
}

#[derive(Default, Deserialize)]
pub struct RegisterCredentials {
	#[serde(default)]
	pub token: String,
	/// Base64-encoded PEM bundle.
	#[serde(default)]
	pub ca_cert: String,
}

impl std::fmt::Debug for RegisterCredentials {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RegisterCredentials")
			.field("token", &fedauth_common_secret::REDACTED)
			.field("ca_cert_len", &self.ca_cert.len())
			.finish()
	}
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
	pub status: String,
	pub cluster: String,
	pub expires_at: String,
}

fn reject(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
	ErrorResponse::new(error, message).into_response_with(status)
}

#[instrument(skip_all)]
pub async fn register(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
	let Some(auth) = headers.get(AUTHORIZATION) else {
		return reject(
			StatusCode::UNAUTHORIZED,
			"unauthorized",
			"Authorization header required",
		);
	};
	let Some(agent_token) = auth.to_str().ok().and_then(|v| v.strip_prefix("Bearer ")) else {
		return reject(StatusCode::UNAUTHORIZED, "unauthorized", "Bearer token required");
	};

	let request: RegisterRequest = match serde_json::from_slice(&body) {
		Ok(request) => request,
		Err(_) => {
			return reject(
				StatusCode::BAD_REQUEST,
				"invalid_request",
				"Invalid request body",
			)
		}
	};
	let cluster = request.cluster.as_str();
	if cluster.is_empty() {
		return reject(StatusCode::BAD_REQUEST, "invalid_request", "cluster is required");
	}
	if state.config.cluster(cluster).is_none() {
		return reject(
			StatusCode::BAD_REQUEST,
			"cluster_not_found",
			format!("No configuration found for cluster: {cluster}"),
		);
	}

	let claims = match state.verifier.verify(cluster, agent_token).await {
		Ok(claims) => claims,
		Err(err) => {
			warn!(cluster, kind = ?err.kind(), error = %err, "agent token validation failed");
			return reject(
				StatusCode::UNAUTHORIZED,
				"invalid_token",
				"Agent token validation failed",
			);
		}
	};

	if !state.config.is_agent_authorized(cluster, &claims.subject) {
		warn!(cluster, subject = %claims.subject, "unauthorized agent");
		return reject(
			StatusCode::FORBIDDEN,
			"unauthorized_agent",
			format!("ServiceAccount not authorized to register credentials for {cluster}"),
		);
	}

	if request.credentials.token.is_empty() {
		return reject(
			StatusCode::BAD_REQUEST,
			"invalid_request",
			"credentials.token is required",
		);
	}
	let Ok(ca_cert) = decode_ca_cert(&request.credentials.ca_cert) else {
		return reject(
			StatusCode::BAD_REQUEST,
			"invalid_request",
			"Invalid CA certificate encoding",
		);
	};

	let creds = Credentials {
		token: SecretString::new(request.credentials.token),
		ca_cert,
	};
	match state.store.set(cluster, creds).await {
		Ok(()) => {}
		// The in-memory entry is already updated and is what serves requests.
		Err(err @ CredentialError::Persistence { .. }) => {
			warn!(cluster, error = %err, "registered credentials were not persisted");
		}
		Err(err) => {
			warn!(cluster, error = %err, "failed to store credentials");
			return reject(
				StatusCode::INTERNAL_SERVER_ERROR,
				"internal_error",
				"Failed to store credentials",
			);
		}
	}

	state.verifier.invalidate_verifier(cluster).await;
	info!(cluster, agent = %claims.subject, "registered credentials");

	let expires_at = (Utc::now() + Duration::days(REGISTRATION_HORIZON_DAYS))
		.to_rfc3339_opts(SecondsFormat::Secs, true);
	Json(RegisterResponse {
		status: "accepted".to_string(),
		cluster: request.cluster,
		expires_at,
	})
	.into_response()
}
