// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! `POST /validate` - verify a token against a named cluster and return its
//! claims. Nothing is forwarded; the caller names the cluster.

use axum::{
	body::Bytes,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use fedauth_server_oidc::VerifyError;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::api::AppState;
use crate::error::ErrorResponse;

#[derive(Deserialize)]
pub struct ValidateRequest {
	#[serde(default)]
	pub cluster: String,
	#[serde(default)]
	pub token: String,
}

#[instrument(skip_all)]
pub async fn validate(State(state): State<AppState>, body: Bytes) -> Response {
	let Ok(request) = serde_json::from_slice::<ValidateRequest>(&body) else {
		return invalid_request("Invalid request body");
	};
	if request.cluster.is_empty() {
		return invalid_request("cluster is required");
	}
	if request.token.is_empty() {
		return invalid_request("token is required");
	}

	match state.verifier.verify(&request.cluster, &request.token).await {
		Ok(claims) => Json(claims).into_response(),
		Err(err) => {
			debug!(cluster = %request.cluster, error = %err, "validation failed");
			let (status, body) = map_error(&err);
			body.into_response_with(status)
		}
	}
}

/// Maps a verification failure to the validation endpoint's status and code.
pub fn map_error(err: &VerifyError) -> (StatusCode, ErrorResponse) {
	let (status, code) = match err {
		VerifyError::ClusterNotFound(_) => (StatusCode::BAD_REQUEST, "cluster_not_found"),
		VerifyError::Expired => (StatusCode::UNAUTHORIZED, "token_expired"),
		VerifyError::InvalidSignature | VerifyError::KeyNotFound => {
			(StatusCode::UNAUTHORIZED, "invalid_signature")
		}
		VerifyError::Client(_) | VerifyError::Discovery(_) => {
			(StatusCode::INTERNAL_SERVER_ERROR, "oidc_discovery_failed")
		}
		VerifyError::KeySet(_) => (StatusCode::INTERNAL_SERVER_ERROR, "jwks_fetch_failed"),
		_ => (StatusCode::UNAUTHORIZED, "invalid_token"),
	};
	(status, ErrorResponse::new(code, err.to_string()))
}

fn invalid_request(message: &str) -> Response {
	ErrorResponse::new("invalid_request", message).into_response_with(StatusCode::BAD_REQUEST)
}
