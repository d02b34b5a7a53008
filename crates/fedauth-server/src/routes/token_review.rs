// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! `POST /apis/authentication.k8s.io/v1/tokenreviews`
//!
//! Every outcome after the request is parsed is a `200` envelope; detection
//! and forwarding failures are reported as `authenticated: false`.

use axum::{
	body::Bytes,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use fedauth_common_http::RetryableError;
use fedauth_server_k8s::{TokenReview, UserInfo};
use fedauth_server_oidc::Claims;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::api::AppState;
use crate::review::{detect_cluster, DetectError};

/// Deliberately generic; it must not reveal which clusters were tried.
pub const NO_MATCHING_CLUSTER: &str = "token not valid for any configured cluster";

#[instrument(skip_all)]
pub async fn review_token(State(state): State<AppState>, body: Bytes) -> Response {
	let request: TokenReview = match serde_json::from_slice(&body) {
		Ok(request) => request,
		Err(err) => {
			debug!(error = %err, "unparseable TokenReview");
			return bad_request("invalid request body");
		}
	};
	if request.spec.token.is_empty() {
		return bad_request("token is required");
	}

	// Fires when this handler is dropped, e.g. on client disconnect.
	let cancel = CancellationToken::new();
	let _guard = cancel.clone().drop_guard();

	let deadline = state.config.http.review_timeout;
	let review = match tokio::time::timeout(deadline, review(&state, &request, &cancel)).await {
		Ok(review) => review,
		Err(_) => {
			cancel.cancel();
			warn!(timeout = ?deadline, "identity review timed out");
			TokenReview::unauthenticated("identity review timed out")
		}
	};
	Json(review).into_response()
}

async fn review(state: &AppState, request: &TokenReview, cancel: &CancellationToken) -> TokenReview {
	let claims = match detect_cluster(&state.verifier, &request.spec.token, cancel).await {
		Ok(claims) => claims,
		Err(DetectError::Cancelled) => return TokenReview::unauthenticated("request cancelled"),
		Err(err @ (DetectError::NoMatch | DetectError::Ambiguous)) => {
			info!(error = %err, "cluster detection failed");
			return TokenReview::unauthenticated(NO_MATCHING_CLUSTER);
		}
	};

	let cluster = claims.cluster.as_str();
	info!(
		cluster,
		namespace = claims.namespace().unwrap_or_default(),
		service_account = claims.service_account_name().unwrap_or_default(),
		pod = claims.pod_name().unwrap_or_default(),
		"detected cluster"
	);

	let forwarded = tokio::select! {
		_ = cancel.cancelled() => return TokenReview::unauthenticated("request cancelled"),
		forwarded = state.forwarder.forward(cluster, request) => forwarded,
	};
	match forwarded {
		Ok(response) => {
			if let Some(user) = response.user().filter(|_| response.is_authenticated()) {
				let mismatched = identity_mismatches(&claims, user);
				if !mismatched.is_empty() {
					warn!(cluster, ?mismatched, "cluster review disagrees with the verified token");
				}
			}
			response
		}
		Err(err) => {
			warn!(
				cluster = %cluster,
				error = %err,
				retryable = err.is_retryable(),
				"identity review forwarding failed"
			);
			TokenReview::unauthenticated(format!("failed to validate token: {err}"))
		}
	}
}

/// Fields of the identity the cluster returned that contradict the claims
/// verified locally. The cluster's answer is relayed either way.
pub fn identity_mismatches(claims: &Claims, user: &UserInfo) -> Vec<&'static str> {
	let mut mismatched = Vec::new();
	if user.username != claims.subject {
		mismatched.push("username");
	}
	if user.namespace() != claims.namespace() {
		mismatched.push("namespace");
	}
	if user.service_account_name() != claims.service_account_name() {
		mismatched.push("service_account");
	}
	if !claims.groups().iter().all(|group| user.groups.contains(group)) {
		mismatched.push("groups");
	}
	let extra_conflicts = claims
		.extra()
		.iter()
		.any(|(key, values)| user.extra.get(key).is_some_and(|got| got != values));
	if extra_conflicts {
		mismatched.push("extra");
	}
	mismatched
}

fn bad_request(message: &str) -> Response {
	(StatusCode::BAD_REQUEST, Json(TokenReview::unauthenticated(message))).into_response()
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use std::collections::BTreeMap;

	fn claims() -> Claims {
		serde_json::from_value(json!({
			"cluster": "cluster-b",
			"iss": "https://kubernetes.default.svc.cluster.local",
			"sub": "system:serviceaccount:payments:api",
			"exp": 4_000_000_000i64,
			"kubernetes.io": {
				"namespace": "payments",
				"serviceaccount": {"name": "api", "uid": "sa-1"},
				"pod": {"name": "api-7c9d", "uid": "pod-1"}
			}
		}))
		.unwrap()
	}

	fn matching_user() -> UserInfo {
		UserInfo {
			username: "system:serviceaccount:payments:api".to_string(),
			uid: "sa-1".to_string(),
			groups: vec![
				"system:serviceaccounts".to_string(),
				"system:serviceaccounts:payments".to_string(),
				"system:authenticated".to_string(),
			],
			extra: BTreeMap::from([(
				"authentication.kubernetes.io/pod-name".to_string(),
				vec!["api-7c9d".to_string()],
			)]),
		}
	}

	#[test]
	fn consistent_review_has_no_mismatches() {
		assert!(identity_mismatches(&claims(), &matching_user()).is_empty());
	}

	#[test]
	fn review_for_another_identity_is_flagged() {
		let mut user = matching_user();
		user.username = "system:serviceaccount:billing:worker".to_string();
		user.groups.retain(|g| g != "system:serviceaccounts:payments");
		user.extra.insert(
			"authentication.kubernetes.io/pod-name".to_string(),
			vec!["worker-1".to_string()],
		);
		assert_eq!(
			identity_mismatches(&claims(), &user),
			vec!["username", "namespace", "service_account", "groups", "extra"]
		);
	}

	#[test]
	fn absent_extra_fields_are_not_conflicts() {
		let mut user = matching_user();
		user.extra.clear();
		assert!(identity_mismatches(&claims(), &user).is_empty());
	}
}
