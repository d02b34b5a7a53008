// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use fedauth_server_oidc::{Claims, VerifierManager, VerifyError};
use futures::future::join_all;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DetectError {
	#[error("token signature does not match any configured cluster")]
	NoMatch,

	#[error("token is accepted by more than one cluster")]
	Ambiguous,

	#[error("detection cancelled")]
	Cancelled,
}

/// Finds the one configured cluster whose published keys verify `token`.
///
/// Every cluster is checked concurrently and the token is only checked
/// locally against public key material; it is not sent anywhere. A token
/// that verifies against more than one cluster is rejected rather than
/// attributed to either, as is any token while two clusters are known to
/// share a signing key. Stops as soon as `cancel` fires, including mid-check.
#[instrument(skip_all)]
pub async fn detect_cluster(
	verifier: &VerifierManager,
	token: &str,
	cancel: &CancellationToken,
) -> Result<Claims, DetectError> {
	let checks = verifier
		.config()
		.cluster_names()
		.map(|cluster| async move { (cluster, verifier.verify(cluster, token).await) });

	let outcomes = tokio::select! {
		biased;
		_ = cancel.cancelled() => return Err(DetectError::Cancelled),
		outcomes = join_all(checks) => outcomes,
	};

	let mut matches = Vec::new();
	let mut collisions = Vec::new();
	for (cluster, outcome) in outcomes {
		match outcome {
			Ok(claims) => matches.push(claims),
			Err(VerifyError::KeyCollision { cluster, other }) => collisions.push((cluster, other)),
			Err(err) => {
				debug!(cluster, kind = ?err.kind(), error = %err, "token not valid for cluster");
			}
		}
	}

	if let Some((cluster, other)) = collisions.first() {
		error!(cluster = %cluster, other = %other, "clusters share a signing key; refusing to attribute");
		return Err(DetectError::Ambiguous);
	}
	let claims = match matches.len() {
		0 => return Err(DetectError::NoMatch),
		1 => matches.swap_remove(0),
		_ => {
			let clusters: Vec<&str> = matches.iter().map(|c| c.cluster.as_str()).collect();
			error!(?clusters, "token verified against several clusters; refusing to attribute");
			return Err(DetectError::Ambiguous);
		}
	};

	debug!(cluster = %claims.cluster, subject = %claims.subject, "cluster detected");
	Ok(claims)
}
