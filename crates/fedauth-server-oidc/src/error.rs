// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use jsonwebtoken::Algorithm;
use thiserror::Error;

pub type VerifyResult<T> = Result<T, VerifyError>;

/// Coarse classification used to pick HTTP status and retry behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyErrorKind {
	/// Not retryable; the request or the configuration must change.
	Configuration,
	/// Transient; surfaced as a server-side failure.
	Discovery,
	/// Transient; surfaced as a server-side failure.
	KeySet,
	/// The token was not signed by this cluster. Normal during detection.
	SignatureMismatch,
	/// Signed by this cluster but expired, not yet valid or malformed.
	ClaimInvalid,
}

#[derive(Error, Debug, Clone)]
pub enum VerifyError {
	#[error("cluster not found: {0}")]
	ClusterNotFound(String),

	#[error("cluster {cluster} shares a signing key with cluster {other}")]
	KeyCollision { cluster: String, other: String },

	#[error("building client for cluster: {0}")]
	Client(String),

	#[error("OIDC discovery failed: {0}")]
	Discovery(String),

	#[error("JWKS fetch failed: {0}")]
	KeySet(String),

	#[error("no key in the key set matches the token")]
	KeyNotFound,

	#[error("signature verification failed")]
	InvalidSignature,

	#[error("token expired")]
	Expired,

	#[error("token not yet valid")]
	NotYetValid,

	#[error("issuer mismatch")]
	IssuerMismatch,

	#[error("unsupported algorithm {0:?}")]
	UnsupportedAlgorithm(Algorithm),

	#[error("malformed token: {0}")]
	Malformed(String),

	#[error("invalid claims: {0}")]
	InvalidClaims(String),
}

impl VerifyError {
	pub fn kind(&self) -> VerifyErrorKind {
		match self {
			VerifyError::ClusterNotFound(_) | VerifyError::KeyCollision { .. } => {
				VerifyErrorKind::Configuration
			}
			VerifyError::Client(_) | VerifyError::Discovery(_) => VerifyErrorKind::Discovery,
			VerifyError::KeySet(_) => VerifyErrorKind::KeySet,
			VerifyError::KeyNotFound | VerifyError::InvalidSignature => {
				VerifyErrorKind::SignatureMismatch
			}
			VerifyError::Expired
			| VerifyError::NotYetValid
			| VerifyError::IssuerMismatch
			| VerifyError::UnsupportedAlgorithm(_)
			| VerifyError::Malformed(_)
			| VerifyError::InvalidClaims(_) => VerifyErrorKind::ClaimInvalid,
		}
	}

	pub fn is_transient(&self) -> bool {
		matches!(
			self.kind(),
			VerifyErrorKind::Discovery | VerifyErrorKind::KeySet
		)
	}
}
