// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use fedauth_common_http::RetryableError;
use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for K8s operations.
pub type K8sResult<T> = Result<T, K8sError>;

/// Errors that can occur during K8s operations.
#[derive(Error, Debug)]
pub enum K8sError {
	/// The cluster could not be reached: connect failure, timeout, TLS.
	#[error("cluster unreachable: {message}")]
	Unreachable { message: String },

	/// The cluster answered with a non-success status.
	#[error("cluster returned HTTP {status}: {message}")]
	Upstream { status: u16, message: String },

	/// The cluster answered but the body was not a valid object.
	#[error("invalid response from cluster: {message}")]
	InvalidResponse { message: String },

	/// Client construction failed, e.g. an unparseable CA bundle.
	#[error("client configuration error: {message}")]
	Config { message: String },
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		match err {
			kube::Error::Api(response) => K8sError::Upstream {
				status: response.code,
				message: response.message,
			},
			kube::Error::SerdeError(e) => K8sError::InvalidResponse {
				message: e.to_string(),
			},
			other => K8sError::Unreachable {
				message: other.to_string(),
			},
		}
	}
}

impl From<reqwest::Error> for K8sError {
	fn from(err: reqwest::Error) -> Self {
		if err.is_decode() {
			K8sError::InvalidResponse {
				message: err.to_string(),
			}
		} else if err.is_builder() {
			K8sError::Config {
				message: err.to_string(),
			}
		} else {
			K8sError::Unreachable {
				message: err.to_string(),
			}
		}
	}
}

impl RetryableError for K8sError {
	fn is_retryable(&self) -> bool {
		match self {
			K8sError::Unreachable { .. } => true,
			K8sError::Upstream { status, .. } => StatusCode::from_u16(*status)
				.map(|s| s.is_retryable())
				.unwrap_or(false),
			K8sError::InvalidResponse { .. } | K8sError::Config { .. } => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn authoritative_rejection_is_not_retryable() {
		let err = K8sError::Upstream {
			status: 401,
			message: "Unauthorized".to_string(),
		};
		assert!(!err.is_retryable());
		assert_eq!(err.to_string(), "cluster returned HTTP 401: Unauthorized");
	}

	#[test]
	fn network_failures_are_retryable() {
		assert!(K8sError::Unreachable {
			message: "connection refused".to_string()
		}
		.is_retryable());
		assert!(K8sError::Upstream {
			status: 503,
			message: String::new()
		}
		.is_retryable());
	}
}
